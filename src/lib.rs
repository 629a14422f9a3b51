//! Curly is a fast and correct implementation of the [Jinja][]
//! general purpose template engine.
//!
//! The lexer generates a stream of tokens which are consumed by a
//! parser that transforms them into AST nodes; these nodes can then
//! be stored as compiled templates or rendered directly against any
//! `serde::Serialize` data mapping.
//!
//! The main public API is accessed using an
//! [Environment](environment::Environment) which owns the syntax
//! configuration, the filter, test and global registries, the
//! template cache and every pipeline entry point.
//!
//! ## Templates
//!
//! Templates should be named so that useful error messages can be
//! generated; if a name is not available the value of *unknown* will
//! be used as the template name.
//!
//! Render a one-off template source:
//!
//! ```ignore
//! let env = Environment::new();
//! let result = env.render_str(
//!     "hello.txt",
//!     "Hello {{ name }}!",
//!     &json!({"name": "world"}),
//! )?;
//! ```
//!
//! To resolve templates by name configure a [Loader](loader::Loader);
//! the in-memory loader works well for tests and embedded templates
//! while the file loader reads from a directory (requires the `fs`
//! feature, enabled by default):
//!
//! ```ignore
//! let mut loader = MemoryLoader::new();
//! loader.insert("base.html", "{% block body %}{% endblock %}");
//! let mut env = Environment::new();
//! env.set_loader(Box::new(loader));
//! let result = env.render("base.html", &json!({}))?;
//! ```
//!
//! ## Expressions and statements
//!
//! The statement and expression language is Jinja: `{{ ... }}` prints
//! an expression, `{% ... %}` introduces statements such as `if`,
//! `for`, `set`, `block`, `extends`, `include`, `import`, `macro`,
//! `call`, `filter`, `with`, `do` and `autoescape`, and `{# ... #}`
//! is a comment. All nine delimiters, the line statement and line
//! comment prefixes and the whitespace control policy are
//! configurable through [Syntax](lexer::Syntax).
//!
//! ## Filters and tests
//!
//! Filters transform values with `{{ value | upper }}`, tests probe
//! them with `{% if x is even %}`. Both registries are open; custom
//! callables may ask for the active context or the owning
//! environment by registering through
//! [pass_context](callable::pass_context) or
//! [pass_environment](callable::pass_environment):
//!
//! ```ignore
//! env.add_filter("shout", |inv| {
//!     Ok(Value::String(format!("{}!", inv.value_string()?)))
//! });
//! ```
//!
//! ## Escaping
//!
//! Auto-escaping is off by default; enable it on the environment or
//! scope it with `{% autoescape true %}`. Values marked safe with the
//! `safe` filter pass through untouched. The escape function itself
//! is replaceable with `set_escape()`.
//!
//! [Jinja]: https://jinja.palletsprojects.com
//!

pub mod callable;
pub mod context;
pub mod environment;
pub mod error;
pub mod escape;
#[cfg(feature = "builtins")]
pub(crate) mod filters;
#[cfg(feature = "builtins")]
pub(crate) mod functions;
pub mod lexer;
pub mod loader;
pub mod optimizer;
pub mod output;
pub mod parser;
pub mod render;
#[cfg(feature = "builtins")]
pub(crate) mod tests;
pub(crate) mod value;

/// Result type returned by the environment.
pub type Result<T> = std::result::Result<T, error::Error>;

/// Result type returned when rendering templates.
pub type RenderResult<T> = std::result::Result<T, error::RenderError>;

/// Result type returned when lexing templates.
pub type SyntaxResult<T> = std::result::Result<T, error::SyntaxError>;

pub use environment::{Environment, Template};
pub use error::Error;
pub use escape::EscapeFn;
pub use lexer::{Newline, Syntax};
pub use loader::MemoryLoader;
#[cfg(feature = "fs")]
pub use loader::FileLoader;
