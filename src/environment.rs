//! Environment configuration, registries and the pipeline entry
//! points.
//!
//! The environment owns the syntax configuration, the global, filter
//! and test registries, the template cache and every way into the
//! pipeline: `lex`, `parse`, `compile`, `get_template` and the render
//! helpers.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::{
    callable::{CallableFn, Invocation},
    context::{Context, Scope},
    error::{Error, RenderError},
    escape::{self, EscapeFn},
    lexer::{self, Syntax, Token},
    loader::Loader,
    optimizer,
    output::{Output, StringOutput},
    parser::{
        ast::{Expr, Node},
        Parser,
    },
    render::{Render, RenderIter},
    Result,
};

/// A value or function exposed to every template.
pub enum Global {
    Value(Value),
    Function(CallableFn),
}

/// AST rewriting pass registered on the environment; modifiers run
/// after parsing in registration order, before the optimizer.
pub type ModifierFn = Box<dyn Fn(&mut Vec<Node>) + Send + Sync>;

/// Post-processing applied to every rendered expression.
///
/// The three accepted shapes mirror the pass modes for filters; all
/// are invoked through the canonical context taking form.
pub enum Finalize {
    Value(Box<dyn Fn(Value) -> Value + Send + Sync>),
    Environment(Box<dyn Fn(&Environment, Value) -> Value + Send + Sync>),
    Context(Box<dyn Fn(&Context<'_>, Value) -> Value + Send + Sync>),
}

impl Finalize {
    /// Finalize from a plain value transform.
    pub fn value<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::Value(Box::new(f))
    }

    /// Finalize that receives the owning environment.
    pub fn with_environment<F>(f: F) -> Self
    where
        F: Fn(&Environment, Value) -> Value + Send + Sync + 'static,
    {
        Self::Environment(Box::new(f))
    }

    /// Finalize that receives the active context.
    pub fn with_context<F>(f: F) -> Self
    where
        F: Fn(&Context<'_>, Value) -> Value + Send + Sync + 'static,
    {
        Self::Context(Box::new(f))
    }
}

type AttrHook = Box<dyn Fn(&Value, &str) -> Option<Value> + Send + Sync>;
type ItemHook = Box<dyn Fn(&Value, &Value) -> Option<Value> + Send + Sync>;

/// Configuration root for a whole pipeline.
pub struct Environment {
    syntax: Syntax,
    optimize: bool,
    auto_escape: bool,
    auto_reload: bool,
    strict: bool,
    escape: EscapeFn,
    finalize: Option<Finalize>,
    attr_hook: Option<AttrHook>,
    item_hook: Option<ItemHook>,
    globals: HashMap<String, Global>,
    filters: HashMap<String, CallableFn>,
    tests: HashMap<String, CallableFn>,
    modifiers: Vec<ModifierFn>,
    loader: Option<Box<dyn Loader>>,
    cache: RefCell<HashMap<String, Rc<Template>>>,
}

impl Environment {
    /// Create an environment with the default configuration and the
    /// builtin registries.
    pub fn new() -> Self {
        let mut env = Self {
            syntax: Syntax::default(),
            optimize: true,
            auto_escape: false,
            auto_reload: true,
            strict: false,
            escape: Box::new(escape::html),
            finalize: None,
            attr_hook: None,
            item_hook: None,
            globals: HashMap::new(),
            filters: HashMap::new(),
            tests: HashMap::new(),
            modifiers: Vec::new(),
            loader: None,
            cache: RefCell::new(HashMap::new()),
        };
        env.builtins();
        env
    }

    #[allow(unused_mut, unused_variables)]
    fn builtins(&mut self) {
        #[cfg(feature = "builtins")]
        {
            crate::filters::register(&mut self.filters);
            crate::tests::register(&mut self.tests);
            crate::functions::register(&mut self.globals);
        }
    }

    /// Syntax configuration used by the lexer.
    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// Mutable syntax configuration; configure before compiling.
    pub fn syntax_mut(&mut self) -> &mut Syntax {
        &mut self.syntax
    }

    pub fn set_syntax(&mut self, syntax: Syntax) {
        self.syntax = syntax;
    }

    pub fn set_optimize(&mut self, optimize: bool) {
        self.optimize = optimize;
    }

    pub fn auto_escape(&self) -> bool {
        self.auto_escape
    }

    pub fn set_auto_escape(&mut self, auto_escape: bool) {
        self.auto_escape = auto_escape;
    }

    pub fn set_auto_reload(&mut self, auto_reload: bool) {
        self.auto_reload = auto_reload;
    }

    /// Strict mode raises on unresolved variables instead of
    /// yielding undefined.
    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Set the escape function used by auto-escaping and the escape
    /// filter.
    pub fn set_escape(&mut self, escape: EscapeFn) {
        self.escape = escape;
    }

    pub(crate) fn escape_fn(&self) -> &EscapeFn {
        &self.escape
    }

    pub fn set_finalize(&mut self, finalize: Finalize) {
        self.finalize = Some(finalize);
    }

    /// Apply the configured finalize to an output value.
    pub(crate) fn apply_finalize(
        &self,
        ctx: &Context<'_>,
        value: Value,
    ) -> Value {
        match self.finalize {
            None => value,
            Some(Finalize::Value(ref f)) => f(value),
            Some(Finalize::Environment(ref f)) => f(self, value),
            Some(Finalize::Context(ref f)) => f(ctx, value),
        }
    }

    /// Override the attribute access hook.
    pub fn set_attribute_hook<F>(&mut self, f: F)
    where
        F: Fn(&Value, &str) -> Option<Value> + Send + Sync + 'static,
    {
        self.attr_hook = Some(Box::new(f));
    }

    /// Override the index access hook.
    pub fn set_item_hook<F>(&mut self, f: F)
    where
        F: Fn(&Value, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.item_hook = Some(Box::new(f));
    }

    pub(crate) fn get_attr(
        &self,
        value: &Value,
        name: &str,
    ) -> Option<Value> {
        match self.attr_hook {
            Some(ref hook) => hook(value, name),
            None => crate::value::get_attr(value, name),
        }
    }

    pub(crate) fn get_item(
        &self,
        value: &Value,
        key: &Value,
    ) -> Option<Value> {
        match self.item_hook {
            Some(ref hook) => hook(value, key),
            None => crate::value::get_item(value, key),
        }
    }

    /// Add a global value visible to every template.
    pub fn add_global<T: Serialize>(&mut self, name: &str, value: T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.globals
            .insert(name.to_string(), Global::Value(value));
    }

    /// Add a global function.
    pub fn add_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Invocation) -> crate::RenderResult<Value>
            + Send
            + Sync
            + 'static,
    {
        self.globals.insert(
            name.to_string(),
            Global::Function(crate::callable::plain(f)),
        );
    }

    /// Add a global function with an explicit pass mode.
    pub fn add_function_with(&mut self, name: &str, f: CallableFn) {
        self.globals.insert(name.to_string(), Global::Function(f));
    }

    /// Add a filter.
    pub fn add_filter<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Invocation) -> crate::RenderResult<Value>
            + Send
            + Sync
            + 'static,
    {
        self.filters
            .insert(name.to_string(), crate::callable::plain(f));
    }

    /// Add a filter with an explicit pass mode; combine with
    /// `pass_context` or `pass_environment`.
    pub fn add_filter_with(&mut self, name: &str, f: CallableFn) {
        self.filters.insert(name.to_string(), f);
    }

    /// Add a test.
    pub fn add_test<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Invocation) -> crate::RenderResult<Value>
            + Send
            + Sync
            + 'static,
    {
        self.tests
            .insert(name.to_string(), crate::callable::plain(f));
    }

    /// Add a test with an explicit pass mode.
    pub fn add_test_with(&mut self, name: &str, f: CallableFn) {
        self.tests.insert(name.to_string(), f);
    }

    /// Register an AST modifier.
    pub fn add_modifier(&mut self, f: ModifierFn) {
        self.modifiers.push(f);
    }

    pub(crate) fn filters(&self) -> &HashMap<String, CallableFn> {
        &self.filters
    }

    pub(crate) fn tests(&self) -> &HashMap<String, CallableFn> {
        &self.tests
    }

    pub(crate) fn global(&self, name: &str) -> Option<&Global> {
        self.globals.get(name)
    }

    /// Value form of a global, used by context resolution.
    pub(crate) fn global_value(&self, name: &str) -> Option<Value> {
        match self.globals.get(name) {
            Some(Global::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    /// Set the template loader.
    pub fn set_loader(&mut self, loader: Box<dyn Loader>) {
        self.loader = Some(loader);
    }

    /// Lex a source string into tokens.
    pub fn lex(&self, source: &str) -> Result<Vec<Token>> {
        Ok(lexer::collect(source, &self.syntax, None)?)
    }

    /// Parse a source string into an AST.
    pub fn parse(
        &self,
        source: &str,
        name: Option<&str>,
    ) -> Result<Vec<Node>> {
        Parser::new(source, &self.syntax, name)?.parse()
    }

    /// Compile a source string into a template.
    ///
    /// Registered modifiers run over the AST in registration order,
    /// then the optimizer when enabled.
    pub fn compile(&self, name: &str, source: &str) -> Result<Template> {
        debug!("compile template '{}'", name);
        let mut nodes = self.parse(source, Some(name))?;
        for modifier in &self.modifiers {
            modifier(&mut nodes);
        }
        if self.optimize {
            optimizer::optimize(&mut nodes);
        }
        Ok(Template::new(name, source, nodes))
    }

    /// Load a template through the configured loader.
    ///
    /// When `auto_reload` is off compiled templates are served from
    /// the cache.
    pub fn get_template(&self, name: &str) -> Result<Rc<Template>> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))?;
        if !self.auto_reload {
            if let Some(cached) = self.cache.borrow().get(name) {
                debug!("template cache hit '{}'", name);
                return Ok(Rc::clone(cached));
            }
        }
        let source = loader.load(name)?;
        let template = Rc::new(self.compile(name, &source)?);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&template));
        Ok(template)
    }

    /// Enumerate the template names known to the loader.
    pub fn list_templates(&self) -> Vec<String> {
        self.loader
            .as_ref()
            .map(|l| l.list())
            .unwrap_or_default()
    }

    /// Compile and render a one-off template source.
    pub fn render_str<T: Serialize>(
        &self,
        name: &str,
        source: &str,
        data: &T,
    ) -> Result<String> {
        let template = self.compile(name, source)?;
        self.render_template(&template, data)
    }

    /// Render a template registered with the loader.
    pub fn render<T: Serialize>(
        &self,
        name: &str,
        data: &T,
    ) -> Result<String> {
        let template = self.get_template(name)?;
        self.render_template(&template, data)
    }

    /// Render a compiled template to a string.
    pub fn render_template<T: Serialize>(
        &self,
        template: &Template,
        data: &T,
    ) -> Result<String> {
        let mut writer = StringOutput::new();
        template.render(self, data, &mut writer)?;
        Ok(writer.into_string())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Environments are equivalent when their delimiter and trim
/// configuration match.
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.syntax == other.syntax
    }
}

/// A named block cached on a compiled template.
#[derive(Clone)]
pub struct BlockDef {
    pub(crate) body: Rc<Vec<Node>>,
    pub(crate) scoped: bool,
    pub(crate) required: bool,
}

/// A compiled template.
pub struct Template {
    name: String,
    source: String,
    body: Vec<Node>,
    blocks: HashMap<String, BlockDef>,
}

impl Template {
    /// Build a template, caching every named block discovered by a
    /// pre-order walk of the body.
    pub(crate) fn new(name: &str, source: &str, body: Vec<Node>) -> Self {
        let mut blocks = HashMap::new();
        Node::walk_all(&body, &mut |node| {
            if let Node::Block {
                ref name,
                ref body,
                scoped,
                required,
            } = *node
            {
                blocks.insert(
                    name.clone(),
                    BlockDef {
                        body: Rc::new(body.clone()),
                        scoped,
                        required,
                    },
                );
            }
        });
        Self {
            name: name.to_string(),
            source: source.to_string(),
            body,
            blocks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }

    pub(crate) fn blocks(&self) -> &HashMap<String, BlockDef> {
        &self.blocks
    }

    /// The parent template expression when this template extends
    /// another.
    pub(crate) fn extends_expr(&self) -> Option<&Expr> {
        match self.body.first() {
            Some(Node::Extends(ref expr)) => Some(expr),
            _ => None,
        }
    }

    /// Render this template to the given writer.
    pub fn render<T: Serialize>(
        &self,
        env: &Environment,
        data: &T,
        writer: &mut impl Output,
    ) -> Result<()> {
        let root = data_scope(data)?;
        let mut render = Render::new(env, root);
        render.render_template_root(self, writer)
    }

    /// Render lazily, yielding one output chunk per top level
    /// statement; drop the iterator to cancel the remainder.
    pub fn render_iter<'a, T: Serialize>(
        &'a self,
        env: &'a Environment,
        data: &T,
    ) -> Result<RenderIter<'a>> {
        let root = data_scope(data)?;
        Ok(RenderIter::new(env, self, root))
    }
}

/// Convert render input into the root scope.
pub(crate) fn data_scope<T: Serialize>(data: &T) -> Result<Scope> {
    let value =
        serde_json::to_value(data).map_err(RenderError::from)?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Scope::new()),
        other => Err(RenderError::Message(format!(
            "template data must be a mapping, got {}",
            crate::value::type_name(&other)
        ))
        .into()),
    }
}
