//! Invocation machinery shared by filters, tests and global
//! functions.
//!
//! Callables register in one of three shapes depending on whether
//! they want the active context or the owning environment prepended;
//! the shapes are distinct constructors so an invalid shape cannot be
//! registered at all.
use serde_json::{Map, Value};

use crate::{
    context::Context, environment::Environment, error::RenderError,
    escape::Markup, value, RenderResult,
};

/// Arguments for a single filter, test or function invocation.
pub struct Invocation {
    name: String,
    input: Option<Value>,
    args: Vec<Value>,
    named: Map<String, Value>,
}

impl Invocation {
    pub fn new(
        name: impl Into<String>,
        input: Option<Value>,
        args: Vec<Value>,
        named: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            args,
            named,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The piped input value exactly as evaluated; `None` is the
    /// undefined sentinel and safe strings keep their markup wrapper.
    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    /// The input value, failing when it is undefined.
    ///
    /// Markup resolves to the wrapped string so callables never see
    /// the safe string wrapper.
    pub fn value(&self) -> RenderResult<&Value> {
        self.input
            .as_ref()
            .map(Markup::plain)
            .ok_or_else(|| RenderError::Undefined(self.name.clone()))
    }

    /// The input value converted to its output string form.
    pub fn value_string(&self) -> RenderResult<String> {
        Ok(value::output_string(self.value()?))
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Positional argument that must be present.
    pub fn arg(&self, index: usize) -> RenderResult<&Value> {
        self.args.get(index).ok_or_else(|| RenderError::Arity {
            name: self.name.clone(),
            expected: format!("at least {}", index + 1),
        })
    }

    pub fn named(&self) -> &Map<String, Value> {
        &self.named
    }

    /// Assert on the number of positional arguments.
    pub fn arity(&self, min: usize, max: usize) -> RenderResult<()> {
        if self.args.len() < min || self.args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{}-{}", min, max)
            };
            return Err(RenderError::Arity {
                name: self.name.clone(),
                expected,
            });
        }
        Ok(())
    }
}

/// A registered callable tagged with its pass mode.
pub enum CallableFn {
    /// Receives only the invocation arguments.
    Plain(Box<dyn Fn(&Invocation) -> RenderResult<Value> + Send + Sync>),
    /// Receives the active render context first.
    Context(
        Box<
            dyn Fn(&Context<'_>, &Invocation) -> RenderResult<Value>
                + Send
                + Sync,
        >,
    ),
    /// Receives the owning environment first.
    Environment(
        Box<
            dyn Fn(&Environment, &Invocation) -> RenderResult<Value>
                + Send
                + Sync,
        >,
    ),
}

/// Register a plain callable.
pub fn plain<F>(f: F) -> CallableFn
where
    F: Fn(&Invocation) -> RenderResult<Value> + Send + Sync + 'static,
{
    CallableFn::Plain(Box::new(f))
}

/// Mark a callable as wanting the active context prepended.
pub fn pass_context<F>(f: F) -> CallableFn
where
    F: Fn(&Context<'_>, &Invocation) -> RenderResult<Value>
        + Send
        + Sync
        + 'static,
{
    CallableFn::Context(Box::new(f))
}

/// Mark a callable as wanting the owning environment prepended.
pub fn pass_environment<F>(f: F) -> CallableFn
where
    F: Fn(&Environment, &Invocation) -> RenderResult<Value>
        + Send
        + Sync
        + 'static,
{
    CallableFn::Environment(Box::new(f))
}
