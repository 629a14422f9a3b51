//! Scoped variable resolution and dispatch to the registries.
use serde_json::{Map, Value};

use crate::{
    callable::{CallableFn, Invocation},
    environment::Environment,
    error::RenderError,
    escape::Markup,
    RenderResult,
};

/// A single variable scope.
pub type Scope = Map<String, Value>;

/// Variable resolution context for one render.
///
/// Lookup walks the scope stack innermost first and falls back to the
/// environment globals; a miss yields the undefined sentinel
/// (`None`), never an error.
#[derive(Clone)]
pub struct Context<'env> {
    env: &'env Environment,
    scopes: Vec<Scope>,
    auto_escape: bool,
}

impl<'env> Context<'env> {
    /// Create a context with a single empty scope.
    pub fn new(env: &'env Environment) -> Self {
        Self {
            env,
            scopes: vec![Scope::new()],
            auto_escape: env.auto_escape(),
        }
    }

    /// Create a context with the given root scope.
    pub fn with_root(env: &'env Environment, root: Scope) -> Self {
        Self {
            env,
            scopes: vec![root],
            auto_escape: env.auto_escape(),
        }
    }

    /// Rebuild a context from a scope snapshot.
    pub(crate) fn from_scopes(
        env: &'env Environment,
        scopes: Vec<Scope>,
        auto_escape: bool,
    ) -> Self {
        let mut scopes = scopes;
        if scopes.is_empty() {
            scopes.push(Scope::new());
        }
        Self {
            env,
            scopes,
            auto_escape,
        }
    }

    pub fn environment(&self) -> &'env Environment {
        self.env
    }

    pub fn auto_escape(&self) -> bool {
        self.auto_escape
    }

    pub fn set_auto_escape(&mut self, auto_escape: bool) {
        self.auto_escape = auto_escape;
    }

    /// Resolve a name; `None` is the undefined sentinel.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        self.env.global_value(name)
    }

    /// Assign into the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Derive a child context; writes into the child do not affect
    /// this context.
    pub fn derived(&self) -> Context<'env> {
        let mut child = self.clone();
        child.push_scope();
        child
    }

    /// Push the overrides as a fresh scope, run `f` and pop again;
    /// the scope is removed on the error path as well.
    pub fn apply<T>(
        &mut self,
        overrides: Scope,
        f: impl FnOnce(&mut Self) -> RenderResult<T>,
    ) -> RenderResult<T> {
        self.scopes.push(overrides);
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// Snapshot of the scope stack, used to capture closures for
    /// call blocks.
    pub(crate) fn scopes(&self) -> &Vec<Scope> {
        &self.scopes
    }

    /// Dispatch a filter through the environment registry.
    pub fn filter(&self, inv: &Invocation) -> RenderResult<Value> {
        match self.env.filters().get(inv.name()) {
            Some(f) => self.dispatch(f, inv),
            None => {
                Err(RenderError::FilterNotFound(inv.name().to_string()))
            }
        }
    }

    /// Dispatch a test through the environment registry.
    pub fn test(&self, inv: &Invocation) -> RenderResult<Value> {
        match self.env.tests().get(inv.name()) {
            Some(f) => self.dispatch(f, inv),
            None => Err(RenderError::TestNotFound(inv.name().to_string())),
        }
    }

    /// Invoke a callable threading the context or environment through
    /// when the callable opted in at registration.
    pub(crate) fn dispatch(
        &self,
        f: &CallableFn,
        inv: &Invocation,
    ) -> RenderResult<Value> {
        match f {
            CallableFn::Plain(f) => f(inv),
            CallableFn::Context(f) => f(self, inv),
            CallableFn::Environment(f) => f(self.env, inv),
        }
    }

    /// Escape a value for output.
    ///
    /// Markup passes through unchanged; with auto-escaping enabled
    /// strings are escaped and wrapped, everything else is returned
    /// as is.
    pub fn escape(&self, value: Value) -> Value {
        if Markup::is_markup(&value) {
            return value;
        }
        if !self.auto_escape {
            return value;
        }
        match value {
            Value::String(s) => Markup::wrap((self.env.escape_fn())(&s)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use serde_json::json;

    #[test]
    fn scope_lookup_order() {
        let env = Environment::new();
        let mut root = Scope::new();
        root.insert("a".to_string(), json!(1));
        let mut ctx = Context::with_root(&env, root);
        assert_eq!(ctx.resolve("a"), Some(json!(1)));
        ctx.push_scope();
        ctx.set("a", json!(2));
        assert_eq!(ctx.resolve("a"), Some(json!(2)));
        ctx.pop_scope();
        assert_eq!(ctx.resolve("a"), Some(json!(1)));
        assert_eq!(ctx.resolve("missing"), None);
    }

    #[test]
    fn apply_pops_on_error() {
        let env = Environment::new();
        let mut ctx = Context::new(&env);
        let depth = ctx.scopes().len();
        let mut overrides = Scope::new();
        overrides.insert("x".to_string(), json!(1));
        let result: RenderResult<()> = ctx.apply(overrides, |_| {
            Err(crate::error::RenderError::Message("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(ctx.scopes().len(), depth);
    }
}
