//! Render a template to output using the data.
//!
//! The renderer walks the AST and drives a string sink. Expression
//! evaluation yields `Option<Value>` where `None` is the undefined
//! sentinel; the output pipeline for every printed expression is
//! escape (when auto-escaping is active), then finalize, then
//! stringification.
use std::collections::HashMap;
use std::rc::Rc;

use log::trace;
use serde_json::{Map, Value};

use crate::{
    callable::Invocation,
    context::{Context, Scope},
    environment::{BlockDef, Environment, Global, Template},
    error::{Error, RenderError},
    escape::Markup,
    output::{Output, StringOutput},
    parser::ast::{BinaryOp, CmpOp, Expr, FilterCall, Node, UnaryOp},
    value, Result,
};

mod loops;

use loops::{LoopBody, LoopState};

/// Hard cap on recursive loop depth.
const MAX_LOOP_DEPTH: usize = 1024;

/// A macro compiled into a reusable callable.
#[derive(Clone)]
struct MacroDef {
    name: String,
    params: Vec<(String, Option<Expr>)>,
    body: Rc<Vec<Node>>,
}

/// The body of a call block captured together with its defining
/// scopes so that `caller()` renders in the caller's context.
#[derive(Clone)]
struct CallerDef {
    params: Vec<(String, Option<Expr>)>,
    body: Rc<Vec<Node>>,
    scopes: Vec<Scope>,
    auto_escape: bool,
}

/// Tree walking renderer for one render invocation.
pub struct Render<'env> {
    env: &'env Environment,
    ctx: Context<'env>,
    blocks: HashMap<String, Vec<BlockDef>>,
    block_stack: Vec<(String, usize)>,
    macros: HashMap<String, Rc<MacroDef>>,
    namespaces: HashMap<String, HashMap<String, Rc<MacroDef>>>,
    callers: Vec<CallerDef>,
    loops: Vec<LoopState>,
    rendering: Vec<String>,
}

impl<'env> Render<'env> {
    pub(crate) fn new(env: &'env Environment, root: Scope) -> Self {
        Self {
            env,
            ctx: Context::with_root(env, root),
            blocks: HashMap::new(),
            block_stack: Vec::new(),
            macros: HashMap::new(),
            namespaces: HashMap::new(),
            callers: Vec::new(),
            loops: Vec::new(),
            rendering: Vec::new(),
        }
    }

    /// Render a template from the root, resolving inheritance.
    pub(crate) fn render_template_root(
        &mut self,
        template: &Template,
        out: &mut dyn Output,
    ) -> Result<()> {
        trace!("render template '{}'", template.name());
        self.rendering.push(template.name().to_string());
        let result = self.render_template(template, out);
        self.rendering.pop();
        result
    }

    /// Render a template body; when the template extends a parent the
    /// parent tree is rendered instead and this template only
    /// contributes blocks.
    fn render_template(
        &mut self,
        template: &Template,
        out: &mut dyn Output,
    ) -> Result<()> {
        for (name, def) in template.blocks() {
            self.blocks
                .entry(name.clone())
                .or_insert_with(Vec::new)
                .push(def.clone());
        }
        if let Some(expr) = template.extends_expr() {
            let parent = self.eval_template_name(expr)?;
            if self.rendering.iter().any(|n| n == &parent) {
                return Err(RenderError::TemplateCycle(parent).into());
            }
            let parent_template = self.env.get_template(&parent)?;
            self.rendering.push(parent);
            let result = self.render_template(&parent_template, out);
            self.rendering.pop();
            return result;
        }
        self.render_nodes(template.body(), out)
    }

    fn render_nodes(
        &mut self,
        nodes: &[Node],
        out: &mut dyn Output,
    ) -> Result<()> {
        for node in nodes {
            self.render_node(node, out)?;
        }
        Ok(())
    }

    fn render_node(
        &mut self,
        node: &Node,
        out: &mut dyn Output,
    ) -> Result<()> {
        match node {
            Node::Text(text) => {
                out.write_str(text).map_err(RenderError::from)?;
            }
            Node::Output(exprs) => {
                for expr in exprs {
                    self.render_output(expr, out)?;
                }
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let mut taken = false;
                for (test, body) in branches {
                    let v = self.eval(test)?;
                    if truthy_opt(&v) {
                        self.render_nodes(body, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    self.render_nodes(otherwise, out)?;
                }
            }
            Node::For {
                targets,
                iter,
                body,
                otherwise,
                filter,
                recursive,
            } => {
                // An undefined iterable runs the else branch; null is
                // a hard error.
                let items = match self.eval(iter)? {
                    None => Vec::new(),
                    Some(Value::Null) => {
                        return Err(
                            RenderError::NotIterable("null").into()
                        );
                    }
                    Some(v) => value::iterate(&v).map_err(Error::from)?,
                };
                let lb = Rc::new(LoopBody {
                    targets: targets.clone(),
                    body: Rc::new(body.clone()),
                    otherwise: Rc::new(otherwise.clone()),
                    filter: filter.clone(),
                    recursive: *recursive,
                });
                self.run_loop(lb, items, 0, out)?;
            }
            Node::Set {
                targets,
                value: expr,
            } => {
                let v = self.eval(expr)?.unwrap_or(Value::Null);
                if targets.len() == 1 {
                    self.ctx.set(targets[0].clone(), v);
                } else {
                    self.bind_targets(targets, &v)?;
                }
            }
            Node::SetBlock {
                targets,
                filters,
                body,
            } => {
                if targets.len() != 1 {
                    return Err(RenderError::Message(
                        "set blocks support a single target".to_string(),
                    )
                    .into());
                }
                let mut buf = StringOutput::new();
                self.render_nodes(body, &mut buf)?;
                let mut v = Value::String(buf.into_string());
                for fc in filters {
                    v = self.apply_filter_call(fc, v)?;
                }
                self.ctx.set(targets[0].clone(), v);
            }
            Node::Block { name, body, .. } => {
                self.render_block(name, body, out)?;
            }
            // Inheritance is resolved at the template level; a first
            // node extends was already consumed there.
            Node::Extends(_) => {}
            Node::Include {
                template,
                ignore_missing,
                with_context,
            } => {
                self.render_include(
                    template,
                    *ignore_missing,
                    *with_context,
                    out,
                )?;
            }
            Node::Import {
                template, alias, ..
            } => {
                let defs = self.load_macros(template)?;
                self.namespaces.insert(alias.clone(), defs);
            }
            Node::FromImport {
                template, names, ..
            } => {
                let defs = self.load_macros(template)?;
                for (name, alias) in names {
                    let def = defs.get(name).cloned().ok_or_else(|| {
                        RenderError::Message(format!(
                            "cannot import name '{}'",
                            name
                        ))
                    })?;
                    let bound =
                        alias.clone().unwrap_or_else(|| name.clone());
                    self.macros.insert(bound, def);
                }
            }
            Node::Macro(decl) => {
                self.macros.insert(
                    decl.name.clone(),
                    Rc::new(MacroDef {
                        name: decl.name.clone(),
                        params: decl.params.clone(),
                        body: Rc::new(decl.body.clone()),
                    }),
                );
            }
            Node::CallBlock { call, params, body } => {
                let caller = CallerDef {
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                    scopes: self.ctx.scopes().clone(),
                    auto_escape: self.ctx.auto_escape(),
                };
                self.callers.push(caller);
                let result = self.eval(call);
                self.callers.pop();
                if let Some(v) = result? {
                    out.write_value(&v).map_err(RenderError::from)?;
                }
            }
            Node::FilterBlock { filters, body } => {
                let mut buf = StringOutput::new();
                self.render_nodes(body, &mut buf)?;
                let mut v = Value::String(buf.into_string());
                for fc in filters {
                    v = self.apply_filter_call(fc, v)?;
                }
                out.write_value(&v).map_err(RenderError::from)?;
            }
            Node::With { targets, body } => {
                self.ctx.push_scope();
                let mut result = Ok(());
                for (name, expr) in targets {
                    match self.eval(expr) {
                        Ok(v) => self
                            .ctx
                            .set(name.clone(), v.unwrap_or(Value::Null)),
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                if result.is_ok() {
                    result = self.render_nodes(body, out);
                }
                self.ctx.pop_scope();
                result?;
            }
            Node::Do(expr) => {
                self.eval(expr)?;
            }
            Node::AutoEscape { value: expr, body } => {
                let v = self.eval(expr)?;
                let saved = self.ctx.auto_escape();
                self.ctx.set_auto_escape(truthy_opt(&v));
                let result = self.render_nodes(body, out);
                self.ctx.set_auto_escape(saved);
                result?;
            }
            Node::ContextModifier { overrides, body } => {
                let saved = self.ctx.auto_escape();
                let mut values = Vec::new();
                for (name, expr) in overrides {
                    let v = self.eval(expr)?.unwrap_or(Value::Null);
                    if name == "autoescape" {
                        self.ctx.set_auto_escape(value::is_truthy(&v));
                    }
                    values.push((name.clone(), v));
                }
                self.ctx.push_scope();
                for (name, v) in values {
                    self.ctx.set(name, v);
                }
                let result = self.render_nodes(body, out);
                self.ctx.pop_scope();
                self.ctx.set_auto_escape(saved);
                result?;
            }
        }
        Ok(())
    }

    /// Print a single output expression through escape, finalize and
    /// stringification.
    fn render_output(
        &mut self,
        expr: &Expr,
        out: &mut dyn Output,
    ) -> Result<()> {
        if let Some(v) = self.eval(expr)? {
            let v = self.ctx.escape(v);
            let v = self.env.apply_finalize(&self.ctx, v);
            out.write_value(&v).map_err(RenderError::from)?;
        }
        Ok(())
    }

    /// Run a loop over materialized items.
    fn run_loop(
        &mut self,
        lb: Rc<LoopBody>,
        items: Vec<Value>,
        depth0: usize,
        out: &mut dyn Output,
    ) -> Result<()> {
        if depth0 >= MAX_LOOP_DEPTH {
            return Err(RenderError::RecursionLimit.into());
        }

        // The filter sees the loop targets for each candidate item
        // but not this loop's own `loop` binding.
        let items = if let Some(ref filter) = lb.filter {
            let mut kept = Vec::new();
            for item in items {
                self.ctx.push_scope();
                let keep = self
                    .bind_targets(&lb.targets, &item)
                    .and_then(|_| self.eval(filter))
                    .map(|v| truthy_opt(&v));
                self.ctx.pop_scope();
                if keep? {
                    kept.push(item);
                }
            }
            kept
        } else {
            items
        };

        if items.is_empty() {
            let otherwise = Rc::clone(&lb.otherwise);
            return self.render_nodes(&otherwise, out);
        }

        let len = items.len();
        self.ctx.push_scope();
        self.loops
            .push(LoopState::new(len, depth0, Rc::clone(&lb)));
        let mut result = Ok(());
        for (i, item) in items.iter().enumerate() {
            if let Some(state) = self.loops.last_mut() {
                state.index0 = i;
            }
            result = self.bind_targets(&lb.targets, item);
            if result.is_ok() {
                let object =
                    self.loops.last().map(|s| s.object(&items)).unwrap();
                self.ctx.set("loop", object);
                let body = Rc::clone(&lb.body);
                result = self.render_nodes(&body, out);
            }
            if result.is_err() {
                break;
            }
        }
        self.loops.pop();
        self.ctx.pop_scope();
        result
    }

    /// Bind loop or set targets, unpacking when there is more than
    /// one target.
    fn bind_targets(
        &mut self,
        targets: &[String],
        item: &Value,
    ) -> Result<()> {
        if targets.len() == 1 {
            self.ctx.set(targets[0].clone(), item.clone());
            return Ok(());
        }
        let parts = value::iterate(item).map_err(|_| {
            RenderError::Message(format!(
                "cannot unpack non-iterable {} value",
                value::type_name(item)
            ))
        })?;
        if parts.len() < targets.len() {
            return Err(RenderError::UnpackTooFew {
                expected: targets.len(),
                got: parts.len(),
            }
            .into());
        }
        if parts.len() > targets.len() {
            return Err(RenderError::UnpackTooMany {
                expected: targets.len(),
            }
            .into());
        }
        for (name, part) in targets.iter().zip(parts) {
            self.ctx.set(name.clone(), part);
        }
        Ok(())
    }

    fn apply_filter_call(
        &mut self,
        fc: &FilterCall,
        input: Value,
    ) -> Result<Value> {
        let args = self.eval_args(&fc.args)?;
        let named = self.eval_kwargs(&fc.kwargs)?;
        let inv =
            Invocation::new(fc.name.clone(), Some(input), args, named);
        Ok(self.ctx.filter(&inv)?)
    }

    /// Render a named block through the override chain.
    fn render_block(
        &mut self,
        name: &str,
        fallback: &[Node],
        out: &mut dyn Output,
    ) -> Result<()> {
        let def = self.blocks.get(name).and_then(|c| c.first()).cloned();
        match def {
            Some(def) => {
                if def.required {
                    return Err(RenderError::RequiredBlock(
                        name.to_string(),
                    )
                    .into());
                }
                self.enter_block(name, 0, &def, out)
            }
            None => self.render_nodes(fallback, out),
        }
    }

    /// Render one definition from a block chain.
    ///
    /// Blocks are not scoped by default: they see the template root
    /// scope plus globals. The `scoped` modifier exposes the
    /// enclosing locals instead.
    fn enter_block(
        &mut self,
        name: &str,
        index: usize,
        def: &BlockDef,
        out: &mut dyn Output,
    ) -> Result<()> {
        let body = Rc::clone(&def.body);
        self.block_stack.push((name.to_string(), index));
        let result = if def.scoped {
            self.ctx.push_scope();
            let r = self.render_nodes(&body, out);
            self.ctx.pop_scope();
            r
        } else {
            let root = self
                .ctx
                .scopes()
                .first()
                .cloned()
                .unwrap_or_default();
            let fresh = Context::from_scopes(
                self.env,
                vec![root],
                self.ctx.auto_escape(),
            );
            let saved = std::mem::replace(&mut self.ctx, fresh);
            let r = self.render_nodes(&body, out);
            self.ctx = saved;
            r
        };
        self.block_stack.pop();
        result
    }

    /// `super()` renders the next definition in the current block's
    /// chain.
    fn eval_super(&mut self) -> Result<Option<Value>> {
        let (name, index) =
            self.block_stack.last().cloned().ok_or_else(|| {
                RenderError::Message(
                    "super() called outside of a block".to_string(),
                )
            })?;
        let def = self
            .blocks
            .get(&name)
            .and_then(|c| c.get(index + 1))
            .cloned()
            .ok_or_else(|| {
                RenderError::Message(format!(
                    "block '{}' has no parent block",
                    name
                ))
            })?;
        let mut buf = StringOutput::new();
        self.enter_block(&name, index + 1, &def, &mut buf)?;
        Ok(Some(Markup::wrap(buf.into_string())))
    }

    fn render_include(
        &mut self,
        template: &Expr,
        ignore_missing: bool,
        with_context: bool,
        out: &mut dyn Output,
    ) -> Result<()> {
        let v = self.eval_required(template)?;
        let candidates: Vec<String> = match v {
            Value::Array(ref items) => {
                items.iter().map(value::output_string).collect()
            }
            ref other => vec![value::output_string(other)],
        };

        let mut found = None;
        for name in &candidates {
            match self.env.get_template(name) {
                Ok(t) => {
                    found = Some(t);
                    break;
                }
                Err(Error::TemplateNotFound(_))
                | Err(Error::TemplatesNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        let tpl = match found {
            Some(t) => t,
            None => {
                if ignore_missing {
                    return Ok(());
                }
                return Err(if candidates.len() == 1 {
                    Error::TemplateNotFound(candidates[0].clone())
                } else {
                    Error::TemplatesNotFound(candidates)
                });
            }
        };

        if self.rendering.iter().any(|n| n == tpl.name()) {
            return Err(RenderError::TemplateCycle(
                tpl.name().to_string(),
            )
            .into());
        }
        self.rendering.push(tpl.name().to_string());
        let saved_blocks = std::mem::take(&mut self.blocks);
        let saved_stack = std::mem::take(&mut self.block_stack);

        let result = if with_context {
            self.ctx.push_scope();
            let r = self.render_template(&tpl, out);
            self.ctx.pop_scope();
            r
        } else {
            let fresh = Context::from_scopes(
                self.env,
                vec![Scope::new()],
                self.ctx.auto_escape(),
            );
            let saved = std::mem::replace(&mut self.ctx, fresh);
            let r = self.render_template(&tpl, out);
            self.ctx = saved;
            r
        };

        self.blocks = saved_blocks;
        self.block_stack = saved_stack;
        self.rendering.pop();
        result
    }

    /// Load the macros exported by another template.
    fn load_macros(
        &mut self,
        template: &Expr,
    ) -> Result<HashMap<String, Rc<MacroDef>>> {
        let name = self.eval_template_name(template)?;
        if self.rendering.iter().any(|n| n == &name) {
            return Err(RenderError::TemplateCycle(name).into());
        }
        let tpl = self.env.get_template(&name)?;
        let mut defs = HashMap::new();
        Node::walk_all(tpl.body(), &mut |node| {
            if let Node::Macro(ref decl) = *node {
                defs.insert(
                    decl.name.clone(),
                    Rc::new(MacroDef {
                        name: decl.name.clone(),
                        params: decl.params.clone(),
                        body: Rc::new(decl.body.clone()),
                    }),
                );
            }
        });
        Ok(defs)
    }

    /// Evaluate an expression; `None` is the undefined sentinel.
    fn eval(&mut self, expr: &Expr) -> Result<Option<Value>> {
        match expr {
            Expr::Const(v) => Ok(Some(v.clone())),
            Expr::Name(name) => {
                if let Some(v) = self.ctx.resolve(name) {
                    return Ok(Some(v));
                }
                if self.env.strict() {
                    return Err(RenderError::VariableNotFound(
                        name.clone(),
                    )
                    .into());
                }
                Ok(None)
            }
            Expr::Tuple(items) | Expr::List(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.push(self.eval(item)?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(out)))
            }
            Expr::Dict(pairs) => {
                let mut map = Map::new();
                for (k, v) in pairs {
                    let key_value = self.eval_required(k)?;
                    let key = value::to_key(&key_value)?;
                    map.insert(
                        key,
                        self.eval(v)?.unwrap_or(Value::Null),
                    );
                }
                Ok(Some(Value::Object(map)))
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    let v = self.eval(operand)?;
                    Ok(Some(Value::Bool(!truthy_opt(&v))))
                }
                UnaryOp::Neg => {
                    let v = self.eval_required(operand)?;
                    Ok(Some(value::neg(&v)?))
                }
                UnaryOp::Pos => {
                    let v = self.eval_required(operand)?;
                    Ok(Some(value::pos(&v)?))
                }
            },
            Expr::Binary { op, left, right } => {
                self.eval_binary(*op, left, right)
            }
            Expr::Concat(items) => {
                let mut s = String::new();
                for item in items {
                    if let Some(v) = self.eval(item)? {
                        s.push_str(&value::output_string(&v));
                    }
                }
                Ok(Some(Value::String(s)))
            }
            Expr::Compare { left, ops } => self.eval_compare(left, ops),
            Expr::Getattr { target, name } => {
                match self.eval(target)? {
                    None => Err(RenderError::Undefined(describe(target))
                        .into()),
                    Some(v) => Ok(self.env.get_attr(&v, name)),
                }
            }
            Expr::Getitem { target, index } => {
                self.eval_getitem(target, index)
            }
            // Slices only appear as a subscript index.
            Expr::Slice { .. } => Err(RenderError::Message(
                "slice used outside of a subscript".to_string(),
            )
            .into()),
            Expr::Call { .. } => self.eval_call(expr),
            Expr::Filter {
                name,
                input,
                args,
                kwargs,
            } => {
                let input_v = match input {
                    Some(e) => self.eval(e)?,
                    None => None,
                };
                let args_v = self.eval_args(args)?;
                let named = self.eval_kwargs(kwargs)?;
                let inv =
                    Invocation::new(name.clone(), input_v, args_v, named);
                Ok(Some(self.ctx.filter(&inv)?))
            }
            Expr::Test {
                name,
                input,
                args,
                kwargs,
                negated,
            } => {
                // Strict mode must not break definedness probes.
                let input_v = match self.eval(input) {
                    Ok(v) => v,
                    Err(Error::Render(RenderError::VariableNotFound(
                        _,
                    ))) if name == "defined" || name == "undefined" => {
                        None
                    }
                    Err(e) => return Err(e),
                };
                let args_v = self.eval_args(args)?;
                let named = self.eval_kwargs(kwargs)?;
                let inv =
                    Invocation::new(name.clone(), input_v, args_v, named);
                let result = self.ctx.test(&inv)?;
                let mut truth = value::is_truthy(&result);
                if *negated {
                    truth = !truth;
                }
                Ok(Some(Value::Bool(truth)))
            }
            Expr::Condition {
                test,
                then,
                otherwise,
            } => {
                let t = self.eval(test)?;
                if truthy_opt(&t) {
                    self.eval(then)
                } else {
                    match otherwise {
                        Some(e) => self.eval(e),
                        None => Ok(None),
                    }
                }
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Option<Value>> {
        match op {
            BinaryOp::And => {
                let l = self.eval(left)?;
                if !truthy_opt(&l) {
                    return Ok(l);
                }
                self.eval(right)
            }
            BinaryOp::Or => {
                let l = self.eval(left)?;
                if truthy_opt(&l) {
                    return Ok(l);
                }
                self.eval(right)
            }
            _ => {
                let l = self.eval_required(left)?;
                let r = self.eval_required(right)?;
                let v = match op {
                    BinaryOp::Add => value::add(&l, &r),
                    BinaryOp::Sub => value::sub(&l, &r),
                    BinaryOp::Mul => value::mul(&l, &r),
                    BinaryOp::Div => value::div(&l, &r),
                    BinaryOp::FloorDiv => value::floordiv(&l, &r),
                    BinaryOp::Mod => value::rem(&l, &r),
                    BinaryOp::Pow => value::pow(&l, &r),
                    BinaryOp::And | BinaryOp::Or => unreachable!(),
                }?;
                Ok(Some(v))
            }
        }
    }

    fn eval_compare(
        &mut self,
        left: &Expr,
        ops: &[(CmpOp, Expr)],
    ) -> Result<Option<Value>> {
        let mut current = self.eval(left)?;
        for (op, right_expr) in ops {
            let right = self.eval(right_expr)?;
            let holds = match op {
                CmpOp::Eq => eq_opt(&current, &right),
                CmpOp::Ne => !eq_opt(&current, &right),
                CmpOp::In | CmpOp::NotIn => {
                    let item =
                        current.clone().unwrap_or(Value::Null);
                    let container = right.as_ref().ok_or_else(|| {
                        RenderError::Undefined(describe(right_expr))
                    })?;
                    let found = value::contains(container, &item)?;
                    if *op == CmpOp::NotIn {
                        !found
                    } else {
                        found
                    }
                }
                _ => {
                    let l = current.as_ref().ok_or_else(|| {
                        RenderError::Message(
                            "cannot compare undefined value".to_string(),
                        )
                    })?;
                    let r = right.as_ref().ok_or_else(|| {
                        RenderError::Undefined(describe(right_expr))
                    })?;
                    let ordering = value::compare(l, r)?;
                    match op {
                        CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                        CmpOp::Lteq => {
                            ordering != std::cmp::Ordering::Greater
                        }
                        CmpOp::Gt => {
                            ordering == std::cmp::Ordering::Greater
                        }
                        CmpOp::Gteq => {
                            ordering != std::cmp::Ordering::Less
                        }
                        _ => unreachable!(),
                    }
                }
            };
            if !holds {
                return Ok(Some(Value::Bool(false)));
            }
            current = right;
        }
        Ok(Some(Value::Bool(true)))
    }

    fn eval_getitem(
        &mut self,
        target: &Expr,
        index: &Expr,
    ) -> Result<Option<Value>> {
        let t = self.eval(target)?.ok_or_else(|| {
            Error::from(RenderError::Undefined(describe(target)))
        })?;
        if let Expr::Slice { start, stop, step } = index {
            let start = self.eval_slice_part(start)?;
            let stop = self.eval_slice_part(stop)?;
            let step = self.eval_slice_part(step)?;
            return Ok(Some(value::slice(&t, start, stop, step)?));
        }
        let key = self.eval_required(index)?;
        Ok(self.env.get_item(&t, &key))
    }

    fn eval_slice_part(
        &mut self,
        part: &Option<Box<Expr>>,
    ) -> Result<Option<i64>> {
        match part {
            None => Ok(None),
            Some(e) => {
                let v = self.eval_required(e)?;
                match v.as_i64() {
                    Some(i) => Ok(Some(i)),
                    None => Err(RenderError::Message(
                        "slice indices must be integers".to_string(),
                    )
                    .into()),
                }
            }
        }
    }

    fn eval_call(&mut self, expr: &Expr) -> Result<Option<Value>> {
        let (target, args, kwargs, var_args, var_kwargs) = match expr {
            Expr::Call {
                target,
                args,
                kwargs,
                var_args,
                var_kwargs,
            } => (target, args, kwargs, var_args, var_kwargs),
            _ => unreachable!("eval_call on a non-call expression"),
        };

        if let Expr::Getattr {
            target: inner,
            name: method,
        } = &**target
        {
            if matches!(&**inner, Expr::Name(n) if n == "loop") {
                return self.eval_loop_method(method, args);
            }
            if let Expr::Name(ns) = &**inner {
                if let Some(def) = self
                    .namespaces
                    .get(ns)
                    .and_then(|m| m.get(method))
                    .cloned()
                {
                    let (a, k) = self.eval_call_arguments(
                        args, kwargs, var_args, var_kwargs,
                    )?;
                    return self.call_macro(&def, a, k).map(Some);
                }
            }
        }

        if let Expr::Name(name) = &**target {
            match name.as_str() {
                "super" => return self.eval_super(),
                "caller" => {
                    let (a, k) = self.eval_call_arguments(
                        args, kwargs, var_args, var_kwargs,
                    )?;
                    return self.eval_caller(a, k);
                }
                "loop" => return self.eval_loop_recursive(args),
                _ => {}
            }
            if let Some(def) = self.macros.get(name).cloned() {
                let (a, k) = self.eval_call_arguments(
                    args, kwargs, var_args, var_kwargs,
                )?;
                return self.call_macro(&def, a, k).map(Some);
            }
            if matches!(
                self.env.global(name),
                Some(Global::Function(_))
            ) {
                let (a, k) = self.eval_call_arguments(
                    args, kwargs, var_args, var_kwargs,
                )?;
                let inv = Invocation::new(name.clone(), None, a, k);
                let v = match self.env.global(name) {
                    Some(Global::Function(f)) => {
                        self.ctx.dispatch(f, &inv)?
                    }
                    _ => unreachable!(),
                };
                return Ok(Some(v));
            }
            return Err(RenderError::NotCallable(name.clone()).into());
        }

        Err(RenderError::NotCallable(describe(target)).into())
    }

    fn eval_call_arguments(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        var_args: &Option<Box<Expr>>,
        var_kwargs: &Option<Box<Expr>>,
    ) -> Result<(Vec<Value>, Map<String, Value>)> {
        let mut out = self.eval_args(args)?;
        if let Some(e) = var_args {
            let v = self.eval_required(e)?;
            out.extend(value::iterate(&v)?);
        }
        let mut named = self.eval_kwargs(kwargs)?;
        if let Some(e) = var_kwargs {
            let v = self.eval_required(e)?;
            match Markup::plain(&v).clone() {
                Value::Object(map) => {
                    for (k, v) in map {
                        named.insert(k, v);
                    }
                }
                other => {
                    return Err(RenderError::Message(format!(
                        "argument splat expects a mapping, got {}",
                        value::type_name(&other)
                    ))
                    .into());
                }
            }
        }
        Ok((out, named))
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.eval(arg)?.unwrap_or(Value::Null));
        }
        Ok(out)
    }

    fn eval_kwargs(
        &mut self,
        kwargs: &[(String, Expr)],
    ) -> Result<Map<String, Value>> {
        let mut named = Map::new();
        for (name, expr) in kwargs {
            named.insert(
                name.clone(),
                self.eval(expr)?.unwrap_or(Value::Null),
            );
        }
        Ok(named)
    }

    fn eval_loop_method(
        &mut self,
        method: &str,
        args: &[Expr],
    ) -> Result<Option<Value>> {
        let args_v = self.eval_args(args)?;
        if self.loops.is_empty() {
            return Err(
                RenderError::Undefined("loop".to_string()).into()
            );
        }
        match method {
            "cycle" => {
                if args_v.is_empty() {
                    return Err(RenderError::Message(
                        "no items for cycling given".to_string(),
                    )
                    .into());
                }
                let state = self.loops.last().unwrap();
                Ok(Some(state.cycle(&args_v)))
            }
            "changed" => {
                let state = self.loops.last_mut().unwrap();
                let probe = if args_v.len() == 1 {
                    args_v.into_iter().next().unwrap()
                } else {
                    Value::Array(args_v)
                };
                Ok(Some(Value::Bool(state.changed(probe))))
            }
            _ => Err(RenderError::Message(format!(
                "loop has no method '{}'",
                method
            ))
            .into()),
        }
    }

    /// `loop(children)` re-enters a recursive loop one level deeper.
    fn eval_loop_recursive(
        &mut self,
        args: &[Expr],
    ) -> Result<Option<Value>> {
        let (lb, depth0) = {
            let state = self.loops.last().ok_or_else(|| {
                Error::from(RenderError::Undefined("loop".to_string()))
            })?;
            if !state.body.recursive {
                return Err(RenderError::Message(
                    "loop is not marked recursive".to_string(),
                )
                .into());
            }
            (Rc::clone(&state.body), state.depth0 + 1)
        };
        let arg = args.first().ok_or_else(|| {
            Error::from(RenderError::Message(
                "loop() requires an iterable argument".to_string(),
            ))
        })?;
        let v = self.eval_required(arg)?;
        let items = value::iterate(&v)?;
        let mut buf = StringOutput::new();
        self.run_loop(lb, items, depth0, &mut buf)?;
        Ok(Some(Markup::wrap(buf.into_string())))
    }

    /// Bind positional and keyword arguments to a parameter list.
    fn bind_params(
        &mut self,
        name: &str,
        params: &[(String, Option<Expr>)],
        args: Vec<Value>,
        mut kwargs: Map<String, Value>,
    ) -> Result<Scope> {
        if args.len() > params.len() {
            return Err(RenderError::Message(format!(
                "'{}' takes at most {} argument(s), got {}",
                name,
                params.len(),
                args.len()
            ))
            .into());
        }
        let mut scope = Scope::new();
        for (i, (pname, default)) in params.iter().enumerate() {
            if i < args.len() {
                if kwargs.contains_key(pname) {
                    return Err(RenderError::Message(format!(
                        "'{}' got multiple values for argument '{}'",
                        name, pname
                    ))
                    .into());
                }
                scope.insert(pname.clone(), args[i].clone());
            } else if let Some(v) = kwargs.remove(pname) {
                scope.insert(pname.clone(), v);
            } else if let Some(ref d) = default {
                let v = self.eval(d)?.unwrap_or(Value::Null);
                scope.insert(pname.clone(), v);
            }
        }
        if let Some(k) = kwargs.keys().next() {
            return Err(RenderError::Message(format!(
                "'{}' got an unexpected keyword argument '{}'",
                name, k
            ))
            .into());
        }
        Ok(scope)
    }

    /// Invoke a macro; the body renders in a fresh scope holding only
    /// the arguments plus globals and the result is safe markup.
    fn call_macro(
        &mut self,
        def: &Rc<MacroDef>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value> {
        let scope =
            self.bind_params(&def.name, &def.params, args, kwargs)?;
        let body = Rc::clone(&def.body);
        let fresh = Context::from_scopes(
            self.env,
            vec![scope],
            self.ctx.auto_escape(),
        );
        let saved = std::mem::replace(&mut self.ctx, fresh);
        let mut buf = StringOutput::new();
        let result = self.render_nodes(&body, &mut buf);
        self.ctx = saved;
        result?;
        Ok(Markup::wrap(buf.into_string()))
    }

    /// `caller()` renders the call block body in the caller's own
    /// context.
    fn eval_caller(
        &mut self,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Option<Value>> {
        let def = self.callers.last().cloned().ok_or_else(|| {
            RenderError::Message(
                "caller() called outside of a call block".to_string(),
            )
        })?;
        let scope =
            self.bind_params("caller", &def.params, args, kwargs)?;
        let mut ctx = Context::from_scopes(
            self.env,
            def.scopes.clone(),
            def.auto_escape,
        );
        ctx.push_scope();
        for (k, v) in scope {
            ctx.set(k, v);
        }
        let saved = std::mem::replace(&mut self.ctx, ctx);
        let body = Rc::clone(&def.body);
        let mut buf = StringOutput::new();
        let result = self.render_nodes(&body, &mut buf);
        self.ctx = saved;
        result?;
        Ok(Some(Markup::wrap(buf.into_string())))
    }

    fn eval_required(&mut self, expr: &Expr) -> Result<Value> {
        self.eval(expr)?.ok_or_else(|| {
            Error::from(RenderError::Undefined(describe(expr)))
        })
    }

    fn eval_template_name(&mut self, expr: &Expr) -> Result<String> {
        let v = self.eval_required(expr)?;
        match Markup::plain(&v) {
            Value::String(s) => Ok(s.clone()),
            other => Err(RenderError::Message(format!(
                "template name must be a string, got {}",
                value::type_name(other)
            ))
            .into()),
        }
    }
}

/// Lazy renderer yielding one output chunk per top level statement.
///
/// Dropping the iterator cancels the remainder of the render. A
/// template that extends a parent renders as a single chunk.
pub struct RenderIter<'a> {
    render: Render<'a>,
    template: &'a Template,
    index: usize,
    whole: bool,
    done: bool,
}

impl<'a> RenderIter<'a> {
    pub(crate) fn new(
        env: &'a Environment,
        template: &'a Template,
        root: Scope,
    ) -> Self {
        let whole = template.extends_expr().is_some();
        Self {
            render: Render::new(env, root),
            template,
            index: 0,
            whole,
            done: false,
        }
    }
}

impl<'a> Iterator for RenderIter<'a> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.whole {
            self.done = true;
            let mut buf = StringOutput::new();
            return Some(
                self.render
                    .render_template_root(self.template, &mut buf)
                    .map(|_| buf.into_string()),
            );
        }
        if self.index == 0 {
            for (name, def) in self.template.blocks() {
                self.render
                    .blocks
                    .entry(name.clone())
                    .or_insert_with(Vec::new)
                    .push(def.clone());
            }
        }
        let body = self.template.body();
        if self.index >= body.len() {
            self.done = true;
            return None;
        }
        let node = &body[self.index];
        self.index += 1;
        let mut buf = StringOutput::new();
        match self.render.render_node(node, &mut buf) {
            Ok(()) => Some(Ok(buf.into_string())),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn truthy_opt(value: &Option<Value>) -> bool {
    value.as_ref().map(value::is_truthy).unwrap_or(false)
}

fn eq_opt(a: &Option<Value>, b: &Option<Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => value::eq(a, b),
        _ => false,
    }
}

/// Describe an expression for undefined and not-callable messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Name(n) => n.clone(),
        Expr::Getattr { target, name } => {
            format!("{}.{}", describe(target), name)
        }
        Expr::Getitem { target, .. } => {
            format!("{}[...]", describe(target))
        }
        Expr::Call { target, .. } => format!("{}()", describe(target)),
        _ => "expression".to_string(),
    }
}
