//! Abstract syntax tree node types.
use std::fmt;

use serde_json::Value;

/// Unary expression operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Pos,
    Neg,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Pos => "+",
            Self::Neg => "-",
            Self::Not => "not",
        };
        write!(f, "{}", s)
    }
}

/// Binary expression operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::And => "and",
            Self::Or => "or",
        };
        write!(f, "{}", s)
    }
}

/// Comparison operators; comparisons chain left to right.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lteq,
    Gt,
    Gteq,
    In,
    NotIn,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lteq => "<=",
            Self::Gt => ">",
            Self::Gteq => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
        };
        write!(f, "{}", s)
    }
}

/// Expression nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Variable reference.
    Name(String),
    /// Literal constant; also produced by the optimizer.
    Const(Value),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// String concatenation with `~`.
    Concat(Vec<Expr>),
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    Getattr {
        target: Box<Expr>,
        name: String,
    },
    Getitem {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// Subscript slice; only ever appears as a `Getitem` index.
    Slice {
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        var_args: Option<Box<Expr>>,
        var_kwargs: Option<Box<Expr>>,
    },
    /// Filter application; `input` is absent for block filters.
    Filter {
        name: String,
        input: Option<Box<Expr>>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Test {
        name: String,
        input: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        negated: bool,
    },
    /// Inline conditional: `a if b else c`.
    Condition {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Determine if this expression is a constant literal.
    pub fn is_const(&self) -> bool {
        matches!(*self, Self::Const(_))
    }

    /// Get the constant value when this expression is one.
    pub fn as_const(&self) -> Option<&Value> {
        match *self {
            Self::Const(ref v) => Some(v),
            _ => None,
        }
    }

    /// Rewrite this expression bottom-up.
    ///
    /// Children are transformed before the function is applied to the
    /// rebuilt parent which keeps a single pass sufficient for
    /// constant folding.
    pub fn transform(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let node = match self {
            Self::Name(_) | Self::Const(_) => self,
            Self::Tuple(items) => Self::Tuple(transform_list(items, f)),
            Self::List(items) => Self::List(transform_list(items, f)),
            Self::Dict(pairs) => Self::Dict(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.transform(f), v.transform(f)))
                    .collect(),
            ),
            Self::Unary { op, operand } => Self::Unary {
                op,
                operand: Box::new(operand.transform(f)),
            },
            Self::Binary { op, left, right } => Self::Binary {
                op,
                left: Box::new(left.transform(f)),
                right: Box::new(right.transform(f)),
            },
            Self::Concat(items) => Self::Concat(transform_list(items, f)),
            Self::Compare { left, ops } => Self::Compare {
                left: Box::new(left.transform(f)),
                ops: ops
                    .into_iter()
                    .map(|(op, e)| (op, e.transform(f)))
                    .collect(),
            },
            Self::Getattr { target, name } => Self::Getattr {
                target: Box::new(target.transform(f)),
                name,
            },
            Self::Getitem { target, index } => Self::Getitem {
                target: Box::new(target.transform(f)),
                index: Box::new(index.transform(f)),
            },
            Self::Slice { start, stop, step } => Self::Slice {
                start: start.map(|e| Box::new(e.transform(f))),
                stop: stop.map(|e| Box::new(e.transform(f))),
                step: step.map(|e| Box::new(e.transform(f))),
            },
            Self::Call {
                target,
                args,
                kwargs,
                var_args,
                var_kwargs,
            } => Self::Call {
                target: Box::new(target.transform(f)),
                args: transform_list(args, f),
                kwargs: transform_kwargs(kwargs, f),
                var_args: var_args.map(|e| Box::new(e.transform(f))),
                var_kwargs: var_kwargs.map(|e| Box::new(e.transform(f))),
            },
            Self::Filter {
                name,
                input,
                args,
                kwargs,
            } => Self::Filter {
                name,
                input: input.map(|e| Box::new(e.transform(f))),
                args: transform_list(args, f),
                kwargs: transform_kwargs(kwargs, f),
            },
            Self::Test {
                name,
                input,
                args,
                kwargs,
                negated,
            } => Self::Test {
                name,
                input: Box::new(input.transform(f)),
                args: transform_list(args, f),
                kwargs: transform_kwargs(kwargs, f),
                negated,
            },
            Self::Condition {
                test,
                then,
                otherwise,
            } => Self::Condition {
                test: Box::new(test.transform(f)),
                then: Box::new(then.transform(f)),
                otherwise: otherwise.map(|e| Box::new(e.transform(f))),
            },
        };
        f(node)
    }

    /// Pre-order traversal over this expression and its descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match *self {
            Self::Name(_) | Self::Const(_) => {}
            Self::Tuple(ref items)
            | Self::List(ref items)
            | Self::Concat(ref items) => {
                for e in items {
                    e.walk(f);
                }
            }
            Self::Dict(ref pairs) => {
                for (k, v) in pairs {
                    k.walk(f);
                    v.walk(f);
                }
            }
            Self::Unary { ref operand, .. } => operand.walk(f),
            Self::Binary {
                ref left,
                ref right,
                ..
            } => {
                left.walk(f);
                right.walk(f);
            }
            Self::Compare { ref left, ref ops } => {
                left.walk(f);
                for (_, e) in ops {
                    e.walk(f);
                }
            }
            Self::Getattr { ref target, .. } => target.walk(f),
            Self::Getitem {
                ref target,
                ref index,
            } => {
                target.walk(f);
                index.walk(f);
            }
            Self::Slice {
                ref start,
                ref stop,
                ref step,
            } => {
                for e in [start, stop, step].iter().filter_map(|e| e.as_deref())
                {
                    e.walk(f);
                }
            }
            Self::Call {
                ref target,
                ref args,
                ref kwargs,
                ref var_args,
                ref var_kwargs,
            } => {
                target.walk(f);
                for e in args {
                    e.walk(f);
                }
                for (_, e) in kwargs {
                    e.walk(f);
                }
                if let Some(ref e) = var_args {
                    e.walk(f);
                }
                if let Some(ref e) = var_kwargs {
                    e.walk(f);
                }
            }
            Self::Filter {
                ref input,
                ref args,
                ref kwargs,
                ..
            } => {
                if let Some(ref e) = input {
                    e.walk(f);
                }
                for e in args {
                    e.walk(f);
                }
                for (_, e) in kwargs {
                    e.walk(f);
                }
            }
            Self::Test {
                ref input,
                ref args,
                ref kwargs,
                ..
            } => {
                input.walk(f);
                for e in args {
                    e.walk(f);
                }
                for (_, e) in kwargs {
                    e.walk(f);
                }
            }
            Self::Condition {
                ref test,
                ref then,
                ref otherwise,
            } => {
                test.walk(f);
                then.walk(f);
                if let Some(ref e) = otherwise {
                    e.walk(f);
                }
            }
        }
    }
}

fn transform_list(
    items: Vec<Expr>,
    f: &mut impl FnMut(Expr) -> Expr,
) -> Vec<Expr> {
    items.into_iter().map(|e| e.transform(f)).collect()
}

fn transform_kwargs(
    kwargs: Vec<(String, Expr)>,
    f: &mut impl FnMut(Expr) -> Expr,
) -> Vec<(String, Expr)> {
    kwargs.into_iter().map(|(k, e)| (k, e.transform(f))).collect()
}

/// A macro declaration; also used for the parameter list of call
/// blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct MacroDecl {
    pub name: String,
    pub params: Vec<(String, Option<Expr>)>,
    pub body: Vec<Node>,
}

/// One link in a filter chain attached to a filter or set block.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
}

/// Statement nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Literal template text.
    Text(String),
    /// Expressions printed to the output.
    Output(Vec<Expr>),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        targets: Vec<String>,
        iter: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
        filter: Option<Expr>,
        recursive: bool,
    },
    Set {
        targets: Vec<String>,
        value: Expr,
    },
    SetBlock {
        targets: Vec<String>,
        filters: Vec<FilterCall>,
        body: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
        scoped: bool,
        required: bool,
    },
    Extends(Expr),
    Include {
        template: Expr,
        ignore_missing: bool,
        with_context: bool,
    },
    Import {
        template: Expr,
        alias: String,
        with_context: bool,
    },
    FromImport {
        template: Expr,
        names: Vec<(String, Option<String>)>,
        with_context: bool,
    },
    Macro(MacroDecl),
    CallBlock {
        call: Expr,
        params: Vec<(String, Option<Expr>)>,
        body: Vec<Node>,
    },
    FilterBlock {
        filters: Vec<FilterCall>,
        body: Vec<Node>,
    },
    With {
        targets: Vec<(String, Expr)>,
        body: Vec<Node>,
    },
    Do(Expr),
    AutoEscape {
        value: Expr,
        body: Vec<Node>,
    },
    /// Scoped overrides applied to the context around a body; produced
    /// by environment modifiers rather than the parser.
    ContextModifier {
        overrides: Vec<(String, Expr)>,
        body: Vec<Node>,
    },
}

impl Node {
    /// Direct child statements of this node.
    pub fn children(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        match *self {
            Self::Text(_)
            | Self::Output(_)
            | Self::Set { .. }
            | Self::Extends(_)
            | Self::Include { .. }
            | Self::Import { .. }
            | Self::FromImport { .. }
            | Self::Do(_) => {}
            Self::If {
                ref branches,
                ref otherwise,
            } => {
                for (_, body) in branches {
                    out.extend(body.iter());
                }
                out.extend(otherwise.iter());
            }
            Self::For {
                ref body,
                ref otherwise,
                ..
            } => {
                out.extend(body.iter());
                out.extend(otherwise.iter());
            }
            Self::SetBlock { ref body, .. }
            | Self::Block { ref body, .. }
            | Self::CallBlock { ref body, .. }
            | Self::FilterBlock { ref body, .. }
            | Self::With { ref body, .. }
            | Self::AutoEscape { ref body, .. }
            | Self::ContextModifier { ref body, .. } => {
                out.extend(body.iter());
            }
            Self::Macro(ref decl) => out.extend(decl.body.iter()),
        }
        out
    }

    /// Pre-order traversal over this node and all descendant
    /// statements.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Pre-order traversal over a statement list.
    pub fn walk_all<'a>(nodes: &'a [Node], f: &mut impl FnMut(&'a Node)) {
        for node in nodes {
            node.walk(f);
        }
    }

    /// Rewrite every expression contained in this node bottom-up,
    /// recursing into child statements.
    pub fn transform_expressions(
        &mut self,
        f: &mut impl FnMut(Expr) -> Expr,
    ) {
        fn take(e: &mut Expr, f: &mut impl FnMut(Expr) -> Expr) {
            let expr = std::mem::replace(e, Expr::Const(Value::Null));
            *e = expr.transform(f);
        }
        fn take_all(es: &mut [Expr], f: &mut impl FnMut(Expr) -> Expr) {
            for e in es {
                take(e, f);
            }
        }
        fn body(nodes: &mut [Node], f: &mut impl FnMut(Expr) -> Expr) {
            for n in nodes {
                n.transform_expressions(f);
            }
        }
        fn filters(
            chain: &mut [FilterCall],
            f: &mut impl FnMut(Expr) -> Expr,
        ) {
            for fc in chain {
                take_all(&mut fc.args, f);
                for (_, e) in fc.kwargs.iter_mut() {
                    take(e, f);
                }
            }
        }

        match *self {
            Self::Text(_) => {}
            Self::Output(ref mut exprs) => take_all(exprs, f),
            Self::If {
                ref mut branches,
                ref mut otherwise,
            } => {
                for (test, b) in branches.iter_mut() {
                    take(test, f);
                    body(b, f);
                }
                body(otherwise, f);
            }
            Self::For {
                ref mut iter,
                body: ref mut b,
                ref mut otherwise,
                ref mut filter,
                ..
            } => {
                take(iter, f);
                if let Some(ref mut e) = filter {
                    take(e, f);
                }
                body(b, f);
                body(otherwise, f);
            }
            Self::Set { ref mut value, .. } => take(value, f),
            Self::SetBlock {
                filters: ref mut chain,
                body: ref mut b,
                ..
            } => {
                filters(chain, f);
                body(b, f);
            }
            Self::Block { body: ref mut b, .. } => body(b, f),
            Self::Extends(ref mut e) => take(e, f),
            Self::Include {
                ref mut template, ..
            } => take(template, f),
            Self::Import {
                ref mut template, ..
            } => take(template, f),
            Self::FromImport {
                ref mut template, ..
            } => take(template, f),
            Self::Macro(ref mut decl) => {
                for (_, default) in decl.params.iter_mut() {
                    if let Some(ref mut e) = default {
                        take(e, f);
                    }
                }
                body(&mut decl.body, f);
            }
            Self::CallBlock {
                ref mut call,
                ref mut params,
                body: ref mut b,
            } => {
                take(call, f);
                for (_, default) in params.iter_mut() {
                    if let Some(ref mut e) = default {
                        take(e, f);
                    }
                }
                body(b, f);
            }
            Self::FilterBlock {
                filters: ref mut chain,
                body: ref mut b,
            } => {
                filters(chain, f);
                body(b, f);
            }
            Self::With {
                ref mut targets,
                body: ref mut b,
            } => {
                for (_, e) in targets.iter_mut() {
                    take(e, f);
                }
                body(b, f);
            }
            Self::Do(ref mut e) => take(e, f),
            Self::AutoEscape {
                ref mut value,
                body: ref mut b,
            } => {
                take(value, f);
                body(b, f);
            }
            Self::ContextModifier {
                ref mut overrides,
                body: ref mut b,
            } => {
                for (_, e) in overrides.iter_mut() {
                    take(e, f);
                }
                body(b, f);
            }
        }
    }
}
