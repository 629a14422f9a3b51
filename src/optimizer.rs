//! Compile-time constant folding over the AST.
//!
//! A pure pass: expressions whose children are all constants and
//! whose operator is foldable are replaced with their value. Filters
//! and tests are never folded since registered callables may be
//! impure. Any error during folding leaves the node unchanged, and
//! the pass is idempotent.
use serde_json::{Map, Value};

use crate::{
    parser::ast::{BinaryOp, CmpOp, Expr, Node, UnaryOp},
    value,
};

/// Fold constants over a statement list in place.
pub fn optimize(nodes: &mut Vec<Node>) {
    for node in nodes.iter_mut() {
        node.transform_expressions(&mut fold);
    }
}

fn fold(expr: Expr) -> Expr {
    match try_fold(&expr) {
        Some(v) => Expr::Const(v),
        None => expr,
    }
}

fn try_fold(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Unary { op, operand } => {
            let v = operand.as_const()?;
            match op {
                UnaryOp::Not => Some(Value::Bool(!value::is_truthy(v))),
                UnaryOp::Neg => value::neg(v).ok(),
                UnaryOp::Pos => value::pos(v).ok(),
            }
        }
        Expr::Binary { op, left, right } => {
            let l = left.as_const()?;
            let r = right.as_const()?;
            match op {
                BinaryOp::And => Some(if value::is_truthy(l) {
                    r.clone()
                } else {
                    l.clone()
                }),
                BinaryOp::Or => Some(if value::is_truthy(l) {
                    l.clone()
                } else {
                    r.clone()
                }),
                BinaryOp::Add => value::add(l, r).ok(),
                BinaryOp::Sub => value::sub(l, r).ok(),
                BinaryOp::Mul => value::mul(l, r).ok(),
                BinaryOp::Div => value::div(l, r).ok(),
                BinaryOp::FloorDiv => value::floordiv(l, r).ok(),
                BinaryOp::Mod => value::rem(l, r).ok(),
                BinaryOp::Pow => value::pow(l, r).ok(),
            }
        }
        Expr::Concat(items) => {
            let mut s = String::new();
            for item in items {
                s.push_str(&value::output_string(item.as_const()?));
            }
            Some(Value::String(s))
        }
        Expr::Compare { left, ops } => {
            let mut current = left.as_const()?;
            for (op, right) in ops {
                let r = right.as_const()?;
                let holds = match op {
                    CmpOp::Eq => value::eq(current, r),
                    CmpOp::Ne => !value::eq(current, r),
                    CmpOp::In => value::contains(r, current).ok()?,
                    CmpOp::NotIn => !value::contains(r, current).ok()?,
                    _ => {
                        let ordering = value::compare(current, r).ok()?;
                        match op {
                            CmpOp::Lt => {
                                ordering == std::cmp::Ordering::Less
                            }
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
                    return Some(Value::Bool(false));
                }
                current = r;
            }
            Some(Value::Bool(true))
        }
        Expr::Getitem { target, index } => {
            // Missing keys resolve to undefined at runtime, which a
            // constant cannot represent, so only fold hits.
            let t = target.as_const()?;
            let key = index.as_const()?;
            value::get_item(t, key)
        }
        Expr::Condition {
            test,
            then,
            otherwise,
        } => {
            let t = test.as_const()?;
            if value::is_truthy(t) {
                then.as_const().cloned()
            } else {
                otherwise.as_ref()?.as_const().cloned()
            }
        }
        Expr::List(items) | Expr::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(item.as_const()?.clone());
            }
            Some(Value::Array(out))
        }
        Expr::Dict(pairs) => {
            let mut map = Map::new();
            for (k, v) in pairs {
                let key = value::to_key(k.as_const()?).ok()?;
                map.insert(key, v.as_const()?.clone());
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Syntax;
    use crate::parser::Parser;
    use serde_json::json;

    fn optimized(source: &str) -> Vec<Node> {
        let mut nodes = Parser::new(source, &Syntax::default(), None)
            .unwrap()
            .parse()
            .unwrap();
        optimize(&mut nodes);
        nodes
    }

    fn first_const(nodes: &[Node]) -> Option<Value> {
        match nodes.first() {
            Some(Node::Output(exprs)) => {
                exprs.first().and_then(|e| e.as_const().cloned())
            }
            _ => None,
        }
    }

    #[test]
    fn folds_arithmetic() {
        let nodes = optimized("{{ 1 + 2 * 3 }}");
        assert_eq!(first_const(&nodes), Some(json!(7)));
    }

    #[test]
    fn folds_comparisons_and_boolean() {
        let nodes = optimized("{{ 1 < 2 and 'a' ~ 'b' == 'ab' }}");
        assert_eq!(first_const(&nodes), Some(json!(true)));
    }

    #[test]
    fn division_by_zero_left_unfolded() {
        let nodes = optimized("{{ 1 / 0 }}");
        assert_eq!(first_const(&nodes), None);
    }

    #[test]
    fn filters_never_fold() {
        let nodes = optimized("{{ 'a' | upper }}");
        assert_eq!(first_const(&nodes), None);
    }
}
