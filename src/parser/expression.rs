//! Expression parsing with the operator precedence ladder.
//!
//! Lowest to highest: conditional `a if b else c`, `or`, `and`,
//! `not`, comparisons (chained, including `in` and `is` tests), the
//! filter pipe `|`, string concat `~`, `+ -`, `* / // %`, unary
//! `+ -`, `**` and finally postfix `. [] ()`.
use serde_json::Value;

use crate::{
    error::Error,
    lexer::TokenKind,
    parser::{
        ast::{BinaryOp, CmpOp, Expr, UnaryOp},
        Parser,
    },
};

/// Keywords that terminate a bare (parenthesis-free) test argument.
static KEYWORDS: [&str; 7] = ["and", "or", "not", "if", "else", "in", "is"];

impl Parser {
    /// Parse an expression, promoting a trailing comma to a tuple.
    pub(crate) fn parse_tuple_expression(
        &mut self,
        with_condexpr: bool,
    ) -> Result<Expr, Error> {
        let first = self.parse_expression(with_condexpr)?;
        if self.peek().kind() != &TokenKind::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.peek().kind() == &TokenKind::Comma {
            self.advance();
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_expression(with_condexpr)?);
        }
        Ok(Expr::Tuple(items))
    }

    /// Parse a single expression.
    pub(crate) fn parse_expression(
        &mut self,
        with_condexpr: bool,
    ) -> Result<Expr, Error> {
        if with_condexpr {
            self.parse_condexpr()
        } else {
            self.parse_or()
        }
    }

    fn parse_condexpr(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_or()?;
        while self.peek().is_name("if") {
            self.advance();
            let test = self.parse_or()?;
            let otherwise = if self.peek().is_name("else") {
                self.advance();
                Some(Box::new(self.parse_condexpr()?))
            } else {
                None
            };
            expr = Expr::Condition {
                test: Box::new(test),
                then: Box::new(expr),
                otherwise,
            };
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.peek().is_name("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_not()?;
        while self.peek().is_name("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, Error> {
        if self.peek().is_name("not") && !self.peek_at(1).is_name("in") {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_filtered()?;
        let mut ops: Vec<(CmpOp, Expr)> = Vec::new();

        loop {
            let kind = self.peek().kind().clone();
            let op = match kind {
                TokenKind::Eq => Some(CmpOp::Eq),
                TokenKind::Ne => Some(CmpOp::Ne),
                TokenKind::Lt => Some(CmpOp::Lt),
                TokenKind::Lteq => Some(CmpOp::Lteq),
                TokenKind::Gt => Some(CmpOp::Gt),
                TokenKind::Gteq => Some(CmpOp::Gteq),
                TokenKind::Name(ref n) if n == "in" => Some(CmpOp::In),
                TokenKind::Name(ref n)
                    if n == "not" && self.peek_at(1).is_name("in") =>
                {
                    self.advance();
                    Some(CmpOp::NotIn)
                }
                TokenKind::Name(ref n) if n == "is" => {
                    self.advance();
                    left = self.parse_test(left)?;
                    continue;
                }
                _ => None,
            };
            match op {
                Some(op) => {
                    self.advance();
                    let right = self.parse_filtered()?;
                    ops.push((op, right));
                }
                None => break,
            }
        }

        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    /// Parse a test application following `is`.
    fn parse_test(&mut self, input: Expr) -> Result<Expr, Error> {
        let negated = if self.peek().is_name("not") {
            self.advance();
            true
        } else {
            false
        };
        let (name, _) = self.expect_name("test name")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.peek().kind() == &TokenKind::Lparen {
            self.advance();
            let parsed = self.parse_call_args()?;
            args = parsed.0;
            kwargs = parsed.1;
        } else if self.bare_test_argument() {
            args.push(self.parse_primary_postfix()?);
        }
        Ok(Expr::Test {
            name,
            input: Box::new(input),
            args,
            kwargs,
            negated,
        })
    }

    /// A test may take a single argument without parentheses, eg:
    /// `x is divisibleby 3`.
    fn bare_test_argument(&self) -> bool {
        match self.peek().kind() {
            TokenKind::Integer(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Lbracket
            | TokenKind::Lbrace => true,
            TokenKind::Name(ref n) => !KEYWORDS.contains(&n.as_str()),
            _ => false,
        }
    }

    fn parse_filtered(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_concat()?;
        while self.peek().kind() == &TokenKind::Pipe {
            self.advance();
            let (name, _) = self.expect_name("filter name")?;
            let mut args = Vec::new();
            let mut kwargs = Vec::new();
            if self.peek().kind() == &TokenKind::Lparen {
                self.advance();
                let parsed = self.parse_call_args()?;
                args = parsed.0;
                kwargs = parsed.1;
            }
            left = Expr::Filter {
                name,
                input: Some(Box::new(left)),
                args,
                kwargs,
            };
        }
        Ok(left)
    }

    fn parse_concat(&mut self) -> Result<Expr, Error> {
        let first = self.parse_math1()?;
        if self.peek().kind() != &TokenKind::Tilde {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.peek().kind() == &TokenKind::Tilde {
            self.advance();
            items.push(self.parse_math1()?);
        }
        Ok(Expr::Concat(items))
    }

    fn parse_math1(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_math2()?;
        loop {
            let op = match self.peek().kind() {
                TokenKind::Add => BinaryOp::Add,
                TokenKind::Sub => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_math2()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_math2(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind() {
                TokenKind::Mul => BinaryOp::Mul,
                TokenKind::Div => BinaryOp::Div,
                TokenKind::FloorDiv => BinaryOp::FloorDiv,
                TokenKind::Mod => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let op = match self.peek().kind() {
            TokenKind::Sub => Some(UnaryOp::Neg),
            TokenKind::Add => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> Result<Expr, Error> {
        let base = self.parse_primary_postfix()?;
        if self.peek().kind() == &TokenKind::Pow {
            self.advance();
            // Right associative with a unary right hand side so that
            // `2 ** -1` parses.
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exp),
            });
        }
        Ok(base)
    }

    pub(crate) fn parse_primary_postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().kind() {
                TokenKind::Dot => {
                    self.advance();
                    let (name, _) = self.expect_name("attribute name")?;
                    expr = Expr::Getattr {
                        target: Box::new(expr),
                        name,
                    };
                }
                TokenKind::Lbracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    expr = Expr::Getitem {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Lparen => {
                    self.advance();
                    let (args, kwargs, var_args, var_kwargs) =
                        self.parse_call_args()?;
                    expr = Expr::Call {
                        target: Box::new(expr),
                        args,
                        kwargs,
                        var_args: var_args.map(Box::new),
                        var_kwargs: var_kwargs.map(Box::new),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parse the inside of a `[...]` subscript which may be a plain
    /// index or a slice.
    fn parse_subscript(&mut self) -> Result<Expr, Error> {
        let start = if self.peek().kind() == &TokenKind::Colon {
            None
        } else {
            Some(Box::new(self.parse_expression(true)?))
        };

        let index = if self.peek().kind() == &TokenKind::Colon {
            self.advance();
            let stop = match self.peek().kind() {
                TokenKind::Colon | TokenKind::Rbracket => None,
                _ => Some(Box::new(self.parse_expression(true)?)),
            };
            let step = if self.peek().kind() == &TokenKind::Colon {
                self.advance();
                match self.peek().kind() {
                    TokenKind::Rbracket => None,
                    _ => Some(Box::new(self.parse_expression(true)?)),
                }
            } else {
                None
            };
            Expr::Slice { start, stop, step }
        } else {
            match start {
                Some(e) => *e,
                None => {
                    let token = self.peek().clone();
                    return Err(self
                        .syntax_error("expected subscript expression", &token)
                        .into());
                }
            }
        };

        self.expect(&TokenKind::Rbracket)?;
        Ok(index)
    }

    /// Parse call arguments after the opening parenthesis, consuming
    /// the closing one.
    #[allow(clippy::type_complexity)]
    pub(crate) fn parse_call_args(
        &mut self,
    ) -> Result<
        (Vec<Expr>, Vec<(String, Expr)>, Option<Expr>, Option<Expr>),
        Error,
    > {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        let mut var_args = None;
        let mut var_kwargs = None;
        let mut first = true;

        loop {
            if self.peek().kind() == &TokenKind::Rparen {
                self.advance();
                break;
            }
            if !first {
                self.expect(&TokenKind::Comma)?;
                // Trailing comma before the closing parenthesis.
                if self.peek().kind() == &TokenKind::Rparen {
                    self.advance();
                    break;
                }
            }
            first = false;

            match self.peek().kind() {
                TokenKind::Mul => {
                    self.advance();
                    var_args = Some(self.parse_expression(true)?);
                }
                TokenKind::Pow => {
                    self.advance();
                    var_kwargs = Some(self.parse_expression(true)?);
                }
                TokenKind::Name(_)
                    if self.peek_at(1).kind() == &TokenKind::Assign =>
                {
                    let (name, _) = self.expect_name("argument name")?;
                    self.advance();
                    let value = self.parse_expression(true)?;
                    kwargs.push((name, value));
                }
                _ => {
                    args.push(self.parse_expression(true)?);
                }
            }
        }

        Ok((args, kwargs, var_args, var_kwargs))
    }

    /// Determine if the next token can begin an expression.
    pub(crate) fn starts_expression(&self) -> bool {
        matches!(
            self.peek().kind(),
            TokenKind::Name(_)
                | TokenKind::Integer(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Lparen
                | TokenKind::Lbracket
                | TokenKind::Lbrace
                | TokenKind::Sub
                | TokenKind::Add
        )
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        let token = self.peek().clone();
        match token.kind() {
            TokenKind::Name(ref n) => {
                let expr = match n.as_str() {
                    "true" | "True" => Expr::Const(Value::Bool(true)),
                    "false" | "False" => Expr::Const(Value::Bool(false)),
                    "none" | "None" | "null" => Expr::Const(Value::Null),
                    _ => Expr::Name(n.clone()),
                };
                self.advance();
                Ok(expr)
            }
            TokenKind::Integer(n) => {
                let n = *n;
                self.advance();
                Ok(Expr::Const(Value::from(n)))
            }
            TokenKind::Float(n) => {
                let n = *n;
                self.advance();
                Ok(Expr::Const(
                    serde_json::Number::from_f64(n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                ))
            }
            TokenKind::Str(ref s) => {
                let s = s.clone();
                self.advance();
                Ok(Expr::Const(Value::String(s)))
            }
            TokenKind::Lparen => {
                self.advance();
                if self.peek().kind() == &TokenKind::Rparen {
                    self.advance();
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let expr = self.parse_tuple_expression(true)?;
                self.expect(&TokenKind::Rparen)?;
                Ok(expr)
            }
            TokenKind::Lbracket => {
                self.advance();
                let mut items = Vec::new();
                loop {
                    if self.peek().kind() == &TokenKind::Rbracket {
                        self.advance();
                        break;
                    }
                    if !items.is_empty() {
                        self.expect(&TokenKind::Comma)?;
                        if self.peek().kind() == &TokenKind::Rbracket {
                            self.advance();
                            break;
                        }
                    }
                    items.push(self.parse_expression(true)?);
                }
                Ok(Expr::List(items))
            }
            TokenKind::Lbrace => {
                self.advance();
                let mut pairs = Vec::new();
                loop {
                    if self.peek().kind() == &TokenKind::Rbrace {
                        self.advance();
                        break;
                    }
                    if !pairs.is_empty() {
                        self.expect(&TokenKind::Comma)?;
                        if self.peek().kind() == &TokenKind::Rbrace {
                            self.advance();
                            break;
                        }
                    }
                    let key = self.parse_expression(true)?;
                    self.expect(&TokenKind::Colon)?;
                    let value = self.parse_expression(true)?;
                    pairs.push((key, value));
                }
                Ok(Expr::Dict(pairs))
            }
            _ => Err(self
                .syntax_error(
                    format!(
                        "Expected an expression, got {}",
                        token.kind().description()
                    ),
                    &token,
                )
                .into()),
        }
    }
}
