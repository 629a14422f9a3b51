//! Convert the lexer token stream to AST nodes.
//!
//! Statements are tag dispatched with one token of lookahead; block
//! bodies are collected recursively until one of a caller supplied
//! set of end tags is seen.
use crate::{
    error::{AssertionError, Error, SyntaxError},
    lexer::{self, Syntax, Token, TokenKind},
    Result,
};

pub mod ast;
mod expression;

use ast::{Expr, FilterCall, MacroDecl, Node};

/// Default file name.
static UNKNOWN: &str = "unknown";

/// Tags the statement dispatcher understands.
static KNOWN_TAGS: [&str; 14] = [
    "for", "if", "set", "block", "extends", "include", "import", "from",
    "macro", "call", "filter", "with", "do", "autoescape",
];

/// Convert a token stream to AST nodes.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file_name: String,
    source: String,
    tag_stack: Vec<&'static str>,
    extends_seen: bool,
}

impl Parser {
    /// Create a parser for the given source; the source is lexed with
    /// the supplied syntax configuration.
    pub fn new(
        source: &str,
        syntax: &Syntax,
        file_name: Option<&str>,
    ) -> Result<Self> {
        let tokens = lexer::collect(source, syntax, file_name)?;
        Ok(Self {
            tokens,
            pos: 0,
            file_name: file_name.unwrap_or(UNKNOWN).to_string(),
            // Keep a normalized copy for error snippets; spans refer
            // to the normalized source.
            source: source.replace("\r\n", "\n").replace('\r', "\n"),
            tag_stack: Vec::new(),
            extends_seen: false,
        })
    }

    /// Parse the entire template into a statement list.
    pub fn parse(mut self) -> Result<Vec<Node>> {
        let nodes = self.subparse(None)?;
        Ok(nodes)
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn syntax_error(
        &self,
        message: impl Into<String>,
        token: &Token,
    ) -> SyntaxError {
        SyntaxError::new(
            message,
            &self.file_name,
            token.line(),
            token.span().clone(),
            &self.source,
        )
    }

    fn assertion_error(
        &self,
        message: impl Into<String>,
        token: &Token,
    ) -> AssertionError {
        AssertionError::new(message, &self.file_name, token.line())
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if self.peek().kind() == kind {
            Ok(self.advance())
        } else {
            let token = self.peek().clone();
            Err(self
                .syntax_error(
                    format!(
                        "expected {}, got {}",
                        kind.description(),
                        token.kind().description()
                    ),
                    &token,
                )
                .into())
        }
    }

    pub(crate) fn expect_name(
        &mut self,
        what: &str,
    ) -> Result<(String, Token)> {
        let token = self.peek().clone();
        match token.kind() {
            TokenKind::Name(ref n) => {
                let name = n.clone();
                self.advance();
                Ok((name, token))
            }
            _ => Err(self
                .syntax_error(
                    format!(
                        "expected {}, got {}",
                        what,
                        token.kind().description()
                    ),
                    &token,
                )
                .into()),
        }
    }

    /// Expect a specific keyword name token.
    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let token = self.peek().clone();
        if token.is_name(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self
                .syntax_error(
                    format!(
                        "expected '{}', got {}",
                        keyword,
                        token.kind().description()
                    ),
                    &token,
                )
                .into())
        }
    }

    /// Eat a keyword name token when present.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_name(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_tag_start(&self) -> bool {
        matches!(
            self.peek().kind(),
            TokenKind::BlockStart | TokenKind::LineStatementStart
        )
    }

    fn at_tag_end(&self) -> bool {
        matches!(
            self.peek().kind(),
            TokenKind::BlockEnd | TokenKind::LineStatementEnd
        )
    }

    /// Expect the end of a statement tag; line statements terminate
    /// with their own end token.
    fn expect_tag_end(&mut self) -> Result<()> {
        if self.at_tag_end() {
            self.advance();
            Ok(())
        } else {
            let token = self.peek().clone();
            Err(self
                .syntax_error(
                    format!(
                        "expected end of statement block, got {}",
                        token.kind().description()
                    ),
                    &token,
                )
                .into())
        }
    }

    /// Parse a name used as a tag identifier, rejecting hyphenated
    /// names with a useful message.
    fn parse_tag_name(&mut self) -> Result<(String, Token)> {
        let (name, token) = self.expect_name("identifier")?;
        if self.peek().kind() == &TokenKind::Sub
            && self.peek().span().start == token.span().end
        {
            let next = self.peek().clone();
            return Err(self
                .syntax_error(
                    "Names may not contain hyphens, use an underscore instead.",
                    &next,
                )
                .into());
        }
        Ok((name, token))
    }

    /// Collect statements until EOF or one of the given end tags.
    ///
    /// When an end tag is seen the parser is left positioned at the
    /// tag start token; the caller consumes it with `take_end_tag`.
    fn subparse(
        &mut self,
        end_tags: Option<&[&'static str]>,
    ) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = Vec::new();
        loop {
            match self.peek().kind() {
                TokenKind::Data(_) => {
                    let token = self.advance();
                    if let TokenKind::Data(text) = token.into_kind() {
                        nodes.push(Node::Text(text));
                    }
                }
                TokenKind::VariableStart => {
                    self.advance();
                    let expr = self.parse_tuple_expression(true)?;
                    self.expect(&TokenKind::VariableEnd)?;
                    nodes.push(Node::Output(vec![expr]));
                }
                TokenKind::BlockStart | TokenKind::LineStatementStart => {
                    let name_token = self.peek_at(1).clone();
                    let name = match name_token.kind() {
                        TokenKind::Name(ref n) => n.clone(),
                        _ => {
                            return Err(self
                                .syntax_error(
                                    format!(
                                        "expected tag name, got {}",
                                        name_token.kind().description()
                                    ),
                                    &name_token,
                                )
                                .into());
                        }
                    };
                    if let Some(ends) = end_tags {
                        if ends.contains(&name.as_str()) {
                            return Ok(nodes);
                        }
                    }
                    if !KNOWN_TAGS.contains(&name.as_str()) {
                        return Err(self.fail_unknown_tag(
                            &name,
                            end_tags,
                            &name_token,
                        ));
                    }
                    self.advance();
                    self.advance();
                    let node =
                        self.parse_statement(&name, &name_token, &nodes)?;
                    nodes.push(node);
                }
                TokenKind::Eof => {
                    if let Some(ends) = end_tags {
                        return Err(self.fail_eof(ends));
                    }
                    return Ok(nodes);
                }
                _ => {
                    let token = self.peek().clone();
                    return Err(self
                        .syntax_error(
                            format!(
                                "unexpected {}",
                                token.kind().description()
                            ),
                            &token,
                        )
                        .into());
                }
            }
        }
    }

    /// Consume an end tag previously seen by `subparse`.
    fn take_end_tag(&mut self, ends: &[&'static str]) -> Result<String> {
        if !self.at_tag_start() {
            return Err(self.fail_eof(ends));
        }
        self.advance();
        let (name, token) = self.expect_name("tag name")?;
        if !ends.contains(&name.as_str()) {
            return Err(self.fail_unknown_tag(&name, Some(ends), &token));
        }
        Ok(name)
    }

    fn looking_for(&self, ends: &[&'static str]) -> String {
        let expected = ends
            .iter()
            .map(|t| format!("'{}'", t))
            .collect::<Vec<_>>()
            .join(" or ");
        let innermost = self.tag_stack.last().copied().unwrap_or("template");
        format!(
            " Jinja was looking for the following tags: {}. The innermost block that needs to be closed is '{}'.",
            expected, innermost
        )
    }

    fn fail_unknown_tag(
        &self,
        name: &str,
        end_tags: Option<&[&'static str]>,
        token: &Token,
    ) -> Error {
        let mut message = format!("Encountered unknown tag '{}'.", name);
        if let Some(ends) = end_tags {
            if !self.tag_stack.is_empty() {
                message.push_str(&self.looking_for(ends));
            }
        }
        self.syntax_error(message, token).into()
    }

    fn fail_eof(&self, ends: &[&'static str]) -> Error {
        let mut message = String::from("Unexpected end of template.");
        if !self.tag_stack.is_empty() {
            message.push_str(&self.looking_for(ends));
        }
        let token = self.peek().clone();
        self.syntax_error(message, &token).into()
    }

    /// Dispatch a statement tag; the tag start and name tokens are
    /// already consumed.
    fn parse_statement(
        &mut self,
        name: &str,
        token: &Token,
        preceding: &[Node],
    ) -> Result<Node> {
        match name {
            "for" => self.parse_for(),
            "if" => self.parse_if(),
            "set" => self.parse_set(),
            "block" => self.parse_block(),
            "extends" => self.parse_extends(token, preceding),
            "include" => self.parse_include(),
            "import" => self.parse_import(),
            "from" => self.parse_from(),
            "macro" => self.parse_macro(),
            "call" => self.parse_call_block(),
            "filter" => self.parse_filter_block(),
            "with" => self.parse_with(),
            "do" => self.parse_do(),
            "autoescape" => self.parse_autoescape(),
            _ => unreachable!("unhandled known tag"),
        }
    }

    /// Parse a comma separated list of assignment targets.
    fn parse_targets(&mut self) -> Result<Vec<String>> {
        let parens = if self.peek().kind() == &TokenKind::Lparen {
            self.advance();
            true
        } else {
            false
        };
        let mut targets = Vec::new();
        loop {
            let (name, token) = self.parse_tag_name()?;
            if name == "loop" {
                return Err(self
                    .assertion_error(
                        "Cannot assign to the reserved name 'loop'",
                        &token,
                    )
                    .into());
            }
            targets.push(name);
            if self.peek().kind() == &TokenKind::Comma {
                self.advance();
                if !matches!(self.peek().kind(), TokenKind::Name(_)) {
                    break;
                }
            } else {
                break;
            }
        }
        if parens {
            self.expect(&TokenKind::Rparen)?;
        }
        Ok(targets)
    }

    fn parse_for(&mut self) -> Result<Node> {
        let targets = self.parse_targets()?;
        self.expect_keyword("in")?;
        let iter = self.parse_tuple_expression(false)?;
        let filter = if self.eat_keyword("if") {
            Some(self.parse_expression(false)?)
        } else {
            None
        };
        let recursive = self.eat_keyword("recursive");
        self.expect_tag_end()?;

        self.tag_stack.push("for");
        let body = self.subparse(Some(&["endfor", "else"]))?;
        let tag = self.take_end_tag(&["endfor", "else"])?;
        let otherwise = if tag == "else" {
            self.expect_tag_end()?;
            let otherwise = self.subparse(Some(&["endfor"]))?;
            self.take_end_tag(&["endfor"])?;
            otherwise
        } else {
            Vec::new()
        };
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::For {
            targets,
            iter,
            body,
            otherwise,
            filter,
            recursive,
        })
    }

    fn parse_if(&mut self) -> Result<Node> {
        let mut branches: Vec<(Expr, Vec<Node>)> = Vec::new();
        let mut otherwise: Vec<Node> = Vec::new();
        let mut test = self.parse_expression(false)?;

        self.tag_stack.push("if");
        loop {
            self.expect_tag_end()?;
            let body = self.subparse(Some(&["elif", "else", "endif"]))?;
            let tag = self.take_end_tag(&["elif", "else", "endif"])?;
            branches.push((test, body));
            match tag.as_str() {
                "elif" => {
                    test = self.parse_expression(false)?;
                }
                "else" => {
                    self.expect_tag_end()?;
                    otherwise = self.subparse(Some(&["endif"]))?;
                    self.take_end_tag(&["endif"])?;
                    break;
                }
                _ => break,
            }
        }
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::If {
            branches,
            otherwise,
        })
    }

    fn parse_set(&mut self) -> Result<Node> {
        let targets = self.parse_targets()?;

        if self.peek().kind() == &TokenKind::Assign {
            self.advance();
            let value = self.parse_tuple_expression(true)?;
            self.expect_tag_end()?;
            return Ok(Node::Set { targets, value });
        }

        // Block form, with an optional filter chain.
        let mut filters = Vec::new();
        while self.peek().kind() == &TokenKind::Pipe {
            self.advance();
            filters.push(self.parse_filter_call()?);
        }
        self.expect_tag_end()?;
        self.tag_stack.push("set");
        let body = self.subparse(Some(&["endset"]))?;
        self.take_end_tag(&["endset"])?;
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::SetBlock {
            targets,
            filters,
            body,
        })
    }

    fn parse_filter_call(&mut self) -> Result<FilterCall> {
        let (name, token) = self.expect_name("filter name")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.peek().kind() == &TokenKind::Lparen {
            self.advance();
            let (a, k, var_args, var_kwargs) = self.parse_call_args()?;
            if var_args.is_some() || var_kwargs.is_some() {
                return Err(self
                    .syntax_error(
                        "filter blocks do not accept splat arguments",
                        &token,
                    )
                    .into());
            }
            args = a;
            kwargs = k;
        }
        Ok(FilterCall { name, args, kwargs })
    }

    fn parse_block(&mut self) -> Result<Node> {
        let (name, _) = self.parse_tag_name()?;
        let scoped = self.eat_keyword("scoped");
        let required = self.eat_keyword("required");
        self.expect_tag_end()?;

        self.tag_stack.push("block");
        let body = self.subparse(Some(&["endblock"]))?;
        self.take_end_tag(&["endblock"])?;
        // An optional trailing name must match the open tag.
        if matches!(self.peek().kind(), TokenKind::Name(_)) {
            let (close, token) = self.expect_name("block name")?;
            if close != name {
                return Err(self
                    .syntax_error(
                        format!(
                            "mismatched block end tag, expected '{}' got '{}'",
                            name, close
                        ),
                        &token,
                    )
                    .into());
            }
        }
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::Block {
            name,
            body,
            scoped,
            required,
        })
    }

    fn parse_extends(
        &mut self,
        token: &Token,
        preceding: &[Node],
    ) -> Result<Node> {
        if !self.tag_stack.is_empty() || !preceding.is_empty() {
            return Err(self
                .syntax_error(
                    "extends must be the first tag in the template",
                    token,
                )
                .into());
        }
        if self.extends_seen {
            return Err(self
                .syntax_error(
                    "extends may only appear once in a template",
                    token,
                )
                .into());
        }
        let template = self.parse_expression(true)?;
        self.expect_tag_end()?;
        self.extends_seen = true;
        Ok(Node::Extends(template))
    }

    fn parse_include(&mut self) -> Result<Node> {
        let template = self.parse_expression(true)?;
        let ignore_missing = if self.eat_keyword("ignore") {
            self.expect_keyword("missing")?;
            true
        } else {
            false
        };
        let with_context = self.parse_context_policy(true)?;
        self.expect_tag_end()?;
        Ok(Node::Include {
            template,
            ignore_missing,
            with_context,
        })
    }

    /// Parse an optional trailing `with context` / `without context`.
    fn parse_context_policy(&mut self, default: bool) -> Result<bool> {
        if self.peek().is_name("with") && self.peek_at(1).is_name("context")
        {
            self.advance();
            self.advance();
            Ok(true)
        } else if self.peek().is_name("without")
            && self.peek_at(1).is_name("context")
        {
            self.advance();
            self.advance();
            Ok(false)
        } else {
            Ok(default)
        }
    }

    fn parse_import(&mut self) -> Result<Node> {
        let template = self.parse_expression(true)?;
        self.expect_keyword("as")?;
        let (alias, _) = self.parse_tag_name()?;
        let with_context = self.parse_context_policy(false)?;
        self.expect_tag_end()?;
        Ok(Node::Import {
            template,
            alias,
            with_context,
        })
    }

    fn parse_from(&mut self) -> Result<Node> {
        let template = self.parse_expression(true)?;
        self.expect_keyword("import")?;

        let mut names: Vec<(String, Option<String>)> = Vec::new();
        let mut with_context = false;
        loop {
            if (self.peek().is_name("with") || self.peek().is_name("without"))
                && self.peek_at(1).is_name("context")
            {
                with_context = self.parse_context_policy(false)?;
                break;
            }
            let (name, _) = self.parse_tag_name()?;
            let alias = if self.eat_keyword("as") {
                let (alias, _) = self.parse_tag_name()?;
                Some(alias)
            } else {
                None
            };
            names.push((name, alias));
            if self.peek().kind() == &TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        if names.is_empty() {
            let token = self.peek().clone();
            return Err(self
                .syntax_error("expected at least one import name", &token)
                .into());
        }
        self.expect_tag_end()?;
        Ok(Node::FromImport {
            template,
            names,
            with_context,
        })
    }

    /// Parse a macro style parameter list: `(a, b=default)`.
    fn parse_params(&mut self) -> Result<Vec<(String, Option<Expr>)>> {
        self.expect(&TokenKind::Lparen)?;
        let mut params = Vec::new();
        loop {
            if self.peek().kind() == &TokenKind::Rparen {
                self.advance();
                break;
            }
            if !params.is_empty() {
                self.expect(&TokenKind::Comma)?;
                if self.peek().kind() == &TokenKind::Rparen {
                    self.advance();
                    break;
                }
            }
            let (name, _) = self.parse_tag_name()?;
            let default = if self.peek().kind() == &TokenKind::Assign {
                self.advance();
                Some(self.parse_expression(true)?)
            } else {
                None
            };
            params.push((name, default));
        }
        Ok(params)
    }

    fn parse_macro(&mut self) -> Result<Node> {
        let (name, _) = self.parse_tag_name()?;
        let params = self.parse_params()?;
        self.expect_tag_end()?;

        self.tag_stack.push("macro");
        let body = self.subparse(Some(&["endmacro"]))?;
        self.take_end_tag(&["endmacro"])?;
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::Macro(MacroDecl { name, params, body }))
    }

    fn parse_call_block(&mut self) -> Result<Node> {
        let params = if self.peek().kind() == &TokenKind::Lparen {
            self.parse_params()?
        } else {
            Vec::new()
        };
        let call = self.parse_expression(true)?;
        if !matches!(call, Expr::Call { .. }) {
            let token = self.peek().clone();
            return Err(self
                .syntax_error("expected a call expression", &token)
                .into());
        }
        self.expect_tag_end()?;

        self.tag_stack.push("call");
        let body = self.subparse(Some(&["endcall"]))?;
        self.take_end_tag(&["endcall"])?;
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::CallBlock { call, params, body })
    }

    fn parse_filter_block(&mut self) -> Result<Node> {
        let mut filters = vec![self.parse_filter_call()?];
        while self.peek().kind() == &TokenKind::Pipe {
            self.advance();
            filters.push(self.parse_filter_call()?);
        }
        self.expect_tag_end()?;

        self.tag_stack.push("filter");
        let body = self.subparse(Some(&["endfilter"]))?;
        self.take_end_tag(&["endfilter"])?;
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::FilterBlock { filters, body })
    }

    fn parse_with(&mut self) -> Result<Node> {
        let mut targets: Vec<(String, Expr)> = Vec::new();
        while !self.at_tag_end() {
            if !targets.is_empty() {
                self.expect(&TokenKind::Comma)?;
            }
            let (name, _) = self.parse_tag_name()?;
            self.expect(&TokenKind::Assign)?;
            let value = self.parse_expression(true)?;
            targets.push((name, value));
        }
        self.expect_tag_end()?;

        self.tag_stack.push("with");
        let body = self.subparse(Some(&["endwith"]))?;
        self.take_end_tag(&["endwith"])?;
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::With { targets, body })
    }

    fn parse_do(&mut self) -> Result<Node> {
        let expr = self.parse_tuple_expression(true)?;
        self.expect_tag_end()?;
        Ok(Node::Do(expr))
    }

    fn parse_autoescape(&mut self) -> Result<Node> {
        let value = self.parse_expression(true)?;
        self.expect_tag_end()?;

        self.tag_stack.push("autoescape");
        let body = self.subparse(Some(&["endautoescape"]))?;
        self.take_end_tag(&["endautoescape"])?;
        self.expect_tag_end()?;
        self.tag_stack.pop();

        Ok(Node::AutoEscape { value, body })
    }
}
