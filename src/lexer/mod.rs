//! Convert template source into a stream of tokens.
//!
//! The lexer is a cursor state machine; markup delimiters are runtime
//! configuration so the scanner searches for them rather than matching
//! with a compiled grammar. Literal text between tags accumulates into
//! `data` tokens, expression tokens are lexed inside tags and comments
//! are swallowed entirely.
use std::ops::Range;

use crate::{error::SyntaxError, SyntaxResult};

pub mod token;

pub use token::{Token, TokenKind};

/// Default file name for error messages.
static UNKNOWN: &str = "unknown";

/// Newline sequence used when literal text is written to the output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Newline {
    Lf,
    Cr,
    CrLf,
}

impl Newline {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Lf => "\n",
            Self::Cr => "\r",
            Self::CrLf => "\r\n",
        }
    }
}

impl Default for Newline {
    fn default() -> Self {
        Self::Lf
    }
}

/// Delimiter and whitespace configuration consumed by the lexer.
///
/// Two environments are considered equivalent when their `Syntax`
/// values compare equal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Syntax {
    pub block_start: String,
    pub block_end: String,
    pub variable_start: String,
    pub variable_end: String,
    pub comment_start: String,
    pub comment_end: String,
    pub line_statement_prefix: Option<String>,
    pub line_comment_prefix: Option<String>,
    pub trim_blocks: bool,
    pub lstrip_blocks: bool,
    pub newline: Newline,
    pub keep_trailing_newline: bool,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            block_start: "{%".to_string(),
            block_end: "%}".to_string(),
            variable_start: "{{".to_string(),
            variable_end: "}}".to_string(),
            comment_start: "{#".to_string(),
            comment_end: "#}".to_string(),
            line_statement_prefix: None,
            line_comment_prefix: None,
            trim_blocks: false,
            lstrip_blocks: false,
            newline: Newline::default(),
            keep_trailing_newline: false,
        }
    }
}

/// Flavor of markup tag found in the source.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TagKind {
    Variable,
    Block,
    Comment,
}

/// Scanner event for the data state.
enum Event {
    Tag(TagKind, usize),
    LineStatement { ws_start: usize, prefix_len: usize },
    LineComment { ws_start: usize },
}

/// Whitespace strip applied to the end of pending data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Strip {
    None,
    All,
    Lstrip,
}

/// Whitespace strip applied to the start of the following data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Lead {
    None,
    All,
    Newline,
}

/// Whitespace control modifier attached to a tag boundary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Modifier {
    None,
    Minus,
    Plus,
}

impl Modifier {
    fn parse(c: Option<char>) -> Self {
        match c {
            Some('-') => Self::Minus,
            Some('+') => Self::Plus,
            _ => Self::None,
        }
    }

    fn len(&self) -> usize {
        match *self {
            Self::None => 0,
            _ => 1,
        }
    }
}

/// Terminator for expression lexing.
enum ExprEnd {
    Tag(TagKind),
    Line,
}

/// Lexer for a single template source.
pub struct Lexer<'syntax> {
    syntax: &'syntax Syntax,
    source: String,
    file_name: String,
    cursor: usize,
    line: usize,
    tokens: Vec<Token>,
    pending: String,
    pending_start: usize,
    pending_line: usize,
    pending_line_start: bool,
    lead: Lead,
}

impl<'syntax> Lexer<'syntax> {
    /// Create a lexer for the given source.
    ///
    /// Line endings are normalized to `\n` before scanning; the
    /// configured newline sequence is restored when data tokens are
    /// emitted. Unless `keep_trailing_newline` is set a single
    /// trailing newline is removed from the source.
    pub fn new(
        source: &str,
        syntax: &'syntax Syntax,
        file_name: Option<&str>,
    ) -> Self {
        let mut source = source.replace("\r\n", "\n").replace('\r', "\n");
        if !syntax.keep_trailing_newline && source.ends_with('\n') {
            source.pop();
        }
        Self {
            syntax,
            source,
            file_name: file_name.unwrap_or(UNKNOWN).to_string(),
            cursor: 0,
            line: 1,
            tokens: Vec::new(),
            pending: String::new(),
            pending_start: 0,
            pending_line: 1,
            pending_line_start: true,
            lead: Lead::None,
        }
    }

    /// Consume the source and produce the token stream.
    pub fn tokenize(mut self) -> SyntaxResult<Vec<Token>> {
        loop {
            if self.cursor >= self.source.len() {
                self.flush_data(Strip::None);
                let end = self.source.len();
                let line = self.line;
                self.tokens.push(Token::new(TokenKind::Eof, end..end, line));
                return Ok(self.tokens);
            }

            match self.find_event() {
                None => {
                    let end = self.source.len();
                    self.append_data_to(end);
                }
                Some((pos, Event::LineComment { ws_start })) => {
                    self.append_data_to(ws_start);
                    let eol = self.source[pos..]
                        .find('\n')
                        .map(|i| pos + i)
                        .unwrap_or_else(|| self.source.len());
                    self.bump_to(eol);
                }
                Some((pos, Event::LineStatement { ws_start, prefix_len })) => {
                    self.append_data_to(ws_start);
                    self.flush_data(Strip::None);
                    self.bump_to(pos + prefix_len);
                    let line = self.line;
                    self.tokens.push(Token::new(
                        TokenKind::LineStatementStart,
                        pos..pos + prefix_len,
                        line,
                    ));
                    self.lex_expression(ExprEnd::Line)?;
                }
                Some((pos, Event::Tag(kind, delim_len))) => {
                    self.append_data_to(pos);
                    let after = pos + delim_len;
                    let modifier =
                        Modifier::parse(self.source[after..].chars().next());
                    match kind {
                        TagKind::Variable => {
                            // Only `-` is a modifier here so that a
                            // leading unary plus still lexes.
                            let modifier = match modifier {
                                Modifier::Minus => Modifier::Minus,
                                _ => Modifier::None,
                            };
                            let strip = match modifier {
                                Modifier::Minus => Strip::All,
                                _ => Strip::None,
                            };
                            self.flush_data(strip);
                            self.bump_to(after + modifier.len());
                            let line = self.line;
                            self.tokens.push(Token::new(
                                TokenKind::VariableStart,
                                pos..after,
                                line,
                            ));
                            let end =
                                self.lex_expression(ExprEnd::Tag(kind))?;
                            self.lead = match end {
                                Modifier::Minus => Lead::All,
                                _ => Lead::None,
                            };
                        }
                        TagKind::Block => {
                            self.flush_data(self.open_strip(modifier));
                            self.bump_to(after + modifier.len());
                            if let Some((content_start, open_end)) =
                                self.match_raw_head()
                            {
                                self.lex_raw(content_start, open_end)?;
                            } else {
                                let line = self.line;
                                self.tokens.push(Token::new(
                                    TokenKind::BlockStart,
                                    pos..after,
                                    line,
                                ));
                                let end =
                                    self.lex_expression(ExprEnd::Tag(kind))?;
                                self.lead = self.block_lead(end);
                            }
                        }
                        TagKind::Comment => {
                            self.flush_data(self.open_strip(modifier));
                            self.bump_to(after + modifier.len());
                            self.lex_comment()?;
                        }
                    }
                }
            }
        }
    }

    /// Strip mode for pending data at a block or comment open tag.
    fn open_strip(&self, modifier: Modifier) -> Strip {
        match modifier {
            Modifier::Minus => Strip::All,
            Modifier::Plus => Strip::None,
            Modifier::None => {
                if self.syntax.lstrip_blocks {
                    Strip::Lstrip
                } else {
                    Strip::None
                }
            }
        }
    }

    /// Leading strip mode for the data that follows a block tag.
    fn block_lead(&self, end: Modifier) -> Lead {
        match end {
            Modifier::Minus => Lead::All,
            Modifier::Plus => Lead::None,
            Modifier::None => {
                if self.syntax.trim_blocks {
                    Lead::Newline
                } else {
                    Lead::None
                }
            }
        }
    }

    /// Find the next markup event at or after the cursor.
    fn find_event(&self) -> Option<(usize, Event)> {
        let rest = &self.source[self.cursor..];
        let mut best: Option<(usize, TagKind, usize)> = None;

        let candidates = [
            (&self.syntax.variable_start, TagKind::Variable),
            (&self.syntax.block_start, TagKind::Block),
            (&self.syntax.comment_start, TagKind::Comment),
        ];
        for (delim, kind) in candidates.iter() {
            if delim.is_empty() {
                continue;
            }
            if let Some(i) = rest.find(delim.as_str()) {
                let pos = self.cursor + i;
                let replace = match best {
                    None => true,
                    Some((bpos, _, blen)) => {
                        pos < bpos || (pos == bpos && delim.len() > blen)
                    }
                };
                if replace {
                    best = Some((pos, *kind, delim.len()));
                }
            }
        }

        let limit = best
            .as_ref()
            .map(|(p, _, _)| *p)
            .unwrap_or_else(|| self.source.len());

        if let Some(ev) = self.find_line_event(limit) {
            return Some(ev);
        }

        best.map(|(pos, kind, len)| (pos, Event::Tag(kind, len)))
    }

    /// Scan logical line starts before `limit` for a line statement or
    /// line comment prefix.
    fn find_line_event(&self, limit: usize) -> Option<(usize, Event)> {
        if self.syntax.line_statement_prefix.is_none()
            && self.syntax.line_comment_prefix.is_none()
        {
            return None;
        }

        let bytes = self.source.as_bytes();
        let mut line_start = if self.at_line_start(self.cursor) {
            Some(self.cursor)
        } else {
            None
        };
        let mut search = self.cursor;

        loop {
            let ls = match line_start.take() {
                Some(p) => p,
                None => match self.source[search..limit].find('\n') {
                    Some(i) => search + i + 1,
                    None => return None,
                },
            };
            search = ls;
            if ls >= limit {
                return None;
            }

            let mut p = ls;
            while p < self.source.len()
                && (bytes[p] == b' ' || bytes[p] == b'\t')
            {
                p += 1;
            }
            if p >= limit {
                continue;
            }

            if let Some(ref prefix) = self.syntax.line_statement_prefix {
                if self.source[p..].starts_with(prefix.as_str()) {
                    return Some((
                        p,
                        Event::LineStatement {
                            ws_start: ls,
                            prefix_len: prefix.len(),
                        },
                    ));
                }
            }
            if let Some(ref prefix) = self.syntax.line_comment_prefix {
                if self.source[p..].starts_with(prefix.as_str()) {
                    return Some((p, Event::LineComment { ws_start: ls }));
                }
            }
        }
    }

    /// Append source text up to `end` to the pending data buffer,
    /// honoring any leading strip left by the previous tag.
    fn append_data_to(&mut self, end: usize) {
        let mut slice = &self.source[self.cursor..end];
        match self.lead {
            Lead::All => {
                let trimmed = slice.trim_start();
                if !trimmed.is_empty() {
                    self.lead = Lead::None;
                }
                slice = trimmed;
            }
            Lead::Newline => {
                if let Some(rest) = slice.strip_prefix('\n') {
                    slice = rest;
                }
                if end > self.cursor {
                    self.lead = Lead::None;
                }
            }
            Lead::None => {}
        }
        if !slice.is_empty() && self.pending.is_empty() {
            let offset = end - slice.len();
            self.pending_start = offset;
            self.pending_line =
                self.line + count_newlines(&self.source[self.cursor..offset]);
            self.pending_line_start = self.at_line_start(offset);
        }
        self.pending.push_str(slice);
        self.bump_to(end);
    }

    /// Emit the pending data buffer as a token.
    fn flush_data(&mut self, strip: Strip) {
        match strip {
            Strip::All => {
                let len = self.pending.trim_end().len();
                self.pending.truncate(len);
            }
            Strip::Lstrip => match self.pending.rfind('\n') {
                Some(i) => {
                    if self.pending[i + 1..]
                        .bytes()
                        .all(|b| b == b' ' || b == b'\t')
                    {
                        self.pending.truncate(i + 1);
                    }
                }
                None => {
                    if self.pending_line_start
                        && self.pending.bytes().all(|b| b == b' ' || b == b'\t')
                    {
                        self.pending.clear();
                    }
                }
            },
            Strip::None => {}
        }

        if !self.pending.is_empty() {
            let value = match self.syntax.newline {
                Newline::Lf => std::mem::take(&mut self.pending),
                nl => {
                    let v = self.pending.replace('\n', nl.as_str());
                    self.pending.clear();
                    v
                }
            };
            self.tokens.push(Token::new(
                TokenKind::Data(value),
                self.pending_start..self.cursor,
                self.pending_line,
            ));
        }
    }

    /// Lex expression tokens until the end of the current tag.
    ///
    /// Returns the whitespace modifier found on the end delimiter.
    fn lex_expression(&mut self, end: ExprEnd) -> SyntaxResult<Modifier> {
        let (end_delim, end_kind, line_mode) = match end {
            ExprEnd::Tag(TagKind::Variable) => (
                self.syntax.variable_end.clone(),
                TokenKind::VariableEnd,
                false,
            ),
            ExprEnd::Tag(_) => {
                (self.syntax.block_end.clone(), TokenKind::BlockEnd, false)
            }
            ExprEnd::Line => {
                (String::new(), TokenKind::LineStatementEnd, true)
            }
        };
        let mut depth: usize = 0;

        loop {
            // Whitespace; a newline terminates a line statement when
            // no brackets are open.
            loop {
                match self.peek_char() {
                    Some('\n') if line_mode && depth == 0 => {
                        self.bump(1);
                        let pos = self.cursor;
                        let line = self.line;
                        self.tokens.push(Token::new(
                            end_kind,
                            pos - 1..pos,
                            line,
                        ));
                        return Ok(Modifier::None);
                    }
                    Some(c) if c.is_whitespace() => self.bump(c.len_utf8()),
                    Some(_) => break,
                    None => {
                        if line_mode && depth == 0 {
                            let pos = self.cursor;
                            let line = self.line;
                            self.tokens.push(Token::new(
                                end_kind,
                                pos..pos,
                                line,
                            ));
                            return Ok(Modifier::None);
                        }
                        return Err(self.err(
                            format!(
                                "unexpected end of template, expected '{}'",
                                end_delim
                            ),
                            self.cursor..self.cursor,
                        ));
                    }
                }
            }

            if !line_mode && depth == 0 {
                let rest = &self.source[self.cursor..];
                let modifier = if rest.starts_with(end_delim.as_str()) {
                    Some(Modifier::None)
                } else if rest.starts_with('-')
                    && rest[1..].starts_with(end_delim.as_str())
                {
                    Some(Modifier::Minus)
                } else if rest.starts_with('+')
                    && rest[1..].starts_with(end_delim.as_str())
                {
                    Some(Modifier::Plus)
                } else {
                    None
                };
                if let Some(modifier) = modifier {
                    let start = self.cursor;
                    let len = modifier.len() + end_delim.len();
                    let line = self.line;
                    self.tokens.push(Token::new(
                        end_kind,
                        start..start + len,
                        line,
                    ));
                    self.bump(len);
                    return Ok(modifier);
                }
            }

            self.lex_expr_token(&mut depth)?;
        }
    }

    /// Lex a single expression token at the cursor.
    fn lex_expr_token(&mut self, depth: &mut usize) -> SyntaxResult<()> {
        let start = self.cursor;
        let line = self.line;
        let rest = &self.source[self.cursor..];
        let c = rest.chars().next().unwrap();

        if c.is_ascii_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or_else(|| rest.len());
            let name = rest[..len].to_string();
            self.bump(len);
            self.tokens.push(Token::new(
                TokenKind::Name(name),
                start..start + len,
                line,
            ));
            return Ok(());
        }

        if c.is_ascii_digit() {
            return self.lex_number();
        }

        if c == '"' || c == '\'' {
            return self.lex_string(c);
        }

        let two = if rest.len() >= 2 && rest.is_char_boundary(2) {
            &rest[..2]
        } else {
            ""
        };
        let kind = match two {
            "**" => Some(TokenKind::Pow),
            "//" => Some(TokenKind::FloorDiv),
            "==" => Some(TokenKind::Eq),
            "!=" => Some(TokenKind::Ne),
            "<=" => Some(TokenKind::Lteq),
            ">=" => Some(TokenKind::Gteq),
            _ => None,
        };
        if let Some(kind) = kind {
            self.bump(2);
            self.tokens.push(Token::new(kind, start..start + 2, line));
            return Ok(());
        }

        let kind = match c {
            '+' => TokenKind::Add,
            '-' => TokenKind::Sub,
            '*' => TokenKind::Mul,
            '/' => TokenKind::Div,
            '%' => TokenKind::Mod,
            '~' => TokenKind::Tilde,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '=' => TokenKind::Assign,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '|' => TokenKind::Pipe,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '(' | '[' | '{' => {
                *depth += 1;
                match c {
                    '(' => TokenKind::Lparen,
                    '[' => TokenKind::Lbracket,
                    _ => TokenKind::Lbrace,
                }
            }
            ')' | ']' | '}' => {
                if *depth == 0 {
                    return Err(self.err(
                        format!("unexpected '{}'", c),
                        start..start + 1,
                    ));
                }
                *depth -= 1;
                match c {
                    ')' => TokenKind::Rparen,
                    ']' => TokenKind::Rbracket,
                    _ => TokenKind::Rbrace,
                }
            }
            _ => {
                return Err(self.err(
                    format!("unexpected character '{}'", c),
                    start..start + c.len_utf8(),
                ));
            }
        };
        self.bump(c.len_utf8());
        self.tokens
            .push(Token::new(kind, start..start + c.len_utf8(), line));
        Ok(())
    }

    fn lex_number(&mut self) -> SyntaxResult<()> {
        let start = self.cursor;
        let line = self.line;
        let bytes = self.source.as_bytes();
        let mut p = self.cursor;
        let mut float = false;

        while p < bytes.len() && bytes[p].is_ascii_digit() {
            p += 1;
        }
        if p + 1 < bytes.len()
            && bytes[p] == b'.'
            && bytes[p + 1].is_ascii_digit()
        {
            float = true;
            p += 1;
            while p < bytes.len() && bytes[p].is_ascii_digit() {
                p += 1;
            }
        }
        if p < bytes.len() && (bytes[p] == b'e' || bytes[p] == b'E') {
            let mut q = p + 1;
            if q < bytes.len() && (bytes[q] == b'+' || bytes[q] == b'-') {
                q += 1;
            }
            if q < bytes.len() && bytes[q].is_ascii_digit() {
                float = true;
                p = q;
                while p < bytes.len() && bytes[p].is_ascii_digit() {
                    p += 1;
                }
            }
        }

        let text = &self.source[start..p];
        let kind = if float {
            match text.parse::<f64>() {
                Ok(f) => TokenKind::Float(f),
                Err(_) => {
                    return Err(self.err(
                        format!("invalid float literal '{}'", text),
                        start..p,
                    ));
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => TokenKind::Integer(n),
                // Fall back to a float when the literal overflows.
                Err(_) => match text.parse::<f64>() {
                    Ok(f) => TokenKind::Float(f),
                    Err(_) => {
                        return Err(self.err(
                            format!("invalid integer literal '{}'", text),
                            start..p,
                        ));
                    }
                },
            }
        };
        self.bump(p - start);
        self.tokens.push(Token::new(kind, start..p, line));
        Ok(())
    }

    fn lex_string(&mut self, quote: char) -> SyntaxResult<()> {
        let start = self.cursor;
        let line = self.line;
        self.bump(1);
        let mut value = String::new();

        loop {
            let c = match self.peek_char() {
                Some(c) => c,
                None => {
                    return Err(self.err(
                        "unterminated string literal",
                        start..self.cursor,
                    ));
                }
            };
            if c == quote {
                self.bump(1);
                break;
            }
            if c == '\\' {
                self.bump(1);
                let esc = match self.peek_char() {
                    Some(c) => c,
                    None => {
                        return Err(self.err(
                            "unterminated string literal",
                            start..self.cursor,
                        ));
                    }
                };
                let resolved = match esc {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    '0' => '\0',
                    '\\' => '\\',
                    '\'' => '\'',
                    '"' => '"',
                    _ => {
                        return Err(self.err(
                            format!("unknown escape sequence '\\{}'", esc),
                            self.cursor - 1..self.cursor + esc.len_utf8(),
                        ));
                    }
                };
                value.push(resolved);
                self.bump(esc.len_utf8());
                continue;
            }
            value.push(c);
            self.bump(c.len_utf8());
        }

        self.tokens.push(Token::new(
            TokenKind::Str(value),
            start..self.cursor,
            line,
        ));
        Ok(())
    }

    /// Match a `raw` tag head at the cursor.
    ///
    /// Returns the offset of the raw content and the whitespace
    /// modifier on the end of the opening tag.
    fn match_raw_head(&self) -> Option<(usize, Modifier)> {
        let s = &self.source;
        let mut p = self.cursor;
        while p < s.len() && s.as_bytes()[p].is_ascii_whitespace() {
            p += 1;
        }
        if !s[p..].starts_with("raw") {
            return None;
        }
        p += 3;
        if let Some(c) = s[p..].chars().next() {
            if c.is_ascii_alphanumeric() || c == '_' {
                return None;
            }
        }
        while p < s.len() && s.as_bytes()[p].is_ascii_whitespace() {
            p += 1;
        }
        let modifier = Modifier::parse(s[p..].chars().next());
        p += modifier.len();
        if !s[p..].starts_with(self.syntax.block_end.as_str()) {
            return None;
        }
        Some((p + self.syntax.block_end.len(), modifier))
    }

    /// Lex a raw region into a single data token.
    fn lex_raw(
        &mut self,
        content_start: usize,
        open_end: Modifier,
    ) -> SyntaxResult<()> {
        let bs = self.syntax.block_start.clone();
        let be = self.syntax.block_end.clone();
        let mut search = content_start;

        loop {
            let k = match self.source[search..].find(bs.as_str()) {
                Some(i) => search + i,
                None => {
                    return Err(self.err(
                        "Missing end of raw directive",
                        self.cursor..self.source.len(),
                    ));
                }
            };
            let mut p = k + bs.len();
            let close_start = Modifier::parse(self.source[p..].chars().next());
            p += close_start.len();
            while p < self.source.len()
                && self.source.as_bytes()[p].is_ascii_whitespace()
            {
                p += 1;
            }
            if !self.source[p..].starts_with("endraw") {
                search = k + bs.len();
                continue;
            }
            p += 6;
            if let Some(c) = self.source[p..].chars().next() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    search = k + bs.len();
                    continue;
                }
            }
            while p < self.source.len()
                && self.source.as_bytes()[p].is_ascii_whitespace()
            {
                p += 1;
            }
            let close_end = Modifier::parse(self.source[p..].chars().next());
            p += close_end.len();
            if !self.source[p..].starts_with(be.as_str()) {
                search = k + bs.len();
                continue;
            }
            p += be.len();

            let mut content = &self.source[content_start..k];
            match open_end {
                Modifier::Minus => content = content.trim_start(),
                Modifier::Plus => {}
                Modifier::None => {
                    if self.syntax.trim_blocks {
                        if let Some(rest) = content.strip_prefix('\n') {
                            content = rest;
                        }
                    }
                }
            }
            let mut owned = content.to_string();
            match close_start {
                Modifier::Minus => {
                    let len = owned.trim_end().len();
                    owned.truncate(len);
                }
                Modifier::Plus => {}
                Modifier::None => {
                    if self.syntax.lstrip_blocks {
                        if let Some(i) = owned.rfind('\n') {
                            if owned[i + 1..]
                                .bytes()
                                .all(|b| b == b' ' || b == b'\t')
                            {
                                owned.truncate(i + 1);
                            }
                        }
                    }
                }
            }

            self.bump_to(content_start);
            if !owned.is_empty() {
                let value = match self.syntax.newline {
                    Newline::Lf => owned,
                    nl => owned.replace('\n', nl.as_str()),
                };
                let line = self.line;
                self.tokens.push(Token::new(
                    TokenKind::Data(value),
                    content_start..k,
                    line,
                ));
            }
            self.bump_to(p);
            self.lead = self.block_lead(close_end);
            return Ok(());
        }
    }

    /// Swallow a comment; nothing is emitted.
    fn lex_comment(&mut self) -> SyntaxResult<()> {
        let ce = &self.syntax.comment_end;
        match self.source[self.cursor..].find(ce.as_str()) {
            None => Err(self.err(
                "Missing end of comment tag",
                self.cursor..self.source.len(),
            )),
            Some(i) => {
                let j = self.cursor + i;
                let modifier = if j > self.cursor {
                    match self.source.as_bytes()[j - 1] {
                        b'-' => Modifier::Minus,
                        b'+' => Modifier::Plus,
                        _ => Modifier::None,
                    }
                } else {
                    Modifier::None
                };
                self.bump_to(j + ce.len());
                self.lead = self.block_lead(modifier);
                Ok(())
            }
        }
    }

    fn at_line_start(&self, pos: usize) -> bool {
        pos == 0 || self.source.as_bytes()[pos - 1] == b'\n'
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.cursor..].chars().next()
    }

    fn bump(&mut self, n: usize) {
        let end = self.cursor + n;
        self.bump_to(end);
    }

    fn bump_to(&mut self, end: usize) {
        debug_assert!(end >= self.cursor);
        self.line += count_newlines(&self.source[self.cursor..end]);
        self.cursor = end;
    }

    fn err(
        &self,
        message: impl Into<String>,
        span: Range<usize>,
    ) -> SyntaxError {
        SyntaxError::new(message, &self.file_name, self.line, span, &self.source)
    }
}

fn count_newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// Collect the source into a vector of tokens using the given syntax.
pub fn collect(
    source: &str,
    syntax: &Syntax,
    file_name: Option<&str>,
) -> SyntaxResult<Vec<Token>> {
    Lexer::new(source, syntax, file_name).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let syntax = Syntax::default();
        collect(source, &syntax, None)
            .unwrap()
            .into_iter()
            .map(|t| t.into_kind())
            .collect()
    }

    fn kinds(source: &str, syntax: &Syntax) -> Vec<TokenKind> {
        collect(source, syntax, None)
            .unwrap()
            .into_iter()
            .map(|t| t.into_kind())
            .collect()
    }

    fn data(s: &str) -> TokenKind {
        TokenKind::Data(s.to_string())
    }

    fn name(s: &str) -> TokenKind {
        TokenKind::Name(s.to_string())
    }

    #[test]
    fn lex_empty() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn lex_data_only() {
        assert_eq!(
            lex("lorem ipsum"),
            vec![data("lorem ipsum"), TokenKind::Eof]
        );
    }

    #[test]
    fn lex_variable() {
        assert_eq!(
            lex("a {{ foo.bar }} b"),
            vec![
                data("a "),
                TokenKind::VariableStart,
                name("foo"),
                TokenKind::Dot,
                name("bar"),
                TokenKind::VariableEnd,
                data(" b"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_block_and_literals() {
        assert_eq!(
            lex("{% if x == 1.5 %}"),
            vec![
                TokenKind::BlockStart,
                name("if"),
                name("x"),
                TokenKind::Eq,
                TokenKind::Float(1.5),
                TokenKind::BlockEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(
            lex(r#"{{ "a\n\"b" }}"#),
            vec![
                TokenKind::VariableStart,
                TokenKind::Str("a\n\"b".to_string()),
                TokenKind::VariableEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_unknown_escape_errors() {
        let syntax = Syntax::default();
        let err = collect(r#"{{ "a\qb" }}"#, &syntax, None).unwrap_err();
        assert!(err.to_string().contains("unknown escape sequence"));
    }

    #[test]
    fn lex_unterminated_string_errors() {
        let syntax = Syntax::default();
        let err = collect(r#"{{ "abc }}"#, &syntax, None).unwrap_err();
        assert!(err.to_string().contains("unterminated string literal"));
    }

    #[test]
    fn lex_nested_braces_in_variable() {
        assert_eq!(
            lex("{{ {'a': 1} }}"),
            vec![
                TokenKind::VariableStart,
                TokenKind::Lbrace,
                TokenKind::Str("a".to_string()),
                TokenKind::Colon,
                TokenKind::Integer(1),
                TokenKind::Rbrace,
                TokenKind::VariableEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_trim_markers() {
        assert_eq!(
            lex("a \n{{- 1 -}}\n b"),
            vec![
                data("a"),
                TokenKind::VariableStart,
                TokenKind::Integer(1),
                TokenKind::VariableEnd,
                data("b"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_trim_blocks_strips_one_newline() {
        let syntax = Syntax {
            trim_blocks: true,
            ..Default::default()
        };
        let tokens = kinds("{% if x %}\n\ny{% endif %}", &syntax);
        assert!(tokens.contains(&data("\ny")));
    }

    #[test]
    fn lex_lstrip_blocks() {
        let syntax = Syntax {
            lstrip_blocks: true,
            ..Default::default()
        };
        let tokens = kinds("x\n    {% if y %}{% endif %}", &syntax);
        assert_eq!(tokens[0], data("x\n"));
    }

    #[test]
    fn lex_comment_swallowed() {
        assert_eq!(
            lex("a{# a comment #}b"),
            vec![data("a"), data("b"), TokenKind::Eof],
        );
    }

    #[test]
    fn lex_raw_block() {
        assert_eq!(
            lex("a{% raw %}{{ not lexed }}{% endraw %}b"),
            vec![
                data("a"),
                data("{{ not lexed }}"),
                data("b"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_raw_unterminated_errors() {
        let syntax = Syntax::default();
        let err = collect("{% raw %}...", &syntax, None).unwrap_err();
        assert!(err.to_string().contains("Missing end of raw directive"));
    }

    #[test]
    fn lex_custom_delimiters() {
        let syntax = Syntax {
            block_start: "<?".to_string(),
            block_end: "?>".to_string(),
            variable_start: "<?=".to_string(),
            variable_end: "?>".to_string(),
            comment_start: "<!--".to_string(),
            comment_end: "-->".to_string(),
            ..Default::default()
        };
        let tokens = kinds(
            "<!-- c --><? for item in seq -?>\n    <?= item ?>\n<?- endfor ?>",
            &syntax,
        );
        assert_eq!(
            tokens,
            vec![
                TokenKind::BlockStart,
                name("for"),
                name("item"),
                name("in"),
                name("seq"),
                TokenKind::BlockEnd,
                TokenKind::VariableStart,
                name("item"),
                TokenKind::VariableEnd,
                TokenKind::BlockStart,
                name("endfor"),
                TokenKind::BlockEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_line_statement() {
        let syntax = Syntax {
            line_statement_prefix: Some("#".to_string()),
            ..Default::default()
        };
        let tokens = kinds("# for x in seq\nbody\n# endfor\n", &syntax);
        assert_eq!(
            tokens,
            vec![
                TokenKind::LineStatementStart,
                name("for"),
                name("x"),
                name("in"),
                name("seq"),
                TokenKind::LineStatementEnd,
                data("body\n"),
                TokenKind::LineStatementStart,
                name("endfor"),
                TokenKind::LineStatementEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_line_comment() {
        let syntax = Syntax {
            line_comment_prefix: Some("##".to_string()),
            ..Default::default()
        };
        let tokens = kinds("a\n## note\nb", &syntax);
        assert_eq!(tokens, vec![data("a\n\nb"), TokenKind::Eof]);
    }

    #[test]
    fn lex_trailing_newline_policy() {
        let keep = Syntax {
            keep_trailing_newline: true,
            ..Default::default()
        };
        assert_eq!(kinds("x\n", &keep), vec![data("x\n"), TokenKind::Eof]);
        assert_eq!(lex("x\n"), vec![data("x"), TokenKind::Eof]);
    }
}
