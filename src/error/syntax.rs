//! Errors generated when compiling templates.
use std::fmt;
use std::ops::Range;

use unicode_width::UnicodeWidthStr;

/// Error generated by the lexer or the parser.
///
/// Carries the template file name, the 1-based line, the byte span of
/// the offending region and a copy of the source so that the `Debug`
/// implementation can render a code snippet:
///
/// ```ignore
/// error: Encountered unknown tag 'endif'.
///  --> unknown:1:22
///   |
/// 1 | {% for item in seq %}...{% endif %}
///   | ---------------------^
/// ```
pub struct SyntaxError {
    message: String,
    file_name: String,
    line: usize,
    span: Range<usize>,
    source: String,
}

impl SyntaxError {
    pub fn new(
        message: impl Into<String>,
        file_name: &str,
        line: usize,
        span: Range<usize>,
        source: &str,
    ) -> Self {
        Self {
            message: message.into(),
            file_name: file_name.to_string(),
            line,
            span,
            source: source.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// 1-based line of the error.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Byte span of the offending region in the source.
    pub fn span(&self) -> &Range<usize> {
        &self.span
    }

    fn line_bounds(&self) -> (usize, usize) {
        let pos = self.span.start.min(self.source.len());
        let start = self.source[..pos]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = self.source[pos..]
            .find('\n')
            .map(|i| pos + i)
            .unwrap_or_else(|| self.source.len());
        (start, end)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.line_bounds();
        let pos = self.span.start.min(self.source.len());
        let line_slice = &self.source[start..end];

        let line_prefix = format!(" {} | ", self.line);
        let line_padding = " ".repeat(line_prefix.len() - 3);

        let cols = UnicodeWidthStr::width(&self.source[start..pos]) + 1;
        let file_info = format!("{}:{}:{}", self.file_name, self.line, cols);

        let err_pointer = if cols > 1 {
            format!("{}^", "-".repeat(cols - 1))
        } else {
            "^".to_string()
        };

        writeln!(f, "error: {}", self.message)?;
        writeln!(f, "{}--> {}", line_padding, file_info)?;
        writeln!(f, "{} |", line_padding)?;
        writeln!(f, "{}{}", line_prefix, line_slice)?;
        write!(f, "{} | {}", line_padding, err_pointer)?;
        Ok(())
    }
}

impl PartialEq for SyntaxError {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
            && self.line == other.line
            && self.span == other.span
    }
}

impl Eq for SyntaxError {}

impl std::error::Error for SyntaxError {}

/// Compile-time semantic error such as a reserved loop target or a
/// hyphenated tag name.
#[derive(Debug, PartialEq, Eq)]
pub struct AssertionError {
    message: String,
    file_name: String,
    line: usize,
}

impl AssertionError {
    pub fn new(
        message: impl Into<String>,
        file_name: &str,
        line: usize,
    ) -> Self {
        Self {
            message: message.into(),
            file_name: file_name.to_string(),
            line,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AssertionError {}
