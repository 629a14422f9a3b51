//! Output sinks the renderer writes template chunks to.
//!
//! Sinks receive rendered text; `write_value` is the funnel every
//! printed expression ends in, converting a template value to its
//! output form (markup unwraps, null renders empty, containers use
//! their repr).
use std::io::{Result, Write};

use serde_json::Value;

use crate::value;

/// Trait for destinations that rendered output is written to.
pub trait Output {
    /// Write a chunk of rendered text.
    fn write_str(&mut self, s: &str) -> Result<()>;

    /// Write a template value in its output form.
    fn write_value(&mut self, value: &Value) -> Result<()> {
        let s = value::output_string(value);
        if s.is_empty() {
            return Ok(());
        }
        self.write_str(&s)
    }
}

/// Sink that streams rendered output to an `io::Write` destination.
pub struct Writer<W: Write> {
    writer: W,
}

impl<W: Write> Writer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Flush and take back the underlying writer.
    pub fn into_inner(mut self) -> W {
        let _ = self.writer.flush();
        self.writer
    }
}

impl<W: Write> Output for Writer<W> {
    fn write_str(&mut self, s: &str) -> Result<()> {
        self.writer.write_all(s.as_bytes())
    }
}

/// Sink that buffers rendered output into a string.
///
/// Every capture the renderer performs internally goes through one of
/// these: set blocks, filter blocks, macro bodies, `caller()` and
/// `super()` all render into a string buffer first.
#[derive(Default)]
pub struct StringOutput {
    value: String,
}

impl StringOutput {
    pub fn new() -> Self {
        Default::default()
    }

    /// Take the buffered output.
    pub fn into_string(self) -> String {
        self.value
    }
}

impl Output for StringOutput {
    fn write_str(&mut self, s: &str) -> Result<()> {
        self.value.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::Markup;
    use serde_json::json;

    #[test]
    fn write_value_output_forms() {
        let mut out = StringOutput::new();
        out.write_value(&json!(null)).unwrap();
        out.write_value(&json!("a")).unwrap();
        out.write_value(&json!(2)).unwrap();
        out.write_value(&Markup::wrap("<b>")).unwrap();
        out.write_value(&json!([1, 2])).unwrap();
        assert_eq!(out.into_string(), "a2<b>[1, 2]");
    }
}
