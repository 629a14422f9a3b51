//! Escape functions and the safe string marker.
//!
//! The default is to escape for HTML content using `html`.
use serde_json::Value;

/// Type for escape functions.
pub type EscapeFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Escape for HTML output.
pub fn html(s: &str) -> String {
    let mut output = String::new();
    for c in s.chars() {
        match c {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '&' => output.push_str("&amp;"),
            '\'' => output.push_str("&#x27;"),
            _ => output.push(c),
        }
    }
    output
}

/// Do not escape output.
pub fn noop(s: &str) -> String {
    s.to_owned()
}

/// Key used to smuggle safe strings through the value model.
///
/// A string wrapped as markup is carried as a single entry object so
/// that auto-escaping can recognise it and pass it through verbatim.
static MARKUP_KEY: &str = "\u{f8ff}markup";

/// Marker for strings that are already escaped and safe to emit
/// verbatim under auto-escaping.
///
/// The marker only changes how auto-escaping treats the string; for
/// every other operation (length, iteration, comparisons, membership,
/// arithmetic) the value layer resolves markup with [plain](Self::plain)
/// first so a safe string behaves exactly like the string it wraps.
pub struct Markup;

impl Markup {
    /// Wrap an already safe string.
    pub fn wrap(s: impl Into<String>) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(MARKUP_KEY.to_string(), Value::String(s.into()));
        Value::Object(map)
    }

    /// Get the safe string when the value is markup.
    pub fn unwrap(value: &Value) -> Option<&str> {
        match value {
            Value::Object(map) if map.len() == 1 => {
                map.get(MARKUP_KEY).and_then(|v| v.as_str())
            }
            _ => None,
        }
    }

    /// Determine if a value is already marked safe.
    pub fn is_markup(value: &Value) -> bool {
        Self::unwrap(value).is_some()
    }

    /// Resolve a value to its plain form.
    ///
    /// Markup yields the wrapped string value, everything else passes
    /// through untouched.
    pub fn plain(value: &Value) -> &Value {
        match value {
            Value::Object(map) if map.len() == 1 => map
                .get(MARKUP_KEY)
                .filter(|inner| inner.is_string())
                .unwrap_or(value),
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html() {
        assert_eq!(html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
    }

    #[test]
    fn markup_round_trip() {
        let v = Markup::wrap("<b>");
        assert!(Markup::is_markup(&v));
        assert_eq!(Markup::unwrap(&v), Some("<b>"));
        assert!(!Markup::is_markup(&Value::String("<b>".into())));
    }

    #[test]
    fn markup_plain_resolves_to_the_string() {
        let v = Markup::wrap("abc");
        assert_eq!(Markup::plain(&v), &Value::String("abc".into()));
        let n = Value::from(3);
        assert_eq!(Markup::plain(&n), &n);
    }
}
