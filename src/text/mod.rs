//! The textual source format and its round-trip check.
//!
//! One file holds one root control:
//!
//! ```text
//! Screen1 As screen:
//!     Fill: =RGBA(0, 0, 0, 1)
//!     OnVisible: |
//!         =Set(x, 1);
//!         Navigate(Screen2)
//!     Title: "literal, not a formula"
//!     Reset(): =Set(x, 0)
//!     Button1 As button.primary:
//!         Text: ="Go"
//! ```
//!
//! Indentation is four spaces per level. Within a control, properties come
//! first (sorted), then functions, then children in publish order. Names
//! that are not plain identifiers are single-quoted, `''` escaping a quote.

pub mod emit;
pub mod parse;
pub mod roundtrip;

use std::borrow::Cow;

use crate::error::{Result, SourceError};
use crate::ir::ControlNode;

pub use emit::{emit, write_control};
pub use parse::parse;
pub use roundtrip::RoundTripWriter;

pub const INDENT: usize = 4;

/// Whether `name` must be single-quoted to be read back.
pub fn needs_quotes(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => true,
        Some(c) if !(c.is_alphabetic() || c == '_') => true,
        Some(_) => !chars.all(|c| c.is_alphanumeric() || c == '_'),
    }
}

pub fn quote_name(name: &str) -> Cow<'_, str> {
    if needs_quotes(name) {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    } else {
        Cow::Borrowed(name)
    }
}

/// An expression-language string literal: `"..."`, with `""` for a quote.
pub fn quote_string_literal(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Inverse of [`quote_string_literal`]; `None` if `expr` is anything else.
pub fn unquote_string_literal(expr: &str) -> Option<String> {
    let inner = expr.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.next() != Some('"') {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

/// Parse `text`, re-emit it through a [`RoundTripWriter`] and fail on the
/// first character that differs.
pub fn verify_round_trip(file: &str, text: &str) -> Result<ControlNode> {
    let node = parse(file, text)?;
    let mut writer = RoundTripWriter::new(text, file, String::new());
    if write_control(&mut writer, &node, 0).is_err() {
        return Err(writer
            .take_error()
            .unwrap_or_else(|| SourceError::unsupported(file, "emitter failed")));
    }
    writer.finish()?;
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_quoting() {
        assert_eq!(quote_name("Button1"), "Button1");
        assert_eq!(quote_name("_x"), "_x");
        assert_eq!(quote_name("My Button"), "'My Button'");
        assert_eq!(quote_name("it's"), "'it''s'");
        assert_eq!(quote_name("1st"), "'1st'");
        assert_eq!(quote_name(""), "''");
    }

    #[test]
    fn string_literals() {
        let lit = quote_string_literal(r#"say "hi""#);
        assert_eq!(lit, r#""say ""hi""""#);
        assert_eq!(unquote_string_literal(&lit).as_deref(), Some(r#"say "hi""#));
        assert_eq!(unquote_string_literal("\"\"").as_deref(), Some(""));
        assert_eq!(unquote_string_literal(r#""a"b""#), None);
        assert_eq!(unquote_string_literal("Now()"), None);
    }

    #[test]
    fn verify_accepts_canonical_text() {
        let text = "Screen1 As screen:\n    Fill: =Blue\n";
        let node = verify_round_trip("Screen1.fx.yaml", text).unwrap();
        assert_eq!(node.properties["Fill"].expression, "Blue");
    }

    #[test]
    fn verify_rejects_non_canonical_text() {
        // Properties are emitted sorted, so this order cannot come back.
        let text = "Screen1 As screen:\n    Fill: =Blue\n    Color: =Red\n";
        let err = verify_round_trip("Screen1.fx.yaml", text).unwrap_err();
        match err {
            SourceError::RoundTrip(m) => {
                assert_eq!((m.line, m.column), (2, 5));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
