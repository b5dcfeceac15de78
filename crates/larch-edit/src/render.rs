//! Rendering values and traversals into literal expression tokens.

use larch_syntax::ast::{Traversal, TraversalStep};
use larch_syntax::TokenKind;
use larch_value::Value;

use crate::error::RenderError;
use crate::tokens::{self, Tokens};

/// Render a value as a literal expression token run.
///
/// Objects render multi-line with two-space indentation per level; lists
/// render inline. Strings are escaped so that reparsing the output yields
/// the same text.
pub fn tokens_for_value(value: &Value) -> Result<Tokens, RenderError> {
    let mut out = Tokens::new();
    append_value(&mut out, value, 0)?;
    Ok(out)
}

fn append_value(out: &mut Tokens, value: &Value, indent: u32) -> Result<(), RenderError> {
    match value {
        Value::Null => out.push(tokens::ident("null", 0)),
        Value::Bool(true) => out.push(tokens::ident("true", 0)),
        Value::Bool(false) => out.push(tokens::ident("false", 0)),
        Value::Number(num) => {
            if !num.is_finite() {
                return Err(RenderError::cannot_render(
                    "number has no finite decimal representation",
                ));
            }
            out.push(tokens::synthetic(
                TokenKind::Number,
                num.to_string().into_bytes(),
                0,
            ));
        }
        Value::String(text) => append_quoted_string(out, text, 0),
        Value::List(items) => {
            out.push(tokens::synthetic(TokenKind::OBrack, b"[".to_vec(), 0));
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(tokens::synthetic(TokenKind::Comma, b",".to_vec(), 0));
                }
                let mark = out.len();
                append_value(out, item, indent)?;
                if i > 0 {
                    out[mark].spaces_before = 1;
                }
            }
            out.push(tokens::synthetic(TokenKind::CBrack, b"]".to_vec(), 0));
        }
        Value::Object(entries) => {
            out.push(tokens::synthetic(TokenKind::OBrace, b"{".to_vec(), 0));
            out.push(tokens::newline());
            for (key, entry) in entries {
                if is_identifier(key) {
                    out.push(tokens::ident(key, indent + 2));
                } else {
                    append_quoted_string(out, key, indent + 2);
                }
                out.push(tokens::equals(1));
                let mark = out.len();
                append_value(out, entry, indent + 2)?;
                out[mark].spaces_before = 1;
                out.push(tokens::newline());
            }
            out.push(tokens::synthetic(TokenKind::CBrace, b"}".to_vec(), indent));
        }
    }
    Ok(())
}

/// Render a reference path. Adjacent traversal tokens carry no spacing.
pub fn tokens_for_traversal(traversal: &Traversal) -> Tokens {
    let mut out = Tokens::new();
    out.push(tokens::ident(&traversal.root, 0));
    for step in &traversal.steps {
        match step {
            TraversalStep::Attr { name, .. } => {
                out.push(tokens::synthetic(TokenKind::Dot, b".".to_vec(), 0));
                out.push(tokens::ident(name, 0));
            }
            TraversalStep::Index { value, .. } => {
                out.push(tokens::synthetic(TokenKind::OBrack, b"[".to_vec(), 0));
                out.push(tokens::synthetic(
                    TokenKind::Number,
                    value.to_string().into_bytes(),
                    0,
                ));
                out.push(tokens::synthetic(TokenKind::CBrack, b"]".to_vec(), 0));
            }
        }
    }
    out
}

/// The token run for a quoted block label: one leading space, then the
/// quoted string.
pub(crate) fn quoted_label_tokens(label: &str, spaces_before: u32) -> Tokens {
    let mut out = Tokens::new();
    append_quoted_string(&mut out, label, spaces_before);
    out
}

fn append_quoted_string(out: &mut Tokens, text: &str, spaces_before: u32) {
    out.push(tokens::synthetic(
        TokenKind::OQuote,
        b"\"".to_vec(),
        spaces_before,
    ));
    let escaped = escape_string(text);
    if !escaped.is_empty() {
        out.push(tokens::synthetic(TokenKind::QuotedLit, escaped, 0));
    }
    out.push(tokens::synthetic(TokenKind::CQuote, b"\"".to_vec(), 0));
}

/// Escape string content for a quoted literal. Besides the usual character
/// escapes, `${` and `%{` become their doubled forms so the output does not
/// reparse as a template sequence.
fn escape_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    for c in text.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\r' => out.extend_from_slice(b"\\r"),
            '$' | '%' if bytes.get(i + 1) == Some(&b'{') => {
                out.push(c as u8);
                out.push(c as u8);
            }
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
        i += c.len_utf8();
    }
    out
}

/// Whether a key can be written bare.
fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '-' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use larch_syntax::Pos;
    use larch_value::Number;

    fn rendered(value: &Value) -> String {
        String::from_utf8(tokens_for_value(value).unwrap().bytes()).unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(rendered(&Value::Null), "null");
        assert_eq!(rendered(&Value::Bool(true)), "true");
        assert_eq!(rendered(&Value::Bool(false)), "false");
        assert_eq!(rendered(&Value::int(42)), "42");
        assert_eq!(rendered(&Value::float(1.5)), "1.5");
        assert_eq!(rendered(&Value::float(10.0)), "10");
        assert_eq!(rendered(&Value::string("hi")), "\"hi\"");
        assert_eq!(rendered(&Value::string("")), "\"\"");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(rendered(&Value::string("a\"b")), r#""a\"b""#);
        assert_eq!(rendered(&Value::string("a\\b")), r#""a\\b""#);
        assert_eq!(rendered(&Value::string("a\nb")), r#""a\nb""#);
        assert_eq!(rendered(&Value::string("a\tb")), r#""a\tb""#);
        assert_eq!(rendered(&Value::string("\u{1}")), r#""\u0001""#);
        assert_eq!(rendered(&Value::string("${x}")), r#""$${x}""#);
        assert_eq!(rendered(&Value::string("%{x}")), r#""%%{x}""#);
        assert_eq!(rendered(&Value::string("caf\u{e9}")), "\"caf\u{e9}\"");
    }

    #[test]
    fn test_list() {
        assert_eq!(rendered(&Value::list([])), "[]");
        assert_eq!(
            rendered(&Value::list([Value::int(1), Value::int(2), Value::int(3)])),
            "[1, 2, 3]"
        );
        assert_eq!(
            rendered(&Value::list([Value::string("a"), Value::string("b")])),
            "[\"a\", \"b\"]"
        );
    }

    #[test]
    fn test_object_multiline() {
        let obj = Value::object([
            ("name".to_string(), Value::string("larch")),
            ("the key".to_string(), Value::int(2)),
        ]);
        assert_eq!(rendered(&obj), "{\n  name = \"larch\"\n  \"the key\" = 2\n}");
    }

    #[test]
    fn test_nested_object_indents() {
        let obj = Value::object([(
            "outer".to_string(),
            Value::object([("inner".to_string(), Value::int(1))]),
        )]);
        assert_eq!(rendered(&obj), "{\n  outer = {\n    inner = 1\n  }\n}");
    }

    #[test]
    fn test_non_finite_fails() {
        let err = tokens_for_value(&Value::Number(Number::Float(f64::NAN))).unwrap_err();
        assert!(matches!(err, RenderError::CannotRender { .. }));
    }

    #[test]
    fn test_traversal() {
        let (trav, diags) =
            larch_syntax::parse_traversal_abs(b"a.b[0].c", "t", Pos::start());
        assert!(!diags.has_errors());
        let out = tokens_for_traversal(&trav);
        assert_eq!(out.bytes(), b"a.b[0].c");
    }

    #[test]
    fn test_rendered_value_reparses() {
        let values = [
            Value::string("say \"hi\" to ${who}"),
            Value::list([Value::int(1), Value::string("two")]),
            Value::object([("a".to_string(), Value::Bool(true))]),
        ];
        for value in &values {
            let mut src = b"x = ".to_vec();
            src.extend(tokens_for_value(value).unwrap().bytes());
            src.push(b'\n');
            let (_, diags) = larch_syntax::parse(&src, "t", Pos::start());
            assert!(!diags.has_errors(), "reparse of {:?}: {}", value, diags);
        }
    }
}
