//! Lossless reading, editing, and writing of Larch configuration files.
//!
//! A [`File`] produced by [`parse_config`] owns every byte of its source:
//! each token, punctuation and comments and whitespace counts included,
//! lands in exactly one node of a physical tree. Serializing an untouched file
//! reproduces the input byte for byte; edits splice token runs in and out of
//! the tree and leave the rest alone, so the output differs from the input
//! only where something changed.
//!
//! ```
//! use larch_edit::parse_config;
//! use larch_value::Value;
//! use larch_syntax::Pos;
//!
//! let src = b"service \"web\" {\n  port = 8080\n}\n";
//! let (mut file, diags) = parse_config(src, "main.lch", Pos::start());
//! assert!(!diags.has_errors());
//!
//! let mut body = file.body_mut();
//! let mut service = body.get_block_mut("service", &["web"]).unwrap();
//! service
//!     .body_mut()
//!     .set_attribute_value("port", &Value::int(9090))
//!     .unwrap();
//!
//! assert_eq!(
//!     file.bytes(),
//!     b"service \"web\" {\n  port = 9090\n}\n"
//! );
//! ```
//!
//! Editing happens through [`Body`]/[`BodyMut`] handles; after any edit the
//! next serialization runs one formatter pass over the whole token stream to
//! settle spacing, equals-sign alignment, and indentation.

use std::io;

mod attribute;
mod block;
mod body;
mod builder;
mod error;
mod format;
mod render;
mod tokens;
mod tree;

pub use attribute::Attribute;
pub use block::{Block, BlockMut};
pub use body::{Body, BodyMut};
pub use error::RenderError;
pub use format::format;
pub use render::{tokens_for_traversal, tokens_for_value};
pub use tokens::Tokens;
pub use tree::{NodeId, QuotedString};

// The parts of the syntax and value layers that appear in this crate's API.
pub use larch_syntax::{Diagnostic, Diagnostics, Pos, Severity, Span, Token, TokenKind};
pub use larch_value::{Number, Value};

/// Parse a configuration file into an editable, lossless [`File`].
///
/// Always returns a best-effort file: regions the parser could not
/// understand are kept as unstructured token runs, so even a file with
/// errors serializes back to its source. `start` positions diagnostics for
/// buffers embedded in larger documents; pass [`Pos::start`] otherwise.
pub fn parse_config(src: &[u8], filename: &str, start: Pos) -> (File, Diagnostics) {
    let (tokens, mut diags) = larch_syntax::scan(src, start);
    let (ast_file, parse_diags) = larch_syntax::parse_tokens(&tokens, filename);
    diags.extend(parse_diags);
    let (tree, root, eof) = builder::build_tree(&tokens, &ast_file.body);
    (
        File {
            filename: filename.to_string(),
            tree,
            root,
            eof,
        },
        diags,
    )
}

/// An editable configuration file.
#[derive(Debug, Clone)]
pub struct File {
    filename: String,
    tree: tree::Tree,
    root: NodeId,
    eof: Tokens,
}

impl File {
    /// The name the file was parsed under.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// A read handle on the top-level body.
    pub fn body(&self) -> Body<'_> {
        Body {
            tree: &self.tree,
            id: self.root,
        }
    }

    /// A write handle on the top-level body.
    pub fn body_mut(&mut self) -> BodyMut<'_> {
        BodyMut {
            tree: &mut self.tree,
            id: self.root,
        }
    }

    /// The file's full token run, exactly as the tree holds it.
    pub fn build_tokens(&self) -> Tokens {
        let mut out = Tokens::new();
        self.tree.build_tokens_into(self.root, &mut out);
        for tok in &self.eof {
            out.push(tok.clone());
        }
        out
    }

    /// Serialize the file.
    ///
    /// An unedited file reproduces its source byte for byte. Once any edit
    /// has occurred, one formatter pass settles spacing before the bytes
    /// are produced.
    pub fn bytes(&self) -> Vec<u8> {
        let mut tokens = self.build_tokens();
        if self.tree.dirty {
            format::format(&mut tokens);
        }
        tokens.bytes()
    }

    /// Write the serialized file to a sink, returning the byte count.
    pub fn write_to<W: io::Write>(&self, w: &mut W) -> io::Result<usize> {
        let bytes = self.bytes();
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_bytes() {
        let srcs: &[&str] = &[
            "",
            "a = 1\n",
            "a   =   1\n",
            "# leading comment\n\na = 1 # trailing\n",
            "service \"web\" {\n  port = 8080\n\n  # nested comment\n  debug = true\n}\n",
            "text = <<-EOT\n    indented ${var.x}\n  EOT\n",
            "weird=1\nlist = [ 1 ,2,  3 ]\n",
            "bar {}\n",
            "a = 1\r\nb = 2\r\n",
            "trailing = 1\n   ",
        ];
        for src in srcs {
            let (file, diags) = parse_config(src.as_bytes(), "t.lch", Pos::start());
            assert!(!diags.has_errors(), "diags for {:?}: {}", src, diags);
            assert_eq!(
                String::from_utf8_lossy(&file.bytes()),
                *src,
                "round-trip failed"
            );
        }
    }

    #[test]
    fn test_roundtrip_with_errors_still_lossless() {
        let srcs: &[&str] = &["a = \nb = 2\n", "??\nx = 1\n", "block {\n  ???\n}\n"];
        for src in srcs {
            let (file, diags) = parse_config(src.as_bytes(), "t.lch", Pos::start());
            assert!(diags.has_errors(), "expected errors for {:?}", src);
            assert_eq!(String::from_utf8_lossy(&file.bytes()), *src);
        }
    }

    #[test]
    fn test_write_to_matches_bytes() {
        let (file, _) = parse_config(b"a = 1\n", "t.lch", Pos::start());
        let mut out = Vec::new();
        let n = file.write_to(&mut out).unwrap();
        assert_eq!(n, 6);
        assert_eq!(out, b"a = 1\n");
    }

    #[test]
    fn test_filename_kept() {
        let (file, _) = parse_config(b"", "configs/app.lch", Pos::start());
        assert_eq!(file.filename(), "configs/app.lch");
    }
}
