//! Owned token runs and synthetic token construction.

use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

use larch_syntax::{Pos, Span, Token, TokenKind};

/// An owned, ordered run of tokens.
///
/// Serializing a run means emitting, for each token, its `spaces_before`
/// spaces and then its bytes. A run carved out of a parse therefore
/// reproduces its region of the source exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tokens(Vec<Token>);

impl Tokens {
    /// An empty run.
    pub fn new() -> Self {
        Tokens(Vec::new())
    }

    /// The serialized form of the run.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for tok in &self.0 {
            out.extend(std::iter::repeat_n(b' ', tok.spaces_before as usize));
            out.extend_from_slice(&tok.bytes);
        }
        out
    }

    /// Write the serialized form to a sink, returning the byte count.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        let bytes = self.bytes();
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Append one token.
    pub fn push(&mut self, tok: Token) {
        self.0.push(tok);
    }

    /// Append every token of another run.
    pub fn extend(&mut self, other: Tokens) {
        self.0.extend(other.0);
    }

    /// Take the tokens out of the run.
    pub fn into_vec(self) -> Vec<Token> {
        self.0
    }
}

impl Deref for Tokens {
    type Target = [Token];

    fn deref(&self) -> &[Token] {
        &self.0
    }
}

impl DerefMut for Tokens {
    fn deref_mut(&mut self) -> &mut [Token] {
        &mut self.0
    }
}

impl From<Vec<Token>> for Tokens {
    fn from(tokens: Vec<Token>) -> Self {
        Tokens(tokens)
    }
}

impl FromIterator<Token> for Tokens {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Tokens(iter.into_iter().collect())
    }
}

impl IntoIterator for Tokens {
    type Item = Token;
    type IntoIter = std::vec::IntoIter<Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tokens {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build a token that has no source position, for text the edit engine
/// makes up itself.
pub fn synthetic(kind: TokenKind, bytes: impl Into<Vec<u8>>, spaces_before: u32) -> Token {
    Token::new(kind, bytes, spaces_before, Span::empty(Pos::start()))
}

/// A synthetic identifier token.
pub fn ident(name: &str, spaces_before: u32) -> Token {
    synthetic(TokenKind::Ident, name.as_bytes().to_vec(), spaces_before)
}

/// A synthetic `=` token.
pub fn equals(spaces_before: u32) -> Token {
    synthetic(TokenKind::Equal, b"=".to_vec(), spaces_before)
}

/// A synthetic newline token.
pub fn newline() -> Token {
    synthetic(TokenKind::Newline, b"\n".to_vec(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_applies_spacing() {
        let run: Tokens = vec![
            ident("a", 0),
            equals(1),
            synthetic(TokenKind::Number, b"1".to_vec(), 1),
            newline(),
        ]
        .into();
        assert_eq!(run.bytes(), b"a = 1\n");
    }

    #[test]
    fn test_write_to_counts_bytes() {
        let run: Tokens = vec![ident("ab", 0), newline()].into();
        let mut out = Vec::new();
        let n = run.write_to(&mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, b"ab\n");
    }
}
