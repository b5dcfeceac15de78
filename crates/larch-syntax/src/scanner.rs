//! Scanner for Larch source text.
//!
//! The scanner is total: any byte sequence produces a token stream ending in
//! [`TokenKind::Eof`], with problems reported as diagnostics rather than
//! failures. Every input byte lands either in some token's bytes or in the
//! following token's `spaces_before` count, so the stream can reproduce the
//! source.

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};
use crate::trace;

/// Scan a source buffer into tokens, with `start` as the position of the
/// first byte (for diagnostics on buffers embedded in larger files).
pub fn scan(src: &[u8], start: Pos) -> (Vec<Token>, Diagnostics) {
    Scanner::new(src, start).run()
}

/// What the scanner is currently inside of.
#[derive(Debug, Clone)]
enum Mode {
    /// Ordinary structural scanning. `braces` counts `{` opened at this
    /// level, so the `}` that closes an interpolation can be told apart
    /// from the `}` of an object literal inside it.
    Body { braces: u32 },
    /// Inside a quoted template, between `OQuote` and `CQuote`.
    Template,
    /// Inside a heredoc body.
    Heredoc {
        marker: Vec<u8>,
        dedent: bool,
        line_start: bool,
    },
}

struct Scanner<'src> {
    src: &'src [u8],
    /// Byte offset into `src`.
    pos: usize,
    line: usize,
    column: usize,
    /// Byte offset of `src[0]` in the surrounding buffer.
    base_byte: usize,
    pending_spaces: u32,
    modes: Vec<Mode>,
    tokens: Vec<Token>,
    diags: Diagnostics,
}

impl<'src> Scanner<'src> {
    fn new(src: &'src [u8], start: Pos) -> Self {
        Scanner {
            src,
            pos: 0,
            line: start.line,
            column: start.column,
            base_byte: start.byte,
            pending_spaces: 0,
            modes: vec![Mode::Body { braces: 0 }],
            tokens: Vec::new(),
            diags: Diagnostics::new(),
        }
    }

    fn run(mut self) -> (Vec<Token>, Diagnostics) {
        loop {
            let in_template = matches!(self.modes.last(), Some(Mode::Template));
            let in_heredoc = matches!(self.modes.last(), Some(Mode::Heredoc { .. }));
            let done = if in_template {
                self.scan_template_part()
            } else if in_heredoc {
                self.scan_heredoc_part()
            } else {
                self.scan_body_token()
            };
            if done {
                break;
            }
        }

        let spaces = std::mem::take(&mut self.pending_spaces);
        let pos = self.here();
        self.tokens
            .push(Token::new(TokenKind::Eof, Vec::new(), spaces, Span::empty(pos)));
        (self.tokens, self.diags)
    }

    // ---- low-level cursor -------------------------------------------------

    #[inline]
    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
            byte: self.base_byte + self.pos,
        }
    }

    #[inline]
    fn at_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    #[inline]
    fn byte(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    #[inline]
    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Advance one byte, keeping line and column current. Column counts
    /// characters, so UTF-8 continuation bytes do not move it.
    fn bump(&mut self) {
        let b = self.src[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if b & 0xC0 != 0x80 {
            self.column += 1;
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    /// Decode the character at the cursor. `None` means malformed UTF-8.
    fn peek_char(&self) -> Option<(char, usize)> {
        let rest = &self.src[self.pos..];
        let first = *rest.first()?;
        if first < 0x80 {
            return Some((first as char, 1));
        }
        let width = match first {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return None,
        };
        let chunk = rest.get(..width)?;
        let s = std::str::from_utf8(chunk).ok()?;
        s.chars().next().map(|c| (c, width))
    }

    fn emit(&mut self, kind: TokenKind, start: Pos) {
        let bytes = self.src[start.byte - self.base_byte..self.pos].to_vec();
        let spaces = std::mem::take(&mut self.pending_spaces);
        let span = Span::new(start, self.here());
        trace!("token {:?} at {}: {:?}", kind, span, String::from_utf8_lossy(&bytes));
        self.tokens.push(Token::new(kind, bytes, spaces, span));
    }

    /// Emit a single-character (or n-byte ASCII) token.
    fn emit_simple(&mut self, kind: TokenKind, len: usize) {
        let start = self.here();
        self.bump_n(len);
        self.emit(kind, start);
    }

    // ---- body mode --------------------------------------------------------

    /// Scan one token in body mode. Returns true when the input is finished.
    fn scan_body_token(&mut self) -> bool {
        // Blanks fold into the next token's spaces_before.
        while matches!(self.byte(), Some(b' ' | b'\t')) {
            self.pending_spaces += 1;
            self.bump();
        }

        if self.at_eof() {
            if self.modes.len() > 1 {
                let pos = self.here();
                self.diags.push(
                    Diagnostic::error("Unterminated template interpolation")
                        .with_detail("The ${ sequence is never closed by a matching \"}\".")
                        .with_subject(Span::empty(pos)),
                );
            }
            return true;
        }

        let b = self.byte().unwrap();
        match b {
            b'\n' => {
                self.pending_spaces = 0;
                self.emit_simple(TokenKind::Newline, 1);
            }
            b'\r' if self.byte_at(1) == Some(b'\n') => {
                self.pending_spaces = 0;
                self.emit_simple(TokenKind::Newline, 2);
            }
            b'#' => self.scan_line_comment(1),
            b'/' if self.byte_at(1) == Some(b'/') => self.scan_line_comment(2),
            b'/' if self.byte_at(1) == Some(b'*') => self.scan_block_comment(),
            b'"' => {
                self.emit_simple(TokenKind::OQuote, 1);
                self.modes.push(Mode::Template);
            }
            b'<' if self.byte_at(1) == Some(b'<') => self.scan_heredoc_intro(),
            b'0'..=b'9' => self.scan_number(),
            b'{' => {
                if let Some(Mode::Body { braces }) = self.modes.last_mut() {
                    *braces += 1;
                }
                self.emit_simple(TokenKind::OBrace, 1);
            }
            b'}' => self.scan_close_brace(),
            b'(' => self.emit_simple(TokenKind::OParen, 1),
            b')' => self.emit_simple(TokenKind::CParen, 1),
            b'[' => self.emit_simple(TokenKind::OBrack, 1),
            b']' => self.emit_simple(TokenKind::CBrack, 1),
            b',' => self.emit_simple(TokenKind::Comma, 1),
            b'.' => self.emit_simple(TokenKind::Dot, 1),
            b':' => self.emit_simple(TokenKind::Colon, 1),
            b'?' => self.emit_simple(TokenKind::Question, 1),
            b'+' => self.emit_simple(TokenKind::Plus, 1),
            b'-' => self.emit_simple(TokenKind::Minus, 1),
            b'*' => self.emit_simple(TokenKind::Star, 1),
            b'/' => self.emit_simple(TokenKind::Slash, 1),
            b'%' => self.emit_simple(TokenKind::Percent, 1),
            b'=' if self.byte_at(1) == Some(b'=') => self.emit_simple(TokenKind::EqualEqual, 2),
            b'=' => self.emit_simple(TokenKind::Equal, 1),
            b'!' if self.byte_at(1) == Some(b'=') => self.emit_simple(TokenKind::NotEqual, 2),
            b'!' => self.emit_simple(TokenKind::Bang, 1),
            b'<' if self.byte_at(1) == Some(b'=') => self.emit_simple(TokenKind::LessEqual, 2),
            b'<' => self.emit_simple(TokenKind::LessThan, 1),
            b'>' if self.byte_at(1) == Some(b'=') => self.emit_simple(TokenKind::GreaterEqual, 2),
            b'>' => self.emit_simple(TokenKind::GreaterThan, 1),
            b'&' if self.byte_at(1) == Some(b'&') => self.emit_simple(TokenKind::And, 2),
            b'|' if self.byte_at(1) == Some(b'|') => self.emit_simple(TokenKind::Or, 2),
            _ => self.scan_word_or_invalid(),
        }
        false
    }

    fn scan_close_brace(&mut self) {
        let open_here = matches!(self.modes.last(), Some(Mode::Body { braces }) if *braces > 0);
        if open_here {
            if let Some(Mode::Body { braces }) = self.modes.last_mut() {
                *braces -= 1;
            }
            self.emit_simple(TokenKind::CBrace, 1);
        } else if self.modes.len() > 1 {
            // This brace closes the interpolation or control sequence whose
            // body we were scanning.
            self.modes.pop();
            self.emit_simple(TokenKind::TemplateSeqEnd, 1);
        } else {
            self.emit_simple(TokenKind::CBrace, 1);
        }
    }

    fn scan_word_or_invalid(&mut self) {
        let start = self.here();
        match self.peek_char() {
            Some((c, width)) if c == '_' || c.is_alphabetic() => {
                self.bump_n(width);
                while let Some((c, width)) = self.peek_char() {
                    if c == '_' || c == '-' || c.is_alphanumeric() {
                        self.bump_n(width);
                    } else {
                        break;
                    }
                }
                self.emit(TokenKind::Ident, start);
            }
            Some((c, width)) => {
                self.bump_n(width);
                self.emit(TokenKind::Invalid, start);
                let span = self.tokens.last().expect("just emitted").span;
                self.diags.push(
                    Diagnostic::error("Invalid character")
                        .with_detail(format!(
                            "The character {:?} is not used within valid configuration syntax.",
                            c
                        ))
                        .with_subject(span),
                );
            }
            None => {
                // Malformed UTF-8: take the one offending byte and move on.
                self.bump();
                self.emit(TokenKind::Invalid, start);
                let span = self.tokens.last().expect("just emitted").span;
                self.diags.push(
                    Diagnostic::error("Invalid character encoding")
                        .with_detail("All input must be valid UTF-8 sequences.")
                        .with_subject(span),
                );
            }
        }
    }

    fn scan_number(&mut self) {
        let start = self.here();
        while matches!(self.byte(), Some(b'0'..=b'9')) {
            self.bump();
        }
        if self.byte() == Some(b'.') && matches!(self.byte_at(1), Some(b'0'..=b'9')) {
            self.bump();
            while matches!(self.byte(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.byte(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.byte_at(1), Some(b'+' | b'-')));
            if matches!(self.byte_at(1 + sign), Some(b'0'..=b'9')) {
                self.bump_n(1 + sign);
                while matches!(self.byte(), Some(b'0'..=b'9')) {
                    self.bump();
                }
            }
        }
        self.emit(TokenKind::Number, start);
    }

    /// A `#` or `//` comment through its newline. The newline belongs to the
    /// comment's bytes, so a trailing comment also terminates its line.
    fn scan_line_comment(&mut self, intro_len: usize) {
        let start = self.here();
        self.bump_n(intro_len);
        while let Some(b) = self.byte() {
            if b == b'\n' {
                self.bump();
                break;
            }
            if b == b'\r' && self.byte_at(1) == Some(b'\n') {
                self.bump_n(2);
                break;
            }
            self.bump();
        }
        self.emit(TokenKind::Comment, start);
    }

    fn scan_block_comment(&mut self) {
        let start = self.here();
        self.bump_n(2);
        loop {
            match self.byte() {
                Some(b'*') if self.byte_at(1) == Some(b'/') => {
                    self.bump_n(2);
                    break;
                }
                Some(_) => self.bump(),
                None => {
                    self.diags.push(
                        Diagnostic::error("Unterminated comment")
                            .with_detail("The /* comment is never closed by a matching */.")
                            .with_subject(Span::new(start, self.here())),
                    );
                    break;
                }
            }
        }
        self.emit(TokenKind::Comment, start);
    }

    /// `<<MARK` or `<<-MARK` plus its newline, entering heredoc mode.
    fn scan_heredoc_intro(&mut self) {
        let start = self.here();
        self.bump_n(2);
        let dedent = self.byte() == Some(b'-');
        if dedent {
            self.bump();
        }

        let marker_from = self.pos;
        while matches!(
            self.byte(),
            Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-')
        ) {
            self.bump();
        }
        let marker = self.src[marker_from..self.pos].to_vec();
        if marker.is_empty() {
            self.emit(TokenKind::Invalid, start);
            let span = self.tokens.last().expect("just emitted").span;
            self.diags.push(
                Diagnostic::error("Invalid heredoc introduction")
                    .with_detail("A heredoc marker must follow the << sequence.")
                    .with_subject(span),
            );
            return;
        }

        if self.byte() == Some(b'\r') && self.byte_at(1) == Some(b'\n') {
            self.bump_n(2);
        } else if self.byte() == Some(b'\n') {
            self.bump();
        } else {
            self.diags.push(
                Diagnostic::error("Invalid heredoc introduction")
                    .with_detail("The heredoc marker must be followed immediately by a newline.")
                    .with_subject(Span::new(start, self.here())),
            );
        }

        self.emit(TokenKind::OHeredoc, start);
        self.modes.push(Mode::Heredoc {
            marker,
            dedent,
            line_start: true,
        });
    }

    // ---- template mode ----------------------------------------------------

    /// Scan the next part of a quoted template. Returns true at hard EOF.
    fn scan_template_part(&mut self) -> bool {
        let start = self.here();
        loop {
            match self.byte() {
                None => {
                    self.flush_literal(TokenKind::QuotedLit, start);
                    self.diags.push(
                        Diagnostic::error("Unterminated string literal")
                            .with_detail("The string is never closed by a matching quote.")
                            .with_subject(Span::empty(self.here())),
                    );
                    self.modes.pop();
                    return false;
                }
                Some(b'"') => {
                    self.flush_literal(TokenKind::QuotedLit, start);
                    self.emit_simple(TokenKind::CQuote, 1);
                    self.modes.pop();
                    return false;
                }
                Some(b'\\') => {
                    // Escape sequences pass through verbatim; interpreting
                    // them is the template parser's business.
                    self.bump();
                    if !self.at_eof() {
                        self.bump();
                    }
                }
                Some(b'\n') => {
                    self.flush_literal(TokenKind::QuotedLit, start);
                    self.diags.push(
                        Diagnostic::error("Unterminated string literal")
                            .with_detail("Quoted strings may not span lines.")
                            .with_subject(Span::empty(self.here())),
                    );
                    self.modes.pop();
                    return false;
                }
                Some(b'\r') if self.byte_at(1) == Some(b'\n') => {
                    self.flush_literal(TokenKind::QuotedLit, start);
                    self.diags.push(
                        Diagnostic::error("Unterminated string literal")
                            .with_detail("Quoted strings may not span lines.")
                            .with_subject(Span::empty(self.here())),
                    );
                    self.modes.pop();
                    return false;
                }
                Some(b'$') if self.byte_at(1) == Some(b'{') => {
                    self.flush_literal(TokenKind::QuotedLit, start);
                    self.emit_simple(TokenKind::TemplateInterp, 2);
                    self.modes.push(Mode::Body { braces: 0 });
                    return false;
                }
                Some(b'$') if self.byte_at(1) == Some(b'$') && self.byte_at(2) == Some(b'{') => {
                    // `$${` is the literal escape for `${`.
                    self.bump_n(3);
                }
                Some(b'%') if self.byte_at(1) == Some(b'{') => {
                    self.flush_literal(TokenKind::QuotedLit, start);
                    self.emit_simple(TokenKind::TemplateControl, 2);
                    self.modes.push(Mode::Body { braces: 0 });
                    return false;
                }
                Some(b'%') if self.byte_at(1) == Some(b'%') && self.byte_at(2) == Some(b'{') => {
                    self.bump_n(3);
                }
                Some(_) => self.bump(),
            }
        }
    }

    /// Emit a literal token for the bytes consumed since `start`, if any.
    fn flush_literal(&mut self, kind: TokenKind, start: Pos) {
        if self.base_byte + self.pos > start.byte {
            self.emit(kind, start);
        }
    }

    // ---- heredoc mode -----------------------------------------------------

    /// Scan the next part of a heredoc body. Returns true at hard EOF.
    fn scan_heredoc_part(&mut self) -> bool {
        let (marker, dedent, line_start) = match self.modes.last() {
            Some(Mode::Heredoc {
                marker,
                dedent,
                line_start,
            }) => (marker.clone(), *dedent, *line_start),
            _ => unreachable!("heredoc scan outside heredoc mode"),
        };

        if self.at_eof() {
            self.diags.push(
                Diagnostic::error("Unterminated heredoc")
                    .with_detail("The heredoc is never closed by its marker on a line of its own.")
                    .with_subject(Span::empty(self.here())),
            );
            self.modes.pop();
            return false;
        }

        if line_start && self.at_heredoc_terminator(&marker, dedent) {
            // Leading blanks (allowed only for <<-) become spaces_before.
            while matches!(self.byte(), Some(b' ' | b'\t')) {
                self.pending_spaces += 1;
                self.bump();
            }
            let start = self.here();
            self.bump_n(marker.len());
            self.emit(TokenKind::CHeredoc, start);
            self.modes.pop();
            return false;
        }

        // One content line, newline included.
        let start = self.here();
        let mut ended_line = false;
        loop {
            match self.byte() {
                None => break,
                Some(b'\n') => {
                    self.bump();
                    ended_line = true;
                    break;
                }
                Some(b'$') if self.byte_at(1) == Some(b'{') => {
                    self.flush_literal(TokenKind::HeredocLit, start);
                    self.emit_simple(TokenKind::TemplateInterp, 2);
                    self.modes.push(Mode::Body { braces: 0 });
                    return false;
                }
                Some(b'$') if self.byte_at(1) == Some(b'$') && self.byte_at(2) == Some(b'{') => {
                    self.bump_n(3);
                }
                Some(b'%') if self.byte_at(1) == Some(b'{') => {
                    self.flush_literal(TokenKind::HeredocLit, start);
                    self.emit_simple(TokenKind::TemplateControl, 2);
                    self.modes.push(Mode::Body { braces: 0 });
                    return false;
                }
                Some(b'%') if self.byte_at(1) == Some(b'%') && self.byte_at(2) == Some(b'{') => {
                    self.bump_n(3);
                }
                Some(_) => self.bump(),
            }
        }
        self.flush_literal(TokenKind::HeredocLit, start);

        if let Some(Mode::Heredoc { line_start, .. }) = self.modes.last_mut() {
            *line_start = ended_line;
        }
        false
    }

    /// Whether the cursor sits at the heredoc's terminator line.
    fn at_heredoc_terminator(&self, marker: &[u8], dedent: bool) -> bool {
        let mut i = self.pos;
        if dedent {
            while matches!(self.src.get(i), Some(b' ' | b'\t')) {
                i += 1;
            }
        }
        if !self.src[i..].starts_with(marker) {
            return false;
        }
        matches!(self.src.get(i + marker.len()), None | Some(b'\n'))
            || (self.src.get(i + marker.len()) == Some(&b'\r')
                && self.src.get(i + marker.len() + 1) == Some(&b'\n'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(src: &str) -> Vec<(TokenKind, String)> {
        let (tokens, _) = scan(src.as_bytes(), Pos::start());
        tokens
            .into_iter()
            .map(|t| (t.kind, t.text().into_owned()))
            .collect()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_empty() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_attribute_line() {
        assert_eq!(
            tokenize("a = 1\n"),
            vec![
                (TokenKind::Ident, "a".to_string()),
                (TokenKind::Equal, "=".to_string()),
                (TokenKind::Number, "1".to_string()),
                (TokenKind::Newline, "\n".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_spaces_before() {
        let (tokens, _) = scan(b"a   = 1\n", Pos::start());
        let spaces: Vec<u32> = tokens.iter().map(|t| t.spaces_before).collect();
        assert_eq!(spaces, vec![0, 3, 1, 0, 0]);
    }

    #[test]
    fn test_spaces_reset_across_lines() {
        let (tokens, _) = scan(b"a = 1\n  b = 2\n", Pos::start());
        let b = tokens.iter().find(|t| t.bytes == b"b").unwrap();
        assert_eq!(b.spaces_before, 2);
        assert_eq!(b.span.start.line, 2);
        assert_eq!(b.span.start.column, 3);
    }

    #[test]
    fn test_blank_line_is_two_newlines() {
        assert_eq!(
            kinds("a = 1\n\nb = 2\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Equal,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Newline,
                TokenKind::Ident,
                TokenKind::Equal,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokenize("# note\n"),
            vec![
                (TokenKind::Comment, "# note\n".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
        assert_eq!(
            tokenize("// note\n"),
            vec![
                (TokenKind::Comment, "// note\n".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
        assert_eq!(
            tokenize("a /* inline */ = 1\n"),
            vec![
                (TokenKind::Ident, "a".to_string()),
                (TokenKind::Comment, "/* inline */".to_string()),
                (TokenKind::Equal, "=".to_string()),
                (TokenKind::Number, "1".to_string()),
                (TokenKind::Newline, "\n".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_quoted_template() {
        assert_eq!(
            tokenize(r#""hello""#),
            vec![
                (TokenKind::OQuote, "\"".to_string()),
                (TokenKind::QuotedLit, "hello".to_string()),
                (TokenKind::CQuote, "\"".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_template_interpolation() {
        assert_eq!(
            tokenize(r#""a ${var.x} b""#),
            vec![
                (TokenKind::OQuote, "\"".to_string()),
                (TokenKind::QuotedLit, "a ".to_string()),
                (TokenKind::TemplateInterp, "${".to_string()),
                (TokenKind::Ident, "var".to_string()),
                (TokenKind::Dot, ".".to_string()),
                (TokenKind::Ident, "x".to_string()),
                (TokenKind::TemplateSeqEnd, "}".to_string()),
                (TokenKind::QuotedLit, " b".to_string()),
                (TokenKind::CQuote, "\"".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_interpolation_with_object_braces() {
        // The closing brace of the object must not end the interpolation.
        assert_eq!(
            kinds(r#""${ { a = 1 } }""#),
            vec![
                TokenKind::OQuote,
                TokenKind::TemplateInterp,
                TokenKind::OBrace,
                TokenKind::Ident,
                TokenKind::Equal,
                TokenKind::Number,
                TokenKind::CBrace,
                TokenKind::TemplateSeqEnd,
                TokenKind::CQuote,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_escaped_interpolation_stays_literal() {
        assert_eq!(
            tokenize(r#""a $${x}""#),
            vec![
                (TokenKind::OQuote, "\"".to_string()),
                (TokenKind::QuotedLit, "a $${x}".to_string()),
                (TokenKind::CQuote, "\"".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_escaped_quote_stays_in_literal() {
        assert_eq!(
            tokenize(r#""say \"hi\"""#),
            vec![
                (TokenKind::OQuote, "\"".to_string()),
                (TokenKind::QuotedLit, r#"say \"hi\""#.to_string()),
                (TokenKind::CQuote, "\"".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let (_, diags) = scan(b"a = \"oops\n", Pos::start());
        assert!(diags.has_errors());
    }

    #[test]
    fn test_heredoc() {
        assert_eq!(
            tokenize("<<EOT\nhello\nworld\nEOT\n"),
            vec![
                (TokenKind::OHeredoc, "<<EOT\n".to_string()),
                (TokenKind::HeredocLit, "hello\n".to_string()),
                (TokenKind::HeredocLit, "world\n".to_string()),
                (TokenKind::CHeredoc, "EOT".to_string()),
                (TokenKind::Newline, "\n".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_heredoc_dedent_marker_indent() {
        let (tokens, diags) = scan(b"<<-EOT\n  x\n  EOT\n", Pos::start());
        assert!(!diags.has_errors());
        let close = tokens.iter().find(|t| t.kind == TokenKind::CHeredoc).unwrap();
        assert_eq!(close.bytes, b"EOT");
        assert_eq!(close.spaces_before, 2);
    }

    #[test]
    fn test_heredoc_interpolation() {
        assert_eq!(
            kinds("<<EOT\nhi ${name}\nEOT\n"),
            vec![
                TokenKind::OHeredoc,
                TokenKind::HeredocLit,
                TokenKind::TemplateInterp,
                TokenKind::Ident,
                TokenKind::TemplateSeqEnd,
                TokenKind::HeredocLit,
                TokenKind::CHeredoc,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_heredoc() {
        let (_, diags) = scan(b"<<EOT\nnever closed\n", Pos::start());
        assert!(diags.has_errors());
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a == b && c || !d\n"),
            vec![
                TokenKind::Ident,
                TokenKind::EqualEqual,
                TokenKind::Ident,
                TokenKind::And,
                TokenKind::Ident,
                TokenKind::Or,
                TokenKind::Bang,
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("x <= 1"),
            vec![
                TokenKind::Ident,
                TokenKind::LessEqual,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokenize("1 2.5 10e3 4.5e-2"),
            vec![
                (TokenKind::Number, "1".to_string()),
                (TokenKind::Number, "2.5".to_string()),
                (TokenKind::Number, "10e3".to_string()),
                (TokenKind::Number, "4.5e-2".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_ident_with_dash() {
        assert_eq!(
            tokenize("instance-type"),
            vec![
                (TokenKind::Ident, "instance-type".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let (tokens, diags) = scan("a = \u{1F600}\n".as_bytes(), Pos::start());
        assert!(diags.has_errors());
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Invalid));
    }

    #[test]
    fn test_block_tokens() {
        assert_eq!(
            kinds("service \"web\" {\n}\n"),
            vec![
                TokenKind::Ident,
                TokenKind::OQuote,
                TokenKind::QuotedLit,
                TokenKind::CQuote,
                TokenKind::OBrace,
                TokenKind::Newline,
                TokenKind::CBrace,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_crlf_newline_preserved() {
        let (tokens, _) = scan(b"a = 1\r\n", Pos::start());
        let nl = tokens.iter().find(|t| t.kind == TokenKind::Newline).unwrap();
        assert_eq!(nl.bytes, b"\r\n");
    }

    #[test]
    fn test_eof_keeps_trailing_blanks() {
        let (tokens, _) = scan(b"a = 1\n  ", Pos::start());
        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.spaces_before, 2);
    }

    #[test]
    fn test_roundtrip_bytes() {
        let srcs: &[&str] = &[
            "a = 1\n",
            "a   =   1\n\n# note\nb = \"x\"\n",
            "service \"web\" {\n  port = 8080\n}\n",
            "text = <<-EOT\n  hello ${who}\n  EOT\n",
        ];
        for src in srcs {
            let (tokens, diags) = scan(src.as_bytes(), Pos::start());
            assert!(!diags.has_errors(), "diags for {:?}: {}", src, diags);
            let mut out = Vec::new();
            for t in &tokens {
                out.extend(std::iter::repeat_n(b' ', t.spaces_before as usize));
                out.extend_from_slice(&t.bytes);
            }
            assert_eq!(String::from_utf8_lossy(&out), *src);
        }
    }
}
