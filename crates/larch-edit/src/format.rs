//! The formatter: re-derives `spaces_before` across a token stream.
//!
//! Formatting never adds, removes, or rewrites tokens; it only adjusts the
//! blank count in front of each one, so the stream's content is untouched.
//! It runs once per serialization after a structural edit; untouched parses
//! are never formatted, which is what keeps them byte-identical.
//!
//! Heredoc bodies are left exactly as written: their lines are string
//! content, not layout.

use larch_syntax::{Token, TokenKind};

/// Normalize spacing, align equals signs, and re-indent.
///
/// Idempotent: formatting a formatted stream changes nothing.
pub fn format(tokens: &mut [Token]) {
    let lines = split_lines(tokens);
    apply_spacing(tokens, &lines);
    align_equals(tokens, &lines);
}

/// One physical line of the stream: a token index range, and whether the
/// line sits inside a heredoc body and must not be touched.
struct Line {
    start: usize,
    end: usize,
    protected: bool,
}

fn split_lines(tokens: &[Token]) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut in_heredoc = 0usize;
    let mut i = 0;
    while i < tokens.len() {
        let start = i;
        let protected = in_heredoc > 0;
        loop {
            let tok = &tokens[i];
            match tok.kind {
                TokenKind::OHeredoc => in_heredoc += 1,
                TokenKind::CHeredoc => in_heredoc = in_heredoc.saturating_sub(1),
                _ => {}
            }
            let ends_line = match tok.kind {
                TokenKind::Newline | TokenKind::OHeredoc => true,
                TokenKind::Comment | TokenKind::HeredocLit => tok.bytes.ends_with(b"\n"),
                _ => false,
            };
            i += 1;
            if ends_line || i == tokens.len() {
                break;
            }
        }
        lines.push(Line {
            start,
            end: i,
            protected,
        });
    }
    lines
}

fn apply_spacing(tokens: &mut [Token], lines: &[Line]) {
    let mut level: i32 = 0;
    for line in lines {
        let mut opens = 0i32;
        let mut closes = 0i32;
        for tok in &tokens[line.start..line.end] {
            match tok.kind {
                TokenKind::OParen | TokenKind::OBrack | TokenKind::OBrace => opens += 1,
                TokenKind::CParen | TokenKind::CBrack | TokenKind::CBrace => closes += 1,
                _ => {}
            }
        }

        if !line.protected {
            let first_kind = tokens[line.start].kind;
            let line_level = if matches!(
                first_kind,
                TokenKind::CParen | TokenKind::CBrack | TokenKind::CBrace
            ) {
                level - 1
            } else {
                level
            };
            tokens[line.start].spaces_before = match first_kind {
                TokenKind::Newline | TokenKind::Eof => 0,
                _ => line_level.max(0) as u32 * 2,
            };

            for idx in line.start + 1..line.end {
                let prev_prev = if idx >= line.start + 2 {
                    Some(tokens[idx - 2].kind)
                } else {
                    None
                };
                tokens[idx].spaces_before =
                    spaces_between(prev_prev, tokens[idx - 1].kind, tokens[idx].kind);
            }
        }

        level = (level + opens - closes).max(0);
    }
}

/// The blank count in front of `cur`, given the one or two tokens before it
/// on the same line.
fn spaces_between(prev_prev: Option<TokenKind>, prev: TokenKind, cur: TokenKind) -> u32 {
    use TokenKind::*;

    // Line structure and string internals never carry spacing.
    if matches!(cur, Newline | Eof) {
        return 0;
    }
    if matches!(cur, QuotedLit | CQuote | TemplateSeqEnd | HeredocLit | CHeredoc) {
        return 0;
    }
    if matches!(prev, OQuote | TemplateInterp | TemplateControl) {
        return 0;
    }

    // Tight punctuation.
    if matches!(cur, Comma | Dot | Colon | Question) {
        return 0;
    }
    if matches!(cur, CParen | CBrack | CBrace) {
        return 0;
    }
    if matches!(prev, OParen | OBrack | OBrace | Dot) {
        return 0;
    }

    // Calls and index steps attach to what they apply to.
    if cur == OParen {
        return if prev == Ident { 0 } else { 1 };
    }
    if cur == OBrack {
        return if matches!(prev, Ident | CBrack | CParen | CQuote) {
            0
        } else {
            1
        };
    }

    if cur == Equal || prev == Equal {
        return 1;
    }
    if cur == OBrace {
        return 1;
    }

    // Unary operators bind tight to their operand.
    if matches!(prev, Minus | Bang) && is_unary_context(prev_prev) {
        return 0;
    }

    // Binary operators, adjacent words and literals, trailing comments.
    1
}

/// Whether an operator preceded by this token would be unary.
fn is_unary_context(prev_prev: Option<TokenKind>) -> bool {
    use TokenKind::*;
    match prev_prev {
        None => true,
        Some(kind) => {
            kind.is_binary_operator()
                || matches!(
                    kind,
                    Equal | Comma | OParen | OBrack | OBrace | Colon | Question | Bang | Minus
                )
        }
    }
}

/// Align the `=` of each attribute run so the expressions start in one
/// column. A run ends at a blank line or any non-attribute line; comment
/// lines and heredoc bodies leave it open. An attribute whose expression
/// continues onto further lines (an unclosed bracket at line end) closes
/// its run too, so nested entries align among themselves only.
fn align_equals(tokens: &mut [Token], lines: &[Line]) {
    let mut run: Vec<(usize, usize)> = Vec::new();
    for line in lines {
        if line.protected {
            continue;
        }
        let first = tokens[line.start].kind;
        if first == TokenKind::Comment {
            continue;
        }
        let is_attribute_line = first == TokenKind::Ident
            && line.start + 1 < line.end
            && tokens[line.start + 1].kind == TokenKind::Equal;
        if is_attribute_line {
            let width = tokens[line.start].text().chars().count();
            run.push((line.start + 1, width));
            if bracket_balance(&tokens[line.start..line.end]) != 0 {
                flush_run(tokens, &mut run);
            }
        } else {
            flush_run(tokens, &mut run);
        }
    }
    flush_run(tokens, &mut run);
}

fn bracket_balance(tokens: &[Token]) -> i32 {
    let mut net = 0;
    for tok in tokens {
        match tok.kind {
            TokenKind::OParen | TokenKind::OBrack | TokenKind::OBrace => net += 1,
            TokenKind::CParen | TokenKind::CBrack | TokenKind::CBrace => net -= 1,
            _ => {}
        }
    }
    net
}

fn flush_run(tokens: &mut [Token], run: &mut Vec<(usize, usize)>) {
    if let Some(max_width) = run.iter().map(|&(_, width)| width).max() {
        for &(equals_idx, width) in run.iter() {
            tokens[equals_idx].spaces_before = (max_width - width + 1) as u32;
        }
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use larch_syntax::{scan, Pos};

    fn formatted(src: &str) -> String {
        let (mut tokens, diags) = scan(src.as_bytes(), Pos::start());
        assert!(!diags.has_errors(), "diags for {:?}: {}", src, diags);
        format(&mut tokens);
        let mut out = Vec::new();
        for tok in &tokens {
            out.extend(std::iter::repeat_n(b' ', tok.spaces_before as usize));
            out.extend_from_slice(&tok.bytes);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_normalizes_attribute_spacing() {
        assert_eq!(formatted("a   =   1\n"), "a = 1\n");
        assert_eq!(formatted("a=1\n"), "a = 1\n");
    }

    #[test]
    fn test_canonical_input_unchanged() {
        let srcs = [
            "a = true\n",
            "service \"web\" {\n  port = 8080\n}\n",
            "x = [1, 2, 3]\n",
            "y = a.b[0]\n",
            "z = f(1, 2)\n",
        ];
        for src in srcs {
            assert_eq!(formatted(src), src);
        }
    }

    #[test]
    fn test_aligns_equals_within_run() {
        assert_eq!(
            formatted("a = 1\nlong = 2\nxy = 3\n"),
            "a    = 1\nlong = 2\nxy   = 3\n"
        );
    }

    #[test]
    fn test_blank_line_resets_alignment() {
        assert_eq!(
            formatted("a = 1\nlong = 2\n\nxy = 3\nq = 4\n"),
            "a    = 1\nlong = 2\n\nxy = 3\nq  = 4\n"
        );
    }

    #[test]
    fn test_block_boundary_resets_alignment() {
        assert_eq!(
            formatted("ab = 1\nblock {\n  inner = 2\n}\nc = 3\n"),
            "ab = 1\nblock {\n  inner = 2\n}\nc = 3\n"
        );
    }

    #[test]
    fn test_comment_line_keeps_run_open() {
        assert_eq!(
            formatted("a = 1\n# note\nlong = 2\n"),
            "a    = 1\n# note\nlong = 2\n"
        );
    }

    #[test]
    fn test_indents_nested_bodies() {
        assert_eq!(
            formatted("outer {\ninner {\na = 1\n}\n}\n"),
            "outer {\n  inner {\n    a = 1\n  }\n}\n"
        );
    }

    #[test]
    fn test_comment_follows_body_indent() {
        assert_eq!(
            formatted("outer {\n# note\na = 1\n}\n"),
            "outer {\n  # note\n  a = 1\n}\n"
        );
    }

    #[test]
    fn test_heredoc_body_untouched() {
        let src = "text = <<-EOT\n    keep   me\n  EOT\n";
        assert_eq!(formatted(src), src);
    }

    #[test]
    fn test_heredoc_leaves_run_open() {
        // The attributes on either side of the heredoc are one run.
        assert_eq!(
            formatted("text = <<-EOT\n  body\n  EOT\nafter = 1\n"),
            "text  = <<-EOT\n  body\n  EOT\nafter = 1\n"
        );
    }

    #[test]
    fn test_unary_binds_tight() {
        assert_eq!(formatted("a = -1\n"), "a = -1\n");
        assert_eq!(formatted("a = !b\n"), "a = !b\n");
        assert_eq!(formatted("a = 1 - 2\n"), "a = 1 - 2\n");
    }

    #[test]
    fn test_idempotent() {
        let srcs = [
            "a=1\nbb  =  2\n\nc = 3\n",
            "outer {\ninner {\nx = [1,2]\n}\n}\n",
            "text = <<EOT\n  raw ${x}\nEOT\n",
            "m = {\nk = 1\n}\n",
        ];
        for src in srcs {
            let once = formatted(src);
            let twice = formatted(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", src);
        }
    }
}
