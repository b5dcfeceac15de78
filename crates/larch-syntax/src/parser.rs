//! Recursive-descent parser for the native syntax.
//!
//! The parser walks the scanned token stream with one token of lookahead and
//! produces the semantic AST. It never gives up: every problem becomes a
//! diagnostic, the cursor synchronizes at the next plausible boundary (the
//! end of the line at body level, the closing bracket inside bracketed
//! forms), and parsing continues. Callers check `Diagnostics::has_errors`
//! to learn whether the result is trustworthy.

use crate::ast::{
    Attribute, BinaryOp, Block, BlockLabel, Body, Expression, Item, ObjectEntry, ObjectKey,
    TemplatePart, Traversal, TraversalStep, UnaryOp,
};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::scanner::scan;
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};
use crate::trace;

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// The name the file was parsed under, for callers that associate
    /// diagnostics back to their inputs.
    pub filename: String,
    /// The top-level body.
    pub body: Body,
}

/// Parse a buffer into a semantic AST.
///
/// Always returns a best-effort [`SourceFile`]; inspect the diagnostics for
/// problems found on the way.
pub fn parse(src: &[u8], filename: &str, start: Pos) -> (SourceFile, Diagnostics) {
    let (tokens, mut diags) = scan(src, start);
    let (file, parse_diags) = parse_tokens(&tokens, filename);
    diags.extend(parse_diags);
    (file, diags)
}

/// Parse an already-scanned token stream into a semantic AST.
///
/// The lossless layer scans once and feeds the same tokens through here, so
/// the AST's spans line up with the tokens it keeps.
pub fn parse_tokens(tokens: &[Token], filename: &str) -> (SourceFile, Diagnostics) {
    let mut parser = Parser::new(tokens);
    let body = parser.parse_body(None);
    (
        SourceFile {
            filename: filename.to_string(),
            body,
        },
        parser.diags,
    )
}

/// Parse an absolute traversal such as `a.b[0].c`.
pub fn parse_traversal_abs(src: &[u8], _filename: &str, start: Pos) -> (Traversal, Diagnostics) {
    let (tokens, mut diags) = scan(src, start);
    let mut parser = Parser::new(&tokens);
    let trav = parser.parse_traversal_to_end();
    diags.extend(parser.diags);
    (trav, diags)
}

/// Binary operators from loosest to tightest binding.
const BINARY_LEVELS: &[&[(TokenKind, BinaryOp)]] = &[
    &[(TokenKind::Or, BinaryOp::Or)],
    &[(TokenKind::And, BinaryOp::And)],
    &[
        (TokenKind::EqualEqual, BinaryOp::Equal),
        (TokenKind::NotEqual, BinaryOp::NotEqual),
    ],
    &[
        (TokenKind::LessThan, BinaryOp::LessThan),
        (TokenKind::GreaterThan, BinaryOp::GreaterThan),
        (TokenKind::LessEqual, BinaryOp::LessEqual),
        (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
    ],
    &[
        (TokenKind::Plus, BinaryOp::Add),
        (TokenKind::Minus, BinaryOp::Subtract),
    ],
    &[
        (TokenKind::Star, BinaryOp::Multiply),
        (TokenKind::Slash, BinaryOp::Divide),
        (TokenKind::Percent, BinaryOp::Modulo),
    ],
];

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Stack of newline significance; the top applies. Newlines matter at
    /// body level and inside object constructors, not inside `(`/`[`.
    include_newlines: Vec<bool>,
    diags: Diagnostics,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            include_newlines: vec![true],
            diags: Diagnostics::new(),
        }
    }

    // ---- cursor -----------------------------------------------------------

    /// The next significant token: comments are always skipped, newlines
    /// only when currently insignificant.
    fn peek(&mut self) -> &'t Token {
        loop {
            let tok = &self.tokens[self.pos];
            match tok.kind {
                TokenKind::Comment => self.pos += 1,
                TokenKind::Newline if !self.newlines_significant() => self.pos += 1,
                _ => return tok,
            }
        }
    }

    /// The token under the cursor, nothing skipped.
    fn raw_peek(&self) -> &'t Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> &'t Token {
        let tok = self.peek();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn newlines_significant(&self) -> bool {
        *self.include_newlines.last().expect("significance stack never empties")
    }

    fn with_newlines<T>(&mut self, significant: bool, f: impl FnOnce(&mut Self) -> T) -> T {
        self.include_newlines.push(significant);
        let result = f(self);
        self.include_newlines.pop();
        result
    }

    fn error(&mut self, summary: &str, detail: impl Into<String>, span: Span) {
        self.diags.push(
            Diagnostic::error(summary)
                .with_detail(detail)
                .with_subject(span),
        );
    }

    // ---- bodies -----------------------------------------------------------

    /// Parse body items until `end` (or EOF). Consumes neither.
    fn parse_body(&mut self, end: Option<TokenKind>) -> Body {
        let start = self.raw_peek().span.start;
        let mut items = Vec::new();

        loop {
            self.skip_body_trivia();
            let tok = self.raw_peek();
            if tok.kind == TokenKind::Eof || Some(tok.kind) == end {
                break;
            }
            match tok.kind {
                TokenKind::Ident => {
                    if let Some(item) = self.parse_definition() {
                        items.push(item);
                    }
                }
                _ => {
                    self.error(
                        "Attribute or block definition required",
                        "An attribute definition (name = value) or block \
                         definition (type and optional labels, then a brace) \
                         is expected here.",
                        tok.span,
                    );
                    self.recover_to_line_end();
                }
            }
        }

        let end_pos = self.raw_peek().span.start;
        let span = if items.is_empty() {
            Span::empty(start)
        } else {
            Span::new(start, end_pos)
        };
        Body { items, span }
    }

    /// Skip newlines and comments between body items.
    fn skip_body_trivia(&mut self) {
        while matches!(
            self.raw_peek().kind,
            TokenKind::Newline | TokenKind::Comment
        ) {
            self.pos += 1;
        }
    }

    /// Parse an attribute or block, starting at its leading identifier.
    fn parse_definition(&mut self) -> Option<Item> {
        let name_tok = self.advance();
        debug_assert_eq!(name_tok.kind, TokenKind::Ident);
        trace!("definition starting with {:?}", name_tok.text());

        match self.peek().kind {
            TokenKind::Equal => {
                let equals_tok = self.advance();
                let expr = self.parse_expression();
                self.expect_line_end("attribute definition");
                let span = name_tok.span.union(expr.span());
                Some(Item::Attribute(Attribute {
                    name: name_tok.text().into_owned(),
                    name_span: name_tok.span,
                    equals_span: equals_tok.span,
                    expr,
                    span,
                }))
            }
            TokenKind::OQuote | TokenKind::OBrace => self
                .parse_block_rest(name_tok)
                .map(Item::Block),
            _ => {
                let bad = self.peek();
                self.error(
                    "Invalid definition",
                    "An equals sign (for an attribute) or a brace (for a \
                     block) is expected after the name.",
                    bad.span,
                );
                self.recover_to_line_end();
                None
            }
        }
    }

    /// Parse the labels, braces and body of a block whose type identifier
    /// has already been consumed.
    fn parse_block_rest(&mut self, type_tok: &Token) -> Option<Block> {
        let mut labels = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::OQuote => {
                    if let Some(label) = self.parse_quoted_label() {
                        labels.push(label);
                    } else {
                        self.recover_to_line_end();
                        return None;
                    }
                }
                TokenKind::OBrace => break,
                _ => {
                    let bad = self.peek();
                    self.error(
                        "Invalid block definition",
                        "Block labels must be quoted strings, followed by an \
                         opening brace.",
                        bad.span,
                    );
                    self.recover_to_line_end();
                    return None;
                }
            }
        }

        let open_tok = self.advance();
        debug_assert_eq!(open_tok.kind, TokenKind::OBrace);

        // A block body normally starts on a new line; `{}` and a single
        // attribute on the brace line are also accepted.
        let body = match self.raw_peek().kind {
            TokenKind::Newline | TokenKind::Comment => {
                self.pos += 1;
                self.parse_body(Some(TokenKind::CBrace))
            }
            TokenKind::CBrace | TokenKind::Eof => Body {
                items: Vec::new(),
                span: Span::empty(self.raw_peek().span.start),
            },
            _ => self.parse_oneline_body(),
        };

        let close_tok = self.raw_peek();
        let close_span = close_tok.span;
        if close_tok.kind == TokenKind::CBrace {
            self.pos += 1;
            self.expect_line_end("block definition");
        } else {
            self.error(
                "Unclosed configuration block",
                "There is no closing brace for this block before the end of \
                 the file.",
                open_tok.span,
            );
        }

        Some(Block {
            type_name: type_tok.text().into_owned(),
            type_span: type_tok.span,
            labels,
            open_brace_span: open_tok.span,
            body,
            close_brace_span: close_span,
            span: type_tok.span.union(close_span),
        })
    }

    /// Parse the body of a one-line block: exactly one attribute between
    /// the braces.
    fn parse_oneline_body(&mut self) -> Body {
        let name_tok = self.peek();
        if name_tok.kind != TokenKind::Ident {
            self.error(
                "Invalid single-line block",
                "A single-line block may contain only one attribute \
                 definition.",
                name_tok.span,
            );
            self.recover_to_line_end();
            return Body {
                items: Vec::new(),
                span: Span::empty(name_tok.span.start),
            };
        }
        self.advance();

        if self.peek().kind != TokenKind::Equal {
            let bad = self.peek();
            self.error(
                "Invalid single-line block",
                "An equals sign is expected after the attribute name.",
                bad.span,
            );
            self.recover_to_line_end();
            return Body {
                items: Vec::new(),
                span: Span::empty(name_tok.span.start),
            };
        }
        let equals_tok = self.advance();
        let expr = self.parse_expression();
        let span = name_tok.span.union(expr.span());
        Body {
            items: vec![Item::Attribute(Attribute {
                name: name_tok.text().into_owned(),
                name_span: name_tok.span,
                equals_span: equals_tok.span,
                expr,
                span,
            })],
            span,
        }
    }

    /// Parse a quoted block label. Interpolation is not allowed here.
    fn parse_quoted_label(&mut self) -> Option<BlockLabel> {
        let open = self.advance();
        debug_assert_eq!(open.kind, TokenKind::OQuote);

        let mut value = String::new();
        loop {
            let tok = self.raw_peek();
            match tok.kind {
                TokenKind::QuotedLit => {
                    value.push_str(&tok.text());
                    self.pos += 1;
                }
                TokenKind::CQuote => {
                    self.pos += 1;
                    return Some(BlockLabel {
                        value,
                        span: open.span.union(tok.span),
                    });
                }
                TokenKind::TemplateInterp | TokenKind::TemplateControl => {
                    self.error(
                        "Invalid block label",
                        "Block labels must be simple string literals; \
                         template sequences are not allowed.",
                        tok.span,
                    );
                    self.skip_template_sequence();
                }
                _ => {
                    self.error(
                        "Unterminated block label",
                        "The label string is never closed by a matching quote.",
                        open.span,
                    );
                    return None;
                }
            }
        }
    }

    /// Consume through the end of the current line after a definition.
    fn expect_line_end(&mut self, what: &str) {
        loop {
            let tok = self.raw_peek();
            match tok.kind {
                // A line comment carries its newline, so it terminates the
                // line by itself.
                TokenKind::Comment => {
                    self.pos += 1;
                    if tok.bytes.ends_with(b"\n") {
                        return;
                    }
                }
                TokenKind::Newline => {
                    self.pos += 1;
                    return;
                }
                TokenKind::Eof => return,
                _ => {
                    self.error(
                        "Missing newline after definition",
                        format!("A {} must end with a newline.", what),
                        tok.span,
                    );
                    self.recover_to_line_end();
                    return;
                }
            }
        }
    }

    /// Skip forward to just past the next line end, leaving `}` and EOF for
    /// the enclosing body to handle. Braces opened inside the skipped
    /// region are balanced so a stray `{` does not derail the whole file.
    fn recover_to_line_end(&mut self) {
        let mut depth = 0usize;
        loop {
            let tok = self.raw_peek();
            match tok.kind {
                TokenKind::Eof => return,
                TokenKind::Newline if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                TokenKind::Comment if depth == 0 && tok.bytes.ends_with(b"\n") => {
                    self.pos += 1;
                    return;
                }
                TokenKind::OBrace => {
                    depth += 1;
                    self.pos += 1;
                }
                TokenKind::CBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Skip a `${`/`%{` sequence through its matching `}`.
    fn skip_template_sequence(&mut self) {
        let mut depth = 0usize;
        loop {
            let tok = self.raw_peek();
            match tok.kind {
                TokenKind::Eof => return,
                TokenKind::TemplateInterp | TokenKind::TemplateControl => {
                    depth += 1;
                    self.pos += 1;
                }
                TokenKind::TemplateSeqEnd => {
                    self.pos += 1;
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    // ---- expressions ------------------------------------------------------

    fn parse_expression(&mut self) -> Expression {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Expression {
        let cond = self.parse_binary(0);
        if self.peek().kind != TokenKind::Question {
            return cond;
        }
        self.advance();
        let true_result = self.parse_expression();
        if self.peek().kind == TokenKind::Colon {
            self.advance();
        } else {
            let bad = self.peek();
            self.error(
                "Missing false branch",
                "A conditional expression needs a colon and a result for the \
                 false case.",
                bad.span,
            );
        }
        let false_result = self.parse_expression();
        let span = cond.span().union(false_result.span());
        Expression::Conditional {
            cond: Box::new(cond),
            true_result: Box::new(true_result),
            false_result: Box::new(false_result),
            span,
        }
    }

    fn parse_binary(&mut self, level: usize) -> Expression {
        if level >= BINARY_LEVELS.len() {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(level + 1);
        loop {
            let kind = self.peek().kind;
            let op = match BINARY_LEVELS[level].iter().find(|(k, _)| *k == kind) {
                Some((_, op)) => *op,
                None => break,
            };
            self.advance();
            let rhs = self.parse_binary(level + 1);
            let span = lhs.span().union(rhs.span());
            lhs = Expression::Binary {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
                span,
            };
        }
        lhs
    }

    fn parse_unary(&mut self) -> Expression {
        let tok = self.peek();
        let op = match tok.kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let op_span = tok.span;
        self.advance();
        let operand = self.parse_unary();
        let span = op_span.union(operand.span());
        Expression::Unary {
            op,
            operand: Box::new(operand),
            span,
        }
    }

    /// Parse a primary expression and any `.attr` / `[index]` suffixes.
    fn parse_postfix(&mut self) -> Expression {
        let mut expr = self.parse_primary();
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name_tok = self.peek();
                    if name_tok.kind != TokenKind::Ident {
                        self.error(
                            "Invalid attribute name",
                            "A dot must be followed by an attribute name.",
                            name_tok.span,
                        );
                        break;
                    }
                    self.advance();
                    expr = attach_attr_step(expr, name_tok);
                }
                TokenKind::OBrack => {
                    let open = self.advance();
                    let key = self.with_newlines(false, |p| p.parse_expression());
                    let close = self.peek();
                    let close_span = close.span;
                    if close.kind == TokenKind::CBrack {
                        self.advance();
                    } else {
                        self.error(
                            "Unclosed index brackets",
                            "The opening bracket has no matching closing \
                             bracket.",
                            open.span,
                        );
                        self.recover_in_brackets(TokenKind::CBrack);
                    }
                    expr = attach_index_step(expr, key, close_span);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expression {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Number => {
                self.advance();
                let value = tok.text().parse::<f64>().unwrap_or_else(|_| {
                    // The scanner only emits digit shapes, so this is a
                    // range problem rather than a syntax one.
                    f64::INFINITY
                });
                Expression::Number {
                    value,
                    span: tok.span,
                }
            }
            TokenKind::Ident => {
                self.advance();
                match tok.bytes.as_slice() {
                    b"true" => Expression::Bool {
                        value: true,
                        span: tok.span,
                    },
                    b"false" => Expression::Bool {
                        value: false,
                        span: tok.span,
                    },
                    b"null" => Expression::Null { span: tok.span },
                    _ if self.peek().kind == TokenKind::OParen => self.parse_call_rest(tok),
                    _ => Expression::Traversal(Traversal {
                        root: tok.text().into_owned(),
                        root_span: tok.span,
                        steps: Vec::new(),
                        span: tok.span,
                    }),
                }
            }
            TokenKind::OQuote => self.parse_template(TokenKind::CQuote),
            TokenKind::OHeredoc => self.parse_template(TokenKind::CHeredoc),
            TokenKind::OBrack => self.parse_tuple(),
            TokenKind::OBrace => self.parse_object(),
            TokenKind::OParen => {
                let open = self.advance();
                let inner = self.with_newlines(false, |p| p.parse_expression());
                let close = self.peek();
                let mut end_span = inner.span();
                if close.kind == TokenKind::CParen {
                    end_span = close.span;
                    self.advance();
                } else {
                    self.error(
                        "Unbalanced parentheses",
                        "The opening parenthesis has no matching closing \
                         parenthesis.",
                        open.span,
                    );
                    self.recover_in_brackets(TokenKind::CParen);
                }
                Expression::Paren {
                    inner: Box::new(inner),
                    span: open.span.union(end_span),
                }
            }
            _ => {
                self.error(
                    "Invalid expression",
                    "An expression is expected here.",
                    tok.span,
                );
                // Do not eat structural tokens the caller needs for its own
                // recovery.
                if !matches!(
                    tok.kind,
                    TokenKind::Newline
                        | TokenKind::Eof
                        | TokenKind::CBrace
                        | TokenKind::CBrack
                        | TokenKind::CParen
                        | TokenKind::TemplateSeqEnd
                ) {
                    self.advance();
                }
                Expression::Invalid { span: tok.span }
            }
        }
    }

    /// Parse call arguments, with the name already consumed and the cursor
    /// on the opening parenthesis.
    fn parse_call_rest(&mut self, name_tok: &Token) -> Expression {
        let open = self.advance();
        debug_assert_eq!(open.kind, TokenKind::OParen);

        let (args, end_span) = self.with_newlines(false, |p| {
            let mut args = Vec::new();
            loop {
                let tok = p.peek();
                match tok.kind {
                    TokenKind::CParen => {
                        p.advance();
                        return (args, tok.span);
                    }
                    TokenKind::Eof => {
                        p.error(
                            "Unterminated function call",
                            "There is no closing parenthesis for this call \
                             before the end of the file.",
                            open.span,
                        );
                        return (args, tok.span);
                    }
                    _ => {
                        args.push(p.parse_expression());
                        match p.peek().kind {
                            TokenKind::Comma => {
                                p.advance();
                            }
                            TokenKind::CParen => {}
                            _ => {
                                let bad = p.peek();
                                p.error(
                                    "Missing argument separator",
                                    "Function arguments must be separated by \
                                     commas.",
                                    bad.span,
                                );
                                p.recover_in_brackets(TokenKind::CParen);
                                return (args, bad.span);
                            }
                        }
                    }
                }
            }
        });

        Expression::FunctionCall {
            name: name_tok.text().into_owned(),
            name_span: name_tok.span,
            args,
            span: name_tok.span.union(end_span),
        }
    }

    /// Parse a quoted or heredoc template, cursor on the opening token.
    fn parse_template(&mut self, close: TokenKind) -> Expression {
        let open = self.advance();
        let heredoc = close == TokenKind::CHeredoc;
        let mut parts = Vec::new();
        let mut end_span = open.span;

        loop {
            let tok = self.raw_peek();
            match tok.kind {
                TokenKind::QuotedLit | TokenKind::HeredocLit => {
                    parts.push(TemplatePart::Literal { span: tok.span });
                    self.pos += 1;
                }
                TokenKind::TemplateInterp => {
                    self.pos += 1;
                    let (expr, seq_span) = self.with_newlines(false, |p| {
                        let expr = p.parse_expression();
                        let seq_end = p.peek();
                        if seq_end.kind == TokenKind::TemplateSeqEnd {
                            let span = seq_end.span;
                            p.advance();
                            (expr, Some(span))
                        } else {
                            (expr, None)
                        }
                    });
                    let span = match seq_span {
                        Some(end) => tok.span.union(end),
                        None => {
                            self.error(
                                "Unterminated template interpolation",
                                "The ${ sequence is never closed by a \
                                 matching \"}\".",
                                tok.span,
                            );
                            self.skip_to_template_seq_end();
                            tok.span.union(expr.span())
                        }
                    };
                    parts.push(TemplatePart::Interp { expr, span });
                }
                TokenKind::TemplateControl => {
                    let start_span = tok.span;
                    self.pos += 1;
                    let end = self.skip_to_template_seq_end();
                    parts.push(TemplatePart::Control {
                        span: start_span.union(end),
                    });
                }
                kind if kind == close => {
                    end_span = tok.span;
                    self.pos += 1;
                    break;
                }
                _ => {
                    // The scanner reported whatever went wrong here; just
                    // stop consuming the template.
                    break;
                }
            }
        }

        Expression::Template {
            parts,
            heredoc,
            span: open.span.union(end_span),
        }
    }

    /// Skip to just past the `}` that closes the current template sequence,
    /// returning its span.
    fn skip_to_template_seq_end(&mut self) -> Span {
        let mut depth = 1usize;
        loop {
            let tok = self.raw_peek();
            match tok.kind {
                TokenKind::Eof => return tok.span,
                TokenKind::TemplateInterp | TokenKind::TemplateControl => {
                    depth += 1;
                    self.pos += 1;
                }
                TokenKind::TemplateSeqEnd => {
                    self.pos += 1;
                    depth -= 1;
                    if depth == 0 {
                        return tok.span;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    fn parse_tuple(&mut self) -> Expression {
        let open = self.advance();
        debug_assert_eq!(open.kind, TokenKind::OBrack);

        let (items, end_span) = self.with_newlines(false, |p| {
            let mut items = Vec::new();
            loop {
                let tok = p.peek();
                match tok.kind {
                    TokenKind::CBrack => {
                        p.advance();
                        return (items, tok.span);
                    }
                    TokenKind::Eof => {
                        p.error(
                            "Unclosed tuple constructor",
                            "There is no closing bracket for this tuple \
                             before the end of the file.",
                            open.span,
                        );
                        return (items, tok.span);
                    }
                    _ => {
                        items.push(p.parse_expression());
                        match p.peek().kind {
                            // Trailing commas are accepted; the next loop
                            // turn sees the closing bracket.
                            TokenKind::Comma => {
                                p.advance();
                            }
                            TokenKind::CBrack => {}
                            _ => {
                                let bad = p.peek();
                                p.error(
                                    "Missing item separator",
                                    "Tuple items must be separated by commas.",
                                    bad.span,
                                );
                                p.recover_in_brackets(TokenKind::CBrack);
                                return (items, bad.span);
                            }
                        }
                    }
                }
            }
        });

        Expression::Tuple {
            items,
            span: open.span.union(end_span),
        }
    }

    fn parse_object(&mut self) -> Expression {
        let open = self.advance();
        debug_assert_eq!(open.kind, TokenKind::OBrace);

        // Newlines separate object items, so they are significant inside
        // the braces even when the object appears inside () or [].
        let (entries, end_span) = self.with_newlines(true, |p| {
            let mut entries = Vec::new();
            loop {
                while p.peek().kind == TokenKind::Newline {
                    p.advance();
                }
                let tok = p.peek();
                match tok.kind {
                    TokenKind::CBrace => {
                        p.advance();
                        return (entries, tok.span);
                    }
                    TokenKind::Eof => {
                        p.error(
                            "Unclosed object constructor",
                            "There is no closing brace for this object \
                             before the end of the file.",
                            open.span,
                        );
                        return (entries, tok.span);
                    }
                    _ => {
                        let key = p.parse_object_key();
                        match p.peek().kind {
                            TokenKind::Equal | TokenKind::Colon => {
                                p.advance();
                            }
                            _ => {
                                let bad = p.peek();
                                p.error(
                                    "Missing key/value separator",
                                    "Object keys must be followed by an \
                                     equals sign or a colon.",
                                    bad.span,
                                );
                                p.recover_in_brackets(TokenKind::CBrace);
                                return (entries, bad.span);
                            }
                        }
                        let value = p.parse_expression();
                        entries.push(ObjectEntry { key, value });
                        match p.peek().kind {
                            TokenKind::Comma | TokenKind::Newline => {
                                p.advance();
                            }
                            TokenKind::CBrace => {}
                            _ => {
                                let bad = p.peek();
                                p.error(
                                    "Missing item separator",
                                    "Object items must be separated by commas \
                                     or line breaks.",
                                    bad.span,
                                );
                                p.recover_in_brackets(TokenKind::CBrace);
                                return (entries, bad.span);
                            }
                        }
                    }
                }
            }
        });

        Expression::Object {
            entries,
            span: open.span.union(end_span),
        }
    }

    fn parse_object_key(&mut self) -> ObjectKey {
        let tok = self.peek();
        if tok.kind == TokenKind::Ident
            && !matches!(tok.bytes.as_slice(), b"true" | b"false" | b"null")
        {
            // A naked identifier key is a literal name, not a variable
            // reference, unless it turns out to be a function call or a
            // traversal. Look at the token after it to decide.
            let next_kind = self.tokens[self.pos + 1..]
                .iter()
                .find(|t| t.kind != TokenKind::Comment)
                .map(|t| t.kind);
            if !matches!(
                next_kind,
                Some(TokenKind::Dot | TokenKind::OBrack | TokenKind::OParen)
            ) {
                self.advance();
                return ObjectKey::Ident {
                    name: tok.text().into_owned(),
                    span: tok.span,
                };
            }
        }
        ObjectKey::Expr(self.parse_expression())
    }

    /// Skip to just past the closing token of the innermost bracketed form,
    /// balancing any nested groups on the way.
    fn recover_in_brackets(&mut self, close: TokenKind) {
        let mut depth = 0usize;
        loop {
            let tok = self.raw_peek();
            match tok.kind {
                TokenKind::Eof => return,
                kind if kind == close && depth == 0 => {
                    self.pos += 1;
                    return;
                }
                kind if kind.is_open_bracket() => {
                    depth += 1;
                    self.pos += 1;
                }
                kind if kind.is_close_bracket() => {
                    depth = depth.saturating_sub(1);
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
    }

    // ---- traversals -------------------------------------------------------

    /// Parse an absolute traversal covering the whole input.
    fn parse_traversal_to_end(&mut self) -> Traversal {
        let root_tok = self.peek();
        if root_tok.kind != TokenKind::Ident {
            self.error(
                "Invalid traversal",
                "A traversal must begin with a variable name.",
                root_tok.span,
            );
            return Traversal {
                root: String::new(),
                root_span: root_tok.span,
                steps: Vec::new(),
                span: root_tok.span,
            };
        }
        self.advance();

        let mut trav = Traversal {
            root: root_tok.text().into_owned(),
            root_span: root_tok.span,
            steps: Vec::new(),
            span: root_tok.span,
        };

        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Dot => {
                    self.advance();
                    let name_tok = self.peek();
                    if name_tok.kind != TokenKind::Ident {
                        self.error(
                            "Invalid traversal",
                            "A dot must be followed by an attribute name.",
                            name_tok.span,
                        );
                        break;
                    }
                    self.advance();
                    trav.steps.push(TraversalStep::Attr {
                        name: name_tok.text().into_owned(),
                        span: name_tok.span,
                    });
                    trav.span = trav.span.union(name_tok.span);
                }
                TokenKind::OBrack => {
                    let open = self.advance();
                    let index_tok = self.peek();
                    let value = if index_tok.kind == TokenKind::Number {
                        self.advance();
                        index_tok.text().parse::<u64>().ok()
                    } else {
                        None
                    };
                    let Some(value) = value else {
                        self.error(
                            "Invalid index step",
                            "Index steps in a traversal must be non-negative \
                             integer literals.",
                            index_tok.span,
                        );
                        self.recover_in_brackets(TokenKind::CBrack);
                        break;
                    };
                    let close = self.peek();
                    let mut step_span = open.span.union(index_tok.span);
                    if close.kind == TokenKind::CBrack {
                        step_span = open.span.union(close.span);
                        self.advance();
                    } else {
                        self.error(
                            "Unclosed index brackets",
                            "The opening bracket has no matching closing \
                             bracket.",
                            open.span,
                        );
                    }
                    trav.steps.push(TraversalStep::Index {
                        value,
                        span: step_span,
                    });
                    trav.span = trav.span.union(step_span);
                }
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Eof => break,
                _ => {
                    self.error(
                        "Invalid traversal",
                        "Only attribute and index steps may follow the root \
                         variable.",
                        tok.span,
                    );
                    break;
                }
            }
        }

        trav
    }
}

/// Extend a traversal with an attribute step, or wrap anything else.
fn attach_attr_step(expr: Expression, name_tok: &Token) -> Expression {
    match expr {
        Expression::Traversal(mut trav) => {
            trav.steps.push(TraversalStep::Attr {
                name: name_tok.text().into_owned(),
                span: name_tok.span,
            });
            trav.span = trav.span.union(name_tok.span);
            Expression::Traversal(trav)
        }
        other => {
            let span = other.span().union(name_tok.span);
            Expression::GetAttr {
                base: Box::new(other),
                name: name_tok.text().into_owned(),
                name_span: name_tok.span,
                span,
            }
        }
    }
}

/// Extend a traversal with a literal index step, or wrap as a general
/// index expression.
fn attach_index_step(expr: Expression, key: Expression, close_span: Span) -> Expression {
    if let Expression::Traversal(mut trav) = expr {
        if let Expression::Number { value, span } = &key {
            if *value >= 0.0 && value.fract() == 0.0 {
                trav.steps.push(TraversalStep::Index {
                    value: *value as u64,
                    span: *span,
                });
                trav.span = trav.span.union(close_span);
                return Expression::Traversal(trav);
            }
        }
        let span = trav.span.union(close_span);
        return Expression::Index {
            base: Box::new(Expression::Traversal(trav)),
            key: Box::new(key),
            span,
        };
    }
    let span = expr.span().union(close_span);
    Expression::Index {
        base: Box::new(expr),
        key: Box::new(key),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> SourceFile {
        let (file, diags) = parse(src.as_bytes(), "test.lch", Pos::start());
        assert!(!diags.has_errors(), "diags for {:?}: {}", src, diags);
        file
    }

    #[test]
    fn test_parse_empty() {
        let file = parse_ok("");
        assert!(file.body.items.is_empty());
    }

    #[test]
    fn test_parse_attributes() {
        let file = parse_ok("a = 1\nb = \"two\"\nc = true\n");
        let names: Vec<&str> = file.body.attributes().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_block() {
        let file = parse_ok("service \"web\" \"front\" {\n  port = 8080\n}\n");
        let block = file.body.blocks().next().unwrap();
        assert_eq!(block.type_name, "service");
        let labels: Vec<&str> = block.labels.iter().map(|l| l.value.as_str()).collect();
        assert_eq!(labels, vec!["web", "front"]);
        assert_eq!(block.body.items.len(), 1);
    }

    #[test]
    fn test_one_line_blocks() {
        let file = parse_ok("bar {}\nfoo { a = 1 }\n");
        let mut blocks = file.body.blocks();
        let bar = blocks.next().unwrap();
        assert!(bar.body.items.is_empty());
        let foo = blocks.next().unwrap();
        assert_eq!(foo.body.items.len(), 1);
    }

    #[test]
    fn test_parse_nested_blocks() {
        let file = parse_ok("parent {\n  child {\n    a = 1\n  }\n}\n");
        let parent = file.body.blocks().next().unwrap();
        let child = parent.body.blocks().next().unwrap();
        assert_eq!(child.type_name, "child");
    }

    #[test]
    fn test_precedence() {
        let file = parse_ok("x = 1 + 2 * 3\n");
        let attr = file.body.attributes().next().unwrap();
        match &attr.expr {
            Expression::Binary { op, rhs, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(
                    rhs.as_ref(),
                    Expression::Binary {
                        op: BinaryOp::Multiply,
                        ..
                    }
                ));
            }
            other => panic!("expected addition at the top, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_is_loosest() {
        let file = parse_ok("x = a && b ? 1 : 2\n");
        let attr = file.body.attributes().next().unwrap();
        assert!(matches!(&attr.expr, Expression::Conditional { .. }));
    }

    #[test]
    fn test_traversal_expression() {
        let file = parse_ok("x = var.items[0].name\n");
        let attr = file.body.attributes().next().unwrap();
        match &attr.expr {
            Expression::Traversal(trav) => {
                assert_eq!(trav.root, "var");
                assert_eq!(trav.steps.len(), 3);
                assert!(matches!(
                    &trav.steps[1],
                    TraversalStep::Index { value: 0, .. }
                ));
            }
            other => panic!("expected traversal, got {:?}", other),
        }
    }

    #[test]
    fn test_function_call() {
        let file = parse_ok("x = max(1, 2, 3)\n");
        let attr = file.body.attributes().next().unwrap();
        match &attr.expr {
            Expression::FunctionCall { name, args, .. } => {
                assert_eq!(name, "max");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_tuple_and_object() {
        let file = parse_ok("x = [1, 2]\ny = { a = 1, b = 2 }\n");
        let mut attrs = file.body.attributes();
        assert!(matches!(
            &attrs.next().unwrap().expr,
            Expression::Tuple { items, .. } if items.len() == 2
        ));
        assert!(matches!(
            &attrs.next().unwrap().expr,
            Expression::Object { entries, .. } if entries.len() == 2
        ));
    }

    #[test]
    fn test_multiline_tuple() {
        let file = parse_ok("x = [\n  1,\n  2,\n]\n");
        let attr = file.body.attributes().next().unwrap();
        assert!(matches!(
            &attr.expr,
            Expression::Tuple { items, .. } if items.len() == 2
        ));
    }

    #[test]
    fn test_template_variables() {
        let file = parse_ok("x = \"hello ${who.name}\"\n");
        let attr = file.body.attributes().next().unwrap();
        let vars = attr.expr.variables();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].root, "who");
    }

    #[test]
    fn test_heredoc_expression() {
        let file = parse_ok("text = <<EOT\nline one\nline two\nEOT\n");
        let attr = file.body.attributes().next().unwrap();
        assert!(matches!(
            &attr.expr,
            Expression::Template { heredoc: true, .. }
        ));
    }

    #[test]
    fn test_recovery_keeps_later_items() {
        let src = "a = \n b = 2\nc = 3\n";
        let (file, diags) = parse(src.as_bytes(), "test.lch", Pos::start());
        assert!(diags.has_errors());
        // The parser synchronized and still saw the following attributes.
        let names: Vec<&str> = file.body.attributes().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"c"), "got {:?}", names);
    }

    #[test]
    fn test_recovery_inside_block() {
        let src = "outer {\n  ???\n  a = 1\n}\nb = 2\n";
        let (file, diags) = parse(src.as_bytes(), "test.lch", Pos::start());
        assert!(diags.has_errors());
        assert_eq!(file.body.items.len(), 2);
    }

    #[test]
    fn test_interpolated_label_rejected() {
        let (_, diags) = parse(
            b"service \"${x}\" {\n}\n",
            "test.lch",
            Pos::start(),
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_line_comment_ends_attribute() {
        let file = parse_ok("a = 1 # trailing\nb = 2\n");
        assert_eq!(file.body.attributes().count(), 2);
    }

    #[test]
    fn test_parse_traversal_abs() {
        let (trav, diags) = parse_traversal_abs(b"a.b[3].c", "t", Pos::start());
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(trav.root, "a");
        assert_eq!(trav.steps.len(), 3);
        assert!(matches!(
            &trav.steps[1],
            TraversalStep::Index { value: 3, .. }
        ));
    }

    #[test]
    fn test_parse_traversal_rejects_operators() {
        let (_, diags) = parse_traversal_abs(b"a + b", "t", Pos::start());
        assert!(diags.has_errors());
    }
}
