//! Zips the semantic AST with the token stream into the physical tree.
//!
//! Every token ends up owned by exactly one node. The AST only guides the
//! partitioning: tokens it does not explain (blank lines, detached
//! comments, regions the parser gave up on) become `Comments` and
//! `Unstructured` children, so nothing is dropped even from a broken parse.

use larch_syntax::ast::{self, Expression, Item};
use larch_syntax::{Token, TokenKind};

use crate::tokens::Tokens;
use crate::tree::{
    AttributeData, BlockData, BodyData, Content, NodeId, QuotedString, Tree,
};

/// Build the arena for a scanned and parsed file. Returns the tree, the
/// root body node, and the trailing EOF run.
pub(crate) fn build_tree(tokens: &[Token], body: &ast::Body) -> (Tree, NodeId, Tokens) {
    debug_assert!(matches!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof)));
    let eof_idx = tokens.len() - 1;

    let mut tree = Tree::new();
    let root = tree.alloc(Content::Body(BodyData::default()), None);

    let mut builder = Builder { tree, tokens };
    let mut cursor = 0;
    builder.build_body(root, &mut cursor, eof_idx, &body.items);

    let eof: Tokens = vec![tokens[eof_idx].clone()].into();
    (builder.tree, root, eof)
}

struct Builder<'t> {
    tree: Tree,
    tokens: &'t [Token],
}

impl Builder<'_> {
    /// Attach children covering token indices `[*cursor, end)` to `body_id`.
    fn build_body(&mut self, body_id: NodeId, cursor: &mut usize, end: usize, items: &[Item]) {
        for item in items {
            let item_start = self.index_at_byte(*cursor, end, item.span().start.byte);

            // Split the gap before the item: a trailing run of comment
            // tokens with nothing after it belongs to the item as its lead
            // comments; anything earlier is free-standing.
            let mut lead_from = item_start;
            while lead_from > *cursor && self.tokens[lead_from - 1].kind == TokenKind::Comment {
                lead_from -= 1;
            }
            self.flush_gap(body_id, *cursor, lead_from);
            let lead: Tokens = self.tokens[lead_from..item_start].to_vec().into();
            *cursor = item_start;

            match item {
                Item::Attribute(attr) => self.build_attribute(body_id, lead, attr, cursor, end),
                Item::Block(block) => self.build_block(body_id, lead, block, cursor, end),
            }
        }
        self.flush_gap(body_id, *cursor, end);
        *cursor = end;
    }

    fn build_attribute(
        &mut self,
        body_id: NodeId,
        lead: Tokens,
        attr: &ast::Attribute,
        cursor: &mut usize,
        end: usize,
    ) {
        // A recovery placeholder means the parser never understood the
        // right-hand side; keep the whole region as unstructured tokens.
        if matches!(attr.expr, Expression::Invalid { .. }) {
            self.build_unparsed(body_id, lead, attr.span, cursor, end);
            return;
        }

        let name_idx = *cursor;
        let shape_ok = self.tokens[name_idx].kind == TokenKind::Ident
            && self.tokens[name_idx].span.start.byte == attr.name_span.start.byte
            && name_idx + 1 < end
            && self.tokens[name_idx + 1].kind == TokenKind::Equal
            && self.tokens[name_idx + 1].span.start.byte == attr.equals_span.start.byte;
        if !shape_ok {
            self.build_unparsed(body_id, lead, attr.span, cursor, end);
            return;
        }

        let expr_end_byte = attr.expr.span().end.byte;
        let mut idx = name_idx + 2;
        while idx < end && self.tokens[idx].span.end.byte <= expr_end_byte {
            idx += 1;
        }
        let expr: Tokens = self.tokens[name_idx + 2..idx].to_vec().into();

        let mut line_comment = None;
        if idx < end && self.tokens[idx].kind == TokenKind::Comment {
            line_comment = Some(self.tokens[idx].clone());
            idx += 1;
        }
        let mut trailing_newline = None;
        let line_ended = line_comment
            .as_ref()
            .is_some_and(|c| c.bytes.ends_with(b"\n"));
        if !line_ended && idx < end && self.tokens[idx].kind == TokenKind::Newline {
            trailing_newline = Some(self.tokens[idx].clone());
            idx += 1;
        }

        let node = self.tree.alloc(
            Content::Attribute(AttributeData {
                lead_comments: lead,
                name: self.tokens[name_idx].clone(),
                equals: self.tokens[name_idx + 1].clone(),
                expr,
                line_comment,
                trailing_newline,
            }),
            Some(body_id),
        );
        self.tree.body_mut(body_id).children.push(node);
        *cursor = idx;
    }

    fn build_block(
        &mut self,
        body_id: NodeId,
        lead: Tokens,
        block: &ast::Block,
        cursor: &mut usize,
        end: usize,
    ) {
        let type_idx = *cursor;
        if self.tokens[type_idx].kind != TokenKind::Ident
            || self.tokens[type_idx].span.start.byte != block.type_span.start.byte
        {
            self.build_unparsed(body_id, lead, block.span, cursor, end);
            return;
        }

        let mut idx = type_idx + 1;
        let mut labels = Vec::new();
        for label in &block.labels {
            let from = self.index_at_byte(idx, end, label.span.start.byte);
            let mut to = from;
            while to < end && self.tokens[to].span.end.byte <= label.span.end.byte {
                to += 1;
            }
            labels.push(QuotedString::new(self.tokens[from..to].to_vec().into()));
            idx = to;
        }

        // `{`, and the newline (or trailing comment) that ends its line.
        let open_idx = self.index_at_byte(idx, end, block.open_brace_span.start.byte);
        if open_idx >= end || self.tokens[open_idx].kind != TokenKind::OBrace {
            self.build_unparsed(body_id, lead, block.span, cursor, end);
            return;
        }
        let mut open: Tokens = vec![self.tokens[open_idx].clone()].into();
        let mut body_from = open_idx + 1;
        if body_from < end
            && matches!(
                self.tokens[body_from].kind,
                TokenKind::Newline | TokenKind::Comment
            )
        {
            open.push(self.tokens[body_from].clone());
            body_from += 1;
        }

        let close_idx = self.index_at_byte(body_from, end, block.close_brace_span.start.byte);

        let child_body = self
            .tree
            .alloc(Content::Body(BodyData::default()), None);
        let mut body_cursor = body_from;
        self.build_body(child_body, &mut body_cursor, close_idx, &block.body.items);

        let mut close = Tokens::new();
        let mut after = close_idx;
        if after < end && self.tokens[after].kind == TokenKind::CBrace {
            close.push(self.tokens[after].clone());
            after += 1;
            if after < end
                && matches!(
                    self.tokens[after].kind,
                    TokenKind::Newline | TokenKind::Comment
                )
            {
                close.push(self.tokens[after].clone());
                after += 1;
            }
        }

        let node = self.tree.alloc(
            Content::Block(BlockData {
                lead_comments: lead,
                type_name: self.tokens[type_idx].clone(),
                labels,
                open,
                body: child_body,
                close,
            }),
            Some(body_id),
        );
        self.tree.set_parent(child_body, Some(node));
        self.tree.body_mut(body_id).children.push(node);
        *cursor = after;
    }

    /// Keep a region the parser could not structure, from the cursor
    /// through the end of the construct's last line.
    fn build_unparsed(
        &mut self,
        body_id: NodeId,
        lead: Tokens,
        span: larch_syntax::Span,
        cursor: &mut usize,
        end: usize,
    ) {
        let mut idx = *cursor;
        let mut line_done = false;
        while idx < end && self.tokens[idx].span.start.byte < span.end.byte {
            line_done = ends_line(&self.tokens[idx]);
            idx += 1;
        }
        // Take the rest of the line too, so the body stays newline-shaped.
        while !line_done && idx < end {
            line_done = ends_line(&self.tokens[idx]);
            idx += 1;
        }

        let mut run = lead;
        for tok in &self.tokens[*cursor..idx] {
            run.push(tok.clone());
        }
        if !run.is_empty() {
            let node = self
                .tree
                .alloc(Content::Unstructured(run), Some(body_id));
            self.tree.body_mut(body_id).children.push(node);
        }
        *cursor = idx;
    }

    /// Turn gap tokens into free-standing `Comments` and `Unstructured`
    /// children: consecutive comments group together, everything else
    /// (blank lines, stray tokens) groups separately.
    fn flush_gap(&mut self, body_id: NodeId, from: usize, to: usize) {
        let mut idx = from;
        while idx < to {
            let comment = self.tokens[idx].kind == TokenKind::Comment;
            let mut run_end = idx;
            while run_end < to && (self.tokens[run_end].kind == TokenKind::Comment) == comment {
                run_end += 1;
            }
            let run: Tokens = self.tokens[idx..run_end].to_vec().into();
            let content = if comment {
                Content::Comments(run)
            } else {
                Content::Unstructured(run)
            };
            let node = self.tree.alloc(content, Some(body_id));
            self.tree.body_mut(body_id).children.push(node);
            idx = run_end;
        }
    }

    /// First token index in `[from, end)` whose start reaches `byte`.
    fn index_at_byte(&self, from: usize, end: usize, byte: usize) -> usize {
        let mut idx = from;
        while idx < end && self.tokens[idx].span.start.byte < byte {
            idx += 1;
        }
        idx
    }
}

/// Whether this token is the last of its physical line.
fn ends_line(tok: &Token) -> bool {
    tok.kind == TokenKind::Newline
        || (tok.kind == TokenKind::Comment && tok.bytes.ends_with(b"\n"))
}
