//! Read and write handles for bodies, carrying the edit operations.

use std::collections::HashMap;

use larch_syntax::ast::Traversal;
use larch_syntax::TokenKind;
use larch_value::Value;
use tracing::trace;

use crate::attribute::Attribute;
use crate::block::{Block, BlockMut};
use crate::error::RenderError;
use crate::render;
use crate::tokens::{self, Tokens};
use crate::tree::{AttributeData, BlockData, BodyData, Content, NodeId, Tree};

/// A read handle on a body: an ordered sequence of attributes and blocks.
#[derive(Debug, Clone, Copy)]
pub struct Body<'a> {
    pub(crate) tree: &'a Tree,
    pub(crate) id: NodeId,
}

impl<'a> Body<'a> {
    /// A snapshot of the body's attributes by name. Unordered; where a name
    /// is (invalidly) repeated, the first definition wins, matching
    /// [`Body::get_attribute`].
    pub fn attributes(&self) -> HashMap<String, Attribute<'a>> {
        let mut out = HashMap::new();
        for attr in self.attribute_handles() {
            out.entry(attr.name()).or_insert(attr);
        }
        out
    }

    /// The first attribute with the given name, if any.
    pub fn get_attribute(&self, name: &str) -> Option<Attribute<'a>> {
        self.attribute_handles().find(|attr| {
            self.tree.attribute(attr.id).name.bytes == name.as_bytes()
        })
    }

    /// The body's blocks, in document order.
    pub fn blocks(&self) -> Vec<Block<'a>> {
        self.block_handles().collect()
    }

    /// The first block whose type and full label sequence match. Labels
    /// compare element-wise, so order and count both matter.
    pub fn get_block(&self, type_name: &str, labels: &[&str]) -> Option<Block<'a>> {
        self.block_handles()
            .find(|block| block.matches(type_name, labels))
    }

    /// Like [`Body::get_block`], but also descending into nested block
    /// bodies, depth-first in document order.
    pub fn first_matching_block(&self, type_name: &str, labels: &[&str]) -> Option<Block<'a>> {
        for block in self.block_handles() {
            if block.matches(type_name, labels) {
                return Some(block);
            }
            if let Some(found) = block.body().first_matching_block(type_name, labels) {
                return Some(found);
            }
        }
        None
    }

    fn attribute_handles(&self) -> impl Iterator<Item = Attribute<'a>> + use<'a> {
        let tree = self.tree;
        tree.body(self.id)
            .children
            .iter()
            .copied()
            .filter(move |&id| tree.is_attribute(id))
            .map(move |id| Attribute { tree, id })
    }

    fn block_handles(&self) -> impl Iterator<Item = Block<'a>> + use<'a> {
        let tree = self.tree;
        tree.body(self.id)
            .children
            .iter()
            .copied()
            .filter(move |&id| tree.is_block(id))
            .map(move |id| Block { tree, id })
    }
}

/// A write handle on a body.
#[derive(Debug)]
pub struct BodyMut<'a> {
    pub(crate) tree: &'a mut Tree,
    pub(crate) id: NodeId,
}

impl BodyMut<'_> {
    /// A read handle on the same body.
    pub fn as_body(&self) -> Body<'_> {
        Body {
            tree: self.tree,
            id: self.id,
        }
    }

    /// See [`Body::get_attribute`].
    pub fn get_attribute(&self, name: &str) -> Option<Attribute<'_>> {
        self.as_body().get_attribute(name)
    }

    /// See [`Body::get_block`].
    pub fn get_block(&self, type_name: &str, labels: &[&str]) -> Option<Block<'_>> {
        self.as_body().get_block(type_name, labels)
    }

    /// Set an attribute to a literal value.
    ///
    /// An existing attribute keeps its name, equals sign and comments and
    /// has only its expression replaced; otherwise a fresh `name = value`
    /// line is appended at the end of the body. A value with no literal
    /// form fails with [`RenderError`] and leaves the body unchanged.
    pub fn set_attribute_value(&mut self, name: &str, value: &Value) -> Result<(), RenderError> {
        let expr = render::tokens_for_value(value)?;
        trace!(attr = name, "set attribute value");
        self.set_attribute_expr(name, expr);
        Ok(())
    }

    /// Set an attribute to a reference path such as `var.items[0]`.
    pub fn set_attribute_traversal(&mut self, name: &str, traversal: &Traversal) {
        let expr = render::tokens_for_traversal(traversal);
        trace!(attr = name, "set attribute traversal");
        self.set_attribute_expr(name, expr);
    }

    /// Remove the attribute with the given name, lead comments and trailing
    /// newline included. Returns whether anything was removed.
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let children = &self.tree.body(self.id).children;
        let found = children.iter().position(|&id| {
            self.tree.is_attribute(id) && self.tree.attribute(id).name.bytes == name.as_bytes()
        });
        match found {
            Some(idx) => {
                trace!(attr = name, "remove attribute");
                self.tree.body_mut(self.id).children.remove(idx);
                self.tree.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Append a new, empty block at the end of the body and return a write
    /// handle on it.
    pub fn append_new_block(&mut self, type_name: &str, labels: &[&str]) -> BlockMut<'_> {
        trace!(type_name, ?labels, "append new block");
        self.ensure_terminated();

        let labels: Vec<_> = labels
            .iter()
            .map(|label| crate::tree::QuotedString::new(render::quoted_label_tokens(label, 1)))
            .collect();
        let open: Tokens = vec![
            tokens::synthetic(TokenKind::OBrace, b"{".to_vec(), 1),
            tokens::newline(),
        ]
        .into();
        let close: Tokens = vec![
            tokens::synthetic(TokenKind::CBrace, b"}".to_vec(), 0),
            tokens::newline(),
        ]
        .into();

        let body = self.tree.alloc(Content::Body(BodyData::default()), None);
        let block = self.tree.alloc(
            Content::Block(BlockData {
                lead_comments: Tokens::new(),
                type_name: tokens::ident(type_name, 0),
                labels,
                open,
                body,
                close,
            }),
            Some(self.id),
        );
        self.tree.set_parent(body, Some(block));
        self.tree.body_mut(self.id).children.push(block);
        self.tree.dirty = true;

        BlockMut {
            tree: self.tree,
            id: block,
        }
    }

    /// A write handle on the first block whose type and labels match.
    pub fn get_block_mut(&mut self, type_name: &str, labels: &[&str]) -> Option<BlockMut<'_>> {
        let id = self.as_body().get_block(type_name, labels)?.id();
        Some(BlockMut {
            tree: self.tree,
            id,
        })
    }

    /// Remove a block from this body, lead comments through the newline
    /// after its closing brace. Returns false when the id does not name a
    /// block child of this body.
    pub fn remove_block(&mut self, block: NodeId) -> bool {
        if !self.tree.is_block(block) || self.tree.node(block).parent != Some(self.id) {
            return false;
        }
        let children = &self.tree.body(self.id).children;
        let Some(idx) = children.iter().position(|&id| id == block) else {
            return false;
        };
        trace!("remove block");
        self.tree.body_mut(self.id).children.remove(idx);

        // Removing a block that had blank lines on both sides would leave a
        // doubled blank; keep just one.
        let children = &self.tree.body(self.id).children;
        if idx > 0 && idx < children.len() {
            let prev = children[idx - 1];
            let next = children[idx];
            if self.is_blank_run(prev) && self.is_blank_run(next) {
                self.tree.body_mut(self.id).children.remove(idx);
            }
        }
        self.tree.dirty = true;
        true
    }

    /// Remove every child of the body.
    pub fn clear(&mut self) {
        self.tree.body_mut(self.id).children.clear();
        self.tree.dirty = true;
    }

    fn is_blank_run(&self, id: NodeId) -> bool {
        match &self.tree.node(id).content {
            Content::Unstructured(tokens) => {
                !tokens.is_empty() && tokens.iter().all(|t| t.kind == TokenKind::Newline)
            }
            _ => false,
        }
    }

    /// Replace or append an attribute's expression run.
    fn set_attribute_expr(&mut self, name: &str, mut expr: Tokens) {
        if let Some(first) = expr.first_mut() {
            first.spaces_before = 1;
        }

        let existing = self.tree.body(self.id).children.iter().copied().find(|&id| {
            self.tree.is_attribute(id) && self.tree.attribute(id).name.bytes == name.as_bytes()
        });

        if let Some(id) = existing {
            self.tree.attribute_mut(id).expr = expr;
        } else {
            self.ensure_terminated();
            let node = self.tree.alloc(
                Content::Attribute(AttributeData {
                    lead_comments: Tokens::new(),
                    name: tokens::ident(name, 0),
                    equals: tokens::equals(1),
                    expr,
                    line_comment: None,
                    trailing_newline: Some(tokens::newline()),
                }),
                Some(self.id),
            );
            self.tree.body_mut(self.id).children.push(node);
        }
        self.tree.dirty = true;
    }

    /// Append a newline first if the body's last token does not already end
    /// a line, so a fresh construct starts on its own line.
    fn ensure_terminated(&mut self) {
        let needs_newline = match self.tree.last_token_of_body(self.id) {
            None => false,
            Some(tok) => {
                !(tok.kind == TokenKind::Newline
                    || (tok.kind == TokenKind::Comment && tok.bytes.ends_with(b"\n")))
            }
        };
        if needs_newline {
            let run: Tokens = vec![tokens::newline()].into();
            let node = self.tree.alloc(Content::Unstructured(run), Some(self.id));
            self.tree.body_mut(self.id).children.push(node);
        }
    }
}
