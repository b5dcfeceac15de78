//! Read and write handles for blocks in the physical tree.

use crate::body::{Body, BodyMut};
use crate::render;
use crate::tokens::Tokens;
use crate::tree::{NodeId, QuotedString, Tree};

/// A block of a body: `type "label"… { body }`.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub(crate) tree: &'a Tree,
    pub(crate) id: NodeId,
}

impl<'a> Block<'a> {
    /// The node id, for operations that need to name this block later,
    /// such as [`BodyMut::remove_block`].
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The block's type name.
    pub fn block_type(&self) -> String {
        self.tree.block(self.id).type_name.text().into_owned()
    }

    /// The block's labels, unquoted, in order.
    pub fn labels(&self) -> Vec<String> {
        self.tree
            .block(self.id)
            .labels
            .iter()
            .map(QuotedString::value)
            .collect()
    }

    /// A read handle on the block's body.
    pub fn body(&self) -> Body<'a> {
        Body {
            tree: self.tree,
            id: self.tree.block(self.id).body,
        }
    }

    /// The block's full token run, lead comments through the newline after
    /// the closing brace.
    pub fn build_tokens(&self) -> Tokens {
        let mut out = Tokens::new();
        self.tree.build_tokens_into(self.id, &mut out);
        out
    }

    /// Whether this block's type and label sequence match exactly.
    pub(crate) fn matches(&self, type_name: &str, labels: &[&str]) -> bool {
        let data = self.tree.block(self.id);
        if data.type_name.bytes != type_name.as_bytes() || data.labels.len() != labels.len() {
            return false;
        }
        data.labels
            .iter()
            .zip(labels)
            .all(|(have, want)| have.value() == *want)
    }
}

/// A write handle on a block.
#[derive(Debug)]
pub struct BlockMut<'a> {
    pub(crate) tree: &'a mut Tree,
    pub(crate) id: NodeId,
}

impl BlockMut<'_> {
    /// The node id of this block.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The block's type name.
    pub fn block_type(&self) -> String {
        self.tree.block(self.id).type_name.text().into_owned()
    }

    /// The block's labels, unquoted, in order.
    pub fn labels(&self) -> Vec<String> {
        self.tree
            .block(self.id)
            .labels
            .iter()
            .map(QuotedString::value)
            .collect()
    }

    /// Replace the block's labels. The type name and body are untouched.
    pub fn set_labels(&mut self, labels: &[&str]) {
        let rendered: Vec<QuotedString> = labels
            .iter()
            .map(|label| QuotedString::new(render::quoted_label_tokens(label, 1)))
            .collect();
        self.tree.block_mut(self.id).labels = rendered;
        self.tree.dirty = true;
    }

    /// A write handle on the block's body.
    pub fn body_mut(&mut self) -> BodyMut<'_> {
        let body = self.tree.block(self.id).body;
        BodyMut {
            tree: self.tree,
            id: body,
        }
    }
}
