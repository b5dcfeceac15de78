//! Read handle for attributes in the physical tree.

use crate::tokens::Tokens;
use crate::tree::{NodeId, Tree};

/// An attribute of a body: `name = expr`, plus its lead comments and line
/// comment.
#[derive(Debug, Clone, Copy)]
pub struct Attribute<'a> {
    pub(crate) tree: &'a Tree,
    pub(crate) id: NodeId,
}

impl<'a> Attribute<'a> {
    /// The attribute's name.
    pub fn name(&self) -> String {
        self.tree.attribute(self.id).name.text().into_owned()
    }

    /// The token run of the expression, exactly as it sits in the tree.
    pub fn expr_tokens(&self) -> &'a Tokens {
        &self.tree.attribute(self.id).expr
    }

    /// The attribute's full token run: lead comments, name, equals sign,
    /// expression, and the comment and newline that end its line.
    pub fn build_tokens(&self) -> Tokens {
        let mut out = Tokens::new();
        self.tree.build_tokens_into(self.id, &mut out);
        out
    }
}
