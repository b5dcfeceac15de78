//! The physical tree: an arena of nodes that together own every token of a
//! parsed file.
//!
//! Nodes are addressed by stable [`NodeId`] indices and carry a back-pointer
//! to their parent, so edits can splice siblings without shared ownership.
//! Serializing the tree is a straight walk that concatenates each node's
//! token runs in document order; nothing is computed, so unmodified regions
//! come out byte-identical.

use larch_syntax::{Token, TokenKind};

use crate::tokens::Tokens;

/// Stable index of a node in a file's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// One node of the physical tree.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) content: Content,
}

/// What a node holds. The set of child shapes is closed: a body's children
/// are always one of the four container-item variants.
#[derive(Debug, Clone)]
pub(crate) enum Content {
    Body(BodyData),
    Attribute(AttributeData),
    Block(BlockData),
    /// A run of full-line comment tokens not attached to any construct.
    Comments(Tokens),
    /// Tokens the parse could not explain: blank lines, or regions skipped
    /// during error recovery.
    Unstructured(Tokens),
}

/// An ordered sequence of attribute, block, comment and unstructured nodes.
#[derive(Debug, Clone, Default)]
pub(crate) struct BodyData {
    pub(crate) children: Vec<NodeId>,
}

/// A `name = expr` binding and every token that belongs to it.
///
/// When the line ends in a trailing comment, the comment's bytes carry the
/// newline and `trailing_newline` is absent.
#[derive(Debug, Clone)]
pub(crate) struct AttributeData {
    pub(crate) lead_comments: Tokens,
    pub(crate) name: Token,
    pub(crate) equals: Token,
    pub(crate) expr: Tokens,
    pub(crate) line_comment: Option<Token>,
    pub(crate) trailing_newline: Option<Token>,
}

/// A `type "label"… { body }` construct and every token that belongs to it.
///
/// The label list is held apart from the body child list so matching a
/// block by labels is a direct element-wise comparison.
#[derive(Debug, Clone)]
pub(crate) struct BlockData {
    pub(crate) lead_comments: Tokens,
    pub(crate) type_name: Token,
    pub(crate) labels: Vec<QuotedString>,
    /// The `{` and the newline after it (just `{` for a one-line block).
    pub(crate) open: Tokens,
    pub(crate) body: NodeId,
    /// The `}` and the newline after it.
    pub(crate) close: Tokens,
}

/// A quoted string label's token run: open quote, literal, close quote.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotedString {
    pub(crate) tokens: Tokens,
}

impl QuotedString {
    pub(crate) fn new(tokens: Tokens) -> Self {
        QuotedString { tokens }
    }

    /// The label text with one pair of quotes stripped. Escape sequences
    /// are left as written; the grammar restricts labels to simple string
    /// literals, so none carry meaning beyond their bytes.
    pub fn value(&self) -> String {
        let mut out = String::new();
        for tok in &self.tokens {
            if tok.kind == TokenKind::QuotedLit {
                out.push_str(&tok.text());
            }
        }
        out
    }
}

/// The node arena of one file.
#[derive(Debug, Clone)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    /// Set by every structural edit; serialization formats when set.
    pub(crate) dirty: bool,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Tree {
            nodes: Vec::new(),
            dirty: false,
        }
    }

    pub(crate) fn alloc(&mut self, content: Content, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { parent, content });
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.node_mut(id).parent = parent;
    }

    pub(crate) fn body(&self, id: NodeId) -> &BodyData {
        match &self.node(id).content {
            Content::Body(body) => body,
            other => panic!("node is not a body: {:?}", other),
        }
    }

    pub(crate) fn body_mut(&mut self, id: NodeId) -> &mut BodyData {
        match &mut self.node_mut(id).content {
            Content::Body(body) => body,
            other => panic!("node is not a body: {:?}", other),
        }
    }

    pub(crate) fn attribute(&self, id: NodeId) -> &AttributeData {
        match &self.node(id).content {
            Content::Attribute(attr) => attr,
            other => panic!("node is not an attribute: {:?}", other),
        }
    }

    pub(crate) fn attribute_mut(&mut self, id: NodeId) -> &mut AttributeData {
        match &mut self.node_mut(id).content {
            Content::Attribute(attr) => attr,
            other => panic!("node is not an attribute: {:?}", other),
        }
    }

    pub(crate) fn block(&self, id: NodeId) -> &BlockData {
        match &self.node(id).content {
            Content::Block(block) => block,
            other => panic!("node is not a block: {:?}", other),
        }
    }

    pub(crate) fn block_mut(&mut self, id: NodeId) -> &mut BlockData {
        match &mut self.node_mut(id).content {
            Content::Block(block) => block,
            other => panic!("node is not a block: {:?}", other),
        }
    }

    pub(crate) fn is_attribute(&self, id: NodeId) -> bool {
        matches!(self.node(id).content, Content::Attribute(_))
    }

    pub(crate) fn is_block(&self, id: NodeId) -> bool {
        matches!(self.node(id).content, Content::Block(_))
    }

    /// Append the full token run of a subtree, in document order.
    pub(crate) fn build_tokens_into(&self, id: NodeId, out: &mut Tokens) {
        match &self.node(id).content {
            Content::Body(body) => {
                for &child in &body.children {
                    self.build_tokens_into(child, out);
                }
            }
            Content::Attribute(attr) => {
                for tok in &attr.lead_comments {
                    out.push(tok.clone());
                }
                out.push(attr.name.clone());
                out.push(attr.equals.clone());
                for tok in &attr.expr {
                    out.push(tok.clone());
                }
                if let Some(comment) = &attr.line_comment {
                    out.push(comment.clone());
                }
                if let Some(nl) = &attr.trailing_newline {
                    out.push(nl.clone());
                }
            }
            Content::Block(block) => {
                for tok in &block.lead_comments {
                    out.push(tok.clone());
                }
                out.push(block.type_name.clone());
                for label in &block.labels {
                    for tok in &label.tokens {
                        out.push(tok.clone());
                    }
                }
                for tok in &block.open {
                    out.push(tok.clone());
                }
                self.build_tokens_into(block.body, out);
                for tok in &block.close {
                    out.push(tok.clone());
                }
            }
            Content::Comments(tokens) | Content::Unstructured(tokens) => {
                for tok in tokens {
                    out.push(tok.clone());
                }
            }
        }
    }

    /// The last token a body would serialize, if any.
    pub(crate) fn last_token_of_body(&self, id: NodeId) -> Option<Token> {
        let body = self.body(id);
        for &child in body.children.iter().rev() {
            if let Some(tok) = self.last_token_of(child) {
                return Some(tok);
            }
        }
        None
    }

    fn last_token_of(&self, id: NodeId) -> Option<Token> {
        match &self.node(id).content {
            Content::Body(body) => body
                .children
                .iter()
                .rev()
                .find_map(|&child| self.last_token_of(child)),
            Content::Attribute(attr) => attr
                .trailing_newline
                .clone()
                .or_else(|| attr.line_comment.clone())
                .or_else(|| attr.expr.last().cloned())
                .or(Some(attr.equals.clone())),
            Content::Block(block) => block
                .close
                .last()
                .cloned()
                .or_else(|| self.last_token_of(block.body)),
            Content::Comments(tokens) | Content::Unstructured(tokens) => tokens.last().cloned(),
        }
    }
}
