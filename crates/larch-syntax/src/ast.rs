//! The semantic AST produced by the native-syntax parser.
//!
//! This tree describes what the source means, attribute by attribute and
//! block by block, and every node remembers where it came from. It does not
//! hold the source's trivia; the lossless layer keeps the token stream and
//! uses the spans recorded here to carve it up.

use crate::Span;

/// An ordered sequence of attributes and blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// The attributes and blocks, in document order.
    pub items: Vec<Item>,
    /// The source region the body covers.
    pub span: Span,
}

impl Body {
    /// The attributes of this body, skipping blocks.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter().filter_map(|item| match item {
            Item::Attribute(attr) => Some(attr),
            Item::Block(_) => None,
        })
    }

    /// The blocks of this body, skipping attributes.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match item {
            Item::Block(block) => Some(block),
            Item::Attribute(_) => None,
        })
    }
}

/// One body entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A `name = expr` binding.
    Attribute(Attribute),
    /// A `type "label" { … }` construct.
    Block(Block),
}

impl Item {
    /// The full source span of the item.
    pub fn span(&self) -> Span {
        match self {
            Item::Attribute(attr) => attr.span,
            Item::Block(block) => block.span,
        }
    }
}

/// A `name = expr` binding inside a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,
    /// Span of the name identifier.
    pub name_span: Span,
    /// Span of the `=` sign.
    pub equals_span: Span,
    /// The right-hand side.
    pub expr: Expression,
    /// Span from the name through the end of the expression.
    pub span: Span,
}

/// A `type label* { body }` construct.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// The block type name.
    pub type_name: String,
    /// Span of the type identifier.
    pub type_span: Span,
    /// The quoted labels following the type, in order.
    pub labels: Vec<BlockLabel>,
    /// Span of the opening `{`.
    pub open_brace_span: Span,
    /// The nested body.
    pub body: Body,
    /// Span of the closing `}`.
    pub close_brace_span: Span,
    /// Span from the type name through the closing brace.
    pub span: Span,
}

/// A quoted string label on a block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLabel {
    /// The label text, unquoted but with escapes left as written.
    pub value: String,
    /// Span covering the quotes.
    pub span: Span,
}

/// An expression on the right-hand side of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A numeric literal.
    Number { value: f64, span: Span },
    /// `true` or `false`.
    Bool { value: bool, span: Span },
    /// `null`.
    Null { span: Span },
    /// A quoted or heredoc template, possibly with interpolations.
    Template {
        parts: Vec<TemplatePart>,
        heredoc: bool,
        span: Span,
    },
    /// A variable reference path such as `var.x[0]`.
    Traversal(Traversal),
    /// A function call.
    FunctionCall {
        name: String,
        name_span: Span,
        args: Vec<Expression>,
        span: Span,
    },
    /// A tuple constructor `[a, b, c]`.
    Tuple { items: Vec<Expression>, span: Span },
    /// An object constructor `{ k = v, … }`.
    Object {
        entries: Vec<ObjectEntry>,
        span: Span,
    },
    /// A unary operation.
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        span: Span,
    },
    /// A binary operation.
    Binary {
        lhs: Box<Expression>,
        op: BinaryOp,
        rhs: Box<Expression>,
        span: Span,
    },
    /// `cond ? a : b`.
    Conditional {
        cond: Box<Expression>,
        true_result: Box<Expression>,
        false_result: Box<Expression>,
        span: Span,
    },
    /// A parenthesized expression.
    Paren { inner: Box<Expression>, span: Span },
    /// `.name` applied to something other than a plain reference path.
    GetAttr {
        base: Box<Expression>,
        name: String,
        name_span: Span,
        span: Span,
    },
    /// `[key]` applied to something other than a plain reference path.
    Index {
        base: Box<Expression>,
        key: Box<Expression>,
        span: Span,
    },
    /// A region the parser could not understand; recovery placeholder.
    Invalid { span: Span },
}

impl Expression {
    /// The full source span of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::Number { span, .. }
            | Expression::Bool { span, .. }
            | Expression::Null { span }
            | Expression::Template { span, .. }
            | Expression::FunctionCall { span, .. }
            | Expression::Tuple { span, .. }
            | Expression::Object { span, .. }
            | Expression::Unary { span, .. }
            | Expression::Binary { span, .. }
            | Expression::Conditional { span, .. }
            | Expression::Paren { span, .. }
            | Expression::GetAttr { span, .. }
            | Expression::Index { span, .. }
            | Expression::Invalid { span } => *span,
            Expression::Traversal(trav) => trav.span,
        }
    }

    /// Every absolute variable reference mentioned anywhere inside this
    /// expression, in source order.
    pub fn variables(&self) -> Vec<Traversal> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Traversal>) {
        match self {
            Expression::Traversal(trav) => out.push(trav.clone()),
            Expression::Template { parts, .. } => {
                for part in parts {
                    if let TemplatePart::Interp { expr, .. } = part {
                        expr.collect_variables(out);
                    }
                }
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            Expression::Tuple { items, .. } => {
                for item in items {
                    item.collect_variables(out);
                }
            }
            Expression::Object { entries, .. } => {
                for entry in entries {
                    if let ObjectKey::Expr(key) = &entry.key {
                        key.collect_variables(out);
                    }
                    entry.value.collect_variables(out);
                }
            }
            Expression::Unary { operand, .. } => operand.collect_variables(out),
            Expression::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expression::Conditional {
                cond,
                true_result,
                false_result,
                ..
            } => {
                cond.collect_variables(out);
                true_result.collect_variables(out);
                false_result.collect_variables(out);
            }
            Expression::Paren { inner, .. } => inner.collect_variables(out),
            Expression::GetAttr { base, .. } => base.collect_variables(out),
            Expression::Index { base, key, .. } => {
                base.collect_variables(out);
                key.collect_variables(out);
            }
            Expression::Number { .. }
            | Expression::Bool { .. }
            | Expression::Null { .. }
            | Expression::Invalid { .. } => {}
        }
    }
}

/// One piece of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// A literal run.
    Literal { span: Span },
    /// A `${ … }` interpolation.
    Interp { expr: Expression, span: Span },
    /// A `%{ … }` control sequence. The contents are kept only as tokens;
    /// directives are not interpreted at this layer.
    Control { span: Span },
}

/// One `key = value` entry in an object constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    /// The key.
    pub key: ObjectKey,
    /// The value expression.
    pub value: Expression,
}

/// An object constructor key.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    /// A bare identifier key.
    Ident { name: String, span: Span },
    /// Any other expression used as a key.
    Expr(Expression),
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

/// An absolute reference path: a root identifier followed by attribute and
/// index steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    /// The root identifier.
    pub root: String,
    /// Span of the root identifier.
    pub root_span: Span,
    /// The steps applied to the root, in order.
    pub steps: Vec<TraversalStep>,
    /// Span from the root through the last step.
    pub span: Span,
}

/// One step of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalStep {
    /// `.name`
    Attr { name: String, span: Span },
    /// `[index]`
    Index { value: u64, span: Span },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pos, Span};

    fn sp() -> Span {
        Span::empty(Pos::start())
    }

    #[test]
    fn test_variables_collects_nested() {
        let trav = |root: &str| {
            Expression::Traversal(Traversal {
                root: root.to_string(),
                root_span: sp(),
                steps: Vec::new(),
                span: sp(),
            })
        };
        let expr = Expression::Binary {
            lhs: Box::new(trav("a")),
            op: BinaryOp::Add,
            rhs: Box::new(Expression::Tuple {
                items: vec![trav("b"), Expression::Number { value: 1.0, span: sp() }],
                span: sp(),
            }),
            span: sp(),
        };
        let roots: Vec<String> = expr.variables().into_iter().map(|t| t.root).collect();
        assert_eq!(roots, vec!["a".to_string(), "b".to_string()]);
    }
}
