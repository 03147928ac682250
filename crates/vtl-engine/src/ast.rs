/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! This module defines the abstract syntax tree for parsed templates.
//! Every node carries the 1-based line it came from, for diagnostics.
//! Trees are immutable once built; evaluation never modifies them.

use crate::value::Value;
use std::collections::HashMap;

/// A node in a template body. Evaluating it produces text.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Produces no output.
    Empty { line: usize },

    /// Literal text to be output as-is.
    Text(Text),

    /// A reference (or other expression) interpolated into the output.
    Expression(Expr),

    /// Sibling nodes whose outputs are concatenated.
    Concat(Concat),

    /// `#if (cond) ... #elseif (cond) ... #else ... #end`
    If(If),

    /// `#foreach ($var in expr) ... #end`
    ForEach(ForEach),

    /// `#set ($var = expr)`
    Set(Set),

    /// `#name(args...)`
    MacroCall(MacroCall),
}

impl Node {
    pub fn line(&self) -> usize {
        match self {
            Node::Empty { line } => *line,
            Node::Text(text) => text.line,
            Node::Expression(expr) => expr.line,
            Node::Concat(concat) => concat.line,
            Node::If(node) => node.line,
            Node::ForEach(node) => node.line,
            Node::Set(node) => node.line,
            Node::MacroCall(node) => node.line,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty { .. })
    }

    /// Join nodes in order. Empty nodes vanish; a single survivor is
    /// returned unwrapped, and nested concatenations are flattened.
    pub fn concat(line: usize, nodes: Vec<Node>) -> Node {
        let mut flat = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Empty { .. } => {}
                Node::Concat(Concat { nodes, .. }) => flat.extend(nodes),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Node::Empty { line },
            1 => flat.pop().unwrap_or(Node::Empty { line }),
            _ => Node::Concat(Concat {
                line: flat[0].line(),
                nodes: flat,
            }),
        }
    }

    /// Number of nodes in this tree, counting this one.
    pub fn size(&self) -> usize {
        1 + match self {
            Node::Concat(concat) => concat.nodes.iter().map(Node::size).sum(),
            Node::If(node) => node.then_branch.size() + node.else_branch.size(),
            Node::ForEach(node) => node.body.size(),
            _ => 0,
        }
    }
}

/// Literal text node.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub text: String,
    pub line: usize,
}

/// Concatenation of sibling nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Concat {
    pub nodes: Vec<Node>,
    pub line: usize,
}

/// Conditional. `#elseif` chains are nested `If`s in the else branch.
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub condition: Expr,
    pub then_branch: Box<Node>,
    pub else_branch: Box<Node>,
    pub line: usize,
}

/// Loop over a list, or the values of a map.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEach {
    /// Loop variable name, without the `$`.
    pub var: String,
    pub collection: Expr,
    pub body: Box<Node>,
    pub line: usize,
}

/// Assignment. Renders as the empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    pub var: String,
    pub value: Expr,
    pub line: usize,
}

/// Invocation of a macro, by name.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub line: usize,
}

/// A macro definition, extracted from the tree at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    /// Parameter names, without the `$`.
    pub parameters: Vec<String>,
    pub body: Node,
    /// Line of the `#macro` directive.
    pub line: usize,
}

/// Macros of a template, by name.
pub type MacroTable = HashMap<String, Macro>;

/// An expression. Evaluating it produces a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// String, integer or boolean literal.
    Constant(Value),

    Reference(Reference),

    /// `[a, b, c]`
    List(Vec<Expr>),

    /// `[from..to]`, inclusive in either direction.
    Range(Box<Expr>, Box<Expr>),

    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// `!expr`
    Not(Box<Expr>),

    /// `-expr`
    Negate(Box<Expr>),
}

/// Primitive binary operators. `!=`, `<=`, `>` and `>=` are built from
/// `Equals` and `Less` by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equals,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

impl Expr {
    pub fn constant(value: impl Into<Value>, line: usize) -> Self {
        Self {
            kind: ExprKind::Constant(value.into()),
            line,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self {
            line: lhs.line,
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    pub fn not(operand: Expr) -> Self {
        Self {
            line: operand.line,
            kind: ExprKind::Not(Box::new(operand)),
        }
    }

    pub fn negate(operand: Expr) -> Self {
        Self {
            line: operand.line,
            kind: ExprKind::Negate(Box::new(operand)),
        }
    }
}

impl From<Reference> for Expr {
    fn from(reference: Reference) -> Self {
        Self {
            line: reference.line,
            kind: ExprKind::Reference(reference),
        }
    }
}

/// A `$`-reference: a variable followed by any chain of suffixes,
/// e.g. `$x.foo()[0].bar`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceKind {
    /// `$name`
    Plain(String),

    /// `lhs.name`
    Member { lhs: Box<Reference>, name: String },

    /// `lhs.name(args...)`
    Method {
        lhs: Box<Reference>,
        name: String,
        args: Vec<Expr>,
    },

    /// `lhs[index]`
    Index { lhs: Box<Reference>, index: Box<Expr> },
}

impl Reference {
    pub fn plain(name: impl Into<String>, line: usize) -> Self {
        Self {
            kind: ReferenceKind::Plain(name.into()),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str, line: usize) -> Node {
        Node::Text(Text {
            text: s.to_string(),
            line,
        })
    }

    // ========================================================================
    // Concatenation tests
    // ========================================================================

    #[test]
    fn test_concat_of_nothing_is_empty() {
        let node = Node::concat(3, vec![]);
        assert_eq!(node, Node::Empty { line: 3 });
    }

    #[test]
    fn test_concat_drops_empty_nodes() {
        let node = Node::concat(
            1,
            vec![Node::Empty { line: 1 }, text("a", 1), Node::Empty { line: 2 }],
        );
        assert_eq!(node, text("a", 1));
    }

    #[test]
    fn test_concat_flattens() {
        let inner = Node::concat(1, vec![text("a", 1), text("b", 1)]);
        let node = Node::concat(1, vec![inner, text("c", 2)]);

        match node {
            Node::Concat(concat) => {
                assert_eq!(concat.nodes, vec![text("a", 1), text("b", 1), text("c", 2)]);
                assert_eq!(concat.line, 1);
            }
            other => panic!("expected concatenation, got {other:?}"),
        }
    }

    #[test]
    fn test_size() {
        let node = Node::concat(1, vec![text("a", 1), text("b", 1)]);
        assert_eq!(node.size(), 3);
        assert_eq!(Node::Empty { line: 1 }.size(), 1);
    }

    // ========================================================================
    // Expression / reference tests
    // ========================================================================

    #[test]
    fn test_binary_takes_lhs_line() {
        let expr = Expr::binary(BinaryOp::Add, Expr::constant(1, 4), Expr::constant(2, 5));
        assert_eq!(expr.line, 4);
    }
}
