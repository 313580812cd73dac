//! Abstract syntax tree for the Box language.
//!
//! The parser produces this tree and the compiler walks it, one handler per
//! node kind. Nodes are a sum type (`ExprKind`) so that the walker can match
//! exhaustively; there is no "unknown node" escape hatch. Every node carries
//! a [`Span`] into the source text for diagnostics.
//!
//! The tree distinguishes *value* positions from *type* positions
//! structurally: [`Expr::is_type_expr`] answers whether a node denotes a
//! type, which drives the struct-value vs. struct-type and value-assignment
//! vs. type-assignment splits in the compiler.

#![warn(missing_docs)]

mod ops;
mod print;
mod span;

pub use crate::ops::{BinOp, UnOp};
pub use crate::span::{line_col, Span};

/// An identifier together with its source span.
#[derive(Clone, PartialEq, Debug)]
pub struct Ident {
    /// The identifier text.
    pub name: String,
    /// Where it appeared.
    pub span: Span,
}

impl Ident {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Tags naming the compiler's core types directly, bypassing the namespace.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CoreTag {
    /// The `Char` type.
    Char,
    /// The `Int` type.
    Int,
    /// The `Real` type.
    Real,
    /// The `Point` type.
    Point,
    /// The `Str` type.
    Str,
    /// The `Void` type.
    Void,
    /// The `Any` type.
    Any,
    /// The `If` control type.
    If,
    /// The `Else` control type.
    Else,
    /// The `For` control type.
    For,
    /// The box-opening marker type.
    Begin,
    /// The box-closing marker type.
    End,
    /// The statement-pause marker type.
    Pause,
}

/// Statement separators inside a box.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Sep {
    /// No separator (first statement).
    None,
    /// `,` or newline.
    Plain,
    /// `;`: re-invokes the parent's `Pause` combination.
    Pause,
}

/// One statement of a box.
#[derive(Clone, PartialEq, Debug)]
pub struct Stmt {
    /// The separator *preceding* this statement.
    pub sep: Sep,
    /// Span of the separator, for pause diagnostics.
    pub sep_span: Span,
    /// The statement expression; `None` for an empty statement.
    pub expr: Option<Expr>,
}

/// A box: an ordered statement list under an optional parent expression.
#[derive(Clone, PartialEq, Debug)]
pub struct BoxNode {
    /// The parent expression, if written (`X[...]` vs. `[...]`).
    pub parent: Option<Box<Expr>>,
    /// The statements, in source order.
    pub stmts: Vec<Stmt>,
}

/// The kind of a compound `( ... )` node.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompoundKind {
    /// A parenthesised expression; exactly one unnamed member.
    Identity,
    /// A tuple-like structure value or structure type.
    Struct,
    /// A species type (`(A => B => C)`).
    Species,
}

/// One member of a compound node.
#[derive(Clone, PartialEq, Debug)]
pub struct Member {
    /// Optional member name (structure types only).
    pub name: Option<Ident>,
    /// The member expression; `None` when a named member inherits the
    /// preceding member's type (`(Real a, b)`).
    pub expr: Option<Expr>,
    /// Source range of the whole member.
    pub span: Span,
}

/// An expression node: a kind plus its source span.
#[derive(Clone, PartialEq, Debug)]
pub struct Expr {
    /// What the node is.
    pub kind: ExprKind,
    /// Where it appeared.
    pub span: Span,
}

/// The per-kind payload of an expression node.
#[derive(Clone, PartialEq, Debug)]
pub enum ExprKind {
    /// A character immediate.
    CharImm(u8),
    /// An integer immediate.
    IntImm(i64),
    /// A real immediate.
    RealImm(f64),
    /// A string immediate.
    StrImm(String),
    /// A lowercase identifier in value position.
    VarIdfr(String),
    /// An uppercase identifier in type position.
    TypeIdfr(String),
    /// A core type named directly.
    TypeTag(CoreTag),
    /// A type expression used in value position: instantiates the type.
    Keyword(Box<Expr>),
    /// Marks the operand's result as explicitly ignorable.
    Ignore(Box<Expr>),
    /// A unary operation on a value.
    UnOp {
        /// The operator.
        op: UnOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A unary operation on a type (`^T`, `&T`, `*T`).
    UnTypeOp {
        /// The operator.
        op: UnOp,
        /// The operand type expression.
        operand: Box<Expr>,
    },
    /// A binary operation.
    BinOp {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Structure member access; `parent` is `None` for the implicit `#`.
    Get {
        /// The structure expression, or `None` for `.name` forms.
        parent: Option<Box<Expr>>,
        /// The member name.
        name: Ident,
    },
    /// Access to the combination arguments: `$` (1), `$$` (2), `$3`, ...
    ArgGet {
        /// Nesting depth; 1 is the child, 2 the parent.
        depth: u32,
    },
    /// A subtype reference, `Parent.Name`; `parent` `None` means `#`.
    Subtype {
        /// The parent expression.
        parent: Option<Box<Expr>>,
        /// The subtype name.
        name: Ident,
    },
    /// A box.
    Box(BoxNode),
    /// A combination definition, `Child@Parent ? "c_name" [body]`.
    CombDef {
        /// The child type expression.
        child: Box<Expr>,
        /// The parent type expression.
        parent: Box<Expr>,
        /// Optional external C-symbol name.
        c_name: Option<(String, Span)>,
        /// Optional implementation body.
        body: Option<BoxNode>,
    },
    /// A compound: parenthesised expression, structure, or species.
    Compound {
        /// What the compound denotes.
        kind: CompoundKind,
        /// The members, in source order.
        members: Vec<Member>,
    },
}

impl Expr {
    /// Build an expression node.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether the node denotes a type rather than a value.
    pub fn is_type_expr(&self) -> bool {
        match &self.kind {
            ExprKind::TypeIdfr(_) | ExprKind::TypeTag(_) | ExprKind::UnTypeOp { .. } => true,
            ExprKind::Subtype { parent, .. } => {
                parent.as_deref().map_or(false, Expr::is_type_expr)
            }
            ExprKind::Compound { kind, members } => match kind {
                CompoundKind::Species => true,
                CompoundKind::Identity => members
                    .first()
                    .and_then(|m| m.expr.as_ref())
                    .map_or(false, Expr::is_type_expr),
                CompoundKind::Struct => members.iter().all(|m| {
                    m.name.is_some()
                        || m.expr.as_ref().map_or(false, Expr::is_type_expr)
                }),
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_idfr(name: &str) -> Expr {
        Expr::new(ExprKind::TypeIdfr(name.to_string()), Span::NONE)
    }

    #[test]
    fn type_position_detection() {
        assert!(type_idfr("Int").is_type_expr());
        assert!(!Expr::new(ExprKind::IntImm(3), Span::NONE).is_type_expr());

        let sub = Expr::new(
            ExprKind::Subtype {
                parent: Some(Box::new(type_idfr("Point"))),
                name: Ident::new("Origin", Span::NONE),
            },
            Span::NONE,
        );
        assert!(sub.is_type_expr());

        let struc_ty = Expr::new(
            ExprKind::Compound {
                kind: CompoundKind::Struct,
                members: vec![
                    Member {
                        name: Some(Ident::new("x", Span::NONE)),
                        expr: Some(type_idfr("Real")),
                        span: Span::NONE,
                    },
                    Member {
                        name: Some(Ident::new("y", Span::NONE)),
                        expr: None,
                        span: Span::NONE,
                    },
                ],
            },
            Span::NONE,
        );
        assert!(struc_ty.is_type_expr());

        let struc_val = Expr::new(
            ExprKind::Compound {
                kind: CompoundKind::Struct,
                members: vec![Member {
                    name: None,
                    expr: Some(Expr::new(ExprKind::IntImm(1), Span::NONE)),
                    span: Span::NONE,
                }],
            },
            Span::NONE,
        );
        assert!(!struc_val.is_type_expr());
    }
}
