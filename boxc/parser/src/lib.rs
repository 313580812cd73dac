//! Lexer and parser for the Box language.
//!
//! The parser is a hand-rolled recursive-descent walk over a token vector,
//! producing [`boxc_ast`] trees. It reports the first error it cannot
//! recover from as a [`ParseError`] with a source span; semantic checking is
//! entirely the compiler's business.

#![warn(missing_docs)]

mod lexer;
mod parser;

pub use crate::lexer::{tokenize, Tok, Token};
pub use crate::parser::{parse, parse_expr};

use boxc_ast::Span;

/// Errors produced while lexing or parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A character that cannot start any token.
    #[error("unexpected character `{ch}` at {span}")]
    BadCharacter {
        /// The offending character.
        ch: char,
        /// Where it appeared.
        span: Span,
    },
    /// A numeric literal that does not fit its type.
    #[error("invalid numeric literal at {span}")]
    BadNumber {
        /// Where it appeared.
        span: Span,
    },
    /// An unknown escape sequence in a character or string literal.
    #[error("invalid escape sequence at {span}")]
    BadEscape {
        /// Where it appeared.
        span: Span,
    },
    /// A character literal missing its closing quote.
    #[error("unterminated character literal at {span}")]
    UnterminatedChar {
        /// Where it started.
        span: Span,
    },
    /// A string literal missing its closing quote.
    #[error("unterminated string literal at {span}")]
    UnterminatedString {
        /// Where it started.
        span: Span,
    },
    /// A block comment missing its `*/`.
    #[error("unterminated comment at {span}")]
    UnterminatedComment {
        /// Where it started.
        span: Span,
    },
    /// `()` with nothing inside.
    #[error("empty parentheses at {span}")]
    EmptyParens {
        /// Where they appeared.
        span: Span,
    },
    /// Any other mismatch between the input and the grammar.
    #[error("found {found}, expected {expected} at {span}")]
    UnexpectedToken {
        /// Description of what was found.
        found: String,
        /// What the parser wanted.
        expected: &'static str,
        /// Where it happened.
        span: Span,
    },
}

impl ParseError {
    /// The source span the error points at.
    pub fn span(&self) -> Span {
        match self {
            ParseError::BadCharacter { span, .. }
            | ParseError::BadNumber { span }
            | ParseError::BadEscape { span }
            | ParseError::UnterminatedChar { span }
            | ParseError::UnterminatedString { span }
            | ParseError::UnterminatedComment { span }
            | ParseError::EmptyParens { span }
            | ParseError::UnexpectedToken { span, .. } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxc_ast::{BinOp, CompoundKind, ExprKind, Sep, UnOp};

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let e = parse_expr("1 + 2 * 3").unwrap();
        let ExprKind::BinOp { op: BinOp::Add, rhs, .. } = &e.kind else {
            panic!("expected +, got {:?}", e.kind);
        };
        assert!(matches!(rhs.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = parse_expr("a = b = 1").unwrap();
        let ExprKind::BinOp { op: BinOp::Assign, rhs, .. } = &e.kind else {
            panic!("expected =");
        };
        assert!(matches!(
            rhs.kind,
            ExprKind::BinOp { op: BinOp::Assign, .. }
        ));
    }

    #[test]
    fn statements_and_separators() {
        let program = parse("a = 10, b = a + 1; Print[b]").unwrap();
        assert_eq!(program.stmts.len(), 3);
        assert_eq!(program.stmts[0].sep, Sep::None);
        assert_eq!(program.stmts[1].sep, Sep::Plain);
        assert_eq!(program.stmts[2].sep, Sep::Pause);
    }

    #[test]
    fn newlines_separate_statements() {
        let program = parse("a = 1\nb = 2\n\n c = 3\n").unwrap();
        assert_eq!(program.stmts.len(), 3);
        assert_eq!(program.stmts[2].sep, Sep::Plain);
    }

    #[test]
    fn box_with_parent_and_nested_statements() {
        let e = parse_expr("Print[1 + 2 * 3]").unwrap();
        let ExprKind::Box(node) = &e.kind else {
            panic!("expected a box");
        };
        let parent = node.parent.as_ref().unwrap();
        assert!(matches!(parent.kind, ExprKind::TypeIdfr(ref n) if n == "Print"));
        assert_eq!(node.stmts.len(), 1);
    }

    #[test]
    fn bare_type_statement_becomes_keyword() {
        let program = parse("Else").unwrap();
        let expr = program.stmts[0].expr.as_ref().unwrap();
        assert!(matches!(expr.kind, ExprKind::Keyword(_)));
    }

    #[test]
    fn member_access_and_subtypes() {
        let e = parse_expr("p.x").unwrap();
        assert!(matches!(e.kind, ExprKind::Get { parent: Some(_), .. }));

        let e = parse_expr(".x").unwrap();
        assert!(matches!(e.kind, ExprKind::Get { parent: None, .. }));

        let e = parse_expr("Point.Y").unwrap();
        assert!(matches!(e.kind, ExprKind::Subtype { parent: Some(_), .. }));
        assert!(e.is_type_expr());
    }

    #[test]
    fn arg_access_depths() {
        assert!(matches!(
            parse_expr("$").unwrap().kind,
            ExprKind::ArgGet { depth: 1 }
        ));
        assert!(matches!(
            parse_expr("$$").unwrap().kind,
            ExprKind::ArgGet { depth: 2 }
        ));
        assert!(matches!(
            parse_expr("$3").unwrap().kind,
            ExprKind::ArgGet { depth: 3 }
        ));
    }

    #[test]
    fn compound_kinds() {
        let e = parse_expr("(1)").unwrap();
        assert!(matches!(
            e.kind,
            ExprKind::Compound {
                kind: CompoundKind::Identity,
                ..
            }
        ));

        let e = parse_expr("(1, 2.5)").unwrap();
        let ExprKind::Compound { kind, members } = &e.kind else {
            panic!()
        };
        assert_eq!(*kind, CompoundKind::Struct);
        assert_eq!(members.len(), 2);

        let e = parse_expr("(Int => Real)").unwrap();
        assert!(matches!(
            e.kind,
            ExprKind::Compound {
                kind: CompoundKind::Species,
                ..
            }
        ));
        assert!(e.is_type_expr());
    }

    #[test]
    fn named_structure_members_inherit_types() {
        let e = parse_expr("(Real a, b)").unwrap();
        let ExprKind::Compound { kind, members } = &e.kind else {
            panic!()
        };
        assert_eq!(*kind, CompoundKind::Struct);
        assert_eq!(members[0].name.as_ref().unwrap().name, "a");
        assert!(members[0].expr.is_some());
        assert_eq!(members[1].name.as_ref().unwrap().name, "b");
        assert!(members[1].expr.is_none());
        assert!(e.is_type_expr());
    }

    #[test]
    fn empty_parens_are_rejected() {
        assert!(matches!(
            parse_expr("()"),
            Err(ParseError::EmptyParens { .. })
        ));
    }

    #[test]
    fn comb_def_forms() {
        let e = parse_expr("Int@Print ? \"box_print_int\"").unwrap();
        let ExprKind::CombDef { c_name, body, .. } = &e.kind else {
            panic!("expected a combination definition");
        };
        assert_eq!(c_name.as_ref().unwrap().0, "box_print_int");
        assert!(body.is_none());

        let e = parse_expr("Int@MyType[$$ = $]").unwrap();
        let ExprKind::CombDef { body, .. } = &e.kind else {
            panic!()
        };
        assert_eq!(body.as_ref().unwrap().stmts.len(), 1);
    }

    #[test]
    fn unary_type_operators() {
        assert!(matches!(
            parse_expr("&Int").unwrap().kind,
            ExprKind::UnTypeOp { op: UnOp::Ref, .. }
        ));
        assert!(matches!(
            parse_expr("&x").unwrap().kind,
            ExprKind::UnOp { op: UnOp::Ref, .. }
        ));
        assert!(matches!(
            parse_expr("-x").unwrap().kind,
            ExprKind::UnOp { op: UnOp::Neg, .. }
        ));
    }

    #[test]
    fn postfix_increment() {
        let e = parse_expr("i++").unwrap();
        assert!(matches!(e.kind, ExprKind::UnOp { op: UnOp::RInc, .. }));
    }

    #[test]
    fn trailing_pause_separator_is_kept() {
        let e = parse_expr("X[1;]").unwrap();
        let ExprKind::Box(node) = &e.kind else { panic!() };
        assert_eq!(node.stmts.len(), 2);
        assert_eq!(node.stmts[1].sep, Sep::Pause);
        assert!(node.stmts[1].expr.is_none());
    }
}
