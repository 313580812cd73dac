//! Tree printing.
//!
//! `Display` for expressions renders an indented node-per-line dump, the
//! form the CLI's `--dump-ast` shows. It is a structural dump, not a
//! pretty-printer: every node names its kind and payload, one per line.

use crate::{BoxNode, Expr, ExprKind, Sep, Stmt};
use core::fmt;

fn indent(f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("  ")?;
    }
    Ok(())
}

fn write_stmts(f: &mut fmt::Formatter, stmts: &[Stmt], depth: usize) -> fmt::Result {
    for stmt in stmts {
        indent(f, depth)?;
        match stmt.sep {
            Sep::None => writeln!(f, "stmt")?,
            Sep::Plain => writeln!(f, "stmt ','")?,
            Sep::Pause => writeln!(f, "stmt ';'")?,
        }
        match &stmt.expr {
            Some(expr) => write_expr(f, expr, depth + 1)?,
            None => {
                indent(f, depth + 1)?;
                writeln!(f, "(empty)")?;
            }
        }
    }
    Ok(())
}

fn write_box(f: &mut fmt::Formatter, node: &BoxNode, depth: usize) -> fmt::Result {
    match &node.parent {
        Some(parent) => {
            indent(f, depth)?;
            writeln!(f, "parent")?;
            write_expr(f, parent, depth + 1)?;
        }
        None => {
            indent(f, depth)?;
            writeln!(f, "parent (implicit)")?;
        }
    }
    write_stmts(f, &node.stmts, depth)
}

fn write_expr(f: &mut fmt::Formatter, expr: &Expr, depth: usize) -> fmt::Result {
    indent(f, depth)?;
    match &expr.kind {
        ExprKind::CharImm(c) => writeln!(f, "char {:?}", *c as char),
        ExprKind::IntImm(i) => writeln!(f, "int {}", i),
        ExprKind::RealImm(r) => writeln!(f, "real {:?}", r),
        ExprKind::StrImm(s) => writeln!(f, "str {:?}", s),
        ExprKind::VarIdfr(name) => writeln!(f, "var `{}`", name),
        ExprKind::TypeIdfr(name) => writeln!(f, "type `{}`", name),
        ExprKind::TypeTag(tag) => writeln!(f, "typetag {:?}", tag),
        ExprKind::Keyword(inner) => {
            writeln!(f, "keyword")?;
            write_expr(f, inner, depth + 1)
        }
        ExprKind::Ignore(inner) => {
            writeln!(f, "ignore")?;
            write_expr(f, inner, depth + 1)
        }
        ExprKind::UnOp { op, operand } => {
            writeln!(f, "unop `{}`", op)?;
            write_expr(f, operand, depth + 1)
        }
        ExprKind::UnTypeOp { op, operand } => {
            writeln!(f, "untypeop `{}`", op)?;
            write_expr(f, operand, depth + 1)
        }
        ExprKind::BinOp { op, lhs, rhs } => {
            writeln!(f, "binop `{}`", op)?;
            write_expr(f, lhs, depth + 1)?;
            write_expr(f, rhs, depth + 1)
        }
        ExprKind::Get { parent, name } => {
            writeln!(f, "get `.{}`", name.name)?;
            match parent {
                Some(parent) => write_expr(f, parent, depth + 1),
                None => Ok(()),
            }
        }
        ExprKind::ArgGet { depth: n } => writeln!(f, "arg ${}", n),
        ExprKind::Subtype { parent, name } => {
            writeln!(f, "subtype `.{}`", name.name)?;
            match parent {
                Some(parent) => write_expr(f, parent, depth + 1),
                None => Ok(()),
            }
        }
        ExprKind::Box(node) => {
            writeln!(f, "box")?;
            write_box(f, node, depth + 1)
        }
        ExprKind::CombDef {
            child,
            parent,
            c_name,
            body,
        } => {
            match c_name {
                Some((name, _)) => writeln!(f, "combdef ? {:?}", name)?,
                None => writeln!(f, "combdef")?,
            }
            write_expr(f, child, depth + 1)?;
            write_expr(f, parent, depth + 1)?;
            if let Some(body) = body {
                indent(f, depth + 1)?;
                writeln!(f, "body")?;
                write_box(f, body, depth + 2)?;
            }
            Ok(())
        }
        ExprKind::Compound { kind, members } => {
            writeln!(f, "compound {:?}", kind)?;
            for member in members {
                indent(f, depth + 1)?;
                match &member.name {
                    Some(name) => writeln!(f, "member `{}`", name.name)?,
                    None => writeln!(f, "member")?,
                }
                if let Some(expr) = &member.expr {
                    write_expr(f, expr, depth + 2)?;
                }
            }
            Ok(())
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

impl fmt::Display for BoxNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_box(f, self, 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Expr, ExprKind, Span, UnOp};

    #[test]
    fn dump_is_indented_per_level() {
        let inner = Expr::new(ExprKind::IntImm(3), Span::NONE);
        let outer = Expr::new(
            ExprKind::UnOp {
                op: UnOp::Neg,
                operand: Box::new(inner),
            },
            Span::NONE,
        );
        assert_eq!(outer.to_string(), "unop `-`\n  int 3\n");
    }
}
