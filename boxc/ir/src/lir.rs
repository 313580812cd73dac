//! The linear IR.
//!
//! A [`Lir`] is an append-only list of nodes: bound labels, branches, and
//! operations with up to three container operands. Instructions are appended
//! in strict program order; there is no reordering and no basic-block
//! structure. Labels are created unbound, may be referenced by branches
//! before or after binding, and must be bound exactly once before the stream
//! is lowered.

use crate::cont::Cont;
use crate::entities::Label;
use crate::genop::GenOp;
use crate::srcloc::SrcLoc;
use cranelift_entity::PrimaryMap;
use core::fmt;
use smallvec::SmallVec;

/// Operand list of one instruction.
pub type Operands = SmallVec<[Cont; 3]>;

/// One node of the stream.
#[derive(Clone, PartialEq, Debug)]
pub enum LirNode {
    /// A label bound at this point.
    Label(Label),
    /// A branch to a label.
    Branch {
        /// `Jc` or `Jmp`.
        op: GenOp,
        /// The target label.
        target: Label,
    },
    /// An operation with 0–3 operands.
    Op {
        /// The generic opcode.
        op: GenOp,
        /// The operands.
        args: Operands,
    },
}

/// A linear instruction stream under construction.
#[derive(Default)]
pub struct Lir {
    nodes: Vec<LirNode>,
    labels: PrimaryMap<Label, Option<u32>>,
    srclocs: Vec<SrcLoc>,
    cur_srcloc: SrcLoc,
}

impl Lir {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// State that subsequently appended nodes correspond to `loc`.
    pub fn set_srcloc(&mut self, loc: SrcLoc) {
        self.cur_srcloc = loc;
    }

    /// The source location recorded for the node at `idx`.
    pub fn srcloc(&self, idx: usize) -> SrcLoc {
        self.srclocs.get(idx).copied().unwrap_or_default()
    }

    /// Create a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None)
    }

    /// Bind `label` to the current emission point.
    ///
    /// Binding twice is a programming error; the box driver binds each
    /// pending label exactly once when its position becomes known.
    pub fn bind_label(&mut self, label: Label) {
        debug_assert!(
            self.labels[label].is_none(),
            "label {} bound twice",
            label
        );
        self.labels[label] = Some(self.nodes.len() as u32);
        self.srclocs.push(self.cur_srcloc);
        self.nodes.push(LirNode::Label(label));
    }

    /// Create a label and bind it right here.
    pub fn label_here(&mut self) -> Label {
        let label = self.new_label();
        self.bind_label(label);
        label
    }

    /// Whether `label` has been bound.
    pub fn is_bound(&self, label: Label) -> bool {
        self.labels[label].is_some()
    }

    /// Append an operation node.
    pub fn push_op(&mut self, op: GenOp, args: &[Cont]) {
        debug_assert!(!op.is_branch(), "branch {} appended as plain op", op);
        debug_assert!(args.len() <= 3);
        self.srclocs.push(self.cur_srcloc);
        self.nodes.push(LirNode::Op {
            op,
            args: SmallVec::from_slice(args),
        });
    }

    /// Append a branch node targeting `label`.
    pub fn push_branch(&mut self, op: GenOp, target: Label) {
        debug_assert!(op.is_branch(), "{} is not a branch", op);
        self.srclocs.push(self.cur_srcloc);
        self.nodes.push(LirNode::Branch { op, target });
    }

    /// The nodes, in emission order.
    pub fn nodes(&self) -> &[LirNode] {
        &self.nodes
    }

    /// Number of labels created so far.
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    /// Count the operation and branch nodes with the given opcode.
    pub fn count_op(&self, op: GenOp) -> usize {
        self.nodes
            .iter()
            .filter(|n| match n {
                LirNode::Op { op: o, .. } | LirNode::Branch { op: o, .. } => *o == op,
                LirNode::Label(_) => false,
            })
            .count()
    }
}

impl fmt::Display for Lir {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for node in &self.nodes {
            match node {
                LirNode::Label(l) => writeln!(f, "{}:", l)?,
                LirNode::Branch { op, target } => writeln!(f, "    {} {}", op, target)?,
                LirNode::Op { op, args } => {
                    write!(f, "    {}", op)?;
                    for (i, a) in args.iter().enumerate() {
                        if i == 0 {
                            write!(f, " {}", a)?;
                        } else {
                            write!(f, ", {}", a)?;
                        }
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cont::ContType;

    #[test]
    fn labels_bind_once_and_display() {
        let mut lir = Lir::new();
        let end = lir.new_label();
        assert!(!lir.is_bound(end));

        lir.push_op(GenOp::Mov, &[Cont::lreg(ContType::Int, 1), Cont::imm_int(7)]);
        lir.push_branch(GenOp::Jmp, end);
        lir.push_op(GenOp::Inc, &[Cont::lreg(ContType::Int, 1)]);
        lir.bind_label(end);
        assert!(lir.is_bound(end));

        let text = lir.to_string();
        assert_eq!(text, "    mov ri1, 7\n    jmp L0\n    inc ri1\nL0:\n");
        assert_eq!(lir.count_op(GenOp::Jmp), 1);
        assert_eq!(lir.count_op(GenOp::Mov), 1);
    }

    #[test]
    fn srclocs_stick_to_nodes() {
        let mut lir = Lir::new();
        lir.push_op(GenOp::Inc, &[Cont::lreg(ContType::Int, 1)]);
        lir.set_srcloc(SrcLoc::new(14));
        lir.push_op(GenOp::Dec, &[Cont::lreg(ContType::Int, 1)]);
        assert!(lir.srcloc(0).is_default());
        assert_eq!(lir.srcloc(1).offset(), Some(14));
        assert!(lir.srcloc(99).is_default());
    }

    #[test]
    fn backward_branch_to_bound_label() {
        let mut lir = Lir::new();
        let top = lir.label_here();
        lir.push_op(GenOp::Dec, &[Cont::lreg(ContType::Int, 1)]);
        lir.push_branch(GenOp::Jc, top);
        assert!(lir.is_bound(top));
        assert_eq!(lir.nodes().len(), 3);
    }
}
