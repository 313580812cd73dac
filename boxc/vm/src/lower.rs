//! Lowering from LIR to installable instructions.
//!
//! Lowering is a two-pass walk over the stream. The first pass assigns an
//! instruction index to every emitted node and records where each label
//! lands (a label binds to the index of the instruction that follows it);
//! the second pass emits the instructions, resolving branch targets. The
//! register-frame prologue is synthesized in front from the final allocator
//! counts, and a `ret` is appended; the prologue cannot be emitted earlier
//! because register counts are only known once the procedure body is
//! complete.

use crate::vm::{Frame, InstallError, Instr};
use boxc_ir::{ContType, Label, Lir, LirNode, SrcLoc};
use rustc_hash::FxHashMap;

/// The result of lowering: instructions plus their source locations.
#[derive(Debug)]
pub struct LoweredCode {
    /// The lowered instructions.
    pub code: Vec<Instr>,
    /// One source location per instruction.
    pub srclocs: Vec<SrcLoc>,
}

/// Lower a finished LIR stream into VM instructions.
pub fn lower(lir: &Lir, frame: &Frame) -> Result<LoweredCode, InstallError> {
    let mut code = Vec::new();
    let mut srclocs = Vec::new();
    for (class, &(vars, temps)) in ContType::REG_CLASSES.iter().zip(frame.counts.iter()) {
        if vars > 0 || temps > 0 {
            code.push(Instr::New {
                ty: *class,
                vars,
                temps,
            });
            srclocs.push(SrcLoc::default_loc());
        }
    }
    let base = code.len() as u32;

    // First pass: label positions in instruction-index space.
    let mut positions: FxHashMap<Label, u32> = FxHashMap::default();
    let mut pc = base;
    for node in lir.nodes() {
        match node {
            LirNode::Label(l) => {
                positions.insert(*l, pc);
            }
            LirNode::Branch { .. } | LirNode::Op { .. } => pc += 1,
        }
    }

    // Second pass: emit.
    for (idx, node) in lir.nodes().iter().enumerate() {
        match node {
            LirNode::Label(_) => continue,
            LirNode::Branch { op, target } => {
                let target = *positions
                    .get(target)
                    .ok_or(InstallError::UnboundLabel(*target))?;
                code.push(Instr::Jump { op: *op, target });
            }
            LirNode::Op { op, args } => code.push(Instr::Op {
                op: *op,
                args: args.clone(),
            }),
        }
        srclocs.push(lir.srcloc(idx));
    }
    code.push(Instr::Ret);
    srclocs.push(SrcLoc::default_loc());
    debug_assert_eq!(code.len(), srclocs.len());
    Ok(LoweredCode { code, srclocs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxc_ir::{Cont, ContType as CT, GenOp};

    #[test]
    fn labels_resolve_past_the_prologue() {
        let mut lir = Lir::new();
        let end = lir.new_label();
        lir.push_op(GenOp::Mov, &[Cont::lreg(CT::Int, 1), Cont::imm_int(1)]);
        lir.push_branch(GenOp::Jmp, end);
        lir.push_op(GenOp::Inc, &[Cont::lreg(CT::Int, 1)]);
        lir.bind_label(end);

        let mut frame = Frame::default();
        frame.counts[1] = (0, 1); // one Int temporary
        let lowered = lower(&lir, &frame).unwrap();
        let code = &lowered.code;

        assert_eq!(
            code[0],
            Instr::New {
                ty: CT::Int,
                vars: 0,
                temps: 1
            }
        );
        // jmp lands one past the inc: the synthesized ret.
        assert_eq!(code[2], Instr::Jump { op: GenOp::Jmp, target: 4 });
        assert_eq!(code.last(), Some(&Instr::Ret));
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut lir = Lir::new();
        let dangling = lir.new_label();
        lir.push_branch(GenOp::Jc, dangling);
        let err = lower(&lir, &Frame::default()).unwrap_err();
        assert!(matches!(err, InstallError::UnboundLabel(_)));
    }

    #[test]
    fn empty_frame_has_no_prologue() {
        let lir = Lir::new();
        let lowered = lower(&lir, &Frame::default()).unwrap();
        assert_eq!(lowered.code, vec![Instr::Ret]);
    }

    #[test]
    fn srclocs_travel_through_lowering() {
        let mut lir = Lir::new();
        lir.set_srcloc(SrcLoc::new(7));
        lir.push_op(GenOp::Inc, &[Cont::lreg(CT::Int, 1)]);

        let mut frame = Frame::default();
        frame.counts[1] = (0, 1);
        let lowered = lower(&lir, &frame).unwrap();
        // Prologue carries no location; the inc keeps its own.
        assert!(lowered.srclocs[0].is_default());
        assert_eq!(lowered.srclocs[1].offset(), Some(7));
    }
}
