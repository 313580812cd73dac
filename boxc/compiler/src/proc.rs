//! Procedures under construction.
//!
//! A `ProcCode` is the thing instructions are appended into: it owns the
//! LIR stream, the register allocator, the prototype registers for sub
//! procedures, and the install state. The main procedure draws its
//! variables from the global pool; sub procedures are fully local.

use crate::regalloc::RegAlloc;
use boxc_ir::{CallNum, Cont, ContType, GenOp, Lir, RegNum};
use boxc_vm::Frame;

/// Procedure style: prologue/epilogue policy and variable placement.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProcStyle {
    /// The module's main procedure; variables live in global registers.
    Main,
    /// A sub procedure with local variables and a parent/child prototype.
    Sub,
    /// Externally defined; never a compilation target.
    Extern,
}

/// A procedure being filled with instructions.
pub struct ProcCode {
    /// The style, fixed at creation.
    pub style: ProcStyle,
    /// The register allocator of this procedure.
    pub reg: RegAlloc,
    /// The instruction stream.
    pub lir: Lir,
    /// Display name, e.g. `Int@Print` or `main`.
    pub name: Option<String>,
    /// Call number, once allocated.
    pub call_num: Option<CallNum>,
    parent_reg: Option<RegNum>,
    child_reg: Option<RegNum>,
}

impl ProcCode {
    /// Create an empty procedure of the given style.
    pub fn new(style: ProcStyle) -> Self {
        Self {
            style,
            reg: RegAlloc::new(),
            lir: Lir::new(),
            name: None,
            call_num: None,
            parent_reg: None,
            child_reg: None,
        }
    }

    /// Set the prototype of a sub procedure and emit the argument-binding
    /// prologue: the caller passes parent and child in the two well-known
    /// global object registers, which are copied into local registers here.
    pub fn set_prototype(&mut self, have_child: bool, have_parent: bool) {
        debug_assert_eq!(self.style, ProcStyle::Sub);
        if have_parent {
            let reg = self.reg.occupy_temp(ContType::Obj);
            self.lir.push_op(
                GenOp::Ref,
                &[Cont::lreg(ContType::Obj, reg), Cont::greg(ContType::Obj, 1)],
            );
            self.parent_reg = Some(reg);
        }
        if have_child {
            let reg = self.reg.occupy_temp(ContType::Obj);
            self.lir.push_op(
                GenOp::Ref,
                &[Cont::lreg(ContType::Obj, reg), Cont::greg(ContType::Obj, 2)],
            );
            self.child_reg = Some(reg);
        }
    }

    /// The local register holding the parent pointer, if the prototype has
    /// one.
    pub fn parent_reg(&self) -> Option<RegNum> {
        self.parent_reg
    }

    /// The local register holding the child pointer, if the prototype has
    /// one.
    pub fn child_reg(&self) -> Option<RegNum> {
        self.child_reg
    }

    /// The frame counts for the install-time prologue.
    pub fn frame(&self) -> Frame {
        Frame {
            counts: self.reg.frame_counts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prototype_binds_parent_then_child() {
        let mut proc = ProcCode::new(ProcStyle::Sub);
        proc.set_prototype(true, true);
        assert_eq!(proc.parent_reg(), Some(1));
        assert_eq!(proc.child_reg(), Some(2));
        assert_eq!(proc.lir.to_string(), "    ref ro1, gro1\n    ref ro2, gro2\n");
    }

    #[test]
    fn childless_prototype_skips_the_child_register() {
        let mut proc = ProcCode::new(ProcStyle::Sub);
        proc.set_prototype(false, true);
        assert_eq!(proc.parent_reg(), Some(1));
        assert_eq!(proc.child_reg(), None);
    }

    #[test]
    fn frame_reflects_allocator_counts() {
        let mut proc = ProcCode::new(ProcStyle::Main);
        proc.reg.occupy_var(ContType::Int);
        let t = proc.reg.occupy_temp(ContType::Real);
        proc.reg.release_temp(ContType::Real, t);
        let frame = proc.frame();
        assert_eq!(frame.counts[1], (1, 0));
        assert_eq!(frame.counts[2], (0, 1));
    }
}
