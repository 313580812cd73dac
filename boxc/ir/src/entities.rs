//! Entity references used by the IR.
//!
//! Like the rest of the workspace these are compact `u32` newtypes rather
//! than Rust references; instructions stay `Copy` and the owning tables live
//! in [`crate::lir::Lir`] and in the VM.

use cranelift_entity::entity_impl;

/// An opaque reference to a jump label in a LIR stream.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);
entity_impl!(Label, "L");

/// The integer handle by which an installed procedure is invoked.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallNum(u32);
entity_impl!(CallNum, "call");
