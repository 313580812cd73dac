//! Intermediate representation of the Box compiler.
//!
//! This crate defines the three layers the emitter works with:
//!
//! - [`Cont`]: the operand container model: immediates, registers, and
//!   pointer-deref cells, each tagged with a storage type;
//! - [`GenOp`]: the generic opcode set shared by the emitter and the VM
//!   lowering;
//! - [`Lir`]: the append-only linear instruction stream with
//!   forward-declarable labels.
//!
//! The compiler appends to a `Lir` while walking the AST; the VM crate
//! lowers the finished stream into installable code, resolving labels to
//! instruction offsets.

#![warn(missing_docs)]

mod cont;
mod entities;
mod genop;
mod lir;
mod srcloc;

pub use crate::cont::{Cont, ContCateg, ContKind, ContType, Imm, RegNum};
pub use crate::entities::{CallNum, Label};
pub use crate::genop::GenOp;
pub use crate::lir::{Lir, LirNode, Operands};
pub use crate::srcloc::SrcLoc;
