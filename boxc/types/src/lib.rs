//! Type system service of the Box compiler.
//!
//! The compiler core only ever talks to this crate through the [`TypeStore`]
//! API: creating types, resolving through identifier/species/raised layers,
//! comparing for overload and combination matching, iterating structure
//! members (whose layout is computed here and nowhere else), and managing
//! combinations: the type-bound procedures that are the only way behaviour
//! attaches to a type.

#![warn(missing_docs)]

mod combs;
mod store;

pub use crate::combs::{Comb, CombKind};
pub use crate::store::{
    Resolve, StructMember, Type, TypeClass, TypeCmp, TypeStore, ANY_SIZE, PTR_SIZE, SUBTYPE_SIZE,
};
