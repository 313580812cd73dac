//! The type store.
//!
//! Types are `u32` entity handles into a [`TypeStore`] arena. The compiler
//! never looks inside a type directly: it creates types through the
//! constructors here and reads them back through the enquiry methods. Layout
//! (member offsets, sizes, alignment) is computed by the store and nowhere
//! else.

use crate::combs::CombTables;
use boxc_ir::ContType;
use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// An opaque reference to a type in a [`TypeStore`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(u32);
entity_impl!(Type, "ty");

/// The type class: what kind of type a handle refers to.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TypeClass {
    /// An atomic portion of memory.
    Intrinsic,
    /// A named type referring to a source type.
    Ident,
    /// A re-typing incompatible with its source.
    Raised,
    /// A structure with ordered, optionally named members.
    Structure,
    /// A union-like type expressing implicit convertibility to its target.
    Species,
    /// A pointer to a target type.
    Pointer,
    /// A named, typed extension of a parent type.
    Subtype,
    /// A function type `child -> parent`.
    Callable,
    /// The boxed top type.
    Any,
}

/// Relationship between two types, as computed by [`TypeStore::compare`].
///
/// The order matters: `Different < Matching < Equal < Same`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum TypeCmp {
    /// The two types are unrelated.
    Different,
    /// The right type can be expanded to the left type.
    Matching,
    /// The two types are structurally equal.
    Equal,
    /// The two handles denote the same type.
    Same,
}

/// Which type layers [`TypeStore::resolve`] may look through.
///
/// A plain bit set, combined with `|`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Resolve(u8);

impl Resolve {
    /// Resolve identifier types to their source.
    pub const IDENT: Resolve = Resolve(0x01);
    /// Resolve species to their target member.
    pub const SPECIES: Resolve = Resolve(0x02);
    /// Resolve raised types to their source.
    pub const RAISED: Resolve = Resolve(0x04);
    /// Resolve pointers to their target.
    pub const POINTER: Resolve = Resolve(0x08);
    /// Resolve registered subtypes to their child type.
    pub const SUBTYPE: Resolve = Resolve(0x10);

    /// Whether all bits of `other` are present.
    pub fn contains(self, other: Resolve) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for Resolve {
    type Output = Resolve;
    fn bitor(self, rhs: Resolve) -> Resolve {
        Resolve(self.0 | rhs.0)
    }
}

/// One member of a structure type.
#[derive(Clone, PartialEq, Debug)]
pub struct StructMember {
    /// Optional member name.
    pub name: Option<String>,
    /// Member type.
    pub ty: Type,
    /// Byte offset from the start of the structure.
    pub offset: u32,
    /// Size of the member in bytes.
    pub size: u32,
}

#[derive(Clone, Debug)]
pub(crate) enum TypeData {
    Intrinsic {
        size: u32,
        align: u32,
        cont: ContType,
    },
    Ident {
        source: Type,
        name: String,
    },
    Raised {
        source: Type,
    },
    Structure {
        members: Vec<StructMember>,
        raw_size: u32,
        align: u32,
    },
    Species {
        members: SmallVec<[Type; 4]>,
    },
    Pointer {
        target: Type,
    },
    Subtype {
        parent: Type,
        name: String,
        child: Option<Type>,
    },
    Callable {
        parent: Type,
        child: Type,
    },
    Any,
}

/// Size of a reference-counted block pointer (`BoxPtr`): block + target.
pub const PTR_SIZE: u32 = 16;
/// Size of a boxed `Any` value: pointer plus runtime type-id.
pub const ANY_SIZE: u32 = 24;
/// A subtype value is a pair of pointers: child then parent.
pub const SUBTYPE_SIZE: u32 = 2 * PTR_SIZE;

fn round_up(n: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

/// The arena of all types of one compilation, plus the combination tables.
pub struct TypeStore {
    pub(crate) data: PrimaryMap<Type, TypeData>,
    pub(crate) combs: CombTables,
    subtype_index: FxHashMap<(Type, String), Type>,
    any: Option<Type>,
}

impl TypeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: PrimaryMap::new(),
            combs: CombTables::new(),
            subtype_index: FxHashMap::default(),
            any: None,
        }
    }

    pub(crate) fn get(&self, t: Type) -> &TypeData {
        &self.data[t]
    }

    // ----- construction ---------------------------------------------------

    /// Create an intrinsic type: an atomic portion of memory of the given
    /// size and alignment, represented by the given container class.
    pub fn intrinsic(&mut self, size: u32, align: u32, cont: ContType) -> Type {
        debug_assert!(size == 0 || align.is_power_of_two());
        self.data.push(TypeData::Intrinsic { size, align, cont })
    }

    /// Create an identifier type wrapping `source` under `name`.
    pub fn ident(&mut self, source: Type, name: &str) -> Type {
        self.data.push(TypeData::Ident {
            source,
            name: name.to_string(),
        })
    }

    /// Create a raised type: same representation as `source`, incompatible
    /// for matching.
    pub fn raised(&mut self, source: Type) -> Type {
        self.data.push(TypeData::Raised { source })
    }

    /// Un-raise a raised type, looking through identifier layers.
    pub fn unraise(&self, t: Type) -> Option<Type> {
        let t = self.resolve(t, Resolve::IDENT, 0);
        match self.get(t) {
            TypeData::Raised { source } => Some(*source),
            _ => None,
        }
    }

    /// Create an empty structure type.
    pub fn structure(&mut self) -> Type {
        self.data.push(TypeData::Structure {
            members: Vec::new(),
            raw_size: 0,
            align: 1,
        })
    }

    /// Append a member to a structure type. The offset is computed here:
    /// the previous raw end rounded up to the member's alignment.
    pub fn add_structure_member(&mut self, structure: Type, member: Type, name: Option<&str>) {
        let m_size = self.size(member);
        let m_align = self.align(member).max(1);
        match &mut self.data[structure] {
            TypeData::Structure {
                members,
                raw_size,
                align,
            } => {
                let offset = round_up(*raw_size, m_align);
                members.push(StructMember {
                    name: name.map(str::to_string),
                    ty: member,
                    offset,
                    size: m_size,
                });
                *raw_size = offset + m_size;
                *align = (*align).max(m_align);
            }
            _ => panic!("add_structure_member on a non-structure type"),
        }
    }

    /// Create an empty species type.
    pub fn species(&mut self) -> Type {
        self.data.push(TypeData::Species {
            members: SmallVec::new(),
        })
    }

    /// Append a member to a species type. The last member added is the
    /// species target.
    pub fn add_species_member(&mut self, species: Type, member: Type) {
        match &mut self.data[species] {
            TypeData::Species { members } => members.push(member),
            _ => panic!("add_species_member on a non-species type"),
        }
    }

    /// Create a pointer type to `target`.
    pub fn pointer(&mut self, target: Type) -> Type {
        self.data.push(TypeData::Pointer { target })
    }

    /// The pointee of a pointer type, looking through identifier layers.
    pub fn deref_pointer(&self, t: Type) -> Option<Type> {
        let t = self.resolve(t, Resolve::IDENT, 0);
        match self.get(t) {
            TypeData::Pointer { target } => Some(*target),
            _ => None,
        }
    }

    /// The boxed top type. There is one `Any` per store.
    pub fn any(&mut self) -> Type {
        if let Some(t) = self.any {
            return t;
        }
        let t = self.data.push(TypeData::Any);
        self.any = Some(t);
        t
    }

    /// Create a function type taking `child` and working on `parent`.
    pub fn callable(&mut self, parent: Type, child: Type) -> Type {
        self.data.push(TypeData::Callable { parent, child })
    }

    // ----- subtypes -------------------------------------------------------

    /// Create a subtype node `parent.name`, optionally registering its child
    /// type right away.
    pub fn create_subtype(&mut self, parent: Type, name: &str, child: Option<Type>) -> Type {
        let t = self.data.push(TypeData::Subtype {
            parent,
            name: name.to_string(),
            child,
        });
        self.subtype_index.insert((parent, name.to_string()), t);
        t
    }

    /// Find a subtype of `parent` by name, following identifier and raised
    /// layers of the parent.
    pub fn find_subtype(&self, parent: Type, name: &str) -> Option<Type> {
        let mut host = parent;
        loop {
            if let Some(t) = self.subtype_index.get(&(host, name.to_string())) {
                return Some(*t);
            }
            host = match self.get(host) {
                TypeData::Ident { source, .. } => *source,
                TypeData::Raised { source } => *source,
                _ => return None,
            };
        }
    }

    /// Retrieve `(name, parent, child)` of a subtype node.
    pub fn subtype_info(&self, t: Type) -> Option<(&str, Type, Option<Type>)> {
        match self.get(t) {
            TypeData::Subtype {
                parent,
                name,
                child,
            } => Some((name.as_str(), *parent, *child)),
            _ => None,
        }
    }

    /// Register the child type of a previously unregistered subtype.
    pub fn register_subtype(&mut self, t: Type, child_ty: Type) -> bool {
        match &mut self.data[t] {
            TypeData::Subtype { child, .. } if child.is_none() => {
                *child = Some(child_ty);
                true
            }
            _ => false,
        }
    }

    /// Whether `t` is a subtype node (through identifier layers).
    pub fn is_subtype(&self, t: Type) -> bool {
        self.class(self.resolve(t, Resolve::IDENT, 0)) == TypeClass::Subtype
    }

    /// Whether `t` is a subtype node with a registered child type.
    pub fn is_registered_subtype(&self, t: Type) -> bool {
        let t = self.resolve(t, Resolve::IDENT, 0);
        matches!(self.get(t), TypeData::Subtype { child: Some(_), .. })
    }

    // ----- enquiry --------------------------------------------------------

    /// The class of a type.
    pub fn class(&self, t: Type) -> TypeClass {
        match self.get(t) {
            TypeData::Intrinsic { .. } => TypeClass::Intrinsic,
            TypeData::Ident { .. } => TypeClass::Ident,
            TypeData::Raised { .. } => TypeClass::Raised,
            TypeData::Structure { .. } => TypeClass::Structure,
            TypeData::Species { .. } => TypeClass::Species,
            TypeData::Pointer { .. } => TypeClass::Pointer,
            TypeData::Subtype { .. } => TypeClass::Subtype,
            TypeData::Callable { .. } => TypeClass::Callable,
            TypeData::Any => TypeClass::Any,
        }
    }

    /// Size of an object of type `t` in bytes.
    pub fn size(&self, t: Type) -> u32 {
        match self.get(t) {
            TypeData::Intrinsic { size, .. } => *size,
            TypeData::Ident { source, .. } | TypeData::Raised { source } => self.size(*source),
            TypeData::Structure {
                raw_size, align, ..
            } => round_up(*raw_size, *align),
            TypeData::Species { members } => members.last().map_or(0, |m| self.size(*m)),
            TypeData::Pointer { .. } => PTR_SIZE,
            TypeData::Subtype { .. } => SUBTYPE_SIZE,
            TypeData::Callable { .. } => PTR_SIZE,
            TypeData::Any => ANY_SIZE,
        }
    }

    /// Alignment of an object of type `t`.
    pub fn align(&self, t: Type) -> u32 {
        match self.get(t) {
            TypeData::Intrinsic { align, .. } => *align,
            TypeData::Ident { source, .. } | TypeData::Raised { source } => self.align(*source),
            TypeData::Structure { align, .. } => *align,
            TypeData::Species { members } => members.last().map_or(1, |m| self.align(*m)),
            TypeData::Pointer { .. }
            | TypeData::Subtype { .. }
            | TypeData::Callable { .. }
            | TypeData::Any => 8,
        }
    }

    /// Whether objects of this type occupy no storage.
    pub fn is_empty(&self, t: Type) -> bool {
        self.size(t) == 0
    }

    /// The container class representing `t` in VM instructions.
    pub fn cont_type(&self, t: Type) -> ContType {
        let s = self.stem(t);
        match self.get(s) {
            TypeData::Intrinsic { cont, size, .. } => {
                if *size == 0 {
                    ContType::Void
                } else {
                    *cont
                }
            }
            TypeData::Structure { .. } => {
                if self.is_empty(s) {
                    ContType::Void
                } else {
                    ContType::Obj
                }
            }
            TypeData::Pointer { .. } => ContType::Ptr,
            TypeData::Species { members } if members.is_empty() => ContType::Void,
            TypeData::Subtype { .. } | TypeData::Callable { .. } | TypeData::Any => ContType::Obj,
            // Idents, raised types and non-empty species are resolved by
            // `stem` above.
            TypeData::Ident { .. } | TypeData::Raised { .. } | TypeData::Species { .. } => {
                unreachable!("stem left an unresolved layer")
            }
        }
    }

    // ----- structure and species members ----------------------------------

    /// The members of a structure type (empty slice for anything else).
    pub fn struct_members(&self, t: Type) -> &[StructMember] {
        match self.get(t) {
            TypeData::Structure { members, .. } => members,
            _ => &[],
        }
    }

    /// Number of members of a structure type.
    pub fn num_struct_members(&self, t: Type) -> usize {
        self.struct_members(t).len()
    }

    /// Find a structure member by name; returns `(offset, type)`.
    pub fn find_structure_member(&self, t: Type, name: &str) -> Option<(u32, Type)> {
        self.struct_members(t)
            .iter()
            .find(|m| m.name.as_deref() == Some(name))
            .map(|m| (m.offset, m.ty))
    }

    /// The members of a species type.
    pub fn species_members(&self, t: Type) -> &[Type] {
        match self.get(t) {
            TypeData::Species { members } => members,
            _ => &[],
        }
    }

    /// The target (last member) of a species type.
    pub fn species_target(&self, t: Type) -> Option<Type> {
        self.species_members(t).last().copied()
    }

    // ----- resolution -----------------------------------------------------

    /// Resolve `t` through the layers named in `set`, at most `num` times
    /// (0 means as many as possible).
    pub fn resolve(&self, t: Type, set: Resolve, num: u32) -> Type {
        let mut t = t;
        let mut n = 0u32;
        loop {
            if num != 0 && n >= num {
                return t;
            }
            let next = match self.get(t) {
                TypeData::Ident { source, .. } if set.contains(Resolve::IDENT) => *source,
                TypeData::Raised { source } if set.contains(Resolve::RAISED) => *source,
                TypeData::Species { members } if set.contains(Resolve::SPECIES) => {
                    match members.last() {
                        Some(m) => *m,
                        None => return t,
                    }
                }
                TypeData::Pointer { target } if set.contains(Resolve::POINTER) => *target,
                TypeData::Subtype {
                    child: Some(child), ..
                } if set.contains(Resolve::SUBTYPE) => *child,
                _ => return t,
            };
            t = next;
            n += 1;
        }
    }

    /// The stem type: `t` resolved through ident, species, and raised
    /// layers. This is what determines storage handling.
    pub fn stem(&self, t: Type) -> Type {
        self.resolve(t, Resolve::IDENT | Resolve::SPECIES | Resolve::RAISED, 0)
    }

    // ----- representation -------------------------------------------------

    /// A printable representation of the type, for diagnostics.
    pub fn repr(&self, t: Type) -> String {
        match self.get(t) {
            TypeData::Intrinsic { size, .. } => format!("<intrinsic {}B>", size),
            TypeData::Ident { name, .. } => name.clone(),
            TypeData::Raised { source } => format!("^{}", self.repr(*source)),
            TypeData::Structure { members, .. } => {
                let mut s = String::from("(");
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&self.repr(m.ty));
                    if let Some(name) = &m.name {
                        s.push(' ');
                        s.push_str(name);
                    }
                }
                s.push(')');
                s
            }
            TypeData::Species { members } => {
                let mut s = String::from("(");
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        s.push_str(" => ");
                    }
                    s.push_str(&self.repr(*m));
                }
                s.push(')');
                s
            }
            TypeData::Pointer { target } => format!("&{}", self.repr(*target)),
            TypeData::Subtype { parent, name, .. } => {
                format!("{}.{}", self.repr(*parent), name)
            }
            TypeData::Callable { parent, child } => {
                format!("{}@{}", self.repr(*child), self.repr(*parent))
            }
            TypeData::Any => "Any".to_string(),
        }
    }

    // ----- comparison -----------------------------------------------------

    /// Compare `right` to `left`.
    ///
    /// `Same` means identical handles; `Equal` structural equality through
    /// identifier layers; `Matching` that a value of type `right` can be
    /// expanded into `left` (species membership, memberwise structure
    /// expansion). Raised types compare `Different` from their source by
    /// construction.
    pub fn compare(&self, left: Type, right: Type) -> TypeCmp {
        if left == right {
            return TypeCmp::Same;
        }
        let l = self.resolve(left, Resolve::IDENT, 0);
        let r = self.resolve(right, Resolve::IDENT, 0);
        if l == r {
            return TypeCmp::Equal;
        }
        match (self.get(l), self.get(r)) {
            // A species on the left accepts its target as equal and any
            // other member with expansion.
            (TypeData::Species { members }, _) => {
                for (i, m) in members.iter().enumerate().rev() {
                    let cmp = self.compare(*m, r);
                    if cmp != TypeCmp::Different {
                        let is_target = i + 1 == members.len();
                        return if is_target {
                            cmp.min(TypeCmp::Equal)
                        } else {
                            TypeCmp::Matching
                        };
                    }
                }
                TypeCmp::Different
            }
            // A species on the right is represented by its target.
            (_, TypeData::Species { .. }) => match self.species_target(r) {
                Some(target) => self.compare(l, target).min(TypeCmp::Equal),
                None => TypeCmp::Different,
            },
            (
                TypeData::Structure {
                    members: lm,
                    raw_size: _,
                    align: _,
                },
                TypeData::Structure { members: rm, .. },
            ) => {
                if lm.len() != rm.len() {
                    return TypeCmp::Different;
                }
                let mut result = TypeCmp::Equal;
                for (a, b) in lm.iter().zip(rm.iter()) {
                    match self.compare(a.ty, b.ty) {
                        TypeCmp::Different => return TypeCmp::Different,
                        TypeCmp::Matching => result = TypeCmp::Matching,
                        TypeCmp::Equal | TypeCmp::Same => {}
                    }
                }
                result
            }
            (TypeData::Pointer { target: lt }, TypeData::Pointer { target: rt }) => {
                if self.compare(*lt, *rt) >= TypeCmp::Equal {
                    TypeCmp::Equal
                } else {
                    TypeCmp::Different
                }
            }
            _ => TypeCmp::Different,
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(store: &mut TypeStore, name: &str, size: u32, cont: ContType) -> (Type, Type) {
        let intr = store.intrinsic(size, size.max(1), cont);
        let id = store.ident(intr, name);
        (intr, id)
    }

    #[test]
    fn ident_is_transparent_for_compare() {
        let mut s = TypeStore::new();
        let (int_i, int_t) = scalar(&mut s, "Int", 8, ContType::Int);
        assert_eq!(s.compare(int_t, int_t), TypeCmp::Same);
        assert_eq!(s.compare(int_t, int_i), TypeCmp::Equal);
        assert_eq!(s.compare(int_i, int_t), TypeCmp::Equal);

        let alias = s.ident(int_t, "MyInt");
        assert_eq!(s.compare(alias, int_t), TypeCmp::Equal);
    }

    #[test]
    fn raised_is_incompatible_with_source() {
        let mut s = TypeStore::new();
        let (_, int_t) = scalar(&mut s, "Int", 8, ContType::Int);
        let raised = s.raised(int_t);
        assert_eq!(s.compare(raised, int_t), TypeCmp::Different);
        assert_eq!(s.compare(int_t, raised), TypeCmp::Different);
        assert_eq!(s.unraise(raised), Some(int_t));
        assert_eq!(s.size(raised), 8);
    }

    #[test]
    fn structure_layout_uses_natural_alignment() {
        let mut s = TypeStore::new();
        let (_, int_t) = scalar(&mut s, "Int", 8, ContType::Int);
        let char_i = s.intrinsic(1, 1, ContType::Char);
        let st = s.structure();
        s.add_structure_member(st, char_i, Some("c"));
        s.add_structure_member(st, int_t, Some("i"));
        s.add_structure_member(st, char_i, None);

        let members = s.struct_members(st);
        assert_eq!(members[0].offset, 0);
        assert_eq!(members[1].offset, 8);
        assert_eq!(members[2].offset, 16);
        assert_eq!(s.size(st), 24);
        assert_eq!(s.align(st), 8);
        assert_eq!(s.find_structure_member(st, "i"), Some((8, int_t)));
        assert_eq!(s.find_structure_member(st, "zzz"), None);
    }

    #[test]
    fn structures_compare_memberwise() {
        let mut s = TypeStore::new();
        let (_, int_t) = scalar(&mut s, "Int", 8, ContType::Int);
        let (_, real_t) = scalar(&mut s, "Real", 8, ContType::Real);

        let a = s.structure();
        s.add_structure_member(a, int_t, Some("x"));
        s.add_structure_member(a, real_t, Some("y"));
        let b = s.structure();
        s.add_structure_member(b, int_t, None);
        s.add_structure_member(b, real_t, None);
        let c = s.structure();
        s.add_structure_member(c, real_t, None);
        s.add_structure_member(c, real_t, None);

        assert_eq!(s.compare(a, b), TypeCmp::Equal);
        assert_eq!(s.compare(a, c), TypeCmp::Different);
    }

    #[test]
    fn species_matches_members_and_equals_target() {
        let mut s = TypeStore::new();
        let (_, int_t) = scalar(&mut s, "Int", 8, ContType::Int);
        let (_, real_t) = scalar(&mut s, "Real", 8, ContType::Real);
        let sp = s.species();
        s.add_species_member(sp, int_t);
        s.add_species_member(sp, real_t);

        assert_eq!(s.compare(sp, int_t), TypeCmp::Matching);
        assert_eq!(s.compare(sp, real_t), TypeCmp::Equal);
        assert_eq!(s.compare(real_t, sp), TypeCmp::Equal);
        assert_eq!(s.species_target(sp), Some(real_t));
        assert_eq!(s.cont_type(sp), ContType::Real);
    }

    #[test]
    fn resolve_and_stem() {
        let mut s = TypeStore::new();
        let (int_i, int_t) = scalar(&mut s, "Int", 8, ContType::Int);
        let alias = s.ident(int_t, "A");
        assert_eq!(s.resolve(alias, Resolve::IDENT, 1), int_t);
        assert_eq!(s.resolve(alias, Resolve::IDENT, 0), int_i);
        assert_eq!(s.stem(alias), int_i);

        let ptr = s.pointer(int_t);
        assert_eq!(s.deref_pointer(ptr), Some(int_t));
        assert_eq!(s.cont_type(ptr), ContType::Ptr);
        assert_eq!(s.size(ptr), PTR_SIZE);
    }

    #[test]
    fn subtypes_register_and_resolve() {
        let mut s = TypeStore::new();
        let (_, point_t) = scalar(&mut s, "Point", 16, ContType::Point);
        let (_, real_t) = scalar(&mut s, "Real", 8, ContType::Real);

        let sub = s.create_subtype(point_t, "Y", None);
        assert!(s.is_subtype(sub));
        assert!(!s.is_registered_subtype(sub));
        assert_eq!(s.find_subtype(point_t, "Y"), Some(sub));
        assert_eq!(s.find_subtype(point_t, "Z"), None);

        assert!(s.register_subtype(sub, real_t));
        assert!(!s.register_subtype(sub, real_t));
        assert!(s.is_registered_subtype(sub));
        assert_eq!(s.resolve(sub, Resolve::SUBTYPE, 0), real_t);
        let (name, parent, child) = s.subtype_info(sub).unwrap();
        assert_eq!((name, parent, child), ("Y", point_t, Some(real_t)));
    }

    #[test]
    fn repr_notation() {
        let mut s = TypeStore::new();
        let (_, int_t) = scalar(&mut s, "Int", 8, ContType::Int);
        let (_, real_t) = scalar(&mut s, "Real", 8, ContType::Real);
        let st = s.structure();
        s.add_structure_member(st, int_t, Some("x"));
        s.add_structure_member(st, real_t, None);
        assert_eq!(s.repr(st), "(Int x, Real)");

        let ptr = s.pointer(int_t);
        assert_eq!(s.repr(ptr), "&Int");
        let raised = s.raised(real_t);
        assert_eq!(s.repr(raised), "^Real");
        let sub = s.create_subtype(int_t, "Tag", None);
        assert_eq!(s.repr(sub), "Int.Tag");
    }
}
