//! Combinations: type-bound procedures.
//!
//! A combination is keyed by `(parent type, kind, child type)` and is the
//! only way behaviour attaches to a type. Combinations live in side tables
//! of the store so that defining one never mutates the type node itself,
//! and so that a namespace floor can undefine exactly the combinations it
//! registered.

use crate::store::{Type, TypeCmp, TypeStore};
use boxc_ir::CallNum;
use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;

/// An opaque reference to a defined combination.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Comb(u32);
entity_impl!(Comb, "comb");

/// The kind of a combination.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CombKind {
    /// At-combination: `child @ parent`.
    At,
    /// Copy combination.
    Copy,
    /// Move combination.
    Move,
}

#[derive(Clone, Debug)]
pub(crate) struct CombData {
    pub parent: Type,
    pub kind: CombKind,
    pub child: Type,
    /// Call number, once one has been generated.
    pub call_num: Option<CallNum>,
    /// External symbol name (the "C-name"), if any.
    pub name: Option<String>,
    /// Whether an implementation exists (native or compiled).
    pub implemented: bool,
}

pub(crate) struct CombTables {
    data: PrimaryMap<Comb, CombData>,
    by_parent: FxHashMap<Type, Vec<Comb>>,
}

impl CombTables {
    pub fn new() -> Self {
        Self {
            data: PrimaryMap::new(),
            by_parent: FxHashMap::default(),
        }
    }
}

impl TypeStore {
    /// Define a combination `child kind parent`. The newest definition
    /// shadows older ones with the same key.
    pub fn define_combination(&mut self, parent: Type, kind: CombKind, child: Type) -> Comb {
        let comb = self.combs.data.push(CombData {
            parent,
            kind,
            child,
            call_num: None,
            name: None,
            implemented: false,
        });
        self.combs.by_parent.entry(parent).or_default().push(comb);
        log::trace!(
            "define combination {}{}{}",
            self.repr(child),
            match kind {
                CombKind::At => "@",
                CombKind::Copy => "(=)",
                CombKind::Move => "(<-)",
            },
            self.repr(parent)
        );
        comb
    }

    /// Remove a combination previously defined on `parent`.
    pub fn undefine_combination(&mut self, parent: Type, comb: Comb) {
        if let Some(list) = self.combs.by_parent.get_mut(&parent) {
            list.retain(|c| *c != comb);
        }
    }

    /// Find the combination matching `parent kind child`.
    ///
    /// The parent's own table is searched newest-first, then the tables of
    /// the types the parent inherits from (identifier sources and raised
    /// sources). Returns the combination and how the child type matched.
    pub fn find_combination(
        &self,
        parent: Type,
        kind: CombKind,
        child: Type,
    ) -> Option<(Comb, TypeCmp)> {
        let mut host = parent;
        loop {
            if let Some(list) = self.combs.by_parent.get(&host) {
                for &comb in list.iter().rev() {
                    let data = &self.combs.data[comb];
                    if data.kind != kind {
                        continue;
                    }
                    let cmp = self.compare(data.child, child);
                    if cmp != TypeCmp::Different {
                        return Some((comb, cmp));
                    }
                }
            }
            host = match self.class(host) {
                crate::store::TypeClass::Ident | crate::store::TypeClass::Raised => {
                    self.resolve(
                        host,
                        crate::store::Resolve::IDENT | crate::store::Resolve::RAISED,
                        1,
                    )
                }
                _ => return None,
            };
        }
    }

    /// Find a combination defined directly on `parent` with a child type
    /// strictly equal to `child`; inherited tables are not searched. Used
    /// when (re)declaring a combination.
    pub fn find_own_combination(
        &self,
        parent: Type,
        kind: CombKind,
        child: Type,
    ) -> Option<Comb> {
        let list = self.combs.by_parent.get(&parent)?;
        list.iter().rev().copied().find(|&comb| {
            let data = &self.combs.data[comb];
            data.kind == kind && self.compare(data.child, child) >= TypeCmp::Equal
        })
    }

    /// The child type a matching value must be expanded to.
    pub fn comb_child(&self, comb: Comb) -> Type {
        self.combs.data[comb].child
    }

    /// The parent type the combination is defined on.
    pub fn comb_parent(&self, comb: Comb) -> Type {
        self.combs.data[comb].parent
    }

    /// The call number of the combination, if one has been generated.
    pub fn comb_call_num(&self, comb: Comb) -> Option<CallNum> {
        self.combs.data[comb].call_num
    }

    /// Record the call number of the combination.
    pub fn set_comb_call_num(&mut self, comb: Comb, num: CallNum) {
        self.combs.data[comb].call_num = Some(num);
    }

    /// The external symbol name of the combination, if any.
    pub fn comb_name(&self, comb: Comb) -> Option<&str> {
        self.combs.data[comb].name.as_deref()
    }

    /// Set the external symbol name of the combination.
    pub fn set_comb_name(&mut self, comb: Comb, name: &str) {
        self.combs.data[comb].name = Some(name.to_string());
    }

    /// Whether the combination has an implementation.
    pub fn comb_is_implemented(&self, comb: Comb) -> bool {
        self.combs.data[comb].implemented
    }

    /// Mark the combination as implemented.
    pub fn set_comb_implemented(&mut self, comb: Comb) {
        self.combs.data[comb].implemented = true;
    }

    /// A printable representation, e.g. `Int@Print`.
    pub fn comb_repr(&self, comb: Comb) -> String {
        let data = &self.combs.data[comb];
        format!("{}@{}", self.repr(data.child), self.repr(data.parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxc_ir::ContType;

    fn scalar(store: &mut TypeStore, name: &str, cont: ContType) -> Type {
        let intr = store.intrinsic(8, 8, cont);
        store.ident(intr, name)
    }

    #[test]
    fn find_prefers_newest_definition() {
        let mut s = TypeStore::new();
        let int_t = scalar(&mut s, "Int", ContType::Int);
        let print_t = scalar(&mut s, "Print", ContType::Void);

        let older = s.define_combination(print_t, CombKind::At, int_t);
        let newer = s.define_combination(print_t, CombKind::At, int_t);
        let (found, cmp) = s.find_combination(print_t, CombKind::At, int_t).unwrap();
        assert_eq!(found, newer);
        assert_eq!(cmp, TypeCmp::Same);

        s.undefine_combination(print_t, newer);
        let (found, _) = s.find_combination(print_t, CombKind::At, int_t).unwrap();
        assert_eq!(found, older);
    }

    #[test]
    fn find_walks_ident_inheritance() {
        let mut s = TypeStore::new();
        let int_t = scalar(&mut s, "Int", ContType::Int);
        let print_t = scalar(&mut s, "Print", ContType::Void);
        let fancy = s.ident(print_t, "FancyPrint");

        let comb = s.define_combination(print_t, CombKind::At, int_t);
        let (found, _) = s.find_combination(fancy, CombKind::At, int_t).unwrap();
        assert_eq!(found, comb);
    }

    #[test]
    fn species_child_matches_with_expansion() {
        let mut s = TypeStore::new();
        let int_t = scalar(&mut s, "Int", ContType::Int);
        let real_t = scalar(&mut s, "Real", ContType::Real);
        let print_t = scalar(&mut s, "Print", ContType::Void);

        let sp = s.species();
        s.add_species_member(sp, int_t);
        s.add_species_member(sp, real_t);

        let comb = s.define_combination(print_t, CombKind::At, sp);
        let (found, cmp) = s.find_combination(print_t, CombKind::At, int_t).unwrap();
        assert_eq!(found, comb);
        assert_eq!(cmp, TypeCmp::Matching);
    }

    #[test]
    fn call_numbers_and_names_are_recorded() {
        let mut s = TypeStore::new();
        let int_t = scalar(&mut s, "Int", ContType::Int);
        let print_t = scalar(&mut s, "Print", ContType::Void);
        let comb = s.define_combination(print_t, CombKind::At, int_t);

        assert_eq!(s.comb_call_num(comb), None);
        assert!(!s.comb_is_implemented(comb));
        s.set_comb_name(comb, "box_print_int");
        s.set_comb_implemented(comb);
        assert_eq!(s.comb_name(comb), Some("box_print_int"));
        assert!(s.comb_is_implemented(comb));
        assert_eq!(s.comb_repr(comb), "Int@Print");
    }
}
