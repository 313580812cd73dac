//! Values: what expressions compile to.
//!
//! A `Value` is the uniform description of an expression result: its kind,
//! its language type, the VM container holding it, and ownership flags.
//! Values are never structurally shared: every push, pop, and copy is a
//! fresh `Value`, and aliasing is only ever created through
//! [`Value::weak_clone`], which never inherits register ownership.
//!
//! Lifecycle is explicit: whoever holds a `Value` must route it back through
//! `Compiler::destroy_value` (or `finish_value`) so that owned registers are
//! released exactly once. The compiler counts live values; a non-zero count
//! at the end of a compilation is a leak and trips the debug assertions.

use boxc_ir::Cont;
use boxc_types::Type;

/// What a value is.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueKind {
    /// The propagated failure marker.
    Err,
    /// An unresolved value identifier awaiting binding.
    VarName,
    /// An unresolved type identifier awaiting binding.
    TypeName,
    /// A type reified as a compile-time value; no storage.
    Type,
    /// A literal carried in the operand itself.
    Imm,
    /// An r-value held in a fresh register.
    Temp,
    /// An l-value: assignable and addressable.
    Target,
}

impl ValueKind {
    /// Human description, for diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            ValueKind::Err => "an error expression",
            ValueKind::VarName => "an undefined variable",
            ValueKind::TypeName => "an undefined type",
            ValueKind::Type => "a type expression",
            ValueKind::Imm => "a constant expression",
            ValueKind::Temp => "an intermediate expression",
            ValueKind::Target => "a target expression",
        }
    }
}

/// An expression result.
#[derive(Debug)]
pub struct Value {
    /// The kind tag.
    pub kind: ValueKind,
    /// The language type; present for every kind beyond the name kinds and
    /// plain errors.
    pub ty: Option<Type>,
    /// The VM container holding the value.
    pub cont: Cont,
    /// The name, for the name kinds (also kept as a debug aid elsewhere).
    pub name: Option<String>,
    /// Shared compiler constant: never finished, never moved from.
    pub read_only: bool,
    /// Whether finishing this value must release `cont`'s register.
    pub own_register: bool,
    /// Suppresses the "ignorable expression" handling for this value.
    pub ignore: bool,
}

impl Value {
    /// A fresh error-kind value with no attached resources.
    pub fn error() -> Value {
        Value {
            kind: ValueKind::Err,
            ty: None,
            cont: Cont::VOID,
            name: None,
            read_only: false,
            own_register: false,
            ignore: false,
        }
    }

    /// Whether this is the failure marker.
    pub fn is_err(&self) -> bool {
        self.kind == ValueKind::Err
    }

    /// Whether this is an r-value in a fresh register.
    pub fn is_temp(&self) -> bool {
        self.kind == ValueKind::Temp
    }

    /// Whether this is an l-value.
    pub fn is_target(&self) -> bool {
        self.kind == ValueKind::Target
    }

    /// Whether this is an unresolved value identifier.
    pub fn is_var_name(&self) -> bool {
        self.kind == ValueKind::VarName
    }

    /// Whether this is an unresolved type identifier.
    pub fn is_type_name(&self) -> bool {
        self.kind == ValueKind::TypeName
    }

    /// Whether this carries an actual run-time value.
    pub fn is_value(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Imm | ValueKind::Temp | ValueKind::Target
        )
    }

    /// Whether the value has a defined type (everything except errors and
    /// the two name kinds).
    pub fn has_type(&self) -> bool {
        !matches!(
            self.kind,
            ValueKind::Err | ValueKind::VarName | ValueKind::TypeName
        )
    }

    /// The type; callers check [`Value::has_type`] first.
    pub fn ty(&self) -> Type {
        self.ty.expect("value has no type")
    }

    /// A non-owning duplicate: same kind, type, container and name, but
    /// never register ownership, never the ignore mark, never read-only.
    pub fn weak_clone(&self) -> Value {
        Value {
            kind: self.kind,
            ty: self.ty,
            cont: self.cont,
            name: self.name.clone(),
            read_only: false,
            own_register: false,
            ignore: false,
        }
    }

    /// Turn a temporary into a target in place; other kinds are unchanged.
    pub fn promote_temp_to_target(mut self) -> Value {
        if self.kind == ValueKind::Temp {
            self.kind = ValueKind::Target;
        }
        self
    }

    /// Set or clear the ignorable mark.
    pub fn set_ignorable(mut self, ignorable: bool) -> Value {
        self.ignore = ignorable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxc_ir::ContType;

    #[test]
    fn weak_clone_never_owns() {
        let v = Value {
            kind: ValueKind::Temp,
            ty: None,
            cont: Cont::lreg(ContType::Int, 3),
            name: Some("x".into()),
            read_only: false,
            own_register: true,
            ignore: true,
        };
        let w = v.weak_clone();
        assert_eq!(w.kind, ValueKind::Temp);
        assert_eq!(w.cont, v.cont);
        assert!(!w.own_register);
        assert!(!w.ignore);
        assert_eq!(w.name.as_deref(), Some("x"));
    }

    #[test]
    fn promotion_only_affects_temps() {
        let t = Value {
            kind: ValueKind::Temp,
            ..Value::error()
        };
        assert_eq!(t.promote_temp_to_target().kind, ValueKind::Target);
        let imm = Value {
            kind: ValueKind::Imm,
            ..Value::error()
        };
        assert_eq!(imm.promote_temp_to_target().kind, ValueKind::Imm);
    }
}
