//! Operators, operations, and their emission schemes.
//!
//! An *operator* (`+`, `<`, the conversion arrow) owns a chain of
//! *operations*: typed overloads resolved newest-first by comparing the
//! operand types through the type system. Each operation carries an
//! emission scheme, guessed from its attributes and the relations between
//! its result and operand types, and either a native opcode or an installed
//! call number as its implementation.

use crate::compiler::Compiler;
use crate::value::Value;
use boxc_ast::{BinOp, UnOp};
use boxc_ir::{CallNum, GenOp};
use boxc_types::{Type, TypeCmp, TypeStore};

/// Operator and operation attribute bits.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct OprAttr(u16);

impl OprAttr {
    /// No attributes.
    pub const NONE: OprAttr = OprAttr(0);
    /// Maps to a VM opcode.
    pub const NATIVE: OprAttr = OprAttr(0x01);
    /// Takes two operands.
    pub const BINARY: OprAttr = OprAttr(0x02);
    /// The result type participates in overload selection.
    pub const MATCH_RESULT: OprAttr = OprAttr(0x04);
    /// Postfix unary operator.
    pub const UN_RIGHT: OprAttr = OprAttr(0x08);
    /// Operands may be swapped.
    pub const COMMUTATIVE: OprAttr = OprAttr(0x10);
    /// Mutates its left operand.
    pub const ASSIGNMENT: OprAttr = OprAttr(0x20);
    /// The produced value is marked ignorable.
    pub const IGNORE_RES: OprAttr = OprAttr(0x40);

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: OprAttr) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for OprAttr {
    type Output = OprAttr;
    fn bitor(self, rhs: OprAttr) -> OprAttr {
        OprAttr(self.0 | rhs.0)
    }
}

/// How an operation is assembled.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Scheme {
    /// `op operand`: in place for assignments, into a temp otherwise.
    StdUn,
    /// Postfix assignment unary: preserve the old value, mutate in place.
    RightUn,
    /// `op dst, src` where the destination doubles as the left operand.
    StdBin,
    /// `op dst, left, right` with a fresh result temporary.
    RLrBin,
    /// `op dst, src` where the result type matches one operand.
    RlRBin,
    /// Call an installed procedure.
    UsrUn,
    /// Not assemblable.
    Unknown,
}

/// The implementation of an operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Implem {
    /// A native VM opcode.
    Opcode(GenOp),
    /// An installed procedure.
    Call(CallNum),
}

/// One typed overload of an operator.
#[derive(Copy, Clone, Debug)]
pub struct Operation {
    /// Attribute bits; a superset of the owning operator's.
    pub attr: OprAttr,
    /// Result type.
    pub result: Type,
    /// Left (or only) operand type.
    pub left: Type,
    /// Right operand type, for binary operations.
    pub right: Option<Type>,
    /// The emission scheme.
    pub scheme: Scheme,
    /// The implementation.
    pub implem: Implem,
}

/// An operator with its chain of operations.
pub struct Operator {
    /// Display name, e.g. `+`.
    pub name: &'static str,
    /// Attributes every operation inherits.
    pub attr: OprAttr,
    ops: Vec<Operation>,
}

fn guess_scheme(
    types: &TypeStore,
    attr: OprAttr,
    result: Type,
    left: Type,
    right: Option<Type>,
) -> Scheme {
    if !attr.contains(OprAttr::NATIVE) {
        return Scheme::Unknown;
    }
    if attr.contains(OprAttr::BINARY) {
        let right = right.expect("binary operation without a right type");
        let res_eq_l = types.compare(result, left) >= TypeCmp::Equal;
        let res_eq_r = types.compare(result, right) >= TypeCmp::Equal;
        let l_eq_r = types.compare(left, right) >= TypeCmp::Equal;
        if l_eq_r && res_eq_l {
            Scheme::StdBin
        } else if l_eq_r {
            Scheme::RLrBin
        } else if res_eq_l || res_eq_r {
            Scheme::RlRBin
        } else {
            panic!("operation registered with no assemblable scheme")
        }
    } else if attr.contains(OprAttr::UN_RIGHT) {
        Scheme::RightUn
    } else {
        Scheme::StdUn
    }
}

impl Operator {
    /// Create an operator with no operations.
    pub fn new(name: &'static str, attr: OprAttr) -> Self {
        Self {
            name,
            attr,
            ops: Vec::new(),
        }
    }

    /// Register an operation with a native opcode implementation. The
    /// newest registration shadows older ones.
    pub fn add_native(
        &mut self,
        types: &TypeStore,
        left: Type,
        right: Option<Type>,
        result: Type,
        extra: OprAttr,
        opcode: GenOp,
    ) {
        let attr = self.attr | extra;
        self.ops.push(Operation {
            attr,
            result,
            left,
            right,
            scheme: guess_scheme(types, attr, result, left, right),
            implem: Implem::Opcode(opcode),
        });
    }

    /// Register an operation implemented by an installed procedure.
    pub fn add_user(
        &mut self,
        left: Type,
        right: Option<Type>,
        result: Type,
        extra: OprAttr,
        call_num: CallNum,
    ) {
        self.ops.push(Operation {
            attr: self.attr | extra,
            result,
            left,
            right,
            scheme: Scheme::UsrUn,
            implem: Implem::Call(call_num),
        });
    }
}

/// How the operand types matched an operation's signature.
#[derive(Copy, Clone, Debug)]
pub struct OprMatch {
    /// Match of the left operand.
    pub left: TypeCmp,
    /// Match of the right operand, `Different` for unaries.
    pub right: TypeCmp,
    /// The type the left operand expands to on a matching match.
    pub expand_left: Type,
    /// The type the right operand expands to on a matching match.
    pub expand_right: Option<Type>,
}

/// Find the operation of `opr` matching the given operand (and, for the
/// conversion operator, result) types. First non-different match wins,
/// newest registrations first.
pub fn find_operation(
    types: &TypeStore,
    opr: &Operator,
    left: Type,
    right: Option<Type>,
    result: Option<Type>,
) -> Option<(Operation, OprMatch)> {
    let unary = !opr.attr.contains(OprAttr::BINARY);
    let match_result = opr.attr.contains(OprAttr::MATCH_RESULT);
    for opn in opr.ops.iter().rev() {
        if match_result {
            let result = result?;
            if types.compare(opn.result, result) == TypeCmp::Different {
                continue;
            }
        }
        let match_left = types.compare(opn.left, left);
        if match_left == TypeCmp::Different {
            continue;
        }
        if unary {
            return Some((
                *opn,
                OprMatch {
                    left: match_left,
                    right: TypeCmp::Different,
                    expand_left: opn.left,
                    expand_right: None,
                },
            ));
        }
        let (Some(right), Some(opn_right)) = (right, opn.right) else {
            continue;
        };
        let match_right = types.compare(opn_right, right);
        if match_right == TypeCmp::Different {
            continue;
        }
        return Some((
            *opn,
            OprMatch {
                left: match_left,
                right: match_right,
                expand_left: opn.left,
                expand_right: Some(opn_right),
            },
        ));
    }
    None
}

impl Compiler {
    /// Compile a unary operation on `v` through the operator table.
    pub(crate) fn opr_emit_un(&mut self, op: UnOp, v: Value) -> Option<Value> {
        // Subtypes are never overloaded; expand them first.
        let v = self.emit_subtype_expansion(v);
        let opr = &self.un_ops[op.index()];
        match find_operation(&self.types, opr, v.ty(), None, None) {
            Some((opn, m)) => {
                let v = if m.left == TypeCmp::Matching {
                    self.emit_value_expansion(v, m.expand_left)
                } else {
                    v
                };
                self.opn_emit_un(opn, v)
            }
            None => {
                let repr = self.types.repr(v.ty());
                let msg = if op.is_right() {
                    format!("{}{} <- operation is not defined", repr, op)
                } else {
                    format!("{}{} <- operation is not defined", op, repr)
                };
                self.log_err(msg);
                self.destroy_value(v);
                None
            }
        }
    }

    /// Compile a binary operation through the operator table.
    pub(crate) fn opr_emit_bin(&mut self, op: BinOp, left: Value, right: Value) -> Option<Value> {
        let left = self.emit_subtype_expansion(left);
        let right = self.emit_subtype_expansion(right);
        let opr = &self.bin_ops[op.index()];
        match find_operation(&self.types, opr, left.ty(), Some(right.ty()), None) {
            Some((opn, m)) => {
                let left = if m.left == TypeCmp::Matching {
                    self.emit_value_expansion(left, m.expand_left)
                } else {
                    left
                };
                let right = if m.right == TypeCmp::Matching {
                    self.emit_value_expansion(right, m.expand_right.expect("binary match"))
                } else {
                    right
                };
                self.opn_emit_bin(opn, left, right)
            }
            None => {
                self.log_err(format!(
                    "{} {} {} <- operation is not defined",
                    self.types.repr(left.ty()),
                    op,
                    self.types.repr(right.ty())
                ));
                self.destroy_value(left);
                self.destroy_value(right);
                None
            }
        }
    }

    fn opn_emit_un(&mut self, opn: Operation, v: Value) -> Option<Value> {
        let Implem::Opcode(opcode) = opn.implem else {
            unreachable!("unary operation without a native opcode")
        };
        let result = match opn.scheme {
            Scheme::StdUn => {
                let v = if opn.attr.contains(OprAttr::ASSIGNMENT) {
                    if !v.is_target() {
                        self.log_err(format!(
                            "unary operator cannot modify its operand ({})",
                            v.kind.describe()
                        ));
                        self.destroy_value(v);
                        return None;
                    }
                    v
                } else {
                    self.make_temp(v)
                };
                self.push_op(opcode, &[v.cont]);
                v
            }
            Scheme::RightUn => {
                debug_assert!(opn.attr.contains(OprAttr::ASSIGNMENT));
                if !v.is_target() {
                    self.log_err(format!(
                        "unary operator cannot modify its operand ({})",
                        v.kind.describe()
                    ));
                    self.destroy_value(v);
                    return None;
                }
                // Preserve the old value in a temporary, then mutate the
                // original storage.
                let old_cont = v.cont;
                let v = self.make_temp(v);
                self.push_op(opcode, &[old_cont]);
                v
            }
            _ => unreachable!("unary operation with a binary scheme"),
        };
        Some(result.set_ignorable(opn.attr.contains(OprAttr::IGNORE_RES)))
    }

    fn opn_emit_bin(&mut self, opn: Operation, mut left: Value, mut right: Value) -> Option<Value> {
        let Implem::Opcode(opcode) = opn.implem else {
            unreachable!("binary operation without a native opcode")
        };
        let result = match opn.scheme {
            Scheme::StdBin => {
                if opn.attr.contains(OprAttr::ASSIGNMENT) {
                    if !left.is_target() {
                        self.log_err(format!(
                            "binary operator cannot modify its left operand ({})",
                            left.kind.describe()
                        ));
                        self.destroy_value(left);
                        self.destroy_value(right);
                        return None;
                    }
                } else {
                    // For a commutative operation, reusing a temporary on
                    // the right saves one move.
                    if opn.attr.contains(OprAttr::COMMUTATIVE)
                        && !left.is_temp()
                        && right.is_temp()
                    {
                        core::mem::swap(&mut left, &mut right);
                    }
                    left = self.make_temp(left);
                }
                self.push_op(opcode, &[left.cont, right.cont]);
                self.destroy_value(right);
                left
            }
            Scheme::RLrBin => {
                let result = self.value_temp(opn.result);
                let left = self.to_temp_or_target(left);
                let right = self.to_temp_or_target(right);
                self.push_op(opcode, &[result.cont, left.cont, right.cont]);
                self.destroy_value(left);
                self.destroy_value(right);
                result
            }
            Scheme::RlRBin => {
                if self.types.compare(opn.result, right.ty()) != TypeCmp::Different {
                    core::mem::swap(&mut left, &mut right);
                }
                let left = self.make_temp(left);
                self.push_op(opcode, &[left.cont, right.cont]);
                self.destroy_value(right);
                left
            }
            _ => unreachable!("binary operation with a unary scheme"),
        };
        Some(result.set_ignorable(opn.attr.contains(OprAttr::IGNORE_RES)))
    }

    /// Try to convert `src` into the already-fabricated `dst` through the
    /// conversion operator. On failure `src` is handed back untouched.
    pub(crate) fn try_emit_conversion(&mut self, dst: &Value, src: Value) -> Result<(), Value> {
        match find_operation(&self.types, &self.convert, src.ty(), None, Some(dst.ty())) {
            None => Err(src),
            Some((opn, m)) => {
                let src = if m.left == TypeCmp::Matching {
                    self.emit_value_expansion(src, m.expand_left)
                } else {
                    src
                };
                match opn.scheme {
                    Scheme::StdUn => {
                        let Implem::Opcode(opcode) = opn.implem else {
                            unreachable!("native conversion without an opcode")
                        };
                        self.push_op(opcode, &[dst.cont, src.cont]);
                        self.destroy_value(src);
                        Ok(())
                    }
                    Scheme::UsrUn => {
                        let Implem::Call(call_num) = opn.implem else {
                            unreachable!("user conversion without a call number")
                        };
                        self.emit_call_num(call_num, dst, src);
                        Ok(())
                    }
                    _ => unreachable!("conversion with an unexpected scheme"),
                }
            }
        }
    }

    /// Convert `src` to `t_dst`, reporting an error when no conversion is
    /// registered.
    pub(crate) fn emit_conversion(&mut self, src: Value, t_dst: Type) -> Option<Value> {
        let dst = self.value_temp(t_dst);
        match self.try_emit_conversion(&dst, src) {
            Ok(()) => Some(dst),
            Err(src) => {
                self.log_err(format!(
                    "don't know how to convert objects of type {} to {}",
                    self.types.repr(src.ty()),
                    self.types.repr(t_dst)
                ));
                self.destroy_value(src);
                self.destroy_value(dst);
                None
            }
        }
    }
}
