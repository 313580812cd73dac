//! Value fabrication and instruction emission.
//!
//! Everything here is a method on [`Compiler`]: fabricating values (with
//! their registers and, for object types, the `create` instruction),
//! moving and expanding them, calling combinations, boxing into `Any`, and
//! the subtype plumbing. The driver in `compiler.rs` only sequences these.
//!
//! Ownership discipline: functions taking a `Value` by value consume it:
//! it is either returned (possibly rebuilt), stored, or destroyed. Functions
//! taking `&Value` never take over the operand.

use crate::compiler::Compiler;
use crate::proc::ProcStyle;
use crate::value::{Value, ValueKind};
use boxc_ir::{CallNum, Cont, ContCateg, ContKind, ContType, GenOp, Label, RegNum};
use boxc_types::{Comb, CombKind, Resolve, Type, TypeClass, TypeCmp, PTR_SIZE};
use smallvec::SmallVec;

/// Container templates: how to place a freshly fabricated value.
#[derive(Copy, Clone, Debug)]
pub(crate) enum ContTemplate {
    /// A fresh local temporary register.
    LReg,
    /// A specific, already-reserved local register.
    LRegFixed(RegNum),
    /// A fresh local variable register.
    LVar,
    /// A fresh global variable register.
    GVar,
    /// A cell in the global data area, addressed off `gro0`.
    GPtr {
        /// Byte offset into the data area.
        offset: i64,
    },
}

/// The integer scratch register used by conditional jumps and `typeof`.
pub(crate) fn ri0() -> Cont {
    Cont::lreg(ContType::Int, 0)
}

impl Compiler {
    // ----- value lifecycle ------------------------------------------------

    /// Count a value constructed outside the tracked constructors.
    pub(crate) fn adopt(&mut self, v: Value) -> Value {
        self.live_values += 1;
        v
    }

    /// A fresh error-kind value with no attached resources.
    pub(crate) fn new_value(&mut self) -> Value {
        self.live_values += 1;
        Value::error()
    }

    /// A non-owning duplicate of `v`.
    pub(crate) fn weak_copy(&mut self, v: &Value) -> Value {
        let copy = v.weak_clone();
        self.adopt(copy)
    }

    /// Release everything `v` holds; idempotent. The value stays usable as
    /// an error marker.
    pub(crate) fn finish_value(&mut self, v: &mut Value) {
        if v.read_only {
            return;
        }
        v.name = None;
        if matches!(v.kind, ValueKind::Temp | ValueKind::Target) && v.own_register {
            match v.cont.kind {
                ContKind::Reg { num, global } => {
                    if !global && num > 0 {
                        let ty = v.cont.ty;
                        self.cur_reg().release_temp(ty, num);
                    }
                }
                ContKind::Ptr { reg, global, .. } => {
                    debug_assert!(!global, "owned global pointer base");
                    if reg > 0 {
                        self.cur_reg().release_temp(ContType::Obj, reg);
                    }
                }
                ContKind::Imm(_) => {}
            }
        }
        v.kind = ValueKind::Err;
        v.ty = None;
        v.own_register = false;
    }

    /// Finish and dispose of a value.
    pub(crate) fn destroy_value(&mut self, mut v: Value) {
        if v.read_only {
            return;
        }
        self.finish_value(&mut v);
        debug_assert!(self.live_values > 0, "value tracking underflow");
        self.live_values -= 1;
    }

    /// Number of values currently alive; equal across any balanced region.
    pub fn live_values(&self) -> usize {
        self.live_values
    }

    // ----- fabrication ----------------------------------------------------

    /// Apply a container template to `v`, requesting registers as needed.
    pub(crate) fn setup_container(&mut self, v: &mut Value, t: Type, tmpl: ContTemplate) {
        let ct = self.types.cont_type(t);
        v.ty = Some(t);
        match tmpl {
            ContTemplate::LReg => {
                v.kind = ValueKind::Temp;
                let num = self.cur_reg().occupy_temp(ct);
                v.cont = Cont::lreg(ct, num);
                v.own_register = num > 0;
            }
            ContTemplate::LRegFixed(num) => {
                v.kind = ValueKind::Temp;
                v.cont = Cont::lreg(ct, num);
            }
            ContTemplate::LVar => {
                v.kind = ValueKind::Target;
                let num = self.cur_reg().occupy_var(ct);
                v.cont = Cont::lreg(ct, num);
            }
            ContTemplate::GVar => {
                v.kind = ValueKind::Target;
                let num = self.cur_reg().occupy_var(ct);
                v.cont = Cont::greg(ct, num);
            }
            ContTemplate::GPtr { offset } => {
                v.kind = ValueKind::Target;
                v.cont = Cont::ptr(ct, 0, offset, true);
            }
        }
    }

    /// A character immediate.
    pub(crate) fn value_imm_char(&mut self, c: u8) -> Value {
        let mut v = self.new_value();
        v.kind = ValueKind::Imm;
        v.ty = Some(self.core.char_t);
        v.cont = Cont::imm_char(c);
        v
    }

    /// An integer immediate.
    pub(crate) fn value_imm_int(&mut self, i: i64) -> Value {
        let mut v = self.new_value();
        v.kind = ValueKind::Imm;
        v.ty = Some(self.core.int_t);
        v.cont = Cont::imm_int(i);
        v
    }

    /// A real immediate.
    pub(crate) fn value_imm_real(&mut self, r: f64) -> Value {
        let mut v = self.new_value();
        v.kind = ValueKind::Imm;
        v.ty = Some(self.core.real_t);
        v.cont = Cont::imm_real(r);
        v
    }

    /// A type reified as a compile-time value.
    pub(crate) fn value_type(&mut self, t: Type) -> Value {
        let mut v = self.new_value();
        v.kind = ValueKind::Type;
        v.ty = Some(t);
        v.cont = Cont {
            ty: self.types.cont_type(t),
            kind: ContKind::Reg {
                num: 0,
                global: false,
            },
        };
        v
    }

    /// An unresolved value identifier.
    pub(crate) fn value_var_name(&mut self, name: &str) -> Value {
        let mut v = self.new_value();
        v.kind = ValueKind::VarName;
        v.name = Some(name.to_string());
        v
    }

    /// An unresolved type identifier.
    pub(crate) fn value_type_name(&mut self, name: &str) -> Value {
        let mut v = self.new_value();
        v.kind = ValueKind::TypeName;
        v.name = Some(name.to_string());
        v
    }

    /// A fresh error value.
    pub(crate) fn value_error(&mut self) -> Value {
        self.new_value()
    }

    /// A weak copy of the shared void value.
    pub(crate) fn value_void(&mut self) -> Value {
        let copy = self.consts.void_v.weak_clone();
        self.adopt(copy)
    }

    /// A temporary of type `t`; object types also get their constructor
    /// call emitted.
    pub(crate) fn value_temp(&mut self, t: Type) -> Value {
        let mut v = self.new_value();
        self.setup_container(&mut v, t, ContTemplate::LReg);
        self.emit_value_alloc(&v);
        v
    }

    /// A local register without the constructor call.
    pub(crate) fn value_lreg(&mut self, t: Type) -> Value {
        let mut v = self.new_value();
        self.setup_container(&mut v, t, ContTemplate::LReg);
        v
    }

    /// A variable of type `t`: global pool in the main procedure, local
    /// otherwise.
    pub(crate) fn value_var(&mut self, t: Type) -> Value {
        let tmpl = if self.cur_proc().style == ProcStyle::Main {
            ContTemplate::GVar
        } else {
            ContTemplate::LVar
        };
        let mut v = self.new_value();
        self.setup_container(&mut v, t, tmpl);
        v
    }

    /// A string value: the bytes go into the VM data area and the string
    /// constructor combination is invoked on a fresh `Str` temporary.
    pub(crate) fn value_string(&mut self, s: &str) -> Value {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        let offset = self.vm.add_data(&bytes);

        let mut v_data = self.new_value();
        let obj_t = self.core.obj_t;
        self.setup_container(
            &mut v_data,
            obj_t,
            ContTemplate::GPtr {
                offset: offset as i64,
            },
        );

        let v_str = self.value_temp(self.core.str_t);
        match self.emit_call(&v_str, v_data) {
            Ok(()) => {}
            Err(v_data) => {
                self.log_err("failure while emitting a string constant".to_string());
                self.destroy_value(v_data);
            }
        }
        v_str
    }

    /// The callee-side parent argument (`$$`) of type `t`.
    pub(crate) fn value_parent(&mut self, t: Type) -> Value {
        self.value_parent_or_child(t, true)
    }

    /// The callee-side child argument (`$`) of type `t`.
    pub(crate) fn value_child(&mut self, t: Type) -> Value {
        self.value_parent_or_child(t, false)
    }

    fn value_parent_or_child(&mut self, t: Type, is_parent: bool) -> Value {
        if self.types.is_empty(t) {
            let mut v = self.value_temp(t);
            v.kind = ValueKind::Target;
            return v;
        }
        let reg = if is_parent {
            self.cur_proc().parent_reg()
        } else {
            self.cur_proc().child_reg()
        };
        let Some(reg) = reg else {
            self.log_err(format!(
                "procedure has no {} in its prototype",
                if is_parent { "parent" } else { "child" }
            ));
            return self.value_error();
        };
        let mut v = self.new_value();
        let ptr_t = self.core.ptr_t;
        self.setup_container(&mut v, ptr_t, ContTemplate::LRegFixed(reg));
        let mut v = self.emit_value_cast(v, t);
        v.kind = ValueKind::Target;
        v
    }

    // ----- basic emission -------------------------------------------------

    /// Append an operation to the current procedure.
    pub(crate) fn push_op(&mut self, op: GenOp, args: &[Cont]) {
        self.cur_proc().lir.push_op(op, args);
    }

    /// Append a branch to the current procedure.
    pub(crate) fn push_branch(&mut self, op: GenOp, target: Label) {
        self.cur_proc().lir.push_branch(op, target);
    }

    /// Emit the constructor call for an object-typed value.
    pub(crate) fn emit_value_alloc(&mut self, v: &Value) {
        match v.kind {
            ValueKind::Err => {}
            ValueKind::Temp | ValueKind::Target => {
                if v.cont.ty == ContType::Obj {
                    let tid = self.vm.install_type(v.ty(), &self.types);
                    self.push_op(
                        GenOp::Create,
                        &[v.cont, Cont::imm_int(tid.as_u32() as i64)],
                    );
                }
            }
            _ => unreachable!("allocation for {}", v.kind.describe()),
        }
    }

    /// Emit a run-time reference-count increment for a pointer-shaped value.
    pub(crate) fn emit_link(&mut self, v: &Value) {
        if matches!(v.cont.ty, ContType::Obj | ContType::Ptr)
            && matches!(v.cont.categ(), ContCateg::Lreg | ContCateg::Greg)
        {
            self.push_op(GenOp::Mln, &[v.cont]);
        }
    }

    /// Emit a run-time reference-count decrement for a pointer-shaped value.
    pub(crate) fn emit_unlink(&mut self, v: &Value) {
        if matches!(v.cont.ty, ContType::Obj | ContType::Ptr)
            && matches!(v.cont.categ(), ContCateg::Lreg | ContCateg::Greg)
        {
            self.push_op(GenOp::Munln, &[v.cont]);
        }
    }

    /// Emit a conditional jump on `v` to `target`: the value is moved into
    /// the integer scratch register first.
    pub(crate) fn emit_cjump(&mut self, v: &Value, target: Label) {
        self.push_op(GenOp::Mov, &[ri0(), v.cont]);
        self.push_branch(GenOp::Jc, target);
    }

    // ----- moving values around -------------------------------------------

    /// Force `v` into a fresh temporary (types are instantiated, immediates
    /// and targets are copied); temporaries pass through.
    pub(crate) fn make_temp(&mut self, v: Value) -> Value {
        match v.kind {
            ValueKind::VarName | ValueKind::TypeName => {
                self.log_err(format!(
                    "got {} (`{}`), but a defined type or value is expected here",
                    v.kind.describe(),
                    v.name.as_deref().unwrap_or("?")
                ));
                self.destroy_value(v);
                self.value_error()
            }
            ValueKind::Err | ValueKind::Temp => v,
            ValueKind::Type => {
                let t = v.ty();
                self.destroy_value(v);
                self.value_temp(t)
            }
            ValueKind::Imm | ValueKind::Target => {
                let t = v.ty();
                let src_cont = v.cont;
                self.destroy_value(v);
                let mut nv = self.new_value();
                self.setup_container(&mut nv, t, ContTemplate::LReg);
                if nv.cont.ty != ContType::Void {
                    self.push_op(GenOp::Mov, &[nv.cont, src_cont]);
                }
                nv
            }
        }
    }

    /// Targets pass through; everything else becomes a temporary.
    pub(crate) fn to_temp_or_target(&mut self, v: Value) -> Value {
        if v.is_target() {
            v
        } else {
            self.make_temp(v)
        }
    }

    /// Rewrite an object value into straight-pointer form, materialising a
    /// nonzero offset with a single add. Scalars get their address taken.
    pub(crate) fn cast_to_ptr2(&mut self, mut v: Value) -> Value {
        match v.cont.ty {
            ContType::Obj => match v.cont.kind {
                ContKind::Reg { .. } => v,
                ContKind::Ptr {
                    reg,
                    offset,
                    global,
                } => {
                    let base = Cont {
                        ty: ContType::Obj,
                        kind: ContKind::Reg { num: reg, global },
                    };
                    if offset == 0 {
                        // [roN + 0] is just roN.
                        v.cont = base;
                        v
                    } else if v.own_register && !global {
                        v.cont = base;
                        self.push_op(GenOp::Add, &[v.cont, Cont::imm_int(offset), v.cont]);
                        v
                    } else {
                        let t = v.ty();
                        self.destroy_value(v);
                        let nv = self.value_lreg(t);
                        self.push_op(GenOp::Add, &[nv.cont, Cont::imm_int(offset), base]);
                        nv
                    }
                }
                ContKind::Imm(_) => unreachable!("immediate objects are not addressable"),
            },
            ContType::Ptr => v,
            _ => {
                // A fast value: build a NULL-block pointer to its cell.
                let src_cont = v.cont;
                self.destroy_value(v);
                let ptr_t = self.core.ptr_t;
                let nv = self.value_temp(ptr_t);
                self.push_op(GenOp::Lea, &[nv.cont, src_cont]);
                nv
            }
        }
    }

    /// Reinterpret a pointer-shaped value as holding type `t`.
    pub(crate) fn emit_value_cast(&mut self, mut v: Value, t: Type) -> Value {
        debug_assert_eq!(v.cont.ty, ContType::Ptr);
        match v.cont.kind {
            ContKind::Reg { num, global } => {
                let ct = self.types.cont_type(t);
                v.ty = Some(t);
                v.cont.ty = ct;
                if ct != ContType::Obj && ct != ContType::Ptr {
                    v.cont = Cont::ptr(ct, num, 0, global);
                }
                v
            }
            ContKind::Ptr { .. } => {
                let src_cont = v.cont;
                self.destroy_value(v);
                let ptr_t = self.core.ptr_t;
                let nv = self.value_temp(ptr_t);
                self.push_op(GenOp::Ref, &[nv.cont, src_cont]);
                self.emit_value_cast(nv, t)
            }
            ContKind::Imm(_) => unreachable!("cannot cast an immediate pointer"),
        }
    }

    /// Take the address of `v` into a `Ptr`-typed value.
    pub(crate) fn emit_cast_to_ptr(&mut self, mut v: Value) -> Value {
        if v.cont.ty == ContType::Obj && v.cont.categ() != ContCateg::Ptr {
            v.ty = Some(self.core.ptr_t);
            v.cont.ty = ContType::Ptr;
            v
        } else {
            let src_cont = v.cont;
            self.destroy_value(v);
            let ptr_t = self.core.ptr_t;
            let nv = self.value_temp(ptr_t);
            self.push_op(GenOp::Lea, &[nv.cont, src_cont]);
            nv
        }
    }

    /// Turn an offsetted object pointer `[roN + k]` into a straight register
    /// pointer through one `lea`.
    pub(crate) fn emit_reduce_ptr_offset(&mut self, v: Value) -> Value {
        if v.cont.ty != ContType::Obj || v.cont.categ() != ContCateg::Ptr {
            return v;
        }
        let t = v.ty();
        let src_cont = v.cont;
        self.destroy_value(v);
        let nv = self.value_lreg(t);
        self.push_op(GenOp::Lea, &[nv.cont, src_cont]);
        nv
    }

    /// Rebase `v` to a sub-field at `offset` with type `subf`; no code is
    /// emitted, only the container changes.
    pub(crate) fn get_subfield(&mut self, mut v: Value, offset: i64, subf: Type) -> Value {
        let ct = self.types.cont_type(subf);
        match v.cont.kind {
            ContKind::Reg { num, global } => {
                v.cont = Cont::ptr(ct, num, offset, global);
            }
            ContKind::Ptr {
                reg,
                offset: base,
                global,
            } => {
                v.cont = Cont::ptr(ct, reg, base + offset, global);
            }
            ContKind::Imm(_) => unreachable!("immediate objects are not addressable"),
        }
        v.ty = Some(subf);
        v
    }

    /// Structure member access; `None` when the member does not exist.
    pub(crate) fn emit_struc_member_get(&mut self, v: Value, member: &str) -> Option<Value> {
        // Subtypes have no members of their own.
        let v = self.emit_subtype_expansion(v);

        if v.cont.ty == ContType::Point {
            let op = match member {
                "x" => GenOp::Pptrx,
                "y" => GenOp::Pptry,
                _ => {
                    self.destroy_value(v);
                    return None;
                }
            };
            let ptr_t = self.core.ptr_t;
            let mut dst = self.value_temp(ptr_t);
            self.push_op(op, &[dst.cont, v.cont]);
            dst.kind = ValueKind::Target;
            let real_t = self.core.real_t;
            let dst = self.get_subfield(dst, 0, real_t);
            self.destroy_value(v);
            return Some(dst);
        }

        let stem = self.types.stem(v.ty());
        match self.types.find_structure_member(stem, member) {
            Some((offset, ty)) => Some(self.get_subfield(v, offset as i64, ty)),
            None => {
                self.destroy_value(v);
                None
            }
        }
    }

    // ----- structure iteration --------------------------------------------

    /// Walks the members of a structure value, presenting a weak copy
    /// positioned at each member in turn.
    pub(crate) fn struc_iter_new(&mut self, v_struc: &Value) -> ValueStrucIter {
        let stem = self.types.stem(v_struc.ty());
        let members: SmallVec<[(i64, Type); 8]> = self
            .types
            .struct_members(stem)
            .iter()
            .map(|m| (m.offset as i64, m.ty))
            .collect();
        if members.is_empty() {
            let v_member = self.new_value();
            return ValueStrucIter {
                v_member,
                has_next: false,
                members,
                index: 0,
            };
        }
        let copy = self.weak_copy(v_struc);
        let (offset, ty) = members[0];
        let v_member = self.get_subfield(copy, offset, ty);
        ValueStrucIter {
            v_member,
            has_next: true,
            members,
            index: 0,
        }
    }

    /// Advance to the next member.
    pub(crate) fn struc_iter_next(&mut self, it: &mut ValueStrucIter) {
        it.index += 1;
        if it.index >= it.members.len() {
            it.has_next = false;
            return;
        }
        let (offset, ty) = it.members[it.index];
        let (prev_offset, _) = it.members[it.index - 1];
        let v = core::mem::replace(&mut it.v_member, Value::error());
        it.v_member = self.get_subfield(v, offset - prev_offset, ty);
    }

    /// Dispose of the iterator.
    pub(crate) fn struc_iter_finish(&mut self, it: ValueStrucIter) {
        self.destroy_value(it.v_member);
    }

    // ----- moves, assignment, expansion -----------------------------------

    /// Move `src` into `dst` in place; returns `dst`.
    pub(crate) fn emit_value_move(&mut self, dst: Value, src: Value) -> Value {
        let cmp = self.types.compare(dst.ty(), src.ty());
        if cmp == TypeCmp::Different {
            self.log_err(format!(
                "cannot move objects of type {} into objects of type {}",
                self.types.repr(src.ty()),
                self.types.repr(dst.ty())
            ));
            self.destroy_value(src);
            return dst;
        }
        let src = if cmp == TypeCmp::Matching {
            let dst_ty = dst.ty();
            self.emit_value_expansion(src, dst_ty)
        } else {
            src
        };

        if dst.cont.ty == ContType::Obj {
            // Objects are copied through the memory system, unless the user
            // registered a conversion.
            let src = self.emit_reduce_ptr_offset(src);
            let dst = self.emit_reduce_ptr_offset(dst);
            match self.try_emit_conversion(&dst, src) {
                Ok(()) => dst,
                Err(src) => {
                    let tid = self.vm.install_type(src.ty(), &self.types);
                    self.push_op(GenOp::Typeof, &[ri0(), Cont::imm_int(tid.as_u32() as i64)]);
                    self.push_op(GenOp::Reloc, &[dst.cont, src.cont, ri0()]);
                    self.destroy_value(src);
                    dst
                }
            }
        } else if dst.cont.ty == ContType::Ptr {
            // Pointers move with a reference-count bump.
            self.push_op(GenOp::Ref, &[dst.cont, src.cont]);
            self.destroy_value(src);
            dst
        } else {
            if dst.cont.ty != ContType::Void {
                self.push_op(GenOp::Mov, &[dst.cont, src.cont]);
            }
            self.destroy_value(src);
            dst
        }
    }

    /// Declare a variable for an unresolved identifier and move `src` into
    /// it. Returns the namespace's weak copy of the new variable.
    pub(crate) fn emit_value_assignment(&mut self, v_dst: Value, src: Value) -> Value {
        debug_assert_eq!(v_dst.kind, ValueKind::VarName);
        let name = v_dst.name.clone().expect("variable name");
        self.destroy_value(v_dst);

        let var = self.value_var(src.ty());
        let v_new = self.ns_add_value(&name, var);

        // A temporary object in a register can be handed over without a
        // copy: just reference it from the variable.
        if src.kind == ValueKind::Temp && src.cont.ty == ContType::Obj {
            if let ContKind::Reg { num, global: false } = src.cont.kind {
                if num > 0 {
                    self.push_op(GenOp::Ref, &[v_new.cont, src.cont]);
                    self.destroy_value(src);
                    return v_new;
                }
            }
        }

        self.emit_value_alloc(&v_new);
        self.emit_value_move(v_new, src)
    }

    /// Expand `src` as prescribed by `t_dst` (species target, memberwise
    /// structure expansion, or boxing into `Any`).
    pub(crate) fn emit_value_expansion(&mut self, src: Value, t_dst: Type) -> Value {
        if src.ty() == t_dst {
            return src;
        }
        let t_src = self
            .types
            .resolve(src.ty(), Resolve::IDENT | Resolve::SPECIES, 0);
        let t_dst_r = self.types.resolve(t_dst, Resolve::IDENT, 0);
        if t_src == t_dst_r {
            return src;
        }

        match self.types.class(t_dst_r) {
            TypeClass::Species => {
                let Some(target) = self.types.species_target(t_dst_r) else {
                    return src;
                };
                let dst = self.value_temp(target);
                match self.try_emit_conversion(&dst, src) {
                    Ok(()) => dst,
                    Err(src) => match self.emit_call(&dst, src) {
                        Ok(()) => dst,
                        Err(src) => {
                            self.log_err(format!(
                                "don't know how to convert objects of type {} to {}",
                                self.types.repr(src.ty()),
                                self.types.repr(target)
                            ));
                            self.destroy_value(src);
                            dst
                        }
                    },
                }
            }
            TypeClass::Structure => {
                if self.types.compare(t_dst_r, t_src) != TypeCmp::Matching {
                    return src;
                }
                let dst = self.value_temp(t_dst_r);
                let mut dst_it = self.struc_iter_new(&dst);
                let mut src_it = self.struc_iter_new(&src);
                while dst_it.has_next && src_it.has_next {
                    let d = self.weak_copy(&dst_it.v_member);
                    let s = self.weak_copy(&src_it.v_member);
                    let moved = self.emit_value_move(d, s);
                    self.destroy_value(moved);
                    self.struc_iter_next(&mut dst_it);
                    self.struc_iter_next(&mut src_it);
                }
                debug_assert_eq!(dst_it.has_next, src_it.has_next);
                self.struc_iter_finish(dst_it);
                self.struc_iter_finish(src_it);
                self.destroy_value(src);
                dst
            }
            TypeClass::Any => {
                let tid = self.vm.install_type(src.ty(), &self.types);
                let dst = self.value_temp(t_dst_r);
                if !self.types.is_empty(src.ty()) {
                    let src_ptr = self.weak_copy(&src);
                    let src_ptr = if src_ptr.kind == ValueKind::Imm {
                        self.make_temp(src_ptr)
                    } else {
                        src_ptr
                    };
                    let src_ptr = self.cast_to_ptr2(src_ptr);
                    self.push_op(GenOp::Typeof, &[ri0(), Cont::imm_int(tid.as_u32() as i64)]);
                    self.push_op(GenOp::Box, &[dst.cont, src_ptr.cont, ri0()]);
                    self.destroy_value(src_ptr);
                } else {
                    self.push_op(GenOp::Typeof, &[ri0(), Cont::imm_int(tid.as_u32() as i64)]);
                    self.push_op(GenOp::Box, &[dst.cont, ri0()]);
                }
                self.destroy_value(src);
                dst
            }
            _ => src,
        }
    }

    // ----- combination calls ----------------------------------------------

    /// The call number of a combination, generating one on first use. The
    /// slot stays reserved until an implementation is installed at it.
    pub(crate) fn comb_call_num(&mut self, comb: Comb) -> CallNum {
        if let Some(cn) = self.types.comb_call_num(comb) {
            return cn;
        }
        let cn = self.vm.alloc_call_num();
        self.types.set_comb_call_num(comb, cn);
        cn
    }

    /// Emit the three-instruction call sequence: parent into its pass
    /// register, child into its pass register, then the call itself.
    pub(crate) fn emit_call_num(&mut self, call_num: CallNum, parent: &Value, child: Value) {
        if parent.cont.ty != ContType::Void {
            let op = if parent.cont.ty == ContType::Obj && parent.cont.categ() != ContCateg::Ptr
            {
                GenOp::Mov
            } else {
                GenOp::Lea
            };
            let pass = self.pass_parent;
            self.push_op(op, &[pass, parent.cont]);
        }
        if child.cont.ty != ContType::Void {
            let to_pass = self.to_temp_or_target(child);
            let op = if to_pass.cont.ty == ContType::Obj
                && to_pass.cont.categ() != ContCateg::Ptr
            {
                GenOp::Ref
            } else {
                GenOp::Lea
            };
            let pass = self.pass_child;
            self.push_op(op, &[pass, to_pass.cont]);
            self.destroy_value(to_pass);
        } else {
            self.destroy_value(child);
        }
        self.push_op(GenOp::Call, &[Cont::imm_int(call_num.as_u32() as i64)]);
    }

    /// Call `parent @ child`. `Err` operands are silently swallowed, void
    /// children are ignored, and an `Any` child with no static combination
    /// becomes a dynamic call. When no combination applies, the child is
    /// handed back for the caller to examine.
    pub(crate) fn emit_call(&mut self, parent: &Value, child: Value) -> Result<(), Value> {
        if parent.is_err() || child.is_err() {
            self.destroy_value(child);
            return Ok(());
        }

        // Subtypes can never be children of a call.
        let child = self.emit_subtype_expansion(child);

        // Types derived from Void are always ignored.
        if self.types.compare(child.ty(), self.core.void_t) != TypeCmp::Different {
            self.destroy_value(child);
            return Ok(());
        }

        match self
            .types
            .find_combination(parent.ty(), CombKind::At, child.ty())
        {
            Some((comb, cmp)) => {
                let child = if cmp == TypeCmp::Matching {
                    let expand = self.types.comb_child(comb);
                    self.emit_value_expansion(child, expand)
                } else {
                    child
                };
                let cn = self.comb_call_num(comb);
                self.emit_call_num(cn, parent, child);
                Ok(())
            }
            None => {
                let child_stem = self.types.resolve(child.ty(), Resolve::IDENT, 0);
                if self.types.class(child_stem) != TypeClass::Any {
                    return Err(child);
                }
                // Dynamic call: box the parent weakly and dispatch at run
                // time on the pair of type-ids.
                let parent_copy = self.weak_copy(parent);
                let dyn_parent = self.weak_box(parent_copy);
                let child_ptr = self.cast_to_ptr2(child);
                self.push_op(GenOp::Dycall, &[dyn_parent.cont, child_ptr.cont]);
                self.destroy_value(child_ptr);
                self.destroy_value(dyn_parent);
                Ok(())
            }
        }
    }

    /// Weakly box `src` into an `Any` temporary; an `Any` passes through.
    pub(crate) fn weak_box(&mut self, src: Value) -> Value {
        let any_t = self.core.any_t;
        let t_src = self
            .types
            .resolve(src.ty(), Resolve::IDENT | Resolve::SPECIES, 0);
        if t_src == any_t {
            return src;
        }

        let tid = self.vm.install_type(src.ty(), &self.types);
        let dst = self.value_temp(any_t);
        if !self.types.is_empty(src.ty()) {
            let src_ptr = self.weak_copy(&src);
            // Immediates go through a register so that their address can be
            // taken; the register stays allocated until the boxing is done.
            let src_ptr = if src_ptr.kind == ValueKind::Imm {
                self.make_temp(src_ptr)
            } else {
                src_ptr
            };
            let src_ptr = self.cast_to_ptr2(src_ptr);
            self.push_op(GenOp::Typeof, &[ri0(), Cont::imm_int(tid.as_u32() as i64)]);
            self.push_op(GenOp::Wbox, &[dst.cont, src_ptr.cont, ri0()]);
            self.destroy_value(src_ptr);
        } else {
            self.push_op(GenOp::Typeof, &[ri0(), Cont::imm_int(tid.as_u32() as i64)]);
            self.push_op(GenOp::Box, &[dst.cont, ri0()]);
        }
        self.destroy_value(src);
        dst
    }

    // ----- subtypes -------------------------------------------------------

    /// Build a subtype value `parent.Name`: a pair of pointers to a fresh
    /// child and to the parent.
    pub(crate) fn emit_subtype_build(&mut self, mut parent: Value, name: &str) -> Option<Value> {
        let found = loop {
            match self.types.find_subtype(parent.ty(), name) {
                Some(st) => break st,
                None => {
                    // The subtype might belong to the child of the type:
                    // resolve and retry.
                    if self.types.is_subtype(parent.ty()) {
                        parent = self.emit_subtype_expansion(parent);
                        if parent.is_err() {
                            self.destroy_value(parent);
                            return None;
                        }
                    } else {
                        self.log_err(format!(
                            "type {} has not a subtype of name {}",
                            self.types.repr(parent.ty()),
                            name
                        ));
                        self.destroy_value(parent);
                        return None;
                    }
                }
            }
        };

        let v_subtype = self.value_temp(found);

        let (_, _, t_child) = self.types.subtype_info(found).expect("subtype node");
        if let Some(t_child) = t_child {
            if !self.types.is_empty(t_child) {
                let child_ptr = self.get_ptr_to_new_value(t_child);
                let field = self.weak_copy(&v_subtype);
                let ptr_t = self.core.ptr_t;
                let field = self.get_subfield(field, 0, ptr_t);
                let moved = self.emit_value_move(field, child_ptr);
                self.destroy_value(moved);
            }
        }

        if !self.types.is_empty(parent.ty()) {
            let field = self.weak_copy(&v_subtype);
            let ptr_t = self.core.ptr_t;
            let field = self.get_subfield(field, PTR_SIZE as i64, ptr_t);
            let parent_ptr = self.weak_copy(&parent);
            let parent_ptr = self.emit_cast_to_ptr(parent_ptr);
            let moved = self.emit_value_move(field, parent_ptr);
            self.destroy_value(moved);
        }

        self.destroy_value(parent);
        Some(v_subtype)
    }

    fn get_ptr_to_new_value(&mut self, t: Type) -> Value {
        let fast = matches!(
            self.types.cont_type(t),
            ContType::Char | ContType::Int | ContType::Real | ContType::Point
        );
        let v = if fast {
            // Wrap the fast value in a one-member structure so that it has
            // an addressable block.
            let wrapper = self.types.structure();
            self.types.add_structure_member(wrapper, t, None);
            self.value_temp(wrapper)
        } else {
            self.value_temp(t)
        };
        self.emit_cast_to_ptr(v)
    }

    /// Load the child component of a subtype value.
    pub(crate) fn emit_get_subtype_child(&mut self, v: Value) -> Option<Value> {
        self.subtype_get(v, true)
    }

    /// Load the parent component of a subtype value.
    pub(crate) fn emit_get_subtype_parent(&mut self, v: Value) -> Option<Value> {
        self.subtype_get(v, false)
    }

    fn subtype_get(&mut self, v: Value, get_child: bool) -> Option<Value> {
        let what = if get_child { "child" } else { "parent" };
        if !self.want_instance(&v) {
            self.destroy_value(v);
            return None;
        }
        let vt = self.types.resolve(v.ty(), Resolve::IDENT, 0);
        let info = self.types.subtype_info(vt).map(|(_, p, c)| (p, c));
        let Some((t_parent, t_child)) = info else {
            self.log_err(format!(
                "cannot get the {} of {}: this is not a subtype",
                what,
                self.types.repr(v.ty())
            ));
            self.destroy_value(v);
            return None;
        };
        let t_ret = if get_child { t_child } else { Some(t_parent) };
        let Some(t_ret) = t_ret else {
            self.log_err(format!(
                "cannot get the {} of an unregistered subtype",
                what
            ));
            self.destroy_value(v);
            return None;
        };

        if self.types.is_empty(t_ret) {
            let ret = self.value_temp(t_ret);
            self.destroy_value(v);
            return Some(ret);
        }

        let offset = if get_child { 0 } else { PTR_SIZE as i64 };
        let copy = self.weak_copy(&v);
        let ptr_t = self.core.ptr_t;
        let field = self.get_subfield(copy, offset, ptr_t);
        let ret = self.emit_value_cast(field, t_ret);
        self.destroy_value(v);
        Some(ret)
    }

    /// Expand a subtype-typed value to its child component, preserving
    /// target-ness.
    pub(crate) fn emit_subtype_expansion(&mut self, v: Value) -> Value {
        if v.is_value() && self.types.is_subtype(v.ty()) {
            let was_target = v.is_target();
            match self.emit_get_subtype_child(v) {
                Some(nv) => {
                    if was_target {
                        nv.promote_temp_to_target()
                    } else {
                        nv
                    }
                }
                None => self.value_error(),
            }
        } else {
            v
        }
    }

    // ----- raise / reference / dereference --------------------------------

    /// Un-raise a raised instance: same storage, source type.
    pub(crate) fn emit_raise_instance(&mut self, v: Value) -> Option<Value> {
        if !v.is_value() {
            self.log_err("raising operator got an invalid operand".to_string());
            self.destroy_value(v);
            return None;
        }
        let t = self.types.resolve(v.ty(), Resolve::IDENT, 0);
        match self.types.unraise(t) {
            Some(unraised) => {
                let mut v = v;
                v.ty = Some(unraised);
                Some(v)
            }
            None => {
                self.log_err("raising operator applied to a non-raised type".to_string());
                self.destroy_value(v);
                None
            }
        }
    }

    /// Take a reference: `&x` yields a pointer-typed temporary.
    pub(crate) fn emit_reference_instance(&mut self, v: Value) -> Option<Value> {
        if !v.is_value() {
            self.log_err("invalid operand to the reference operator".to_string());
            self.destroy_value(v);
            return None;
        }
        let mut v = self.cast_to_ptr2(v);
        let pointer = self.types.pointer(v.ty());
        v.ty = Some(pointer);
        v.cont.ty = ContType::Ptr;
        v.kind = ValueKind::Temp;
        Some(v)
    }

    /// Dereference a pointer, with a null guard.
    pub(crate) fn emit_dereference_instance(&mut self, v: Value) -> Option<Value> {
        if !v.is_value() {
            self.log_err("invalid operand to the dereference operator".to_string());
            self.destroy_value(v);
            return None;
        }
        let Some(deref) = self.types.deref_pointer(v.ty()) else {
            self.log_err(format!(
                "cannot dereference objects of type {}",
                self.types.repr(v.ty())
            ));
            self.destroy_value(v);
            return None;
        };
        let mut v = self.emit_value_cast(v, deref);
        v.kind = ValueKind::Target;
        self.push_op(GenOp::Notnul, &[v.cont]);
        Some(v)
    }

    // ----- predicates -----------------------------------------------------

    /// Whether `v` carries a value; reports a diagnostic otherwise (errors
    /// stay silent, they were reported already).
    pub(crate) fn want_instance(&mut self, v: &Value) -> bool {
        if v.is_value() {
            return true;
        }
        if v.is_err() {
            return false;
        }
        match &v.name {
            Some(name) => self.log_err(format!(
                "`{}` is undefined: an expression with both value and type is expected here",
                name
            )),
            None => self.log_err(format!(
                "got {}, but an expression with both value and type is expected here",
                v.kind.describe()
            )),
        }
        false
    }

    /// Whether `v` has a defined type; reports a diagnostic otherwise.
    pub(crate) fn want_has_type(&mut self, v: &Value) -> bool {
        if v.has_type() {
            return true;
        }
        if v.is_err() {
            return false;
        }
        match &v.name {
            Some(name) => self.log_err(format!(
                "`{}` is undefined: an expression with a defined type is expected here",
                name
            )),
            None => self.log_err(format!(
                "got {}, but an expression with a defined type is expected here",
                v.kind.describe()
            )),
        }
        false
    }

    /// Whether a statement value can be dropped without complaint.
    pub(crate) fn value_is_ignorable(&self, v: &Value) -> bool {
        if v.is_err() || v.kind == ValueKind::Type || v.ignore {
            return true;
        }
        if v.is_value() {
            return self.types.compare(self.core.void_t, v.ty()) != TypeCmp::Different;
        }
        false
    }
}

/// Iterator over the members of a structure value; see
/// [`Compiler::struc_iter_new`].
pub(crate) struct ValueStrucIter {
    /// A weak copy positioned at the current member.
    pub v_member: Value,
    /// Whether `v_member` is valid.
    pub has_next: bool,
    members: SmallVec<[(i64, Type); 8]>,
    index: usize,
}
