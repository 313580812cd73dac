//! The compiler driver.
//!
//! One handler per AST node kind, all sharing one evaluation stack, one
//! namespace, and the current procedure's LIR. Handlers keep a strict
//! contract: however a node compiles, exactly one item (a value or an error
//! marker) lands on the stack, and a node whose child poisoned the stack
//! produces exactly one error marker and emits nothing.

use crate::builtins::CoreTypes;
use crate::diag::Diagnostics;
use crate::namespace::{FloorItem, Namespace};
use crate::operators::{Operator, OprAttr};
use crate::proc::{ProcCode, ProcStyle};
use crate::value::{Value, ValueKind};
use boxc_ast::{BinOp, BoxNode, CompoundKind, Expr, ExprKind, Ident, Sep, Span, UnOp};
use boxc_ir::{Cont, ContKind, ContType, GenOp, Lir, SrcLoc};
use boxc_types::{CombKind, Resolve, Type, TypeCmp, TypeStore};
use boxc_vm::Vm;

/// One slot of the evaluation stack.
pub(crate) enum StackItem {
    /// Poison: a sub-expression failed.
    Error,
    /// A live value.
    Val(Value),
}

/// The compile-time constants handed out as weak copies.
pub(crate) struct ConstValues {
    pub begin: Value,
    pub end: Value,
    pub pause: Value,
    pub void_v: Value,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum BoxState {
    Initial,
    GotIf,
    GotElse,
}

/// The Box compiler: an AST walker emitting LIR into procedures installed
/// on a [`Vm`].
///
/// One instance compiles one program; it is single-threaded and not
/// reentrant.
pub struct Compiler {
    /// The type system the compilation works against.
    pub types: TypeStore,
    /// The installation target.
    pub vm: Vm,
    pub(crate) core: CoreTypes,
    pub(crate) ns: Namespace,
    pub(crate) stack: Vec<StackItem>,
    pub(crate) procs: Vec<ProcCode>,
    pub(crate) bin_ops: Vec<Operator>,
    pub(crate) un_ops: Vec<Operator>,
    pub(crate) convert: Operator,
    pub(crate) consts: ConstValues,
    pub(crate) pass_parent: Cont,
    pub(crate) pass_child: Cont,
    pub(crate) diags: Diagnostics,
    pub(crate) cur_span: Span,
    pub(crate) live_values: usize,
}

impl Compiler {
    /// Create a compiler with a fresh type store and VM, the builtin types
    /// and procedures already registered.
    pub fn new() -> Self {
        let mut types = TypeStore::new();
        let core = CoreTypes::create(&mut types);

        let un_ops = UnOp::ALL
            .iter()
            .map(|op| {
                let mut attr = OprAttr::NATIVE;
                if op.is_right() {
                    attr = attr | OprAttr::UN_RIGHT;
                }
                Operator::new(op.as_str(), attr)
            })
            .collect();
        let bin_ops = BinOp::ALL
            .iter()
            .map(|op| Operator::new(op.as_str(), OprAttr::NATIVE | OprAttr::BINARY))
            .collect();
        let convert = Operator::new("(->)", OprAttr::NATIVE | OprAttr::MATCH_RESULT);

        let ro_type = |t: Type, types: &TypeStore| Value {
            kind: ValueKind::Type,
            ty: Some(t),
            cont: Cont {
                ty: types.cont_type(t),
                kind: ContKind::Reg {
                    num: 0,
                    global: false,
                },
            },
            name: None,
            read_only: true,
            own_register: false,
            ignore: false,
        };
        let consts = ConstValues {
            begin: ro_type(core.begin_t, &types),
            end: ro_type(core.end_t, &types),
            pause: ro_type(core.pause_t, &types),
            void_v: Value {
                kind: ValueKind::Imm,
                ty: Some(core.void_t),
                cont: Cont::VOID,
                name: None,
                read_only: true,
                own_register: false,
                ignore: false,
            },
        };

        let mut main = ProcCode::new(ProcStyle::Main);
        main.name = Some("main".to_string());

        let mut compiler = Compiler {
            types,
            vm: Vm::new(),
            core,
            ns: Namespace::new(),
            stack: Vec::new(),
            procs: vec![main],
            bin_ops,
            un_ops,
            convert,
            consts,
            pass_parent: Cont::greg(ContType::Obj, 1),
            pass_child: Cont::greg(ContType::Obj, 2),
            diags: Diagnostics::new(),
            cur_span: Span::NONE,
            live_values: 0,
        };
        compiler.register_builtins();
        compiler
    }

    // ----- small accessors ------------------------------------------------

    pub(crate) fn cur_proc(&mut self) -> &mut ProcCode {
        self.procs.last_mut().expect("no current procedure")
    }

    pub(crate) fn cur_reg(&mut self) -> &mut crate::regalloc::RegAlloc {
        &mut self.cur_proc().reg
    }

    /// The LIR of the main procedure.
    pub fn main_lir(&self) -> &Lir {
        &self.procs[0].lir
    }

    /// The diagnostics recorded so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Number of open namespace floors.
    pub fn ns_depth(&self) -> usize {
        self.ns.depth()
    }

    /// Temporary registers currently allocated in the main procedure.
    pub fn main_temps_in_use(&self) -> u32 {
        self.procs[0].reg.temps_in_use()
    }

    pub(crate) fn log_err(&mut self, message: String) {
        let span = self.cur_span;
        self.diags.error(span, message);
    }

    pub(crate) fn log_warn(&mut self, message: String) {
        let span = self.cur_span;
        self.diags.warn(span, message);
    }

    pub(crate) fn begin_value(&mut self) -> Value {
        let copy = self.consts.begin.weak_clone();
        self.adopt(copy)
    }

    pub(crate) fn end_value(&mut self) -> Value {
        let copy = self.consts.end.weak_clone();
        self.adopt(copy)
    }

    pub(crate) fn pause_value(&mut self) -> Value {
        let copy = self.consts.pause.weak_clone();
        self.adopt(copy)
    }

    // ----- namespace ------------------------------------------------------

    /// Bind `v` under `name` on the current floor; returns a weak copy.
    pub(crate) fn ns_add_value(&mut self, name: &str, v: Value) -> Value {
        let copy = self.weak_copy(&v);
        self.ns.add_value(name, v);
        copy
    }

    /// A weak copy of the visible binding for `name`.
    pub(crate) fn ns_get_value(&mut self, name: &str) -> Option<Value> {
        let copy = self.ns.get_value(name)?.weak_clone();
        Some(self.adopt(copy))
    }

    pub(crate) fn floor_up(&mut self) {
        self.ns.floor_up();
    }

    /// Close the top floor: destroy its values (restoring shadowed
    /// bindings), undefine its combinations unless this closes the module
    /// scope, and run its callbacks, all in reverse insertion order.
    pub(crate) fn floor_down(&mut self) {
        let items = self.ns.pop_floor();
        let undefine = self.ns.depth() > 1;
        for item in items.into_iter().rev() {
            match item {
                FloorItem::Value { name } => {
                    if let Some(v) = self.ns.take_value(&name) {
                        self.destroy_value(v);
                    }
                }
                FloorItem::Procedure { parent, comb } => {
                    if undefine {
                        self.types.undefine_combination(parent, comb);
                    }
                }
                FloorItem::Callback(callback) => callback(self),
            }
        }
    }

    // ----- the evaluation stack -------------------------------------------

    /// Push a value; `None` pushes an error marker.
    pub(crate) fn push_value(&mut self, v: Option<Value>) {
        match v {
            Some(v) => self.stack.push(StackItem::Val(v)),
            None => self.push_error(1),
        }
    }

    /// Push `n` error markers.
    pub(crate) fn push_error(&mut self, n: usize) {
        for _ in 0..n {
            self.stack.push(StackItem::Error);
        }
    }

    /// Pop the top item; error markers come back as fresh error values.
    pub(crate) fn pop_value(&mut self) -> Value {
        match self.stack.pop().expect("evaluation stack underflow") {
            StackItem::Error => self.value_error(),
            StackItem::Val(v) => v,
        }
    }

    /// Borrow the item at depth `pos` (0 = top); `None` for error markers.
    pub(crate) fn get_value(&self, pos: usize) -> Option<&Value> {
        match &self.stack[self.stack.len() - 1 - pos] {
            StackItem::Error => None,
            StackItem::Val(v) => Some(v),
        }
    }

    /// A weak copy of the item at depth `pos`; error markers yield error
    /// values.
    pub(crate) fn get_value_weak(&mut self, pos: usize) -> Value {
        let idx = self.stack.len() - 1 - pos;
        let copy = match &self.stack[idx] {
            StackItem::Error => None,
            StackItem::Val(v) => Some(v.weak_clone()),
        };
        match copy {
            Some(copy) => self.adopt(copy),
            None => self.value_error(),
        }
    }

    fn set_top_ignorable(&mut self, ignorable: bool) {
        if let Some(StackItem::Val(v)) = self.stack.last_mut() {
            v.ignore = ignorable;
        }
    }

    /// Destroy the top `n` items.
    pub(crate) fn remove_any(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(StackItem::Val(v)) = self.stack.pop() {
                self.destroy_value(v);
            }
        }
    }

    /// Standard poison propagation: if any of the top `items_to_pop` items
    /// is an error, drop them all, push `errors_to_push` markers, and
    /// report `true`.
    pub(crate) fn pop_errors(&mut self, items_to_pop: usize, errors_to_push: usize) -> bool {
        let n = self.stack.len();
        let mut poisoned = false;
        for i in 0..items_to_pop {
            match &self.stack[n - 1 - i] {
                StackItem::Error => {
                    poisoned = true;
                    break;
                }
                StackItem::Val(v) if v.is_err() => {
                    poisoned = true;
                    break;
                }
                StackItem::Val(_) => {}
            }
        }
        if !poisoned {
            return false;
        }
        self.remove_any(items_to_pop);
        self.push_error(errors_to_push);
        true
    }

    // ----- entry point ----------------------------------------------------

    /// Compile a whole program into the main procedure. Returns whether the
    /// output is sane (no error diagnostics).
    pub fn compile(&mut self, program: &BoxNode) -> bool {
        self.diags.reset();
        let live_before = self.live_values;
        let depth_before = self.ns.depth();

        self.compile_box_generic(program, None, None);
        self.remove_any(1);

        debug_assert_eq!(self.stack.len(), 0, "evaluation stack not empty");
        debug_assert_eq!(self.ns.depth(), depth_before, "namespace floors unbalanced");
        debug_assert_eq!(self.live_values, live_before, "values leaked");
        debug_assert_eq!(
            self.procs[0].reg.temps_in_use(),
            0,
            "temporary registers leaked"
        );
        self.diags.is_sane()
    }

    // ----- dispatch -------------------------------------------------------

    fn srcloc_of(span: Span) -> SrcLoc {
        if span.is_known() {
            SrcLoc::new(span.start)
        } else {
            SrcLoc::default_loc()
        }
    }

    /// Compile any expression node, leaving exactly one stack item.
    pub(crate) fn compile_any(&mut self, expr: &Expr) {
        let prev_span = core::mem::replace(&mut self.cur_span, expr.span);
        let loc = Self::srcloc_of(expr.span);
        self.cur_proc().lir.set_srcloc(loc);
        let depth = self.stack.len();

        match &expr.kind {
            ExprKind::CharImm(c) => {
                let v = self.value_imm_char(*c);
                self.push_value(Some(v));
            }
            ExprKind::IntImm(i) => {
                let v = self.value_imm_int(*i);
                self.push_value(Some(v));
            }
            ExprKind::RealImm(r) => {
                let v = self.value_imm_real(*r);
                self.push_value(Some(v));
            }
            ExprKind::StrImm(s) => {
                let v = self.value_string(s);
                self.push_value(Some(v));
            }
            ExprKind::VarIdfr(name) => self.compile_var_idfr(name),
            ExprKind::TypeIdfr(name) => self.compile_type_idfr(name),
            ExprKind::TypeTag(tag) => {
                let t = self.core.tag_type(*tag);
                let v = self.value_type(t);
                self.push_value(Some(v));
            }
            ExprKind::Keyword(inner) => self.compile_keyword(inner),
            ExprKind::Ignore(inner) => {
                self.compile_any(inner);
                self.set_top_ignorable(true);
            }
            ExprKind::UnOp { op, operand } => self.compile_un_op(*op, operand),
            ExprKind::UnTypeOp { op, operand } => self.compile_un_type_op(*op, operand),
            ExprKind::BinOp { op, lhs, rhs } => self.compile_bin_op(*op, lhs, rhs),
            ExprKind::Get { parent, name } => self.compile_get(parent.as_deref(), name),
            ExprKind::ArgGet { depth } => self.compile_arg_get(*depth),
            ExprKind::Subtype { parent, name } => self.compile_subtype(parent.as_deref(), name),
            ExprKind::Box(node) => self.compile_box_generic(node, None, None),
            ExprKind::CombDef {
                child,
                parent,
                c_name,
                body,
            } => self.compile_comb_def(child, parent, c_name.as_ref(), body.as_ref()),
            ExprKind::Compound { kind, members } => {
                self.compile_compound(*kind, members, expr)
            }
        }

        debug_assert_eq!(
            self.stack.len(),
            depth + 1,
            "node handler broke the stack-balance contract"
        );
        self.cur_span = prev_span;
        let loc = Self::srcloc_of(prev_span);
        self.cur_proc().lir.set_srcloc(loc);
    }

    // ----- leaf handlers --------------------------------------------------

    fn compile_var_idfr(&mut self, name: &str) {
        match self.ns_get_value(name) {
            Some(v) => self.push_value(Some(v)),
            None => {
                let v = self.value_var_name(name);
                self.push_value(Some(v));
            }
        }
    }

    fn compile_type_idfr(&mut self, name: &str) {
        match self.ns_get_value(name) {
            Some(v) => self.push_value(Some(v)),
            None => {
                // Bind the unresolved name so later sightings share it; a
                // type assignment may retro-define it.
                let v = self.value_type_name(name);
                let copy = self.ns_add_value(name, v);
                self.push_value(Some(copy));
            }
        }
    }

    fn compile_keyword(&mut self, inner: &Expr) {
        self.compile_any(inner);
        if self.pop_errors(1, 1) {
            return;
        }
        let v = self.pop_value();
        let v = self.to_temp_or_target(v);
        self.push_value(Some(v));
    }

    // ----- operators ------------------------------------------------------

    fn compile_un_op(&mut self, op: UnOp, operand: &Expr) {
        self.compile_any(operand);
        if self.pop_errors(1, 1) {
            return;
        }
        let v = self.pop_value();
        if !self.want_instance(&v) {
            self.destroy_value(v);
            self.push_error(1);
            return;
        }
        let result = match op {
            UnOp::Raise => self.emit_raise_instance(v),
            UnOp::Ref => self.emit_reference_instance(v),
            UnOp::Deref => self.emit_dereference_instance(v),
            _ => self.opr_emit_un(op, v),
        };
        self.push_value(result);
    }

    fn compile_un_type_op(&mut self, op: UnOp, operand: &Expr) {
        self.compile_any(operand);
        if self.pop_errors(1, 1) {
            return;
        }
        let v = self.pop_value();
        if !self.want_has_type(&v) {
            self.destroy_value(v);
            self.push_error(1);
            return;
        }
        let out = match op {
            UnOp::LInc | UnOp::Raise => Some(self.types.raised(v.ty())),
            UnOp::Ref => Some(self.types.pointer(v.ty())),
            UnOp::Deref => {
                let deref = self.types.deref_pointer(v.ty());
                if deref.is_none() {
                    self.log_err(format!(
                        "cannot dereference the type {}",
                        self.types.repr(v.ty())
                    ));
                }
                deref
            }
            _ => {
                self.log_err(format!("cannot apply unary operator {} to a type", op));
                None
            }
        };
        self.destroy_value(v);
        match out {
            Some(t) => {
                let tv = self.value_type(t);
                self.push_value(Some(tv));
            }
            None => self.push_error(1),
        }
    }

    fn compile_bin_op(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) {
        self.compile_any(lhs);
        self.compile_any(rhs);
        if self.pop_errors(2, 1) {
            return;
        }
        let right = self.pop_value();
        let left = self.pop_value();

        if op == BinOp::Assign {
            let result = if lhs.is_type_expr() && rhs.is_type_expr() {
                self.compile_type_assignment(left, right)
            } else {
                self.compile_value_assignment(left, right)
            };
            self.push_value(result);
            return;
        }

        let left_ok = self.want_instance(&left);
        let right_ok = self.want_instance(&right);
        if left_ok && right_ok {
            let result = self.opr_emit_bin(op, left, right);
            self.push_value(result);
        } else {
            self.destroy_value(left);
            self.destroy_value(right);
            self.push_error(1);
        }
    }

    fn compile_value_assignment(&mut self, left: Value, right: Value) -> Option<Value> {
        if !self.want_instance(&right) {
            self.destroy_value(left);
            self.destroy_value(right);
            return None;
        }
        // Subtypes are always expanded in assignments, on both sides.
        let left = self.emit_subtype_expansion(left);
        let right = self.emit_subtype_expansion(right);

        if left.is_var_name() {
            let v = self.emit_value_assignment(left, right);
            Some(v.set_ignorable(true))
        } else if left.is_target() {
            let v = self.emit_value_move(left, right);
            Some(v.set_ignorable(true))
        } else {
            self.log_err(format!(
                "invalid target for assignment ({})",
                left.kind.describe()
            ));
            self.destroy_value(left);
            self.destroy_value(right);
            None
        }
    }

    fn compile_type_assignment(&mut self, v_name: Value, v_type: Value) -> Option<Value> {
        if !self.want_has_type(&v_type) {
            self.destroy_value(v_name);
            self.destroy_value(v_type);
            return None;
        }

        if v_name.is_type_name() {
            // Create and bind the new identity type.
            let name = v_name.name.clone().expect("type name");
            let ident = self.types.ident(v_type.ty(), &name);
            let tv = self.value_type(ident);
            let bound = self.ns_add_value(&name, tv);
            self.destroy_value(v_name);
            self.destroy_value(v_type);
            return Some(bound);
        }

        if v_name.has_type() {
            let t = self.types.resolve(v_name.ty(), Resolve::IDENT, 0);
            if self.types.is_subtype(v_name.ty()) {
                if self.types.is_registered_subtype(t) {
                    let child = self
                        .types
                        .subtype_info(t)
                        .and_then(|(_, _, c)| c)
                        .expect("registered subtype has a child");
                    if self.types.compare(child, v_type.ty()) == TypeCmp::Different {
                        self.log_err(format!(
                            "inconsistent redefinition of type {}: was {} and is now {}",
                            self.types.repr(v_name.ty()),
                            self.types.repr(child),
                            self.types.repr(v_type.ty())
                        ));
                    }
                } else {
                    // Retro-definition of a previously unresolved subtype.
                    let _ = self.types.register_subtype(t, v_type.ty());
                }
            } else if self.types.compare(v_name.ty(), v_type.ty()) == TypeCmp::Different {
                self.log_err(format!(
                    "inconsistent redefinition of type {}",
                    self.types.repr(v_name.ty())
                ));
            }
            self.destroy_value(v_name);
            return Some(v_type);
        }

        self.destroy_value(v_name);
        self.destroy_value(v_type);
        None
    }

    // ----- member and argument access -------------------------------------

    fn compile_get(&mut self, parent: Option<&Expr>, name: &Ident) {
        let v_struc = match parent {
            Some(p) => {
                self.compile_any(p);
                self.pop_value()
            }
            None => match self.ns_get_value("#") {
                Some(v) => v,
                None => {
                    self.log_err(format!(
                        "cannot get implicit member `{}`: default parent is not defined in \
                         the current scope",
                        name.name
                    ));
                    self.push_error(1);
                    return;
                }
            },
        };
        if !self.want_instance(&v_struc) {
            self.destroy_value(v_struc);
            self.push_error(1);
            return;
        }
        let t = v_struc.ty();
        match self.emit_struc_member_get(v_struc, &name.name) {
            Some(v) => self.push_value(Some(v)),
            None => {
                self.log_err(format!(
                    "cannot find the member `{}` of an object with type `{}`",
                    name.name,
                    self.types.repr(t)
                ));
                self.push_error(1);
            }
        }
    }

    fn compile_arg_get(&mut self, depth: u32) {
        match depth {
            0 | 1 => match self.ns_get_value("$") {
                Some(v) => self.push_value(Some(v)),
                None => {
                    self.log_err("`$` is not defined in the current scope".to_string());
                    self.push_error(1);
                }
            },
            2 => match self.ns_get_value("$$") {
                Some(v) => {
                    // The parent must be assignable inside the body.
                    let v = v.promote_temp_to_target();
                    self.push_value(Some(v));
                }
                None => {
                    self.log_err("`$$` is not defined in the current scope".to_string());
                    self.push_error(1);
                }
            },
            n => {
                let mut v = match self.ns_get_value("$$") {
                    Some(v) => v,
                    None => {
                        self.log_err("`$$` is not defined in the current scope".to_string());
                        self.push_error(1);
                        return;
                    }
                };
                for _ in 2..n {
                    match self.emit_get_subtype_parent(v) {
                        Some(next) => v = next,
                        None => {
                            self.push_error(1);
                            return;
                        }
                    }
                }
                let v = v.promote_temp_to_target();
                self.push_value(Some(v));
            }
        }
    }

    // ----- subtypes -------------------------------------------------------

    fn compile_subtype(&mut self, parent: Option<&Expr>, name: &Ident) {
        match parent {
            Some(p) if p.is_type_expr() => self.compile_subtype_type(p, name),
            _ => self.compile_subtype_value(parent, name),
        }
    }

    fn compile_subtype_type(&mut self, parent: &Expr, name: &Ident) {
        self.compile_any(parent);
        if self.pop_errors(1, 1) {
            return;
        }
        let v = self.pop_value();
        if !self.want_has_type(&v) {
            self.destroy_value(v);
            self.push_error(1);
            return;
        }
        let pt = v.ty();
        let new_subtype = if self.types.is_subtype(pt) {
            // Our parent is already a subtype (X.Y, asked for X.Y.Z): it
            // must itself be registered first.
            if self.types.is_registered_subtype(pt) {
                let host = self.types.resolve(pt, Resolve::IDENT, 0);
                Some(self.find_or_create_subtype(host, &name.name))
            } else {
                self.log_err(format!(
                    "cannot build subtype `{}` of undefined subtype `{}`",
                    name.name,
                    self.types.repr(pt)
                ));
                None
            }
        } else {
            Some(self.find_or_create_subtype(pt, &name.name))
        };
        self.destroy_value(v);
        match new_subtype {
            Some(st) => {
                let tv = self.value_type(st);
                self.push_value(Some(tv));
            }
            None => self.push_error(1),
        }
    }

    fn find_or_create_subtype(&mut self, parent: Type, name: &str) -> Type {
        match self.types.find_subtype(parent, name) {
            Some(st) => st,
            None => self.types.create_subtype(parent, name, None),
        }
    }

    fn compile_subtype_value(&mut self, parent: Option<&Expr>, name: &Ident) {
        let v_parent = match parent {
            Some(p) => {
                self.compile_any(p);
                if self.pop_errors(1, 1) {
                    return;
                }
                self.pop_value()
            }
            None => match self.ns_get_value("#") {
                Some(v) => v,
                None => {
                    self.log_err(format!(
                        "cannot get implicit method `{}`: default parent is not defined in \
                         the current scope",
                        name.name
                    ));
                    self.push_error(1);
                    return;
                }
            },
        };
        if !self.want_instance(&v_parent) {
            self.destroy_value(v_parent);
            self.push_error(1);
            return;
        }
        let result = self.emit_subtype_build(v_parent, &name.name);
        self.push_value(result);
    }

    // ----- the Box construct ----------------------------------------------

    /// Compile a box: evaluate the parent, open a floor with `$`, `$$` and
    /// `#`, call `Begin`, run the statements (with `Pause` calls and the
    /// `If`/`Else`/`For` control types), call `End`, close the floor. The
    /// box's value is left on the stack.
    pub(crate) fn compile_box_generic(
        &mut self,
        node: &BoxNode,
        t_child: Option<Type>,
        t_parent: Option<Type>,
    ) {
        let mut parent;
        // When the box has no parent expression the box's value is void and
        // `#` is inherited from the enclosing scope.
        let mut void_result = None;
        let mut parent_is_err = false;

        match &node.parent {
            None => {
                parent = match self.ns_get_value("#") {
                    Some(v) => v,
                    None => self.value_void(),
                };
                void_result = Some(self.value_void());
            }
            Some(pexpr) => {
                self.compile_any(pexpr);
                let parent_type = self.pop_value();
                if pexpr.is_type_expr()
                    && parent_type.has_type()
                    && self.types.is_subtype(parent_type.ty())
                {
                    self.log_err(format!(
                        "cannot instantiate unbound subtype {}",
                        self.types.repr(parent_type.ty())
                    ));
                    let mut v = parent_type;
                    self.finish_value(&mut v);
                    parent = v;
                    parent_is_err = true;
                } else {
                    parent = self.to_temp_or_target(parent_type);
                    parent_is_err = parent.is_err();
                }
            }
        }

        // Variables defined in this box die when it closes.
        self.floor_up();

        if let Some(tc) = t_child {
            let v = self.value_child(tc);
            let copy = self.ns_add_value("$", v);
            self.destroy_value(copy);
        }
        if let Some(tp) = t_parent {
            // Inside a combination body the parent of every statement is
            // the callee's own parent.
            let v = self.value_parent(tp);
            let copy = self.ns_add_value("$$", v);
            self.destroy_value(parent);
            parent = copy;
            parent_is_err = parent.is_err();
        }

        {
            // `#` is the object under construction, promoted to a target so
            // that implicit members (`.x = 1`) can be assigned through it.
            let copy = self.weak_copy(&parent);
            let copy = copy.promote_temp_to_target();
            let bound = self.ns_add_value("#", copy);
            self.destroy_value(bound);
        }

        if node.parent.is_some() {
            let begin = self.begin_value();
            if let Err(v) = self.emit_call(&parent, begin) {
                self.destroy_value(v);
            }
        }

        // `For` jumps back here.
        let body_label = self.cur_proc().lir.label_here();
        let mut else_label = None;
        let mut end_label = None;
        let mut state = BoxState::Initial;
        let mut need_floor_down = false;

        for stmt in &node.stmts {
            if stmt.sep == Sep::Pause && !parent_is_err {
                let pause = self.pause_value();
                if let Err(pause) = self.emit_call(&parent, pause) {
                    let message = format!(
                        "don't know how to use `{}` expressions inside a `{}` box",
                        self.types.repr(pause.ty()),
                        self.types.repr(parent.ty())
                    );
                    self.diags.warn(stmt.sep_span, message);
                    self.destroy_value(pause);
                }
            }

            let stmt_val = match &stmt.expr {
                Some(e) => {
                    self.compile_any(e);
                    self.pop_value()
                }
                None => self.value_void(),
            };

            if parent_is_err || self.value_is_ignorable(&stmt_val) {
                self.destroy_value(stmt_val);
                continue;
            }
            if !self.want_has_type(&stmt_val) {
                self.destroy_value(stmt_val);
                continue;
            }

            match self.emit_call(&parent, stmt_val) {
                Ok(()) => {}
                Err(stmt_val) => {
                    let ty = stmt_val.ty();
                    if self.types.compare(ty, self.core.if_t) != TypeCmp::Different {
                        let target = match else_label {
                            Some(l) => l,
                            None => {
                                let l = self.cur_proc().lir.new_label();
                                else_label = Some(l);
                                l
                            }
                        };
                        self.emit_cjump(&stmt_val, target);
                        if state != BoxState::GotIf {
                            debug_assert!(!need_floor_down);
                            self.floor_up();
                            need_floor_down = true;
                        }
                        state = BoxState::GotIf;
                    } else if self.types.compare(ty, self.core.else_t) != TypeCmp::Different {
                        if state == BoxState::GotIf {
                            let end = match end_label {
                                Some(l) => l,
                                None => {
                                    let l = self.cur_proc().lir.new_label();
                                    end_label = Some(l);
                                    l
                                }
                            };
                            self.push_branch(GenOp::Jmp, end);
                            let l = else_label.take().expect("`If` leaves an else label");
                            self.cur_proc().lir.bind_label(l);
                            debug_assert!(need_floor_down);
                            self.floor_down();
                            need_floor_down = false;
                        } else if state == BoxState::GotElse {
                            self.log_err("double `Else`".to_string());
                        } else {
                            self.log_err("`Else` without `If`".to_string());
                        }
                        state = BoxState::GotElse;
                    } else if self.types.compare(ty, self.core.for_t) != TypeCmp::Different {
                        self.emit_cjump(&stmt_val, body_label);
                    } else {
                        let message = format!(
                            "don't know how to use `{}` expressions inside a `{}` box",
                            self.types.repr(ty),
                            self.types.repr(parent.ty())
                        );
                        self.log_warn(message);
                    }
                    self.destroy_value(stmt_val);
                }
            }
        }

        if need_floor_down {
            self.floor_down();
        }
        // Pin pending labels before the End call, so that Begin/End always
        // run exactly once.
        if let Some(l) = end_label {
            self.cur_proc().lir.bind_label(l);
        }
        if let Some(l) = else_label {
            self.cur_proc().lir.bind_label(l);
        }
        if node.parent.is_some() {
            let end = self.end_value();
            if let Err(v) = self.emit_call(&parent, end) {
                self.destroy_value(v);
            }
        }

        self.floor_down();

        match void_result {
            Some(result) => {
                self.destroy_value(parent);
                self.push_value(Some(result));
            }
            None => self.push_value(Some(parent)),
        }
    }

    // ----- combination definitions ----------------------------------------

    fn compile_comb_def(
        &mut self,
        child: &Expr,
        parent: &Expr,
        c_name: Option<&(String, Span)>,
        body: Option<&BoxNode>,
    ) {
        self.compile_any(child);
        let v_child = self.pop_value();
        self.compile_any(parent);
        let v_parent = self.pop_value();

        let child_ok = self.want_has_type(&v_child);
        let parent_ok = self.want_has_type(&v_parent);
        if !(child_ok && parent_ok) {
            self.destroy_value(v_child);
            self.destroy_value(v_parent);
            self.push_error(1);
            return;
        }
        let t_child = v_child.ty();
        let t_parent = v_parent.ty();
        self.destroy_value(v_child);
        self.destroy_value(v_parent);

        if let Some((name, span)) = c_name {
            if name.is_empty() {
                self.diags.error(
                    *span,
                    "empty string in C-name for a procedure declaration".to_string(),
                );
                self.push_error(1);
                return;
            }
        }

        // The surface syntax only defines at-combinations.
        let kind = CombKind::At;

        // Reuse an existing declaration when it is still a bare prototype,
        // or when this is itself a bare re-declaration.
        let comb = match self.types.find_own_combination(t_parent, kind, t_child) {
            Some(existing)
                if (!self.types.comb_is_implemented(existing)
                    && self.types.comb_name(existing).is_none())
                    || (c_name.is_none() && body.is_none()) =>
            {
                existing
            }
            _ => {
                let comb = self.types.define_combination(t_parent, kind, t_child);
                self.ns.add_procedure(t_parent, comb);
                comb
            }
        };

        if let Some((name, _)) = c_name {
            self.types.set_comb_name(comb, name);
            if body.is_none() {
                // An extern declaration: install the named symbol now.
                let cn = self.comb_call_num(comb);
                if let Err(e) = self.vm.install_native_at(cn, name) {
                    self.log_err(format!("cannot reference `{}`: {}", name, e));
                }
                self.types.set_comb_implemented(comb);
            }
        }

        if let Some(body) = body {
            // Switch the compilation target to a fresh sub procedure.
            let mut proc = ProcCode::new(ProcStyle::Sub);
            proc.set_prototype(
                !self.types.is_empty(t_child),
                !self.types.is_empty(t_parent),
            );
            proc.name = Some(self.types.comb_repr(comb));
            let cn = self.comb_call_num(comb);
            proc.call_num = Some(cn);
            self.procs.push(proc);

            self.compile_box_generic(body, Some(t_child), Some(t_parent));
            let body_value = self.pop_value();
            self.destroy_value(body_value);

            let proc = self.procs.pop().expect("sub procedure on the stack");
            if let Err(e) =
                self.vm
                    .install_code(cn, proc.name.as_deref(), &proc.frame(), &proc.lir)
            {
                self.log_err(format!("cannot install the procedure: {}", e));
            }
            self.types.set_comb_implemented(comb);
        }

        let v = self.value_void();
        self.push_value(Some(v));
    }

    // ----- compounds ------------------------------------------------------

    fn compile_compound(&mut self, kind: CompoundKind, members: &[boxc_ast::Member], expr: &Expr) {
        match kind {
            CompoundKind::Identity => {
                match members.first().and_then(|m| m.expr.as_ref()) {
                    Some(inner) => {
                        self.compile_any(inner);
                        // A parenthesised value is never implicitly
                        // ignorable.
                        self.set_top_ignorable(false);
                    }
                    None => self.push_error(1),
                }
            }
            CompoundKind::Species => self.compile_species_type(members),
            CompoundKind::Struct => {
                if expr.is_type_expr() {
                    self.compile_struct_type(members)
                } else {
                    self.compile_struct_value(members)
                }
            }
        }
    }

    fn compile_struct_value(&mut self, members: &[boxc_ast::Member]) {
        let n = members.len();
        let mut no_err = true;

        // Compile the members and leave them on the stack.
        for member in members {
            match &member.expr {
                Some(e) => self.compile_any(e),
                None => {
                    self.diags
                        .error(member.span, "missing member value in structure".to_string());
                    self.push_error(1);
                }
            }
            let v = self.pop_value();
            let mut ok = self.want_instance(&v);
            if ok && self.types.is_empty(v.ty()) {
                self.log_err(format!(
                    "invalid structure member of type `{}`",
                    self.types.repr(v.ty())
                ));
                ok = false;
            }
            no_err &= ok;
            self.push_value(Some(v));
        }

        if !no_err {
            self.remove_any(n);
            self.push_error(1);
            return;
        }

        // Build the anonymous structure type from the member types.
        let t_struc = self.types.structure();
        for i in 0..n {
            let ty = self
                .get_value(n - 1 - i)
                .expect("member value on the stack")
                .ty();
            self.types.add_structure_member(t_struc, ty, None);
        }

        // Create the structure and move the members in.
        let v_struc = self.value_temp(t_struc);
        let mut it = self.struc_iter_new(&v_struc);
        let mut index = 0;
        while it.has_next {
            let src = self.get_value_weak(n - 1 - index);
            let dst = self.weak_copy(&it.v_member);
            let moved = self.emit_value_move(dst, src);
            self.destroy_value(moved);
            self.struc_iter_next(&mut it);
            index += 1;
        }
        self.struc_iter_finish(it);

        self.remove_any(n);
        self.push_value(Some(v_struc));
    }

    fn compile_struct_type(&mut self, members: &[boxc_ast::Member]) {
        let t_struc = self.types.structure();
        let mut err = false;
        let mut previous: Option<Type> = None;

        for member in members {
            if let Some(e) = &member.expr {
                self.compile_any(e);
                let v = self.pop_value();
                if !self.want_has_type(&v) {
                    err = true;
                } else {
                    let t = v.ty();
                    if self.types.is_empty(t) {
                        self.log_err(format!(
                            "zero-sized type `{}` not allowed as the member of a structure",
                            self.types.repr(t)
                        ));
                        err = true;
                    } else {
                        previous = Some(t);
                    }
                }
                self.destroy_value(v);
            }

            if err {
                continue;
            }
            if let Some(t) = previous {
                if let Some(name) = member.name.as_ref().map(|i| i.name.as_str()) {
                    if self.types.find_structure_member(t_struc, name).is_some() {
                        self.log_err(format!(
                            "duplicate member `{}` in structure type definition",
                            name
                        ));
                    }
                }
                let name = member.name.as_ref().map(|i| i.name.clone());
                self.types
                    .add_structure_member(t_struc, t, name.as_deref());
            }
        }

        if err {
            self.push_error(1);
            return;
        }
        let tv = self.value_type(t_struc);
        self.push_value(Some(tv));
    }

    fn compile_species_type(&mut self, members: &[boxc_ast::Member]) {
        let sp = self.types.species();
        for member in members {
            if member.name.is_some() {
                self.diags
                    .error(member.span, "species members cannot be named".to_string());
            }
            let Some(e) = &member.expr else { continue };
            self.compile_any(e);
            let v = self.pop_value();
            if self.want_has_type(&v) {
                let t = v.ty();
                self.types.add_species_member(sp, t);
            }
            self.destroy_value(v);
        }
        let tv = self.value_type(sp);
        self.push_value(Some(tv));
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
