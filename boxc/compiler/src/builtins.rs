//! Builtin types, operations, and procedures.
//!
//! Everything a Box program can reach without defining it first is
//! registered here: the core type names, the unary/binary operation tables,
//! the scalar conversions, the standard IO combinations, the math
//! functions, and the system builtins. Native implementations are installed
//! in the VM by symbol name; the runtime links them.

use crate::compiler::Compiler;
use crate::operators::OprAttr;
use boxc_ast::{BinOp, CoreTag, UnOp};
use boxc_ir::{ContType, GenOp};
use boxc_types::{CombKind, Type, TypeStore};

/// Handles to the core types, created once per compiler.
pub(crate) struct CoreTypes {
    pub char_t: Type,
    pub int_t: Type,
    pub real_t: Type,
    pub point_t: Type,
    pub str_t: Type,
    pub void_t: Type,
    pub ptr_t: Type,
    pub obj_t: Type,
    pub any_t: Type,
    pub if_t: Type,
    pub else_t: Type,
    pub for_t: Type,
    pub print_t: Type,
    pub repr_t: Type,
    pub compare_t: Type,
    pub begin_t: Type,
    pub end_t: Type,
    pub pause_t: Type,
}

impl CoreTypes {
    pub(crate) fn create(types: &mut TypeStore) -> CoreTypes {
        let char_i = types.intrinsic(1, 1, ContType::Char);
        let char_t = types.ident(char_i, "Char");
        let int_i = types.intrinsic(8, 8, ContType::Int);
        let int_t = types.ident(int_i, "Int");
        let real_i = types.intrinsic(8, 8, ContType::Real);
        let real_t = types.ident(real_i, "Real");
        let point_i = types.intrinsic(16, 8, ContType::Point);
        let point_t = types.ident(point_i, "Point");
        let str_i = types.intrinsic(24, 8, ContType::Obj);
        let str_t = types.ident(str_i, "Str");
        let void_i = types.intrinsic(0, 1, ContType::Void);
        let void_t = types.ident(void_i, "Void");
        let ptr_i = types.intrinsic(16, 8, ContType::Ptr);
        let ptr_t = types.ident(ptr_i, "Ptr");
        let obj_i = types.intrinsic(16, 8, ContType::Obj);
        let obj_t = types.ident(obj_i, "CPtr");
        let any_t = types.any();

        // The control types carry an Int but are distinct from it: an Int
        // statement value must not accidentally drive a jump.
        let if_i = types.intrinsic(8, 8, ContType::Int);
        let if_t = types.ident(if_i, "If");
        let for_i = types.intrinsic(8, 8, ContType::Int);
        let for_t = types.ident(for_i, "For");
        let compare_i = types.intrinsic(8, 8, ContType::Int);
        let compare_t = types.ident(compare_i, "Compare");

        // Empty marker types. They are deliberately *not* derived from the
        // Void core type: a `Pause` child must reach its combinations
        // instead of being dropped as void.
        let else_i = types.intrinsic(0, 1, ContType::Void);
        let else_t = types.ident(else_i, "Else");
        let begin_i = types.intrinsic(0, 1, ContType::Void);
        let begin_t = types.ident(begin_i, "Begin");
        let end_i = types.intrinsic(0, 1, ContType::Void);
        let end_t = types.ident(end_i, "End");
        let pause_i = types.intrinsic(0, 1, ContType::Void);
        let pause_t = types.ident(pause_i, "Pause");

        // Print and Repr *are* derived from Void: their box values drop
        // silently as statements.
        let print_t = types.ident(void_i, "Print");
        let repr_t = types.ident(void_i, "Repr");

        CoreTypes {
            char_t,
            int_t,
            real_t,
            point_t,
            str_t,
            void_t,
            ptr_t,
            obj_t,
            any_t,
            if_t,
            else_t,
            for_t,
            print_t,
            repr_t,
            compare_t,
            begin_t,
            end_t,
            pause_t,
        }
    }

    /// Map an AST core-type tag to its type handle.
    pub(crate) fn tag_type(&self, tag: CoreTag) -> Type {
        match tag {
            CoreTag::Char => self.char_t,
            CoreTag::Int => self.int_t,
            CoreTag::Real => self.real_t,
            CoreTag::Point => self.point_t,
            CoreTag::Str => self.str_t,
            CoreTag::Void => self.void_t,
            CoreTag::Any => self.any_t,
            CoreTag::If => self.if_t,
            CoreTag::Else => self.else_t,
            CoreTag::For => self.for_t,
            CoreTag::Begin => self.begin_t,
            CoreTag::End => self.end_t,
            CoreTag::Pause => self.pause_t,
        }
    }
}

impl Compiler {
    pub(crate) fn register_builtins(&mut self) {
        self.register_core_type_names();
        self.register_un_ops();
        self.register_bin_ops();
        self.register_conversions();
        self.register_std_io();
        self.register_std_procs();
        self.register_math();
        self.register_sys();
        log::trace!("builtin registry complete");
    }

    fn bind_type_name(&mut self, name: &str, t: Type) {
        let v = self.value_type(t);
        let copy = self.ns_add_value(name, v);
        self.destroy_value(copy);
    }

    /// Define a combination with a native implementation.
    fn bltin_comb(&mut self, parent: Type, child: Type, native: &str) {
        let comb = self.types.define_combination(parent, CombKind::At, child);
        let cn = self.vm.install_native(native);
        self.types.set_comb_call_num(comb, cn);
        self.types.set_comb_name(comb, native);
        self.types.set_comb_implemented(comb);
    }

    /// Define a named function type: an identifier over `ret` with a
    /// combination taking `arg`, bound in the root namespace.
    fn bltin_simple_fn(&mut self, name: &str, ret: Type, arg: Type, native: &str) -> Type {
        let fn_t = self.types.ident(ret, name);
        self.bltin_comb(fn_t, arg, native);
        self.bind_type_name(name, fn_t);
        fn_t
    }

    fn register_core_type_names(&mut self) {
        let rows = [
            ("Char", self.core.char_t),
            ("Int", self.core.int_t),
            ("Real", self.core.real_t),
            ("Point", self.core.point_t),
            ("Str", self.core.str_t),
            ("Void", self.core.void_t),
            ("Ptr", self.core.ptr_t),
            ("CPtr", self.core.obj_t),
            ("Any", self.core.any_t),
            ("If", self.core.if_t),
            ("Else", self.core.else_t),
            ("For", self.core.for_t),
            ("Print", self.core.print_t),
            ("Repr", self.core.repr_t),
            ("Compare", self.core.compare_t),
        ];
        for (name, t) in rows {
            self.bind_type_name(name, t);
        }
    }

    fn register_un_ops(&mut self) {
        let (i, r, p) = (self.core.int_t, self.core.real_t, self.core.point_t);
        let a = OprAttr::ASSIGNMENT;
        let rows: &[(UnOp, Type, Type, OprAttr, GenOp)] = &[
            (UnOp::Neg, p, p, OprAttr::NONE, GenOp::Neg),
            (UnOp::Neg, r, r, OprAttr::NONE, GenOp::Neg),
            (UnOp::Neg, i, i, OprAttr::NONE, GenOp::Neg),
            (UnOp::LInc, r, r, a, GenOp::Inc),
            (UnOp::LInc, i, i, a, GenOp::Inc),
            (UnOp::LDec, r, r, a, GenOp::Dec),
            (UnOp::LDec, i, i, a, GenOp::Dec),
            (UnOp::RInc, r, r, a, GenOp::Inc),
            (UnOp::RInc, i, i, a, GenOp::Inc),
            (UnOp::RDec, r, r, a, GenOp::Dec),
            (UnOp::RDec, i, i, a, GenOp::Dec),
            (UnOp::BNot, i, i, OprAttr::NONE, GenOp::Bnot),
            (UnOp::Not, i, i, OprAttr::NONE, GenOp::Lnot),
        ];
        for &(op, operand, result, extra, gop) in rows {
            self.un_ops[op.index()].add_native(
                &self.types,
                operand,
                None,
                result,
                extra,
                gop,
            );
        }
    }

    fn register_bin_ops(&mut self) {
        let (c, i, r, p) = (
            self.core.char_t,
            self.core.int_t,
            self.core.real_t,
            self.core.point_t,
        );
        let ai = OprAttr::ASSIGNMENT | OprAttr::IGNORE_RES;
        let co = OprAttr::COMMUTATIVE;
        let no = OprAttr::NONE;
        // (operator, result, left, right, attributes, opcode)
        let rows: &[(BinOp, Type, Type, Type, OprAttr, GenOp)] = &[
            (BinOp::Assign, p, p, p, ai, GenOp::Mov),
            (BinOp::Assign, r, r, r, ai, GenOp::Mov),
            (BinOp::Assign, i, i, i, ai, GenOp::Mov),
            (BinOp::Assign, c, c, c, ai, GenOp::Mov),
            (BinOp::Add, p, p, p, co, GenOp::Add),
            (BinOp::Add, r, r, r, co, GenOp::Add),
            (BinOp::Add, i, i, i, co, GenOp::Add),
            (BinOp::Sub, p, p, p, no, GenOp::Sub),
            (BinOp::Sub, r, r, r, no, GenOp::Sub),
            (BinOp::Sub, i, i, i, no, GenOp::Sub),
            (BinOp::Mul, p, p, r, no, GenOp::Pmulr),
            (BinOp::Mul, p, r, p, no, GenOp::Pmulr),
            (BinOp::Mul, r, r, r, co, GenOp::Mul),
            (BinOp::Mul, i, i, i, co, GenOp::Mul),
            (BinOp::Div, p, p, r, no, GenOp::Pdivr),
            (BinOp::Div, r, r, r, no, GenOp::Div),
            (BinOp::Div, i, i, i, no, GenOp::Div),
            (BinOp::Rem, i, i, i, no, GenOp::Rem),
            (BinOp::Pow, r, r, r, no, GenOp::Pow),
            (BinOp::Pow, i, i, i, no, GenOp::Pow),
            (BinOp::BAnd, i, i, i, co, GenOp::Band),
            (BinOp::BXor, i, i, i, co, GenOp::Bxor),
            (BinOp::BOr, i, i, i, co, GenOp::Bor),
            (BinOp::Shl, i, i, i, no, GenOp::Shl),
            (BinOp::Shr, i, i, i, no, GenOp::Shr),
            (BinOp::LAnd, i, i, i, co, GenOp::Land),
            (BinOp::LOr, i, i, i, co, GenOp::Lor),
            (BinOp::APlus, p, p, p, ai, GenOp::Add),
            (BinOp::APlus, r, r, r, ai, GenOp::Add),
            (BinOp::APlus, i, i, i, ai, GenOp::Add),
            (BinOp::AMinus, p, p, p, ai, GenOp::Sub),
            (BinOp::AMinus, r, r, r, ai, GenOp::Sub),
            (BinOp::AMinus, i, i, i, ai, GenOp::Sub),
            (BinOp::ATimes, r, r, r, ai, GenOp::Mul),
            (BinOp::ATimes, i, i, i, ai, GenOp::Mul),
            (BinOp::ADiv, r, r, r, ai, GenOp::Div),
            (BinOp::ADiv, i, i, i, ai, GenOp::Div),
            (BinOp::ARem, i, i, i, ai, GenOp::Rem),
            (BinOp::AShl, i, i, i, ai, GenOp::Shl),
            (BinOp::AShr, i, i, i, ai, GenOp::Shr),
            (BinOp::ABAnd, i, i, i, ai, GenOp::Band),
            (BinOp::ABXor, i, i, i, ai, GenOp::Bxor),
            (BinOp::ABOr, i, i, i, ai, GenOp::Bor),
            (BinOp::Eq, i, p, p, co, GenOp::Eq),
            (BinOp::Eq, i, r, r, co, GenOp::Eq),
            (BinOp::Eq, i, i, i, co, GenOp::Eq),
            (BinOp::Ne, i, p, p, co, GenOp::Ne),
            (BinOp::Ne, i, r, r, co, GenOp::Ne),
            (BinOp::Ne, i, i, i, co, GenOp::Ne),
            (BinOp::Lt, i, r, r, no, GenOp::Lt),
            (BinOp::Lt, i, i, i, no, GenOp::Lt),
            (BinOp::Le, i, r, r, no, GenOp::Le),
            (BinOp::Le, i, i, i, no, GenOp::Le),
            (BinOp::Gt, i, r, r, no, GenOp::Gt),
            (BinOp::Gt, i, i, i, no, GenOp::Gt),
            (BinOp::Ge, i, r, r, no, GenOp::Ge),
            (BinOp::Ge, i, i, i, no, GenOp::Ge),
        ];
        for &(op, result, left, right, extra, gop) in rows {
            self.bin_ops[op.index()].add_native(
                &self.types,
                left,
                Some(right),
                result,
                extra,
                gop,
            );
        }
    }

    fn register_conversions(&mut self) {
        let (c, i, r, p) = (
            self.core.char_t,
            self.core.int_t,
            self.core.real_t,
            self.core.point_t,
        );
        // (source, destination, opcode)
        let rows = [
            (i, r, GenOp::Real),
            (c, r, GenOp::Real),
            (r, i, GenOp::Int),
            (c, i, GenOp::Int),
        ];
        for (src, dst, gop) in rows {
            self.convert
                .add_native(&self.types, src, None, dst, OprAttr::NONE, gop);
        }

        // (Real, Real) -> Point goes through an installed procedure.
        let couple = self.types.structure();
        self.types.add_structure_member(couple, r, None);
        self.types.add_structure_member(couple, r, None);
        let cn = self.vm.install_native("box_conv_2r_to_point");
        self.convert.add_user(couple, None, p, OprAttr::NONE, cn);
    }

    fn register_std_io(&mut self) {
        let print = self.core.print_t;
        let rows = [
            (self.core.pause_t, "box_print_pause"),
            (self.core.char_t, "box_print_char"),
            (self.core.int_t, "box_print_int"),
            (self.core.real_t, "box_print_real"),
            (self.core.point_t, "box_print_point"),
            (self.core.str_t, "box_print_str"),
        ];
        for (child, native) in rows {
            self.bltin_comb(print, child, native);
        }
    }

    fn register_std_procs(&mut self) {
        let rows = [
            (self.core.char_t, self.core.char_t, "box_char_char"),
            (self.core.char_t, self.core.int_t, "box_char_int"),
            (self.core.char_t, self.core.real_t, "box_char_real"),
            (self.core.int_t, self.core.int_t, "box_int_int"),
            (self.core.int_t, self.core.real_t, "box_int_real"),
            (self.core.real_t, self.core.real_t, "box_real_real"),
            (self.core.point_t, self.core.point_t, "box_point_point"),
            (self.core.if_t, self.core.int_t, "box_if_int"),
            (self.core.for_t, self.core.int_t, "box_for_int"),
            (self.core.compare_t, self.core.begin_t, "box_compare_begin"),
        ];
        for (parent, child, native) in rows {
            self.bltin_comb(parent, child, native);
        }

        // Strings build up by appending their children.
        let str_t = self.core.str_t;
        let rows = [
            (self.core.obj_t, "box_str_from_data"),
            (self.core.str_t, "box_str_append_str"),
            (self.core.char_t, "box_str_append_char"),
            (self.core.int_t, "box_str_append_int"),
            (self.core.real_t, "box_str_append_real"),
            (self.core.point_t, "box_str_append_point"),
            (self.core.pause_t, "box_str_append_newline"),
        ];
        for (child, native) in rows {
            self.bltin_comb(str_t, child, native);
        }
    }

    fn register_math(&mut self) {
        let (i, r, p) = (self.core.int_t, self.core.real_t, self.core.point_t);
        let rows: &[(&str, Type, Type, &str)] = &[
            ("Sqrt", r, r, "box_sqrt"),
            ("Sin", r, r, "box_sin"),
            ("Cos", r, r, "box_cos"),
            ("Tan", r, r, "box_tan"),
            ("Asin", r, r, "box_asin"),
            ("Acos", r, r, "box_acos"),
            ("Atan", r, r, "box_atan"),
            ("Atan2", r, p, "box_atan2"),
            ("Exp", r, r, "box_exp"),
            ("Log", r, r, "box_log"),
            ("Log10", r, r, "box_log10"),
            ("Ceil", i, r, "box_ceil"),
            ("Floor", i, r, "box_floor"),
            ("Abs", r, r, "box_abs"),
            ("Norm", r, p, "box_norm"),
            ("Norm2", r, p, "box_norm2"),
            ("Vec", p, r, "box_vec"),
            ("Ort", p, p, "box_ort"),
        ];
        for &(name, ret, arg, native) in rows {
            self.bltin_simple_fn(name, ret, arg, native);
        }

        // Min and Max accumulate; their Begin combinations seed the
        // accumulator.
        let begin = self.core.begin_t;
        let min_t = self.bltin_simple_fn("Min", r, r, "box_min_real");
        self.bltin_comb(min_t, begin, "box_min_begin");
        let max_t = self.bltin_simple_fn("Max", r, r, "box_max_real");
        self.bltin_comb(max_t, begin, "box_max_begin");
    }

    fn register_sys(&mut self) {
        let begin = self.core.begin_t;
        let end = self.core.end_t;

        self.bltin_simple_fn("Exit", self.core.void_t, self.core.int_t, "box_exit");

        let fail_t =
            self.bltin_simple_fn("Fail", self.core.void_t, self.core.str_t, "box_fail_msg");
        self.bltin_comb(fail_t, begin, "box_fail_clear");
        self.bltin_comb(fail_t, end, "box_fail");

        let isvalid_t = self.bltin_simple_fn(
            "IsValid",
            self.core.int_t,
            self.core.int_t,
            "box_isvalid_int",
        );
        self.bltin_comb(isvalid_t, begin, "box_isvalid_begin");
    }
}
