//! Semantic analysis and code emission for the Box language.
//!
//! The [`Compiler`] walks a parsed AST, tracking expression results as
//! [`Value`]s on an explicit evaluation stack, resolving names through a
//! floor-scoped namespace, dispatching operators and conversions through
//! typed overload chains, and appending linear IR which is lowered into the
//! [`Vm`](boxc_vm::Vm) when a procedure is installed.
//!
//! The easiest way in is [`compile_str`]:
//!
//! ```
//! let compiled = boxc_compiler::compile_str("a = 10, Print[a + 1]").unwrap();
//! let listing = compiled.vm.disasm(compiled.main).unwrap();
//! assert!(listing.contains("add"));
//! ```

#![warn(missing_docs)]

mod builtins;
mod compiler;
mod diag;
mod emit;
mod namespace;
mod operators;
mod proc;
mod regalloc;
mod value;

pub use crate::compiler::Compiler;
pub use crate::diag::{Diagnostic, Diagnostics, Level};
pub use crate::value::{Value, ValueKind};

use boxc_ir::CallNum;
use boxc_types::TypeStore;
use boxc_vm::Vm;
use std::path::Path;

/// Errors from the compilation entry points.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The source file could not be read.
    #[error("cannot read source: {0}")]
    Io(#[from] std::io::Error),
    /// The source does not parse.
    #[error(transparent)]
    Parse(#[from] boxc_parser::ParseError),
    /// Semantic errors were reported; the output was not installed.
    #[error("compilation failed with errors")]
    Insane {
        /// Everything the compiler reported.
        diags: Vec<Diagnostic>,
    },
    /// Installation of a compiled procedure failed.
    #[error(transparent)]
    Install(#[from] boxc_vm::InstallError),
}

/// The result of a successful compilation.
pub struct Compiled {
    /// The VM holding the installed procedures, data, and type table.
    pub vm: Vm,
    /// The type store of the compilation.
    pub types: TypeStore,
    /// The call number of the main procedure.
    pub main: CallNum,
    /// Diagnostics (warnings) recorded along the way.
    pub diags: Vec<Diagnostic>,
}

impl Compiler {
    /// Install the main procedure and hand out the VM. Refuses when the
    /// last compilation was not sane.
    pub fn install_main(mut self) -> Result<Compiled, CompileError> {
        if !self.diagnostics().is_sane() {
            return Err(CompileError::Insane {
                diags: self.diags.take(),
            });
        }
        debug_assert_eq!(self.procs.len(), 1, "sub procedure left on the stack");
        let main = self.procs.pop().expect("main procedure");
        let cn = self.vm.alloc_call_num();
        self.vm
            .install_code(cn, main.name.as_deref(), &main.frame(), &main.lir)?;
        Ok(Compiled {
            vm: self.vm,
            types: self.types,
            main: cn,
            diags: self.diags.take(),
        })
    }
}

/// Compile a source string: parse, compile, and install the main procedure.
pub fn compile_str(source: &str) -> Result<Compiled, CompileError> {
    let ast = boxc_parser::parse(source)?;
    let mut compiler = Compiler::new();
    if !compiler.compile(&ast) {
        return Err(CompileError::Insane {
            diags: compiler.diagnostics().records().to_vec(),
        });
    }
    compiler.install_main()
}

/// Compile a source file; the orchestration helper composing the parser,
/// the compiler, and a VM.
pub fn compile_file(path: &Path) -> Result<Compiled, CompileError> {
    let source = std::fs::read_to_string(path)?;
    compile_str(&source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxc_ir::GenOp;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn finish_is_idempotent_and_releases_once() {
        init_logging();
        let mut c = Compiler::new();
        let int_t = c.core.int_t;
        let mut v = c.value_temp(int_t);
        assert_eq!(c.main_temps_in_use(), 1);
        c.finish_value(&mut v);
        assert_eq!(c.main_temps_in_use(), 0);
        // Finishing again must not release anything else.
        c.finish_value(&mut v);
        assert_eq!(c.main_temps_in_use(), 0);
        c.destroy_value(v);
    }

    #[test]
    fn weak_copies_do_not_own_registers() {
        init_logging();
        let mut c = Compiler::new();
        let int_t = c.core.int_t;
        let v = c.value_temp(int_t);
        let copy = c.weak_copy(&v);
        assert!(!copy.own_register);
        c.destroy_value(copy);
        assert_eq!(c.main_temps_in_use(), 1);
        c.destroy_value(v);
        assert_eq!(c.main_temps_in_use(), 0);
    }

    #[test]
    fn object_fabrication_emits_create() {
        init_logging();
        let mut c = Compiler::new();
        let str_t = c.core.str_t;
        let v = c.value_temp(str_t);
        assert_eq!(c.main_lir().count_op(GenOp::Create), 1);
        c.destroy_value(v);
    }

    #[test]
    fn dynamic_call_boxes_parent_and_emits_dycall() {
        init_logging();
        let mut c = Compiler::new();
        // A parent type with no combination for an Any child.
        let int_t = c.core.int_t;
        let x_t = c.types.ident(int_t, "X");
        let any_t = c.core.any_t;

        let parent = c.value_temp(x_t);
        let child = c.value_temp(any_t);
        let outcome = c.emit_call(&parent, child);
        assert!(outcome.is_ok());

        let listing = c.main_lir().to_string();
        assert!(listing.contains("wbox"), "parent must be weakly boxed:\n{listing}");
        assert!(listing.contains("dycall"), "dynamic dispatch expected:\n{listing}");
        c.destroy_value(parent);
        assert_eq!(c.main_temps_in_use(), 0);
    }

    #[test]
    fn boxing_an_immediate_goes_through_a_register() {
        init_logging();
        let mut c = Compiler::new();
        let v = c.value_imm_int(7);
        let boxed = c.weak_box(v);
        let listing = c.main_lir().to_string();
        assert!(listing.contains("typeof"));
        assert!(listing.contains("wbox"));
        // The immediate was first moved into a register, then lea'd.
        assert!(listing.contains("mov"));
        assert!(listing.contains("lea"));
        c.destroy_value(boxed);
        assert_eq!(c.main_temps_in_use(), 0);
    }

    #[test]
    fn poison_propagation_is_bounded() {
        init_logging();
        let mut c = Compiler::new();
        c.push_error(1);
        let v = c.value_imm_int(1);
        c.push_value(Some(v));
        // One poisoned item in the inspected region collapses it to one
        // marker.
        assert!(c.pop_errors(2, 1));
        let top = c.pop_value();
        assert!(top.is_err());
        c.destroy_value(top);
        assert!(!c.pop_errors(0, 0));
    }

    #[test]
    fn conversion_dispatch_picks_the_convert_operator() {
        init_logging();
        let mut c = Compiler::new();
        let real_t = c.core.real_t;
        let dst = c.value_temp(real_t);
        let src = c.value_imm_int(3);
        assert!(c.try_emit_conversion(&dst, src).is_ok());
        let listing = c.main_lir().to_string();
        assert!(listing.contains("real"), "expected a real conversion:\n{listing}");
        c.destroy_value(dst);
    }

    #[test]
    fn emit_conversion_fabricates_the_destination() {
        init_logging();
        let mut c = Compiler::new();
        let real_t = c.core.real_t;
        let src = c.value_imm_int(5);
        let dst = c.emit_conversion(src, real_t).expect("int converts to real");
        assert_eq!(dst.ty(), real_t);
        c.destroy_value(dst);
        assert_eq!(c.main_temps_in_use(), 0);
    }

    #[test]
    fn user_conversions_dispatch_through_calls() {
        init_logging();
        let mut c = Compiler::new();
        // (Real, Real) -> Point is implemented by an installed procedure.
        let real_t = c.core.real_t;
        let point_t = c.core.point_t;
        let couple = c.types.structure();
        c.types.add_structure_member(couple, real_t, None);
        c.types.add_structure_member(couple, real_t, None);

        let dst = c.value_temp(point_t);
        let src = c.value_temp(couple);
        assert!(c.try_emit_conversion(&dst, src).is_ok());
        let listing = c.main_lir().to_string();
        assert!(listing.contains("call"), "expected a conversion call:\n{listing}");
        c.destroy_value(dst);
        assert_eq!(c.main_temps_in_use(), 0);
    }

    #[test]
    fn floor_callbacks_run_on_teardown_in_reverse_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        init_logging();
        let mut c = Compiler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        c.floor_up();
        for tag in ["first", "second"] {
            let order = order.clone();
            c.ns
                .add_callback(Box::new(move |_| order.borrow_mut().push(tag)));
        }
        c.floor_down();
        assert_eq!(*order.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn refcount_ops_emit_for_pointer_shaped_registers() {
        init_logging();
        let mut c = Compiler::new();
        let str_t = c.core.str_t;
        let v = c.value_temp(str_t);
        c.emit_link(&v);
        c.emit_unlink(&v);
        let listing = c.main_lir().to_string();
        assert!(listing.contains("mln"));
        assert!(listing.contains("munln"));
        c.destroy_value(v);
    }
}
