//! The VM installer: call numbers, procedure slots, data, type-ids.

use boxc_ir::{CallNum, ContType, GenOp, Lir, Operands, SrcLoc};
use boxc_types::{Type, TypeStore};
use cranelift_entity::{entity_impl, PrimaryMap};
use core::fmt;
use rustc_hash::FxHashMap;

/// A runtime type identifier, as carried by `create`/`typeof` operands.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct VmTypeId(u32);
entity_impl!(VmTypeId, "tid");

/// Errors reported while installing a procedure.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// A branch referenced a label that was never bound.
    #[error("branch target {0} was never bound")]
    UnboundLabel(boxc_ir::Label),
    /// The call number already holds an installed procedure.
    #[error("call number {0} is already installed")]
    SlotOccupied(CallNum),
}

/// Per-register-class frame counts of a procedure.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Frame {
    /// `(variable, temporary)` register counts, indexed by register class.
    pub counts: [(u32, u32); 6],
}

impl Frame {
    /// Whether the frame needs no registers at all.
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&(v, t)| v == 0 && t == 0)
    }
}

/// One lowered VM instruction.
#[derive(Clone, PartialEq, Debug)]
pub enum Instr {
    /// Allocate `vars` variable and `temps` temporary registers of a class.
    New {
        /// The register class.
        ty: ContType,
        /// Variable register count.
        vars: u32,
        /// Temporary register count.
        temps: u32,
    },
    /// A plain operation.
    Op {
        /// The generic opcode.
        op: GenOp,
        /// The operands.
        args: Operands,
    },
    /// A resolved jump; `target` is an instruction index.
    Jump {
        /// `Jc` or `Jmp`.
        op: GenOp,
        /// Absolute instruction index of the target.
        target: u32,
    },
    /// Return from the procedure.
    Ret,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instr::New { ty, vars, temps } => {
                write!(f, "new{} {}, {}", ty.letter(), vars, temps)
            }
            Instr::Op { op, args } => {
                write!(f, "{}", op)?;
                for (i, a) in args.iter().enumerate() {
                    if i == 0 {
                        write!(f, " {}", a)?;
                    } else {
                        write!(f, ", {}", a)?;
                    }
                }
                Ok(())
            }
            Instr::Jump { op, target } => write!(f, "{} <{}>", op, target),
            Instr::Ret => write!(f, "ret"),
        }
    }
}

/// One installed procedure.
#[derive(Debug)]
pub enum ProcSlot {
    /// Allocated but not yet installed.
    Reserved,
    /// A native procedure, known to the runtime by symbol name.
    Native {
        /// The external symbol name.
        name: String,
    },
    /// A compiled procedure.
    Code {
        /// Display name, e.g. `Int@Print`.
        name: Option<String>,
        /// The lowered instructions.
        code: Vec<Instr>,
        /// Source location of each instruction.
        srclocs: Vec<SrcLoc>,
    },
}

/// The installation target shared by one compilation.
pub struct Vm {
    procs: PrimaryMap<CallNum, ProcSlot>,
    data: Vec<u8>,
    type_ids: FxHashMap<Type, VmTypeId>,
    type_reprs: PrimaryMap<VmTypeId, String>,
}

impl Vm {
    /// Create an empty VM.
    pub fn new() -> Self {
        Self {
            procs: PrimaryMap::new(),
            data: Vec::new(),
            type_ids: FxHashMap::default(),
            type_reprs: PrimaryMap::new(),
        }
    }

    /// Allocate a call number with an empty slot.
    pub fn alloc_call_num(&mut self) -> CallNum {
        self.procs.push(ProcSlot::Reserved)
    }

    /// Install a native procedure under a fresh call number.
    pub fn install_native(&mut self, name: &str) -> CallNum {
        let cn = self.alloc_call_num();
        self.procs[cn] = ProcSlot::Native {
            name: name.to_string(),
        };
        log::trace!("installed native {} as {}", name, cn);
        cn
    }

    /// Install a native procedure at a previously allocated call number.
    pub fn install_native_at(&mut self, cn: CallNum, name: &str) -> Result<(), InstallError> {
        match self.procs[cn] {
            ProcSlot::Reserved => {
                self.procs[cn] = ProcSlot::Native {
                    name: name.to_string(),
                };
                Ok(())
            }
            _ => Err(InstallError::SlotOccupied(cn)),
        }
    }

    /// Lower `lir` and install it at `cn`.
    pub fn install_code(
        &mut self,
        cn: CallNum,
        name: Option<&str>,
        frame: &Frame,
        lir: &Lir,
    ) -> Result<(), InstallError> {
        if !matches!(self.procs[cn], ProcSlot::Reserved) {
            return Err(InstallError::SlotOccupied(cn));
        }
        let lowered = crate::lower::lower(lir, frame)?;
        log::trace!(
            "installed {} ({} instructions) as {}",
            name.unwrap_or("|unknown|"),
            lowered.code.len(),
            cn
        );
        self.procs[cn] = ProcSlot::Code {
            name: name.map(str::to_string),
            code: lowered.code,
            srclocs: lowered.srclocs,
        };
        Ok(())
    }

    /// The source location recorded for the instruction at `pc` of an
    /// installed procedure.
    pub fn source_at(&self, cn: CallNum, pc: usize) -> Option<SrcLoc> {
        match &self.procs[cn] {
            ProcSlot::Code { srclocs, .. } => srclocs.get(pc).copied(),
            _ => None,
        }
    }

    /// The slot behind a call number.
    pub fn proc(&self, cn: CallNum) -> &ProcSlot {
        &self.procs[cn]
    }

    /// The display name of an installed procedure.
    pub fn proc_name(&self, cn: CallNum) -> Option<&str> {
        match &self.procs[cn] {
            ProcSlot::Reserved => None,
            ProcSlot::Native { name } => Some(name),
            ProcSlot::Code { name, .. } => name.as_deref(),
        }
    }

    /// All allocated call numbers, in allocation order.
    pub fn call_nums(&self) -> impl Iterator<Item = CallNum> + '_ {
        self.procs.keys()
    }

    /// Append a blob to the global data area; returns its byte offset.
    pub fn add_data(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// The global data area.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Install a type description, returning its runtime type-id. Repeated
    /// installation of the same type yields the same id.
    pub fn install_type(&mut self, ty: Type, store: &TypeStore) -> VmTypeId {
        if let Some(id) = self.type_ids.get(&ty) {
            return *id;
        }
        let id = self.type_reprs.push(store.repr(ty));
        self.type_ids.insert(ty, id);
        id
    }

    /// The description installed for a runtime type-id.
    pub fn type_repr(&self, id: VmTypeId) -> &str {
        &self.type_reprs[id]
    }

    /// Disassemble an installed procedure.
    pub fn disasm(&self, cn: CallNum) -> Option<String> {
        match &self.procs[cn] {
            ProcSlot::Reserved => None,
            ProcSlot::Native { name } => Some(format!("{} ({}): native\n", name, cn)),
            ProcSlot::Code { name, code, .. } => {
                let mut out = format!("{} ({}):\n", name.as_deref().unwrap_or("|unknown|"), cn);
                for (pc, instr) in code.iter().enumerate() {
                    out.push_str(&format!("{:4}  {}\n", pc, instr));
                }
                Some(out)
            }
        }
    }

    /// Disassemble everything installed, in call-number order.
    pub fn disasm_all(&self) -> String {
        let mut out = String::new();
        for cn in self.procs.keys() {
            if let Some(text) = self.disasm(cn) {
                out.push_str(&text);
                out.push('\n');
            }
        }
        out
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxc_ir::ContType as CT;

    #[test]
    fn native_installation_and_names() {
        let mut vm = Vm::new();
        let cn = vm.install_native("box_print_int");
        assert_eq!(vm.proc_name(cn), Some("box_print_int"));
        assert!(vm.disasm(cn).unwrap().contains("native"));

        let reserved = vm.alloc_call_num();
        assert_eq!(vm.proc_name(reserved), None);
        vm.install_native_at(reserved, "late").unwrap();
        assert!(vm.install_native_at(reserved, "again").is_err());
    }

    #[test]
    fn data_area_offsets_accumulate() {
        let mut vm = Vm::new();
        assert_eq!(vm.add_data(b"hello\0"), 0);
        assert_eq!(vm.add_data(b"ok\0"), 6);
        assert_eq!(&vm.data()[6..9], b"ok\0");
    }

    #[test]
    fn type_ids_are_deduplicated() {
        let mut vm = Vm::new();
        let mut store = TypeStore::new();
        let intr = store.intrinsic(8, 8, CT::Int);
        let int_t = store.ident(intr, "Int");
        let a = vm.install_type(int_t, &store);
        let b = vm.install_type(int_t, &store);
        assert_eq!(a, b);
        assert_eq!(vm.type_repr(a), "Int");
    }
}
