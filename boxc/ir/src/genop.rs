//! The generic opcode set.
//!
//! The compiler emits *generic* opcodes; the operand containers carry the
//! storage types, and the lowering stage picks the concrete VM instruction
//! from the pair. This keeps the emitter free of per-type opcode tables.

use core::fmt;

macro_rules! genops {
    ( $( $(#[$attr:meta])* $name:ident = $mnemonic:literal; )* ) => {
        /// A generic opcode.
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub enum GenOp {
            $( $(#[$attr])* $name, )*
        }

        impl GenOp {
            /// The assembly mnemonic.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( GenOp::$name => $mnemonic, )*
                }
            }
        }
    };
}

genops! {
    /// Addition.
    Add = "add";
    /// Subtraction.
    Sub = "sub";
    /// Multiplication.
    Mul = "mul";
    /// Division.
    Div = "div";
    /// Remainder.
    Rem = "rem";
    /// Exponentiation.
    Pow = "pow";
    /// Bitwise and.
    Band = "band";
    /// Bitwise xor.
    Bxor = "bxor";
    /// Bitwise or.
    Bor = "bor";
    /// Shift left.
    Shl = "shl";
    /// Shift right.
    Shr = "shr";
    /// Logical and.
    Land = "land";
    /// Logical or.
    Lor = "lor";
    /// Bitwise complement.
    Bnot = "bnot";
    /// Logical negation.
    Lnot = "lnot";
    /// Arithmetic negation.
    Neg = "neg";
    /// Increment in place.
    Inc = "inc";
    /// Decrement in place.
    Dec = "dec";
    /// Equality test.
    Eq = "eq";
    /// Inequality test.
    Ne = "ne";
    /// Less-than test.
    Lt = "lt";
    /// Less-or-equal test.
    Le = "le";
    /// Greater-than test.
    Gt = "gt";
    /// Greater-or-equal test.
    Ge = "ge";
    /// Same-type move.
    Mov = "mov";
    /// Pointer move with reference-count increment.
    Ref = "ref";
    /// Load effective address.
    Lea = "lea";
    /// Allocate and construct an object of the given runtime type-id.
    Create = "create";
    /// Deep copy of an object by runtime type-id.
    Reloc = "reloc";
    /// Reference-count increment.
    Mln = "mln";
    /// Reference-count decrement.
    Munln = "munln";
    /// Conversion to real.
    Real = "real";
    /// Conversion to integer.
    Int = "int";
    /// Point scaling (multiply both components).
    Pmulr = "pmulr";
    /// Point scaling (divide both components).
    Pdivr = "pdivr";
    /// Pointer to the `x` component of a point.
    Pptrx = "pptrx";
    /// Pointer to the `y` component of a point.
    Pptry = "pptry";
    /// Conditional jump on the integer scratch register.
    Jc = "jc";
    /// Unconditional jump.
    Jmp = "jmp";
    /// Box an empty value into an `Any`.
    Box = "box";
    /// Weakly box a value into an `Any` from its address.
    Wbox = "wbox";
    /// Dynamic combination call on two boxed operands.
    Dycall = "dycall";
    /// Load a runtime type-id into the integer scratch register.
    Typeof = "typeof";
    /// Trap if the operand pointer is null.
    Notnul = "notnul";
    /// Call the procedure with the immediate call number.
    Call = "call";
}

impl GenOp {
    /// Whether the opcode is a branch and must carry a label target.
    pub fn is_branch(self) -> bool {
        matches!(self, GenOp::Jc | GenOp::Jmp)
    }
}

impl fmt::Display for GenOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
