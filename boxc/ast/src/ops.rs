//! Operator codes carried on AST nodes.

use core::fmt;

/// Unary operators.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum UnOp {
    /// Prefix `+`.
    Plus,
    /// Prefix `-`.
    Neg,
    /// Bitwise complement `~`.
    BNot,
    /// Logical negation `!`.
    Not,
    /// Prefix increment `++`.
    LInc,
    /// Prefix decrement `--`.
    LDec,
    /// Postfix increment `++`.
    RInc,
    /// Postfix decrement `--`.
    RDec,
    /// Raise `^` (incompatible re-typing).
    Raise,
    /// Reference `&`.
    Ref,
    /// Dereference `*`.
    Deref,
}

impl UnOp {
    /// Total number of unary operators; used to size operator tables.
    pub const COUNT: usize = 11;

    /// All unary operators, in table order.
    pub const ALL: [UnOp; UnOp::COUNT] = [
        UnOp::Plus,
        UnOp::Neg,
        UnOp::BNot,
        UnOp::Not,
        UnOp::LInc,
        UnOp::LDec,
        UnOp::RInc,
        UnOp::RDec,
        UnOp::Raise,
        UnOp::Ref,
        UnOp::Deref,
    ];

    /// Dense index for table lookups.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the operator is written after its operand.
    pub fn is_right(self) -> bool {
        matches!(self, UnOp::RInc | UnOp::RDec)
    }

    /// The surface syntax of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            UnOp::Plus => "+",
            UnOp::Neg => "-",
            UnOp::BNot => "~",
            UnOp::Not => "!",
            UnOp::LInc | UnOp::RInc => "++",
            UnOp::LDec | UnOp::RDec => "--",
            UnOp::Raise => "^",
            UnOp::Ref => "&",
            UnOp::Deref => "*",
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary operators.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinOp {
    /// `=`
    Assign,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `**`
    Pow,
    /// `&`
    BAnd,
    /// `^`
    BXor,
    /// `|`
    BOr,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&&`
    LAnd,
    /// `||`
    LOr,
    /// `+=`
    APlus,
    /// `-=`
    AMinus,
    /// `*=`
    ATimes,
    /// `/=`
    ADiv,
    /// `%=`
    ARem,
    /// `<<=`
    AShl,
    /// `>>=`
    AShr,
    /// `&=`
    ABAnd,
    /// `^=`
    ABXor,
    /// `|=`
    ABOr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl BinOp {
    /// Total number of binary operators; used to size operator tables.
    pub const COUNT: usize = 30;

    /// All binary operators, in table order.
    pub const ALL: [BinOp; BinOp::COUNT] = [
        BinOp::Assign,
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Rem,
        BinOp::Pow,
        BinOp::BAnd,
        BinOp::BXor,
        BinOp::BOr,
        BinOp::Shl,
        BinOp::Shr,
        BinOp::LAnd,
        BinOp::LOr,
        BinOp::APlus,
        BinOp::AMinus,
        BinOp::ATimes,
        BinOp::ADiv,
        BinOp::ARem,
        BinOp::AShl,
        BinOp::AShr,
        BinOp::ABAnd,
        BinOp::ABXor,
        BinOp::ABOr,
        BinOp::Eq,
        BinOp::Ne,
        BinOp::Lt,
        BinOp::Le,
        BinOp::Gt,
        BinOp::Ge,
    ];

    /// Dense index for table lookups.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The surface syntax of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
            BinOp::BAnd => "&",
            BinOp::BXor => "^",
            BinOp::BOr => "|",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::LAnd => "&&",
            BinOp::LOr => "||",
            BinOp::APlus => "+=",
            BinOp::AMinus => "-=",
            BinOp::ATimes => "*=",
            BinOp::ADiv => "/=",
            BinOp::ARem => "%=",
            BinOp::AShl => "<<=",
            BinOp::AShr => ">>=",
            BinOp::ABAnd => "&=",
            BinOp::ABXor => "^=",
            BinOp::ABOr => "|=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

