//! The lifted intermediate representation.
//!
//! One decoded instruction lowers to an ordered sequence of [`Stmt`]s over
//! width-tagged expressions. Statements are deliberately low-level: named
//! variables (architectural registers and numbered temporaries), loads and
//! stores with explicit widths, and a small terminator vocabulary.
//! [`Stmt::ends_block`] is the IR-level basic-block-end marker, which is
//! distinct from the decode-level exit classification: an instruction can
//! fall through at decode level yet emit IR that ends a block (x86 `cmov`
//! lifts to a branch over an assignment).

use std::fmt;

/// A constant with an explicit bit width. The stored value is always
/// masked to the width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Const {
    value: u64,
    bits: u16,
}

impl Const {
    pub fn new(value: u64, bits: u16) -> Self {
        Self {
            value: value & width_mask(bits),
            bits,
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    /// The value sign-extended from its width to 64 bits.
    pub fn value_signed(&self) -> i64 {
        let shift = 64 - self.bits as u32;
        ((self.value as i64) << shift) >> shift
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// True if every bit inside the width is set.
    pub fn is_all_ones(&self) -> bool {
        self.value == width_mask(self.bits)
    }
}

/// Mask covering the low `bits` bits.
pub fn width_mask(bits: u16) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// What a variable names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// An architectural register (or flag). Writes are observable.
    Register,
    /// A numbered temporary introduced by lifting. Dead writes may be
    /// removed by the optimizer.
    Temp,
}

/// A named, width-tagged variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    pub name: String,
    pub bits: u16,
    pub kind: VarKind,
}

impl Var {
    pub fn register(name: impl Into<String>, bits: u16) -> Self {
        Self {
            name: name.into(),
            bits,
            kind: VarKind::Register,
        }
    }

    pub fn temp(name: impl Into<String>, bits: u16) -> Self {
        Self {
            name: name.into(),
            bits,
            kind: VarKind::Temp,
        }
    }
}

/// Binary operators. Comparison operators produce a 1-bit result; the rest
/// produce the width of their left operand, wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    CmpEq,
    CmpNe,
    /// Signed less-than.
    CmpLt,
    /// Unsigned less-than.
    CmpLtu,
}

impl BinOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Sar => ">>s",
            BinOp::CmpEq => "==",
            BinOp::CmpNe => "!=",
            BinOp::CmpLt => "<s",
            BinOp::CmpLtu => "<u",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Two's-complement negation.
    Neg,
    /// Bitwise complement.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    ZeroExtend,
    SignExtend,
    Truncate,
}

/// A width-tagged expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Const(Const),
    Var(Var),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        arg: Box<Expr>,
    },
    /// Memory read of `bits` bits at `addr`.
    Load {
        addr: Box<Expr>,
        bits: u16,
    },
    Cast {
        kind: CastKind,
        arg: Box<Expr>,
        bits: u16,
    },
    /// A value the lifter cannot model (indirect target read from an
    /// unparsed operand, unmodeled flag, ...).
    Unknown {
        bits: u16,
    },
}

impl Expr {
    pub fn constant(value: u64, bits: u16) -> Expr {
        Expr::Const(Const::new(value, bits))
    }

    pub fn var(v: Var) -> Expr {
        Expr::Var(v)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnOp, arg: Expr) -> Expr {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn load(addr: Expr, bits: u16) -> Expr {
        Expr::Load {
            addr: Box::new(addr),
            bits,
        }
    }

    pub fn cast(kind: CastKind, arg: Expr, bits: u16) -> Expr {
        Expr::Cast {
            kind,
            arg: Box::new(arg),
            bits,
        }
    }

    pub fn unknown(bits: u16) -> Expr {
        Expr::Unknown { bits }
    }

    /// Result width of the expression in bits.
    pub fn bits(&self) -> u16 {
        match self {
            Expr::Const(c) => c.bits(),
            Expr::Var(v) => v.bits,
            Expr::Binary { op, lhs, .. } => match op {
                BinOp::CmpEq | BinOp::CmpNe | BinOp::CmpLt | BinOp::CmpLtu => 1,
                _ => lhs.bits(),
            },
            Expr::Unary { arg, .. } => arg.bits(),
            Expr::Load { bits, .. } => *bits,
            Expr::Cast { bits, .. } => *bits,
            Expr::Unknown { bits } => *bits,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}:{}", self.value, self.bits)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.bits)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Unary { op, arg } => match op {
                UnOp::Neg => write!(f, "-({})", arg),
                UnOp::Not => write!(f, "~({})", arg),
            },
            Expr::Load { addr, bits } => write!(f, "load{}({})", bits, addr),
            Expr::Cast { kind, arg, bits } => match kind {
                CastKind::ZeroExtend => write!(f, "zext{}({})", bits, arg),
                CastKind::SignExtend => write!(f, "sext{}({})", bits, arg),
                CastKind::Truncate => write!(f, "trunc{}({})", bits, arg),
            },
            Expr::Unknown { bits } => write!(f, "unknown:{}", bits),
        }
    }
}

/// One IR statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `dst = src`
    Assign { dst: Var, src: Expr },
    /// Memory write of `bits` bits.
    Store { addr: Expr, value: Expr, bits: u16 },
    /// Unconditional transfer.
    Jump { target: Expr },
    /// Transfer to `target` when `cond` is nonzero, else fall through.
    Branch { cond: Expr, target: Expr },
    /// Call; control may or may not come back.
    Call { target: Expr },
    /// Return to the caller.
    Return,
    /// Trap or software interrupt.
    Trap { reason: String },
    /// An opaque effect barrier for instructions the lifter does not
    /// model. Never removed or reordered by the optimizer.
    Intrinsic { name: String, args: Vec<Expr> },
    /// No effect.
    Nop,
}

impl Stmt {
    /// True if this statement ends a basic block at IR level.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Stmt::Jump { .. }
                | Stmt::Branch { .. }
                | Stmt::Call { .. }
                | Stmt::Return
                | Stmt::Trap { .. }
        )
    }

    /// True if this statement is a control transfer, i.e. an observable
    /// effect on the program counter.
    pub fn is_control(&self) -> bool {
        self.ends_block()
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { dst, src } => write!(f, "{} = {}", dst, src),
            Stmt::Store { addr, value, bits } => {
                write!(f, "store{}({}) = {}", bits, addr, value)
            }
            Stmt::Jump { target } => write!(f, "jump {}", target),
            Stmt::Branch { cond, target } => write!(f, "branch {} if {}", target, cond),
            Stmt::Call { target } => write!(f, "call {}", target),
            Stmt::Return => write!(f, "return"),
            Stmt::Trap { reason } => write!(f, "trap \"{}\"", reason),
            Stmt::Intrinsic { name, args } => {
                write!(f, "intrinsic \"{}\"(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Stmt::Nop => write!(f, "nop"),
        }
    }
}
