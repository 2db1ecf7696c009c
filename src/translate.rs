//! Lifting contracts: translation context, the `Translator` trait, and the
//! generic control-flow-only translator.

use std::collections::HashMap;

use crate::decode::{DecodedInstruction, FlowKind};
use crate::ir::{Expr, Stmt, Var, VarKind};
use crate::ArchProfile;

/// Mutable per-session lifting state: temporary numbering and register
/// binding.
///
/// Threaded through successive translations so IR emitted across one
/// session is internally consistent; a parallel lifter allocates one per
/// task rather than sharing, so temporary names never collide.
#[derive(Debug, Clone, Default)]
pub struct TranslationContext {
    next_temp: u32,
    reg_bits: HashMap<String, u16>,
}

impl TranslationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh temporary of the given width.
    pub fn fresh_temp(&mut self, bits: u16) -> Var {
        let n = self.next_temp;
        self.next_temp += 1;
        Var {
            name: format!("t{}", n),
            bits,
            kind: VarKind::Temp,
        }
    }

    /// The register variable for `name`, bound at its first-seen width so
    /// one session never emits the same register name at two widths.
    pub fn reg(&mut self, name: &str, bits: u16) -> Var {
        let bound = *self.reg_bits.entry(name.to_string()).or_insert(bits);
        Var {
            name: name.to_string(),
            bits: bound,
            kind: VarKind::Register,
        }
    }

    /// Number of temporaries handed out so far.
    pub fn temp_count(&self) -> u32 {
        self.next_temp
    }
}

/// Architecture-bound lifting of one decoded instruction into IR.
///
/// Translation is total: it never fails, and instructions the translator
/// cannot model lower to an [`Stmt::Intrinsic`] effect barrier. Every
/// implementation keeps one invariant: a decode-level exit instruction's
/// statement sequence contains at least one block-ending statement.
pub trait Translator: Send + Sync {
    fn translate(&self, insn: &DecodedInstruction, ctx: &mut TranslationContext) -> Vec<Stmt>;
}

/// Lower an instruction purely from its decode-level flow classification.
///
/// This is the fallback shared by every translator: control transfers
/// become the matching terminator (with the parsed target when one is
/// known, `Unknown` otherwise) and data instructions become an intrinsic
/// barrier named after the mnemonic.
pub fn lower_flow(insn: &DecodedInstruction, word_bits: u16) -> Vec<Stmt> {
    let target = |t: Option<crate::Address>| match t {
        Some(a) => Expr::constant(a, word_bits),
        None => Expr::unknown(word_bits),
    };
    match insn.flow {
        FlowKind::Sequential => {
            if insn.mnemonic == "nop" {
                vec![Stmt::Nop]
            } else {
                vec![Stmt::Intrinsic {
                    name: insn.mnemonic.clone(),
                    args: Vec::new(),
                }]
            }
        }
        FlowKind::Jump { target: t } => vec![Stmt::Jump { target: target(t) }],
        FlowKind::ConditionalJump { target: t } => vec![Stmt::Branch {
            cond: Expr::unknown(1),
            target: target(t),
        }],
        FlowKind::Call { target: t } => vec![Stmt::Call { target: target(t) }],
        FlowKind::Return => vec![Stmt::Return],
        FlowKind::Trap => vec![Stmt::Trap {
            reason: insn.mnemonic.clone(),
        }],
    }
}

/// Control-flow-accurate translator for the ISAs without a full lifter.
///
/// Exits become the right terminator with the decoded target; everything
/// else is an intrinsic barrier, so downstream passes see correct block
/// structure and conservative effects.
#[derive(Debug, Clone, Copy)]
pub struct GenericTranslator {
    word_bits: u16,
}

impl GenericTranslator {
    pub fn new(profile: &ArchProfile) -> Self {
        Self {
            word_bits: profile.word_bits,
        }
    }
}

impl Translator for GenericTranslator {
    fn translate(&self, insn: &DecodedInstruction, _ctx: &mut TranslationContext) -> Vec<Stmt> {
        lower_flow(insn, self.word_bits)
    }
}
