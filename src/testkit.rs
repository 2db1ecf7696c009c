//! Deterministic toy ISA for exercising decode/lift plumbing without
//! Capstone. Byte-level encodings:
//!
//!   0x10 imm        li   (2 bytes, sequential)
//!   0x20 lo mid hi  jmp  (4 bytes, unconditional, 24-bit LE target)
//!   0x30 imm        csel (2 bytes, sequential at decode level; its IR
//!                   contains a branch, so IR-bounded lifting stops here)
//!   0x40 0x00       mode (2 bytes, toggles Standard/Thumb; any other
//!                   second byte is an unsupported encoding)
//!   0x50            ret  (1 byte, return)
//!
//! Anything else is an invalid opcode. In Thumb mode, mnemonics carry a
//! `.w` suffix so tests can observe which mode decoded an instruction.

use crate::decode::{
    DecodeContext, DecodeError, DecodedInstruction, FlowKind, InstructionDecoder,
};
use crate::ir::{BinOp, Expr, Stmt};
use crate::translate::{lower_flow, TranslationContext, Translator};
use crate::{Address, ArchKind, ArchProfile, DecodeMode, MAX_INSTRUCTION_SIZE};

pub fn profile() -> ArchProfile {
    ArchProfile::new(ArchKind::X86_32)
}

pub struct TestDecoder;

impl TestDecoder {
    fn emit(
        addr: Address,
        raw: &[u8],
        mnemonic: &str,
        operands: String,
        flow: FlowKind,
        mode: DecodeMode,
    ) -> DecodedInstruction {
        let mnemonic = match mode {
            DecodeMode::Standard => mnemonic.to_string(),
            DecodeMode::Thumb => format!("{}.w", mnemonic),
        };
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        bytes[..raw.len()].copy_from_slice(raw);
        DecodedInstruction {
            addr,
            size: raw.len() as u8,
            mnemonic,
            operands,
            bytes,
            flow,
        }
    }
}

impl InstructionDecoder for TestDecoder {
    fn decode(
        &self,
        image: &[u8],
        offset: usize,
        addr: Address,
        ctx: &mut DecodeContext,
    ) -> Result<DecodedInstruction, DecodeError> {
        let take = |n: usize| -> Result<&[u8], DecodeError> {
            image
                .get(offset..offset + n)
                .ok_or(DecodeError::OutOfRange(addr))
        };
        let opcode = *image.get(offset).ok_or(DecodeError::OutOfRange(addr))?;
        let mode = ctx.mode();

        match opcode {
            0x10 => {
                let raw = take(2)?;
                Ok(Self::emit(
                    addr,
                    raw,
                    "li",
                    format!("r0, {}", raw[1]),
                    FlowKind::Sequential,
                    mode,
                ))
            }
            0x20 => {
                let raw = take(4)?;
                let target =
                    raw[1] as Address | (raw[2] as Address) << 8 | (raw[3] as Address) << 16;
                Ok(Self::emit(
                    addr,
                    raw,
                    "jmp",
                    format!("0x{:x}", target),
                    FlowKind::Jump {
                        target: Some(target),
                    },
                    mode,
                ))
            }
            0x30 => {
                let raw = take(2)?;
                Ok(Self::emit(
                    addr,
                    raw,
                    "csel",
                    format!("r0, {}", raw[1]),
                    FlowKind::Sequential,
                    mode,
                ))
            }
            0x40 => {
                let raw = take(2)?;
                if raw[1] != 0 {
                    return Err(DecodeError::UnsupportedEncoding(addr));
                }
                let insn = Self::emit(addr, raw, "mode", String::new(), FlowKind::Sequential, mode);
                ctx.set_mode(match mode {
                    DecodeMode::Standard => DecodeMode::Thumb,
                    DecodeMode::Thumb => DecodeMode::Standard,
                });
                Ok(insn)
            }
            0x50 => {
                let raw = take(1)?;
                Ok(Self::emit(addr, raw, "ret", String::new(), FlowKind::Return, mode))
            }
            _ => Err(DecodeError::InvalidOpcode(addr)),
        }
    }
}

/// Lifts the toy ISA. `csel` is the interesting case: sequential at
/// decode level, but its IR branches over the assignment.
pub struct TestTranslator;

impl Translator for TestTranslator {
    fn translate(&self, insn: &DecodedInstruction, ctx: &mut TranslationContext) -> Vec<Stmt> {
        let base = insn.mnemonic.trim_end_matches(".w");
        match base {
            "li" => {
                let imm = insn.bytes()[1] as u64;
                vec![Stmt::Assign {
                    dst: ctx.reg("r0", 32),
                    src: Expr::constant(imm, 32),
                }]
            }
            "csel" => {
                let imm = insn.bytes()[1] as u64;
                let flag = ctx.reg("flag", 1);
                vec![
                    Stmt::Branch {
                        cond: Expr::binary(
                            BinOp::CmpEq,
                            Expr::var(flag),
                            Expr::constant(0, 1),
                        ),
                        target: Expr::constant(insn.end_address(), 32),
                    },
                    Stmt::Assign {
                        dst: ctx.reg("r0", 32),
                        src: Expr::constant(imm, 32),
                    },
                ]
            }
            "mode" => vec![Stmt::Nop],
            _ => lower_flow(insn, 32),
        }
    }
}
