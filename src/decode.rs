//! Decode-side contracts: context, instruction capability object, errors.

use std::fmt;

use crate::{Address, ArchProfile, DecodeMode, MAX_INSTRUCTION_SIZE};

/// Mutable per-session decode state threaded through successive decode
/// calls within one lifting session.
///
/// Only decoders mutate it, as a side effect of decoding (e.g. an
/// interworking branch flipping ARM/Thumb state). Concurrent lifting units
/// clone it rather than share it, since the active mode depends on the
/// instructions decoded so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeContext {
    mode: DecodeMode,
}

impl DecodeContext {
    /// Fresh context starting in the profile's initial mode.
    pub fn new(profile: &ArchProfile) -> Self {
        Self {
            mode: profile.initial_mode,
        }
    }

    /// The active decode mode.
    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Switch the active decode mode. Called by decoders only.
    pub fn set_mode(&mut self, mode: DecodeMode) {
        self.mode = mode;
    }
}

/// Decode-level control-flow classification of an instruction.
///
/// `target` is the statically-known destination when the operand encodes
/// one; indirect transfers carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Falls through to the next sequential instruction.
    Sequential,
    /// Unconditional transfer.
    Jump { target: Option<Address> },
    /// Conditional transfer; fall-through is possible but not guaranteed.
    ConditionalJump { target: Option<Address> },
    /// Call; fall-through on return is not guaranteed.
    Call { target: Option<Address> },
    /// Return to the caller.
    Return,
    /// Trap, software interrupt, or halt.
    Trap,
}

impl FlowKind {
    /// True if linear fall-through past this instruction is not guaranteed,
    /// i.e. the instruction ends a basic block at decode level.
    pub fn is_block_exit(&self) -> bool {
        !matches!(self, FlowKind::Sequential)
    }

    /// The statically-known branch/call target, if any.
    pub fn target(&self) -> Option<Address> {
        match self {
            FlowKind::Jump { target }
            | FlowKind::ConditionalJump { target }
            | FlowKind::Call { target } => *target,
            _ => None,
        }
    }
}

/// One decoded instruction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Address the instruction starts at
    pub addr: Address,
    /// Size of the instruction in bytes; never zero
    pub size: u8,
    /// Instruction mnemonic (e.g., "mov", "bl")
    pub mnemonic: String,
    /// Operands as string representation
    pub operands: String,
    /// Raw bytes of the encoding (up to MAX_INSTRUCTION_SIZE)
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
    /// Decode-level control-flow classification
    pub flow: FlowKind,
}

impl DecodedInstruction {
    /// The instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size as usize]
    }

    /// Address immediately after this instruction.
    pub fn end_address(&self) -> Address {
        self.addr + self.size as Address
    }

    /// True if this instruction ends a basic block at decode level.
    pub fn is_block_exit(&self) -> bool {
        self.flow.is_block_exit()
    }

    /// Statically-known branch/call target, if any.
    pub fn branch_target(&self) -> Option<Address> {
        self.flow.target()
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            write!(f, "{}", self.mnemonic)
        } else {
            write!(f, "{}\t{}", self.mnemonic, self.operands)
        }
    }
}

/// Recoverable decode failure.
///
/// Block assembly converts these into a `Truncated` result; they never
/// propagate past it, so callers can probe arbitrary addresses (including
/// mid-instruction or data bytes) without special-casing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No valid instruction at this address for the active mode
    #[error("no valid instruction at 0x{0:x}")]
    InvalidOpcode(Address),

    /// Decoding would read past the mapped image
    #[error("decode at 0x{0:x} runs past the mapped image")]
    OutOfRange(Address),

    /// Bytes form an encoding the decoder does not support
    #[error("unsupported encoding at 0x{0:x}")]
    UnsupportedEncoding(Address),
}

impl DecodeError {
    /// The address the failure occurred at.
    pub fn address(&self) -> Address {
        match self {
            DecodeError::InvalidOpcode(a)
            | DecodeError::OutOfRange(a)
            | DecodeError::UnsupportedEncoding(a) => *a,
        }
    }
}

/// Architecture-bound single-instruction decoder.
///
/// `image` is the whole mapped buffer and `offset` the file offset of the
/// first byte to decode; `addr` is the virtual address the instruction
/// starts at. Implementations must consume at least one byte per success
/// so decode loops provably terminate on finite input.
pub trait InstructionDecoder: Send + Sync {
    fn decode(
        &self,
        image: &[u8],
        offset: usize,
        addr: Address,
        ctx: &mut DecodeContext,
    ) -> Result<DecodedInstruction, DecodeError>;
}
