//! Basic-block assembly over a mapped image.
//!
//! A block runs from its start address to the first decode-level exit
//! instruction or the first decode failure. Failures never escape: they
//! become a `Truncated` termination carrying the fault address, and the
//! block still reports a continuation address so region-level drivers can
//! keep walking.

use crate::decode::{DecodeContext, DecodeError, DecodedInstruction, InstructionDecoder};
use crate::image::Image;
use crate::{Address, ArchProfile};

/// Why a block stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ended at a decode-level exit instruction.
    Complete,
    /// Stopped at a decode failure; `fault` is the address that failed.
    Truncated { fault: Address },
}

impl Termination {
    pub fn is_complete(&self) -> bool {
        matches!(self, Termination::Complete)
    }
}

/// A decoded basic block. May be empty when the very first address fails
/// to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    /// Address the block starts at
    pub start: Address,
    /// Instructions in address order, contiguous
    pub insns: Vec<DecodedInstruction>,
    /// How assembly stopped
    pub termination: Termination,
    /// Where a region walk should continue after this block
    pub next: Address,
}

impl DecodedBlock {
    /// Total encoded length of the block in bytes.
    pub fn len_bytes(&self) -> u64 {
        self.insns.iter().map(|i| i.size as u64).sum()
    }

    /// Address immediately after the last decoded instruction.
    pub fn end_address(&self) -> Address {
        match self.insns.last() {
            Some(i) => i.end_address(),
            None => self.start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }
}

/// Assembles basic blocks by repeated single-instruction decode.
pub struct BlockAssembler<'a> {
    image: &'a dyn Image,
    decoder: &'a dyn InstructionDecoder,
    profile: ArchProfile,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(
        image: &'a dyn Image,
        decoder: &'a dyn InstructionDecoder,
        profile: ArchProfile,
    ) -> Self {
        Self {
            image,
            decoder,
            profile,
        }
    }

    pub fn profile(&self) -> &ArchProfile {
        &self.profile
    }

    /// Decode the single instruction at `addr`.
    ///
    /// Unmapped addresses report `OutOfRange`; a decoder claiming a
    /// zero-size success is treated as an invalid opcode so assembly loops
    /// always make progress.
    pub fn decode_at(
        &self,
        addr: Address,
        ctx: &mut DecodeContext,
    ) -> Result<DecodedInstruction, DecodeError> {
        let offset = self
            .image
            .translate_address(addr)
            .ok_or(DecodeError::OutOfRange(addr))?;
        let insn = self.decoder.decode(self.image.as_bytes(), offset, addr, ctx)?;
        if insn.size == 0 {
            return Err(DecodeError::InvalidOpcode(addr));
        }
        Ok(insn)
    }

    /// Assemble the basic block starting at `start`.
    ///
    /// Instructions are contiguous by construction. On a decode failure
    /// the block is truncated and `next` is the fault address bumped by
    /// the architecture's minimum instruction alignment for the active
    /// mode, so a region walk resynchronizes instead of spinning.
    pub fn assemble(&self, start: Address, ctx: &mut DecodeContext) -> DecodedBlock {
        let mut insns = Vec::new();
        let mut at = start;
        loop {
            match self.decode_at(at, ctx) {
                Ok(insn) => {
                    let exit = insn.is_block_exit();
                    at = insn.end_address();
                    insns.push(insn);
                    if exit {
                        return DecodedBlock {
                            start,
                            insns,
                            termination: Termination::Complete,
                            next: at,
                        };
                    }
                }
                Err(err) => {
                    log::debug!(
                        "block at 0x{:x} truncated: {} ({} instruction(s) kept)",
                        start,
                        err,
                        insns.len()
                    );
                    let fault = err.address();
                    let next = fault + self.profile.min_insn_alignment(ctx.mode());
                    return DecodedBlock {
                        start,
                        insns,
                        termination: Termination::Truncated { fault },
                        next,
                    };
                }
            }
        }
    }
}
