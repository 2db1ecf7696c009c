//! Block-level lifting: decode a block, then translate it to IR.
//!
//! Two granularities are offered. `lift_block` translates a fully
//! assembled decode-level block. `lift_block_ir_bounded` interleaves
//! decode and translate one instruction at a time and stops at the first
//! IR-level block end, which can fall mid-way through a decode-level
//! block (conditional moves and friends).

use crate::block::{BlockAssembler, DecodedBlock, Termination};
use crate::decode::{DecodeContext, DecodedInstruction, InstructionDecoder};
use crate::image::Image;
use crate::ir::Stmt;
use crate::optimize::optimize;
use crate::translate::{TranslationContext, Translator};
use crate::{Address, ArchProfile};

/// IR for one decode-level block: the decoded instructions plus the flat
/// statement sequence they lowered to.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftedBlock {
    pub start: Address,
    pub insns: Vec<DecodedInstruction>,
    pub stmts: Vec<Stmt>,
    pub termination: Termination,
    pub next: Address,
}

/// An IR-bounded block: per-instruction statement groups, ending at the
/// first group containing a block-ending statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub start: Address,
    pub pairs: Vec<(DecodedInstruction, Vec<Stmt>)>,
    pub termination: Termination,
    pub next: Address,
}

impl IrBlock {
    /// All statements in order, flattened across instructions.
    pub fn stmts(&self) -> impl Iterator<Item = &Stmt> {
        self.pairs.iter().flat_map(|(_, stmts)| stmts.iter())
    }
}

/// Drives block assembly and translation against one image.
pub struct Lifter<'a> {
    assembler: BlockAssembler<'a>,
    translator: &'a dyn Translator,
}

impl<'a> Lifter<'a> {
    pub fn new(
        image: &'a dyn Image,
        decoder: &'a dyn InstructionDecoder,
        translator: &'a dyn Translator,
        profile: ArchProfile,
    ) -> Self {
        Self {
            assembler: BlockAssembler::new(image, decoder, profile),
            translator,
        }
    }

    pub fn assembler(&self) -> &BlockAssembler<'a> {
        &self.assembler
    }

    /// Decode the block at `start` and translate every instruction.
    ///
    /// Truncation carries through untouched: the statements cover exactly
    /// the instructions that decoded.
    pub fn lift_block(
        &self,
        start: Address,
        dctx: &mut DecodeContext,
        tctx: &mut TranslationContext,
    ) -> LiftedBlock {
        let block = self.assembler.assemble(start, dctx);
        self.translate_block(block, tctx)
    }

    /// As [`lift_block`](Self::lift_block), then run the IR cleanup pass
    /// over the statement sequence.
    pub fn lift_block_optimized(
        &self,
        start: Address,
        dctx: &mut DecodeContext,
        tctx: &mut TranslationContext,
    ) -> LiftedBlock {
        let mut lifted = self.lift_block(start, dctx, tctx);
        lifted.stmts = optimize(&lifted.stmts);
        lifted
    }

    /// Translate an already-assembled block.
    pub fn translate_block(
        &self,
        block: DecodedBlock,
        tctx: &mut TranslationContext,
    ) -> LiftedBlock {
        let mut stmts = Vec::new();
        for insn in &block.insns {
            stmts.extend(self.translator.translate(insn, tctx));
        }
        log::debug!(
            "lifted block 0x{:x}: {} instruction(s) -> {} statement(s)",
            block.start,
            block.insns.len(),
            stmts.len()
        );
        LiftedBlock {
            start: block.start,
            insns: block.insns,
            stmts,
            termination: block.termination,
            next: block.next,
        }
    }

    /// Lift one instruction at a time, stopping at the first instruction
    /// whose IR contains a block-ending statement.
    ///
    /// A decode failure truncates the block but keeps every pair lifted
    /// so far, mirroring decode-level truncation.
    pub fn lift_block_ir_bounded(
        &self,
        start: Address,
        dctx: &mut DecodeContext,
        tctx: &mut TranslationContext,
    ) -> IrBlock {
        let mut pairs: Vec<(DecodedInstruction, Vec<Stmt>)> = Vec::new();
        let mut at = start;
        loop {
            match self.assembler.decode_at(at, dctx) {
                Ok(insn) => {
                    let stmts = self.translator.translate(&insn, tctx);
                    let ends = stmts.iter().any(Stmt::ends_block);
                    at = insn.end_address();
                    pairs.push((insn, stmts));
                    if ends {
                        return IrBlock {
                            start,
                            pairs,
                            termination: Termination::Complete,
                            next: at,
                        };
                    }
                }
                Err(err) => {
                    let fault = err.address();
                    let next =
                        fault + self.assembler.profile().min_insn_alignment(dctx.mode());
                    log::debug!(
                        "ir-bounded block at 0x{:x} truncated at 0x{:x}",
                        start,
                        fault
                    );
                    return IrBlock {
                        start,
                        pairs,
                        termination: Termination::Truncated { fault },
                        next,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MappedImage;
    use crate::testkit::{self, TestDecoder, TestTranslator};

    fn lifter_on(image: &MappedImage) -> Lifter<'_> {
        Lifter::new(image, &TestDecoder, &TestTranslator, testkit::profile())
    }

    fn contexts() -> (DecodeContext, TranslationContext) {
        (
            DecodeContext::new(&testkit::profile()),
            TranslationContext::new(),
        )
    }

    #[test]
    fn test_lift_block_covers_all_instructions() {
        // li 1, li 2, ret
        let image = MappedImage::new(0x1000, vec![0x10, 0x01, 0x10, 0x02, 0x50]);
        let lifter = lifter_on(&image);
        let (mut d, mut t) = contexts();
        let lifted = lifter.lift_block(0x1000, &mut d, &mut t);
        assert_eq!(lifted.insns.len(), 3);
        assert_eq!(lifted.termination, Termination::Complete);
        assert_eq!(lifted.stmts.last(), Some(&Stmt::Return));
    }

    #[test]
    fn test_truncated_lift_keeps_partial_ir() {
        // li then garbage
        let image = MappedImage::new(0x1000, vec![0x10, 0x07, 0xff]);
        let lifter = lifter_on(&image);
        let (mut d, mut t) = contexts();
        let lifted = lifter.lift_block(0x1000, &mut d, &mut t);
        assert_eq!(lifted.insns.len(), 1);
        assert_eq!(lifted.stmts.len(), 1);
        assert_eq!(
            lifted.termination,
            Termination::Truncated { fault: 0x1002 }
        );
    }

    #[test]
    fn test_ir_bounded_stops_at_ir_branch() {
        // csel is sequential at decode level, so a decode-level block
        // would run on; the IR-bounded walk stops right after it.
        let image = MappedImage::new(0x1000, vec![0x30, 0x05, 0x10, 0x01, 0x50]);
        let lifter = lifter_on(&image);
        let (mut d, mut t) = contexts();
        let block = lifter.lift_block_ir_bounded(0x1000, &mut d, &mut t);
        assert_eq!(block.pairs.len(), 1);
        assert_eq!(block.pairs[0].0.mnemonic, "csel");
        assert_eq!(block.termination, Termination::Complete);
        assert_eq!(block.next, 0x1002);
        assert!(block.stmts().any(|s| s.ends_block()));
    }

    #[test]
    fn test_ir_bounded_preserves_partial_progress_on_failure() {
        // li decodes and lifts, then the bad byte truncates
        let image = MappedImage::new(0x1000, vec![0x10, 0x01, 0xee]);
        let lifter = lifter_on(&image);
        let (mut d, mut t) = contexts();
        let block = lifter.lift_block_ir_bounded(0x1000, &mut d, &mut t);
        assert_eq!(block.pairs.len(), 1);
        assert_eq!(
            block.termination,
            Termination::Truncated { fault: 0x1002 }
        );
        assert_eq!(block.next, 0x1003);
    }

    #[test]
    fn test_optimized_lift_drops_nops() {
        // mode toggle lifts to Nop; the cleanup pass removes it
        let image = MappedImage::new(0x1000, vec![0x40, 0x00, 0x50]);
        let lifter = lifter_on(&image);
        let (mut d, mut t) = contexts();
        let lifted = lifter.lift_block_optimized(0x1000, &mut d, &mut t);
        assert_eq!(lifted.insns.len(), 2);
        assert_eq!(lifted.stmts, vec![Stmt::Return]);
    }
}
