//! One binary, one architecture, one decode/translate state pair.
//!
//! A [`Session`] owns the loaded image and the decoder/translator chosen
//! for the profile, plus the mutable decode and translation contexts that
//! make successive operations consistent (mode tracking, temp numbering).
//! Rendering operations clone the decode context, so they never disturb
//! session state.

use std::sync::Arc;

use crate::block::{BlockAssembler, DecodedBlock};
use crate::decode::{DecodeContext, DecodeError, DecodedInstruction, InstructionDecoder};
use crate::decoder::CapstoneDecoder;
use crate::image::{Image, ImageReader, ReadError};
use crate::lift::{IrBlock, LiftedBlock, Lifter};
use crate::render::{self, RenderedBlock, SymbolResolver};
use crate::task::LiftTask;
use crate::translate::{GenericTranslator, TranslationContext, Translator};
use crate::x86::X86Translator;
use crate::{Address, ArchKind, ArchProfile, Error};

pub struct Session {
    image: Box<dyn Image>,
    profile: ArchProfile,
    decoder: Arc<dyn InstructionDecoder>,
    translator: Arc<dyn Translator>,
    decode_ctx: DecodeContext,
    trans_ctx: TranslationContext,
}

impl Session {
    /// Open a session with the stock decoder and the richest translator
    /// available for the architecture.
    pub fn new(image: impl Image + 'static, profile: ArchProfile) -> Result<Self, Error> {
        let decoder: Arc<dyn InstructionDecoder> = Arc::new(CapstoneDecoder::new(&profile)?);
        let translator: Arc<dyn Translator> = match profile.arch {
            ArchKind::X86_32 | ArchKind::X86_64 => Arc::new(X86Translator::new(&profile)),
            _ => Arc::new(GenericTranslator::new(&profile)),
        };
        Ok(Self::with_parts(image, profile, decoder, translator))
    }

    /// Open a session with explicit decoder and translator implementations.
    pub fn with_parts(
        image: impl Image + 'static,
        profile: ArchProfile,
        decoder: Arc<dyn InstructionDecoder>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            image: Box::new(image),
            decode_ctx: DecodeContext::new(&profile),
            trans_ctx: TranslationContext::new(),
            profile,
            decoder,
            translator,
        }
    }

    pub fn profile(&self) -> &ArchProfile {
        &self.profile
    }

    pub fn entry_point(&self) -> Option<Address> {
        self.image.entry_point()
    }

    /// Endian-aware reader over the session's image.
    pub fn reader(&self) -> ImageReader<'_> {
        ImageReader::new(self.image.as_ref(), self.profile.endianness)
    }

    pub fn read_bytes(&self, addr: Address, len: usize) -> Result<Vec<u8>, ReadError> {
        self.reader().read_bytes(addr, len).map(|b| b.to_vec())
    }

    pub fn read_uint(&self, addr: Address, width: usize) -> Result<u64, ReadError> {
        self.reader().read_uint(addr, width)
    }

    pub fn read_int(&self, addr: Address, width: usize) -> Result<i64, ReadError> {
        self.reader().read_int(addr, width)
    }

    pub fn read_ascii_string(&self, addr: Address, max_len: usize) -> Result<String, ReadError> {
        self.reader().read_ascii_string(addr, max_len)
    }

    /// Decode the single instruction at `addr`, advancing decode state.
    pub fn decode_instruction_at(
        &mut self,
        addr: Address,
    ) -> Result<DecodedInstruction, DecodeError> {
        let assembler =
            BlockAssembler::new(self.image.as_ref(), self.decoder.as_ref(), self.profile);
        assembler.decode_at(addr, &mut self.decode_ctx)
    }

    /// Assemble the basic block at `addr`.
    pub fn decode_block(&mut self, addr: Address) -> DecodedBlock {
        let assembler =
            BlockAssembler::new(self.image.as_ref(), self.decoder.as_ref(), self.profile);
        assembler.assemble(addr, &mut self.decode_ctx)
    }

    /// Decode and translate the basic block at `addr`.
    pub fn lift_block(&mut self, addr: Address) -> LiftedBlock {
        let lifter = Lifter::new(
            self.image.as_ref(),
            self.decoder.as_ref(),
            self.translator.as_ref(),
            self.profile,
        );
        lifter.lift_block(addr, &mut self.decode_ctx, &mut self.trans_ctx)
    }

    /// As [`lift_block`](Self::lift_block) plus the IR cleanup pass.
    pub fn lift_block_optimized(&mut self, addr: Address) -> LiftedBlock {
        let lifter = Lifter::new(
            self.image.as_ref(),
            self.decoder.as_ref(),
            self.translator.as_ref(),
            self.profile,
        );
        lifter.lift_block_optimized(addr, &mut self.decode_ctx, &mut self.trans_ctx)
    }

    /// Lift a block bounded by IR-level block ends rather than
    /// decode-level exits.
    pub fn lift_block_ir_bounded(&mut self, addr: Address) -> IrBlock {
        let lifter = Lifter::new(
            self.image.as_ref(),
            self.decoder.as_ref(),
            self.translator.as_ref(),
            self.profile,
        );
        lifter.lift_block_ir_bounded(addr, &mut self.decode_ctx, &mut self.trans_ctx)
    }

    /// Display text for the instruction at `addr`.
    ///
    /// Works on a clone of the decode context; session state is untouched.
    pub fn disasm_instruction(
        &self,
        addr: Address,
        show_address: bool,
        symbols: &dyn SymbolResolver,
    ) -> Result<String, DecodeError> {
        let assembler =
            BlockAssembler::new(self.image.as_ref(), self.decoder.as_ref(), self.profile);
        let mut ctx = self.decode_ctx.clone();
        let insn = assembler.decode_at(addr, &mut ctx)?;
        Ok(render::disasm_instruction(&insn, show_address, symbols))
    }

    /// Render the block at `addr`, line by line.
    ///
    /// Also works on a cloned decode context, so rendering the same block
    /// twice produces identical output.
    pub fn disasm_block(
        &self,
        addr: Address,
        show_address: bool,
        symbols: &dyn SymbolResolver,
    ) -> RenderedBlock {
        let assembler =
            BlockAssembler::new(self.image.as_ref(), self.decoder.as_ref(), self.profile);
        let mut ctx = self.decode_ctx.clone();
        let block = assembler.assemble(addr, &mut ctx);
        render::render_block(&block, show_address, symbols)
    }

    /// Decode the block at `addr` now, packaging translation into a
    /// deferred task that can run on another thread. Returns the task and
    /// the block's continuation address.
    ///
    /// Decoding happens eagerly because the continuation address depends
    /// on mutable decode state; translation is pure given the task's own
    /// fresh context.
    pub fn block_task(&mut self, addr: Address, optimize: bool) -> (LiftTask, Address) {
        let block = self.decode_block(addr);
        let next = block.next;
        (
            LiftTask::new(block, Arc::clone(&self.translator), optimize),
            next,
        )
    }
}
