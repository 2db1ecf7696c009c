//! Core types, traits, and dispatch for the Nuclide Lift engine.
//!
//! This library is the instruction-decoding and IR-lifting layer of a binary
//! analysis platform: given a loaded image and a virtual address it decodes
//! machine instructions, assembles them into straight-line basic blocks,
//! translates each instruction into a low-level IR statement sequence,
//! optionally optimizes that sequence, and renders instructions as text.
//! Decoding is Capstone-backed and architecture-polymorphic; lifting runs
//! behind the `Translator` trait with one implementation per supported ISA
//! family.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use nuclide_lift::{ArchKind, ArchProfile};
//! use nuclide_lift::image::MappedImage;
//! use nuclide_lift::session::Session;
//!
//! // A flat buffer mapped at a base address. Real callers plug their own
//! // loader in behind the AddressSpace/ByteSource traits.
//! let image = MappedImage::new(0x1000, vec![0x55, 0x89, 0xe5, 0xc3]);
//!
//! let profile = ArchProfile::new(ArchKind::X86_32);
//! let mut session = Session::new(image, profile).unwrap();
//!
//! // Decode and lift one basic block.
//! let block = session.lift_block(0x1000);
//! for stmt in &block.stmts {
//!     println!("{}", stmt);
//! }
//! ```

pub mod image;
pub mod decode;
pub mod decoder;
pub mod ir;
pub mod translate;
pub mod x86;
pub mod block;
pub mod lift;
pub mod optimize;
pub mod render;
pub mod task;
pub mod session;
pub mod format;
mod large_tests;
#[cfg(test)]
pub(crate) mod testkit;

use std::fmt;

use clap::ValueEnum;

/// Represents a virtual address.
pub type Address = u64;

/// Maximum instruction size in bytes across all supported ISAs.
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// Supported instruction sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[non_exhaustive]
pub enum ArchKind {
    /// 32-bit x86
    #[value(name = "x86-32")]
    X86_32,
    /// 64-bit x86
    #[value(name = "x86-64")]
    X86_64,
    /// ARM (32-bit); Thumb is a decode mode, not a separate architecture
    #[value(name = "arm")]
    Arm,
    /// AArch64 (ARM 64-bit)
    #[value(name = "aarch64")]
    AArch64,
    /// MIPS 32-bit
    #[value(name = "mips32")]
    Mips32,
    /// RISC-V 32-bit
    #[value(name = "riscv32")]
    RiscV32,
    /// RISC-V 64-bit
    #[value(name = "riscv64")]
    RiscV64,
    /// PowerPC 32-bit
    #[value(name = "ppc32")]
    Ppc32,
}

impl fmt::Display for ArchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchKind::X86_32 => write!(f, "x86-32"),
            ArchKind::X86_64 => write!(f, "x86-64"),
            ArchKind::Arm => write!(f, "ARM"),
            ArchKind::AArch64 => write!(f, "AArch64"),
            ArchKind::Mips32 => write!(f, "MIPS32"),
            ArchKind::RiscV32 => write!(f, "RISC-V 32"),
            ArchKind::RiscV64 => write!(f, "RISC-V 64"),
            ArchKind::Ppc32 => write!(f, "PowerPC 32"),
        }
    }
}

/// Byte order used when reading multi-byte values from the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

/// Decode sub-mode on architectures with mixed-width encodings.
///
/// The mode lives in a [`decode::DecodeContext`] and is mutated only by the
/// decoder as a side effect of decoding, since the active mode is a function
/// of the instructions decoded so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeMode {
    /// The architecture's primary encoding (ARM state on ARM, the only
    /// state everywhere else).
    Standard,
    /// Thumb state on ARM.
    Thumb,
}

/// Immutable description of the instruction set a session decodes for.
///
/// Created once per session and shared read-only by every decode and lift
/// operation in it. Selects the decoder and translator implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchProfile {
    /// Instruction set.
    pub arch: ArchKind,
    /// Byte order of the image.
    pub endianness: Endianness,
    /// Natural register width in bits (32 or 64).
    pub word_bits: u16,
    /// Decode mode a fresh session starts in.
    pub initial_mode: DecodeMode,
}

impl ArchProfile {
    /// Profile with the conventional defaults for `arch`: little-endian
    /// everywhere except PowerPC, word width per the ISA, standard mode.
    pub fn new(arch: ArchKind) -> Self {
        let endianness = match arch {
            ArchKind::Ppc32 => Endianness::Big,
            _ => Endianness::Little,
        };
        let word_bits = match arch {
            ArchKind::X86_64 | ArchKind::AArch64 | ArchKind::RiscV64 => 64,
            _ => 32,
        };
        Self {
            arch,
            endianness,
            word_bits,
            initial_mode: DecodeMode::Standard,
        }
    }

    /// Override the decode mode the session starts in (e.g. Thumb on ARM).
    pub fn with_initial_mode(mut self, mode: DecodeMode) -> Self {
        self.initial_mode = mode;
        self
    }

    /// Override the byte order (e.g. big-endian MIPS images).
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Smallest legal instruction slot in bytes for the given mode.
    ///
    /// This backs the continuation policy after a truncated block: the next
    /// probe address is one minimal slot past the fault, never a raw "+1"
    /// on aligned ISAs. Callers that want byte-wise re-probing still have
    /// the fault address in the block's termination.
    pub fn min_insn_alignment(&self, mode: DecodeMode) -> Address {
        match self.arch {
            ArchKind::X86_32 | ArchKind::X86_64 => 1,
            ArchKind::Arm => match mode {
                DecodeMode::Thumb => 2,
                DecodeMode::Standard => 4,
            },
            // Compressed encodings make 2 the floor on RISC-V.
            ArchKind::RiscV32 | ArchKind::RiscV64 => 2,
            ArchKind::AArch64 | ArchKind::Mips32 | ArchKind::Ppc32 => 4,
        }
    }
}

/// Error type for session construction.
///
/// Decode failures are deliberately not here: they surface as the
/// `Truncated` variant of a block result, never as a raised error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The architecture/mode/endianness combination has no decoder
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(ArchKind),

    /// Capstone error
    #[error("Capstone error: {0}")]
    Capstone(#[from] capstone::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let p = ArchProfile::new(ArchKind::X86_64);
        assert_eq!(p.word_bits, 64);
        assert_eq!(p.endianness, Endianness::Little);
        assert_eq!(p.initial_mode, DecodeMode::Standard);

        let p = ArchProfile::new(ArchKind::Ppc32);
        assert_eq!(p.word_bits, 32);
        assert_eq!(p.endianness, Endianness::Big);
    }

    #[test]
    fn test_min_insn_alignment() {
        let x86 = ArchProfile::new(ArchKind::X86_64);
        assert_eq!(x86.min_insn_alignment(DecodeMode::Standard), 1);

        let arm = ArchProfile::new(ArchKind::Arm);
        assert_eq!(arm.min_insn_alignment(DecodeMode::Standard), 4);
        assert_eq!(arm.min_insn_alignment(DecodeMode::Thumb), 2);

        let rv = ArchProfile::new(ArchKind::RiscV64);
        assert_eq!(rv.min_insn_alignment(DecodeMode::Standard), 2);
    }

    #[test]
    fn test_initial_mode_override() {
        let p = ArchProfile::new(ArchKind::Arm).with_initial_mode(DecodeMode::Thumb);
        assert_eq!(p.initial_mode, DecodeMode::Thumb);
    }
}
