//! Capstone-based instruction decoder for all supported ISAs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use capstone::{Arch, Capstone, Endian, Mode, NO_EXTRA_MODE};

use crate::decode::{DecodeContext, DecodeError, DecodedInstruction, FlowKind, InstructionDecoder};
use crate::{Address, ArchKind, ArchProfile, DecodeMode, Endianness, Error, MAX_INSTRUCTION_SIZE};

thread_local! {
    // Per-thread cache of Capstone handles, keyed by (arch, mode, endian).
    // Parallel lifting units on different threads never contend on a handle.
    static CS_POOL: RefCell<HashMap<(Arch, Mode, Endian), Arc<Capstone>>> =
        RefCell::new(HashMap::new());
}

/// A Capstone-backed [`InstructionDecoder`] configured from an
/// [`ArchProfile`]. The handle for the active (arch, mode, endian) triple is
/// taken from a thread-local pool, so cloning decode work across threads is
/// cheap and lock-free.
#[derive(Debug, Clone, Copy)]
pub struct CapstoneDecoder {
    profile: ArchProfile,
}

impl CapstoneDecoder {
    /// Build a decoder, validating that Capstone supports the profile's
    /// (arch, mode, endian) triples up front.
    pub fn new(profile: &ArchProfile) -> Result<Self, Error> {
        // Every mode the profile can reach must construct. Checking here
        // keeps the pool lookup in decode() infallible.
        let modes: &[DecodeMode] = match profile.arch {
            ArchKind::Arm => &[DecodeMode::Standard, DecodeMode::Thumb],
            _ => &[DecodeMode::Standard],
        };
        for &mode in modes {
            let (arch, cs_mode, endian) = cs_spec(profile, mode);
            Capstone::new_raw(arch, cs_mode, NO_EXTRA_MODE, Some(endian))?;
        }
        Ok(Self { profile: *profile })
    }

    /// The profile this decoder was built for.
    pub fn profile(&self) -> &ArchProfile {
        &self.profile
    }
}

impl fmt::Display for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapstoneDecoder::{}", self.profile.arch)
    }
}

/// Map a profile and decode mode onto Capstone's configuration triple.
fn cs_spec(profile: &ArchProfile, mode: DecodeMode) -> (Arch, Mode, Endian) {
    let endian = match profile.endianness {
        Endianness::Little => Endian::Little,
        Endianness::Big => Endian::Big,
    };
    match (profile.arch, mode) {
        (ArchKind::X86_32, _) => (Arch::X86, Mode::Mode32, Endian::Little),
        (ArchKind::X86_64, _) => (Arch::X86, Mode::Mode64, Endian::Little),
        (ArchKind::Arm, DecodeMode::Standard) => (Arch::ARM, Mode::Arm, endian),
        (ArchKind::Arm, DecodeMode::Thumb) => (Arch::ARM, Mode::Thumb, endian),
        (ArchKind::AArch64, _) => (Arch::ARM64, Mode::Arm, endian),
        (ArchKind::Mips32, _) => (Arch::MIPS, Mode::Mips32, endian),
        (ArchKind::RiscV32, _) => (Arch::RISCV, Mode::RiscV32, Endian::Little),
        (ArchKind::RiscV64, _) => (Arch::RISCV, Mode::RiscV64, Endian::Little),
        (ArchKind::Ppc32, _) => (Arch::PPC, Mode::Mode32, endian),
    }
}

impl InstructionDecoder for CapstoneDecoder {
    fn decode(
        &self,
        image: &[u8],
        offset: usize,
        addr: Address,
        ctx: &mut DecodeContext,
    ) -> Result<DecodedInstruction, DecodeError> {
        if offset >= image.len() {
            return Err(DecodeError::OutOfRange(addr));
        }

        // Only look at a small window (16 bytes max).
        let end = std::cmp::min(offset + MAX_INSTRUCTION_SIZE, image.len());
        let slice = &image[offset..end];

        let (arch, mode, endian) = cs_spec(&self.profile, ctx.mode());

        let cs = CS_POOL.with(|cell| {
            let mut map = cell.borrow_mut();
            map.entry((arch, mode, endian))
                .or_insert_with(|| {
                    Arc::new(
                        Capstone::new_raw(arch, mode, NO_EXTRA_MODE, Some(endian))
                            .expect("combo validated at construction"),
                    )
                })
                .clone()
        });

        let decoded = Arc::as_ref(&cs)
            .disasm_all(slice, addr)
            .map_err(|_| DecodeError::InvalidOpcode(addr))?;
        let i = decoded
            .iter()
            .next()
            .ok_or(DecodeError::InvalidOpcode(addr))?;

        // The instruction must start exactly where we asked.
        if i.address() != addr {
            return Err(DecodeError::InvalidOpcode(addr));
        }
        let size = i.bytes().len();
        if size == 0 || size > MAX_INSTRUCTION_SIZE {
            return Err(DecodeError::UnsupportedEncoding(addr));
        }

        let mnemonic = i.mnemonic().unwrap_or("").to_string();
        if mnemonic.is_empty() {
            return Err(DecodeError::UnsupportedEncoding(addr));
        }
        let operands = i.op_str().unwrap_or("").to_string();

        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        bytes[..size].copy_from_slice(i.bytes());

        let flow = classify_flow(self.profile.arch, &mnemonic, &operands);

        Ok(DecodedInstruction {
            addr,
            size: size as u8,
            mnemonic,
            operands,
            bytes,
            flow,
        })
    }
}

/// Classify an instruction's control flow from its mnemonic and operand
/// text, per architecture family.
pub fn classify_flow(arch: ArchKind, mnemonic: &str, operands: &str) -> FlowKind {
    let target = || extract_target(operands);
    match arch {
        ArchKind::X86_32 | ArchKind::X86_64 => match mnemonic {
            "jmp" | "ljmp" => FlowKind::Jump { target: target() },
            "call" | "lcall" => FlowKind::Call { target: target() },
            "ret" | "retf" | "iret" | "iretd" | "iretq" => FlowKind::Return,
            "int" | "int1" | "int3" | "into" | "ud2" | "hlt" | "syscall" | "sysenter" => {
                FlowKind::Trap
            }
            m if m.starts_with('j') => FlowKind::ConditionalJump { target: target() },
            "loop" | "loope" | "loopne" => FlowKind::ConditionalJump { target: target() },
            _ => FlowKind::Sequential,
        },
        ArchKind::Arm => {
            // Condition codes suffix almost any ARM mnemonic; a bleq is
            // still a call for block purposes, so split the suffix off
            // before matching the base.
            let m = mnemonic.strip_suffix(".w").unwrap_or(mnemonic);
            let (base, conditional) = arm_split_condition(m);
            match base {
                "b" if conditional => FlowKind::ConditionalJump { target: target() },
                "b" => FlowKind::Jump { target: target() },
                "bl" | "blx" => FlowKind::Call { target: target() },
                "bx" if operands.trim() == "lr" => FlowKind::Return,
                "bx" => FlowKind::Jump { target: None },
                "pop" | "ldm" | "ldmia" | "ldmib" | "ldmdb" | "ldmfd" | "ldmea"
                    if operands.contains("pc") =>
                {
                    FlowKind::Return
                }
                "cbz" | "cbnz" => FlowKind::ConditionalJump { target: target() },
                "svc" | "bkpt" | "udf" => FlowKind::Trap,
                _ => FlowKind::Sequential,
            }
        }
        ArchKind::AArch64 => match mnemonic {
            "b" => FlowKind::Jump { target: target() },
            "br" => FlowKind::Jump { target: None },
            "bl" => FlowKind::Call { target: target() },
            "blr" => FlowKind::Call { target: None },
            "ret" | "eret" => FlowKind::Return,
            "cbz" | "cbnz" | "tbz" | "tbnz" => FlowKind::ConditionalJump { target: target() },
            "svc" | "brk" | "hlt" => FlowKind::Trap,
            m if m.starts_with("b.") => FlowKind::ConditionalJump { target: target() },
            _ => FlowKind::Sequential,
        },
        ArchKind::Mips32 => match mnemonic {
            "j" | "b" => FlowKind::Jump { target: target() },
            "jal" | "jalr" | "bal" => FlowKind::Call { target: target() },
            "jr" => {
                if operands.contains("ra") {
                    FlowKind::Return
                } else {
                    FlowKind::Jump { target: None }
                }
            }
            "syscall" | "break" => FlowKind::Trap,
            "beq" | "bne" | "beqz" | "bnez" | "blez" | "bgtz" | "bltz" | "bgez" | "bltzal"
            | "bgezal" | "beql" | "bnel" => FlowKind::ConditionalJump { target: target() },
            _ => FlowKind::Sequential,
        },
        ArchKind::RiscV32 | ArchKind::RiscV64 => match mnemonic {
            "j" | "c.j" => FlowKind::Jump { target: target() },
            "jal" | "c.jal" => FlowKind::Call { target: target() },
            "jalr" | "c.jalr" => FlowKind::Call { target: None },
            "jr" | "c.jr" => FlowKind::Jump { target: None },
            "ret" => FlowKind::Return,
            "ecall" | "ebreak" | "c.ebreak" => FlowKind::Trap,
            "beq" | "bne" | "blt" | "bge" | "bltu" | "bgeu" | "beqz" | "bnez" | "blez"
            | "bgez" | "bltz" | "bgtz" | "c.beqz" | "c.bnez" => {
                FlowKind::ConditionalJump { target: target() }
            }
            _ => FlowKind::Sequential,
        },
        ArchKind::Ppc32 => match mnemonic {
            "b" | "ba" | "bctr" => FlowKind::Jump { target: target() },
            "bl" | "bla" | "bctrl" => FlowKind::Call { target: target() },
            "blr" => FlowKind::Return,
            "sc" | "trap" | "tw" | "twi" => FlowKind::Trap,
            m if m.starts_with('b') => FlowKind::ConditionalJump { target: target() },
            _ => FlowKind::Sequential,
        },
    }
}

/// Split an ARM mnemonic into its base and whether a condition-code
/// suffix was present ("bleq" → ("bl", true), "add" → ("add", false)).
/// The hs/lo aliases count alongside the canonical codes.
fn arm_split_condition(mnemonic: &str) -> (&str, bool) {
    const CONDS: [&str; 16] = [
        "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt",
        "gt", "le",
    ];
    if mnemonic.len() > 2 {
        let (base, suffix) = mnemonic.split_at(mnemonic.len() - 2);
        if CONDS.contains(&suffix) {
            return (base, true);
        }
    }
    (mnemonic, false)
}

/// Statically-known transfer target from operand text.
///
/// The final operand must be a bare hex immediate, optionally
/// '#'-prefixed, the shape Capstone prints direct targets in ("0x1234",
/// "#0x1234", "r0, #0x1c"). Register and memory operands yield no
/// target: a displacement inside "[rip + 0x2004]" is not a destination.
fn extract_target(operands: &str) -> Option<Address> {
    let last = operands.rsplit(',').next()?.trim();
    let imm = last.strip_prefix('#').unwrap_or(last);
    let hex = imm.strip_prefix("0x")?;
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}
