//! Textual rendering of decoded blocks with optional symbol resolution.
//!
//! Rendering is read-only over a `DecodedBlock` and never re-decodes, so
//! it is idempotent by construction.

use std::collections::HashMap;

use crate::block::{DecodedBlock, Termination};
use crate::decode::DecodedInstruction;
use crate::Address;

/// Maps an address to a display name.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, addr: Address) -> Option<String>;
}

/// Resolver with no symbols.
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _addr: Address) -> Option<String> {
        None
    }
}

impl SymbolResolver for HashMap<Address, String> {
    fn resolve(&self, addr: Address) -> Option<String> {
        self.get(&addr).cloned()
    }
}

/// One instruction as display text. A resolvable static branch target
/// gets its symbol appended as ` <name>`.
pub fn disasm_instruction(
    insn: &DecodedInstruction,
    show_address: bool,
    symbols: &dyn SymbolResolver,
) -> String {
    let mut line = String::new();
    if show_address {
        line.push_str(&format!("0x{:08x}: ", insn.addr));
    }
    line.push_str(&format!("{:<10} {}", insn.mnemonic, insn.operands));
    if let Some(name) = insn.branch_target().and_then(|t| symbols.resolve(t)) {
        line.push_str(&format!(" <{}>", name));
    }
    line.trim_end().to_string()
}

/// A block rendered line-by-line, keeping the block's termination facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBlock {
    pub start: Address,
    pub lines: Vec<String>,
    pub termination: Termination,
    pub next: Address,
}

/// Render every instruction of a decoded block.
pub fn render_block(
    block: &DecodedBlock,
    show_address: bool,
    symbols: &dyn SymbolResolver,
) -> RenderedBlock {
    RenderedBlock {
        start: block.start,
        lines: block
            .insns
            .iter()
            .map(|i| disasm_instruction(i, show_address, symbols))
            .collect(),
        termination: block.termination,
        next: block.next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::FlowKind;
    use crate::MAX_INSTRUCTION_SIZE;

    fn insn(addr: Address, mnemonic: &str, operands: &str, flow: FlowKind) -> DecodedInstruction {
        DecodedInstruction {
            addr,
            size: 2,
            mnemonic: mnemonic.to_string(),
            operands: operands.to_string(),
            bytes: [0u8; MAX_INSTRUCTION_SIZE],
            flow,
        }
    }

    #[test]
    fn test_line_layout() {
        let i = insn(0x1000, "mov", "eax, 1", FlowKind::Sequential);
        assert_eq!(
            disasm_instruction(&i, true, &NoSymbols),
            "0x00001000: mov        eax, 1"
        );
        assert_eq!(disasm_instruction(&i, false, &NoSymbols), "mov        eax, 1");
    }

    #[test]
    fn test_operandless_line_has_no_trailing_space() {
        let i = insn(0x1000, "ret", "", FlowKind::Return);
        assert_eq!(disasm_instruction(&i, false, &NoSymbols), "ret");
    }

    #[test]
    fn test_symbol_suffix_on_static_target() {
        let mut symbols = HashMap::new();
        symbols.insert(0x2000u64, "main".to_string());

        let call = insn(
            0x1000,
            "call",
            "0x2000",
            FlowKind::Call { target: Some(0x2000) },
        );
        assert_eq!(
            disasm_instruction(&call, false, &symbols),
            "call       0x2000 <main>"
        );

        // unresolved target gets no suffix
        let jmp = insn(0x1000, "jmp", "rax", FlowKind::Jump { target: None });
        assert_eq!(disasm_instruction(&jmp, false, &symbols), "jmp        rax");
    }

    #[test]
    fn test_render_block_is_idempotent() {
        let block = DecodedBlock {
            start: 0x1000,
            insns: vec![
                insn(0x1000, "li", "r0, 1", FlowKind::Sequential),
                insn(0x1002, "ret", "", FlowKind::Return),
            ],
            termination: Termination::Complete,
            next: 0x1003,
        };
        let a = render_block(&block, true, &NoSymbols);
        let b = render_block(&block, true, &NoSymbols);
        assert_eq!(a, b);
        assert_eq!(a.lines.len(), 2);
        assert_eq!(a.termination, Termination::Complete);
    }
}
