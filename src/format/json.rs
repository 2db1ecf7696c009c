//! JSON and JSON Lines output formatters

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{BlockFormatter, FormatError};
use crate::block::{DecodedBlock, Termination};
use crate::decode::DecodedInstruction;

/// Serializable instruction for JSON output
#[derive(Serialize, Deserialize)]
struct InstructionJson {
    /// Address of the instruction
    address: String,
    /// Size of the instruction in bytes
    size: u8,
    /// Mnemonic (e.g., "mov", "add")
    mnemonic: String,
    /// Operands
    operands: String,
    /// Bytes of the instruction as hex string
    bytes: String,
}

/// Serializable block for JSON output
#[derive(Serialize, Deserialize)]
struct BlockJson {
    /// Starting address of the block
    start: String,
    /// How the block ended ("complete" or "truncated")
    termination: String,
    /// Fault address for truncated blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<String>,
    /// Continuation address after the block
    next: String,
    /// Instructions in this block
    instructions: Vec<InstructionJson>,
}

impl BlockFormatter for super::JsonFormatter {
    fn format(&self, block: &DecodedBlock) -> Result<String, FormatError> {
        Ok(serde_json::to_string_pretty(&block_to_json(block))?)
    }
}

impl BlockFormatter for super::JsonLinesFormatter {
    fn format(&self, block: &DecodedBlock) -> Result<String, FormatError> {
        let mut output = String::new();
        let start_str = format!("0x{:x}", block.start);

        let (termination, fault) = termination_fields(block.termination);
        let block_json = json!({
            "type": "block",
            "start": start_str,
            "termination": termination,
            "fault": fault,
            "next": format!("0x{:x}", block.next),
        });
        output.push_str(&serde_json::to_string(&block_json)?);
        output.push('\n');

        for insn in &block.insns {
            let instruction = json!({
                "type": "instruction",
                "block_start": start_str,
                "address": format!("0x{:x}", insn.addr),
                "size": insn.size,
                "mnemonic": insn.mnemonic,
                "operands": insn.operands,
                "bytes": hex_bytes(insn),
            });
            output.push_str(&serde_json::to_string(&instruction)?);
            output.push('\n');
        }

        Ok(output)
    }
}

fn hex_bytes(insn: &DecodedInstruction) -> String {
    insn.bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn termination_fields(termination: Termination) -> (&'static str, Option<String>) {
    match termination {
        Termination::Complete => ("complete", None),
        Termination::Truncated { fault } => ("truncated", Some(format!("0x{:x}", fault))),
    }
}

/// Convert an instruction to JSON format
fn instruction_to_json(insn: &DecodedInstruction) -> InstructionJson {
    InstructionJson {
        address: format!("0x{:x}", insn.addr),
        size: insn.size,
        mnemonic: insn.mnemonic.clone(),
        operands: insn.operands.clone(),
        bytes: hex_bytes(insn),
    }
}

/// Convert a block to JSON format
fn block_to_json(block: &DecodedBlock) -> BlockJson {
    let (termination, fault) = termination_fields(block.termination);
    BlockJson {
        start: format!("0x{:x}", block.start),
        termination: termination.to_string(),
        fault,
        next: format!("0x{:x}", block.next),
        instructions: block.insns.iter().map(instruction_to_json).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::create_test_block;
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_json_formatter_structure() {
        let block = create_test_block();
        let result = super::super::JsonFormatter.format(&block).unwrap();
        let parsed: Value = serde_json::from_str(&result).unwrap();

        assert_eq!(parsed["start"], "0x1000");
        assert_eq!(parsed["termination"], "complete");
        assert_eq!(parsed["next"], "0x1004");
        assert!(parsed.get("fault").is_none());
        let insns = parsed["instructions"].as_array().unwrap();
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[0]["mnemonic"], "push");
        assert_eq!(insns[0]["bytes"], "55");
        assert_eq!(insns[1]["bytes"], "89 e5");
    }

    #[test]
    fn test_json_formatter_truncated_block() {
        let mut block = create_test_block();
        block.insns.pop();
        block.termination = Termination::Truncated { fault: 0x1003 };

        let result = super::super::JsonFormatter.format(&block).unwrap();
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["termination"], "truncated");
        assert_eq!(parsed["fault"], "0x1003");
    }

    #[test]
    fn test_jsonl_one_record_per_line() {
        let block = create_test_block();
        let result = super::super::JsonLinesFormatter.format(&block).unwrap();
        let lines: Vec<&str> = result.lines().collect();

        // block record first, then one record per instruction
        assert_eq!(lines.len(), 4);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "block");
        for line in &lines[1..] {
            let record: Value = serde_json::from_str(line).unwrap();
            assert_eq!(record["type"], "instruction");
            assert_eq!(record["block_start"], "0x1000");
        }
    }
}
