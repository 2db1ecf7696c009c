//! CSV output formatter

use super::{BlockFormatter, FormatError};
use crate::block::{DecodedBlock, Termination};

impl BlockFormatter for super::CsvFormatter {
    fn format(&self, block: &DecodedBlock) -> Result<String, FormatError> {
        let mut output = String::new();
        let block_addr = format!("0x{:x}", block.start);
        let (termination, fault) = match block.termination {
            Termination::Complete => ("complete", String::new()),
            Termination::Truncated { fault } => ("truncated", format!("0x{:x}", fault)),
        };

        // CSV header
        output.push_str("block_address,termination,fault,address,size,mnemonic,operands,bytes\n");

        for insn in &block.insns {
            let addr = format!("0x{:x}", insn.addr);
            let bytes = insn
                .bytes()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");

            // Escape fields that might contain commas
            let mnemonic = escape_csv_field(&insn.mnemonic);
            let operands = escape_csv_field(&insn.operands);

            // Write CSV line
            output.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                block_addr, termination, fault, addr, insn.size, mnemonic, operands, bytes
            ));
        }

        Ok(output)
    }
}

/// Helper function to escape a field for CSV output
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('\"') || field.contains('\n') {
        // Need to escape
        let escaped = field.replace('\"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        field.to_string()
    }
}
