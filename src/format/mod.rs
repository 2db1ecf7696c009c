//! Output format module implementation

mod csv;
mod json;

pub use self::csv::*;
pub use self::json::*;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::block::{DecodedBlock, Termination};

/// Supported output formats for lifted blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output (default)
    Text,
    /// JSON format (hierarchical)
    Json,
    /// JSON Lines format (one JSON object per line)
    JsonLines,
    /// CSV format (comma-separated values)
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get the default output format
    pub fn default() -> Self {
        OutputFormat::Text
    }

    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn BlockFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatting failure.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Formatter trait for decoded-block output
pub trait BlockFormatter {
    /// Format one decoded block
    fn format(&self, block: &DecodedBlock) -> Result<String, FormatError>;
}

/// Format a block in plain text
pub struct TextFormatter;

/// Format a block in JSON
pub struct JsonFormatter;

/// Format a block in JSON Lines
pub struct JsonLinesFormatter;

/// Format a block in CSV
pub struct CsvFormatter;

impl BlockFormatter for TextFormatter {
    fn format(&self, block: &DecodedBlock) -> Result<String, FormatError> {
        let mut output = String::new();
        output.push_str(&format!("Block at 0x{:08x}:\n", block.start));

        for insn in &block.insns {
            // Format bytes as hex
            let bytes = insn
                .bytes()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");

            output.push_str(&format!(
                "  0x{:08x}: {:<10} {:<30} ; {}\n",
                insn.addr, insn.mnemonic, insn.operands, bytes
            ));
        }

        match block.termination {
            Termination::Complete => {
                output.push_str(&format!("  Complete; next 0x{:08x}\n", block.next));
            }
            Termination::Truncated { fault } => {
                output.push_str(&format!(
                    "  Truncated at 0x{:08x}; next 0x{:08x}\n",
                    fault, block.next
                ));
            }
        }

        Ok(output)
    }
}
