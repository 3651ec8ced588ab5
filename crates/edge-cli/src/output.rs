//! Output formatting for edgebulk (table, json)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }

    /// Print raw JSON records
    pub fn print_records(&self, records: &[serde_json::Value]) {
        match self.format {
            OutputFormat::Table => {
                let rows: Vec<RecordRow> = records
                    .iter()
                    .enumerate()
                    .map(|(i, record)| RecordRow {
                        index: i + 1,
                        record: record.to_string(),
                    })
                    .collect();
                self.print(&rows);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
                );
            }
        }
    }
}

/// Render error codes for a table cell
pub fn format_codes(codes: &[i64]) -> String {
    codes
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Per-label result of a bulk command batch
#[derive(Debug, Tabled, Serialize)]
pub struct CommandRow {
    #[tabled(rename = "Label")]
    pub label: String,
    #[tabled(rename = "Device")]
    pub device: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Error Codes")]
    pub error_codes: String,
}

/// Per-device result of an onboarding run
#[derive(Debug, Tabled, Serialize)]
pub struct OnboardRow {
    #[tabled(rename = "Device")]
    pub device: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Thing ID")]
    pub thing_id: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

/// One record of an iterated query
#[derive(Debug, Tabled, Serialize)]
pub struct RecordRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Record")]
    pub record: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes() {
        assert_eq!(format_codes(&[]), "");
        assert_eq!(format_codes(&[-90008, -1]), "-90008, -1");
    }
}
