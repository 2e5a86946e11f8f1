//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use pewpi_core::{Record, Token};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize output: {}", e),
        }
    }

    /// Print a single token
    pub fn print_token(&self, token: &Token) {
        match self.format {
            OutputFormat::Human => {
                println!("Token:   {}", token.token_id);
                println!("Type:    {}", token.token_type);
                println!("Value:   {}", token.value);
                println!("User:    {}", token.user_id);
                println!("Status:  {}", token.status);
                println!("Created: {}", token.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated: {}", token.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => self.json(token),
            OutputFormat::Quiet => println!("{}", token.token_id),
        }
    }

    /// Print a list of tokens
    pub fn print_tokens(&self, tokens: &[Token]) {
        match self.format {
            OutputFormat::Human => {
                if tokens.is_empty() {
                    println!("No tokens found.");
                    return;
                }
                for token in tokens {
                    println!(
                        "{} | {:<8} | {:>8} | {:<7} | {}",
                        truncate(&token.token_id, 32),
                        token.token_type,
                        token.value,
                        token.status,
                        truncate(&token.user_id, 24)
                    );
                }
                println!("\n{} token(s)", tokens.len());
            }
            OutputFormat::Json => self.json(tokens),
            OutputFormat::Quiet => {
                for token in tokens {
                    println!("{}", token.token_id);
                }
            }
        }
    }

    /// Print a user's balance
    pub fn print_balance(&self, user_id: &str, balance: f64) {
        match self.format {
            OutputFormat::Human => println!("Balance for {}: {}", user_id, balance),
            OutputFormat::Json => {
                self.json(&serde_json::json!({"userId": user_id, "balance": balance}))
            }
            OutputFormat::Quiet => println!("{}", balance),
        }
    }

    /// Print a single document
    pub fn print_record(&self, record: &Record) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", record.id);
                for (field, value) in &record.fields {
                    println!("{:<8} {}", format!("{}:", field), value);
                }
                println!("Created: {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
                println!("Updated: {}", record.updated_at.format("%Y-%m-%d %H:%M:%S"));
            }
            OutputFormat::Json => self.json(record),
            OutputFormat::Quiet => println!("{}", record.id),
        }
    }

    /// Print a list of documents
    pub fn print_records(&self, records: &[Record]) {
        match self.format {
            OutputFormat::Human => {
                if records.is_empty() {
                    println!("No documents found.");
                    return;
                }
                for record in records {
                    let fields = serde_json::Value::Object(record.fields.clone()).to_string();
                    println!("{} | {}", record.id, truncate(&fields, 70));
                }
                println!("\n{} document(s)", records.len());
            }
            OutputFormat::Json => self.json(records),
            OutputFormat::Quiet => {
                for record in records {
                    println!("{}", record.id);
                }
            }
        }
    }

    /// Print a bare count
    pub fn print_count(&self, label: &str, count: usize) {
        match self.format {
            OutputFormat::Human => println!("{} {}", count, label),
            OutputFormat::Json => self.json(&serde_json::json!({ "count": count })),
            OutputFormat::Quiet => println!("{}", count),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }

    #[test]
    fn test_truncate_multibyte() {
        // Must not split a character
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_output_modes() {
        assert!(Output::new(OutputFormat::Json).is_json());
        assert!(Output::new(OutputFormat::Quiet).is_quiet());
        assert!(Output::new(OutputFormat::Human).should_prompt());
        assert!(!Output::new(OutputFormat::Json).should_prompt());
    }
}
