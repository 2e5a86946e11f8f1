//! Interactive prompts

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{bail, Result};

/// Ask a yes/no question; false when stdin is not a terminal
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(is_yes(&input))
}

fn is_yes(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    input == "y" || input == "yes"
}

/// Use `given`, or read one line from stdin
///
/// Reads from a pipe as well as a terminal, so passwords can be piped in.
pub fn value_or_prompt(given: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = given.filter(|v| !v.is_empty()) {
        return Ok(value);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("{}: ", label);
        io::stderr().flush()?;
    }

    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("{} is required", label);
    }
    Ok(value)
}
