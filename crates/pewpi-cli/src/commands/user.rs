//! Current user command handlers

use anyhow::{bail, Context, Result};

use pewpi_core::Store;

use crate::output::{Output, OutputFormat};

/// Show the current user ID
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let user = store.ledger().current_user_id();

    match output.format {
        OutputFormat::Json => output.json(&serde_json::json!({ "userId": user })),
        OutputFormat::Quiet => println!("{}", user),
        OutputFormat::Human => println!("Current user: {}", user),
    }
    Ok(())
}

/// Set the current user ID
pub fn set(store: &Store, user: String, output: &Output) -> Result<()> {
    let user = user.trim();
    if user.is_empty() {
        bail!("User ID cannot be empty");
    }

    store
        .ledger()
        .set_current_user_id(user)
        .context("Failed to save current user")?;

    output.success(&format!("Current user set to {}", user));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_user() {
        let store = Store::in_memory();
        let output = Output::new(OutputFormat::Quiet);

        set(&store, " carol ".into(), &output).unwrap();
        assert_eq!(store.ledger().current_user_id(), "carol");
        assert!(set(&store, "  ".into(), &output).is_err());
    }
}
