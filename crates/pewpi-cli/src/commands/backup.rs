//! Backup command handlers

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use pewpi_core::{EncryptedBlob, Store};

use crate::output::{Output, OutputFormat};
use crate::prompt::{confirm, value_or_prompt};

/// Write an encrypted ledger backup to a file, or stdout
pub fn export(
    store: &Store,
    out: Option<PathBuf>,
    password: Option<String>,
    output: &Output,
) -> Result<()> {
    let password = value_or_prompt(password, "Password")?;
    let blob = store.export_backup(&password)?;
    let json = blob.to_json().context("Failed to serialize backup")?;

    match out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write backup file: {:?}", path))?;
            output.success(&format!(
                "Exported {} token(s) to {}",
                store.ledger().len(),
                path.display()
            ));
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Replace the ledger with a backup file
pub fn import(
    store: &mut Store,
    file: &Path,
    password: Option<String>,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read backup file: {:?}", file))?;
    let blob = EncryptedBlob::from_json(&content)
        .with_context(|| format!("Not a backup file: {:?}", file))?;

    confirm_replace(store, yes, output)?;
    let password = value_or_prompt(password, "Password")?;
    let count = store.import_backup(&blob, &password)?;

    output.success(&format!("Imported {} token(s)", count));
    Ok(())
}

/// Commit an encrypted backup to the configured repository
pub fn push(
    store: &Store,
    password: Option<String>,
    token: Option<String>,
    output: &Output,
) -> Result<()> {
    let password = value_or_prompt(password, "Password")?;
    use_token(store, token)?;
    let client = store.github_client()?;
    let result = store.push_backup(&client, &password)?;

    match output.format {
        OutputFormat::Json => output.json(&result),
        OutputFormat::Quiet => {
            if let Some(commit) = &result.commit {
                println!("{}", commit.sha);
            }
        }
        OutputFormat::Human => {
            let commit = result
                .commit
                .as_ref()
                .map(|c| c.sha.as_str())
                .unwrap_or("(unknown)");
            output.success(&format!("Pushed backup in commit {}", commit));
        }
    }
    Ok(())
}

/// Fetch the backup from the configured repository and import it
pub fn pull(
    store: &mut Store,
    password: Option<String>,
    token: Option<String>,
    yes: bool,
    output: &Output,
) -> Result<()> {
    confirm_replace(store, yes, output)?;
    let password = value_or_prompt(password, "Password")?;
    use_token(store, token)?;
    let client = store.github_client()?;

    match store.pull_backup(&client, &password)? {
        Some(count) => output.success(&format!("Pulled and imported {} token(s)", count)),
        None => output.message("No remote backup found."),
    }
    Ok(())
}

/// Put an access token given on the command line into the store's session
fn use_token(store: &Store, token: Option<String>) -> Result<()> {
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        store
            .session()
            .set_token(&token)
            .context("Failed to store access token")?;
    }
    Ok(())
}

fn confirm_replace(store: &Store, yes: bool, output: &Output) -> Result<()> {
    if yes || store.ledger().is_empty() {
        return Ok(());
    }
    if !output.should_prompt() {
        bail!("Refusing to replace a non-empty ledger without --yes");
    }
    println!(
        "This replaces all {} token(s) in the ledger.",
        store.ledger().len()
    );
    if !confirm("Continue?")? {
        bail!("Cancelled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pewpi_core::{Config, NewToken, StorageBackend, TokenType};
    use tempfile::TempDir;

    fn store() -> Store {
        let config = Config {
            backend: StorageBackend::Memory,
            kdf_iterations: 1000,
            ..Config::default()
        };
        Store::open_with_config(config).unwrap()
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_export_then_import_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.enc.json");

        let mut source = store();
        source
            .ledger_mut()
            .create_token(NewToken::new(TokenType::Gold).user("alice"))
            .unwrap();
        export(&source, Some(path.clone()), Some("pw".into()), &quiet()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("alice"));

        let mut target = store();
        import(&mut target, &path, Some("pw".into()), false, &quiet()).unwrap();
        assert_eq!(target.ledger().get_balance("alice"), 10.0);
    }

    #[test]
    fn test_import_over_non_empty_ledger_needs_yes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.enc.json");

        let source = store();
        export(&source, Some(path.clone()), Some("pw".into()), &quiet()).unwrap();

        let mut target = store();
        target
            .ledger_mut()
            .create_token(NewToken::new(TokenType::Bronze))
            .unwrap();

        assert!(import(&mut target, &path, Some("pw".into()), false, &quiet()).is_err());
        assert_eq!(target.ledger().len(), 1);

        import(&mut target, &path, Some("pw".into()), true, &quiet()).unwrap();
        assert!(target.ledger().is_empty());
    }

    #[test]
    fn test_import_rejects_non_backup_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("junk.json");
        std::fs::write(&path, "{}").unwrap();

        let mut target = store();
        assert!(import(&mut target, &path, Some("pw".into()), true, &quiet()).is_err());
    }

    #[test]
    fn test_push_without_remote_fails() {
        let store = store();
        let err = push(&store, Some("pw".into()), Some("ghp_x".into()), &quiet()).unwrap_err();
        assert!(err.to_string().contains("No remote configured"));
    }

    #[test]
    fn test_use_token_authenticates_client() {
        let store = store();
        use_token(&store, None).unwrap();
        use_token(&store, Some(String::new())).unwrap();
        assert!(!store.github_client().unwrap().has_token());

        use_token(&store, Some("ghp_x".into())).unwrap();
        assert!(store.github_client().unwrap().has_token());
        assert_eq!(store.session().get_token().as_deref(), Some("ghp_x"));
    }
}
