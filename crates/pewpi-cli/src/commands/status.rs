//! Status command handler

use anyhow::Result;

use pewpi_core::Store;

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let stats = store.stats()?;
    let config = store.config();

    match output.format {
        OutputFormat::Json => {
            output.json(&serde_json::json!({
                "data_dir": config.data_dir,
                "remote": store.remote_target().map(|t| format!("{}/{}:{}", t.owner, t.repo, t.path)),
                "stats": stats,
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", stats.current_user);
        }
        OutputFormat::Human => {
            println!("PewPi Status");
            println!("============");
            println!();
            println!("Storage:");
            println!("  Backend:  {}", stats.backend);
            println!("  Location: {}", config.data_dir.display());
            println!();
            println!("Ledger ({}):", stats.ledger_key);
            println!("  Tokens:       {}", stats.token_count);
            println!("  Active:       {}", stats.active_tokens);
            println!("  Current user: {}", stats.current_user);
            println!("  Balance:      {}", stats.current_balance);
            println!();
            println!("Collections:");
            if stats.collections.is_empty() {
                println!("  (none)");
            }
            for name in &stats.collections {
                println!("  {}", name);
            }
            println!();
            match store.remote_target() {
                Some(target) => println!(
                    "Remote backup: {}/{} {} ({})",
                    target.owner, target.repo, target.path, target.branch
                ),
                None => println!("Remote backup: not configured"),
            }
        }
    }

    Ok(())
}
