//! Config command handlers

use std::path::Path;

use anyhow::{Context, Result};

use pewpi_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => output.json(&config),
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::config_file_path);
            let not_set = || "(not set)".to_string();

            println!("Configuration:");
            println!("  data_dir:        {}", config.data_dir.display());
            println!("  backend:         {}", config.backend);
            println!("  model_prefix:    {}", config.model_prefix);
            println!("  ledger_prefix:   {}", config.ledger_prefix);
            println!("  kdf_iterations:  {}", config.kdf_iterations);
            println!(
                "  log_file:        {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(not_set)
            );
            match &config.remote {
                Some(remote) => {
                    println!("  remote.owner:    {}", remote.owner);
                    println!("  remote.repo:     {}", remote.repo);
                    println!("  remote.branch:   {}", remote.branch);
                    println!("  remote.path:     {}", remote.path);
                    println!("  remote.api_url:  {}", remote.api_url);
                }
                None => println!("  remote:          {}", not_set()),
            }
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, config_path: Option<&Path>, output: &Output) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set_value(&key, &value).with_context(|| {
        format!(
            "Cannot set '{}'\n\
             Valid keys: data_dir, backend, model_prefix, ledger_prefix, kdf_iterations, \
             log_file, remote.owner, remote.repo, remote.branch, remote.path, remote.api_url",
            key
        )
    })?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
