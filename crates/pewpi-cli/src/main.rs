//! PewPi CLI
//!
//! Command-line interface for PewPi - token ledger and document store.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pewpi_core::{Config, Store, TokenType};

mod commands;
mod output;
mod prompt;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "pewpi")]
#[command(about = "PewPi - token ledger and schema-validated document store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug output to stderr (or the configured log file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, env = "PEWPI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint, list and spend tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Show or set the current user
    User {
        #[command(subcommand)]
        command: Option<UserCommands>,
    },
    /// Work with documents in a collection
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },
    /// Encrypted ledger backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show status (backend, ledger, collections)
    Status,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Mint a new token
    #[command(alias = "create")]
    Mint {
        /// Token type (bronze, silver, gold, platinum)
        #[arg(short = 't', long = "type")]
        token_type: TokenType,
        /// Value (defaults to the type's nominal value)
        #[arg(long)]
        value: Option<f64>,
        /// Owner (defaults to the current user)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List tokens
    #[command(alias = "ls")]
    List {
        /// Only this user's tokens
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show the sum of active token values
    Balance {
        /// User (defaults to the current user)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Mark an active token spent
    Spend {
        /// Token ID
        id: String,
    },
    /// Mark an active token revoked
    Revoke {
        /// Token ID
        id: String,
    },
    /// Remove every token
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Show the current user ID
    Show,
    /// Set the current user ID
    Set {
        /// User ID
        id: String,
    },
}

/// Collection name and schema file shared by document commands
#[derive(clap::Args)]
struct DocTarget {
    /// Collection name
    collection: String,
    /// TOML schema file
    #[arg(short, long)]
    schema: PathBuf,
}

#[derive(Subcommand)]
enum DocCommands {
    /// Create a document
    #[command(alias = "add")]
    Create {
        #[command(flatten)]
        target: DocTarget,
        /// Document as a JSON object
        #[arg(short, long)]
        data: String,
    },
    /// Find documents
    Find {
        #[command(flatten)]
        target: DocTarget,
        /// Equality filter as a JSON object
        #[arg(short, long = "where")]
        filter: Option<String>,
        /// Only the first match
        #[arg(long)]
        one: bool,
    },
    /// Update matching documents
    Update {
        #[command(flatten)]
        target: DocTarget,
        /// Equality filter as a JSON object
        #[arg(short, long = "where")]
        filter: Option<String>,
        /// Fields to set as a JSON object
        #[arg(long = "set")]
        patch: String,
        /// Update every match instead of the first
        #[arg(long)]
        many: bool,
    },
    /// Delete matching documents
    #[command(alias = "rm")]
    Delete {
        #[command(flatten)]
        target: DocTarget,
        /// Equality filter as a JSON object
        #[arg(short, long = "where")]
        filter: Option<String>,
        /// Delete every match instead of the first
        #[arg(long)]
        many: bool,
    },
    /// Count matching documents
    Count {
        #[command(flatten)]
        target: DocTarget,
        /// Equality filter as a JSON object
        #[arg(short, long = "where")]
        filter: Option<String>,
    },
    /// Remove every document
    Clear {
        #[command(flatten)]
        target: DocTarget,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Write an encrypted backup of the ledger
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Encryption password
        #[arg(long, env = "PEWPI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Replace the ledger with a backup file
    Import {
        /// Backup file
        file: PathBuf,
        /// Encryption password
        #[arg(long, env = "PEWPI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Commit an encrypted backup to the configured repository
    Push {
        /// Encryption password
        #[arg(long, env = "PEWPI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// GitHub access token
        #[arg(long, env = "PEWPI_GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Fetch the backup from the configured repository and import it
    Pull {
        /// Encryption password
        #[arg(long, env = "PEWPI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// GitHub access token
        #[arg(long, env = "PEWPI_GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (backend, kdf_iterations, remote.owner, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_deref();

    // Config commands work on the file directly, without opening storage
    if let Commands::Config { command } = &cli.command {
        init_logging(None, cli.verbose);
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(Some(&config), cli.verbose);
    debug!(backend = %config.backend, data_dir = ?config.data_dir, "Opening store");

    let mut store = Store::open_with_config(config)?;

    match cli.command {
        Commands::Token { command } => handle_token_command(command, &mut store, &output),
        Commands::User { command } => match command {
            Some(UserCommands::Show) | None => commands::user::show(&store, &output),
            Some(UserCommands::Set { id }) => commands::user::set(&store, id, &output),
        },
        Commands::Doc { command } => handle_doc_command(command, &store, &output),
        Commands::Backup { command } => handle_backup_command(command, &mut store, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Status => commands::status::show(&store, &output),
    }
}

fn handle_token_command(command: TokenCommands, store: &mut Store, output: &Output) -> Result<()> {
    match command {
        TokenCommands::Mint {
            token_type,
            value,
            user,
        } => commands::token::mint(store, token_type, value, user, output),
        TokenCommands::List { user } => commands::token::list(store, user, output),
        TokenCommands::Balance { user } => commands::token::balance(store, user, output),
        TokenCommands::Spend { id } => commands::token::spend(store, id, output),
        TokenCommands::Revoke { id } => commands::token::revoke(store, id, output),
        TokenCommands::Clear { yes } => commands::token::clear(store, yes, output),
    }
}

fn handle_doc_command(command: DocCommands, store: &Store, output: &Output) -> Result<()> {
    use commands::doc;

    match command {
        DocCommands::Create { target, data } => {
            doc::create(store, &target.collection, &target.schema, &data, output)
        }
        DocCommands::Find {
            target,
            filter,
            one,
        } => doc::find(
            store,
            &target.collection,
            &target.schema,
            filter.as_deref(),
            one,
            output,
        ),
        DocCommands::Update {
            target,
            filter,
            patch,
            many,
        } => doc::update(
            store,
            &target.collection,
            &target.schema,
            filter.as_deref(),
            &patch,
            many,
            output,
        ),
        DocCommands::Delete {
            target,
            filter,
            many,
        } => doc::delete(
            store,
            &target.collection,
            &target.schema,
            filter.as_deref(),
            many,
            output,
        ),
        DocCommands::Count { target, filter } => doc::count(
            store,
            &target.collection,
            &target.schema,
            filter.as_deref(),
            output,
        ),
        DocCommands::Clear { target, yes } => {
            doc::clear(store, &target.collection, &target.schema, yes, output)
        }
    }
}

fn handle_backup_command(command: BackupCommands, store: &mut Store, output: &Output) -> Result<()> {
    use commands::backup;

    match command {
        BackupCommands::Export { out, password } => backup::export(store, out, password, output),
        BackupCommands::Import {
            file,
            password,
            yes,
        } => backup::import(store, &file, password, yes, output),
        BackupCommands::Push { password, token } => backup::push(store, password, token, output),
        BackupCommands::Pull {
            password,
            token,
            yes,
        } => backup::pull(store, password, token, yes, output),
    }
}

/// Initialize logging
///
/// The filter comes from `--verbose` (debug), else PEWPI_LOG, else warn.
/// Logs go to the configured log file if there is one, otherwise stderr,
/// so JSON on stdout stays parseable.
fn init_logging(config: Option<&Config>, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        std::env::var("PEWPI_LOG").unwrap_or_else(|_| "warn".to_string())
    };
    let env_filter = EnvFilter::new(format!("pewpi_core={},pewpi_cli={}", level, level));

    if let Some(log_path) = config.and_then(|c| c.log_file.as_ref()) {
        match OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(file) => {
                // Ignore error if already initialized
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_token_mint() {
        let cli = Cli::try_parse_from([
            "pewpi", "--json", "token", "mint", "--type", "gold", "--value", "12.5",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Token {
                command:
                    TokenCommands::Mint {
                        token_type, value, ..
                    },
            } => {
                assert_eq!(token_type, TokenType::Gold);
                assert_eq!(value, Some(12.5));
            }
            _ => panic!("expected token mint"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_token_type() {
        assert!(Cli::try_parse_from(["pewpi", "token", "mint", "--type", "copper"]).is_err());
    }

    #[test]
    fn test_parse_doc_update() {
        let cli = Cli::try_parse_from([
            "pewpi",
            "doc",
            "update",
            "users",
            "--schema",
            "users.toml",
            "--where",
            r#"{"name":"Bo"}"#,
            "--set",
            r#"{"age":31}"#,
            "--many",
        ])
        .unwrap();
        match cli.command {
            Commands::Doc {
                command:
                    DocCommands::Update {
                        target,
                        filter,
                        patch,
                        many,
                    },
            } => {
                assert_eq!(target.collection, "users");
                assert_eq!(target.schema, PathBuf::from("users.toml"));
                assert_eq!(filter.as_deref(), Some(r#"{"name":"Bo"}"#));
                assert_eq!(patch, r#"{"age":31}"#);
                assert!(many);
            }
            _ => panic!("expected doc update"),
        }
    }
}
