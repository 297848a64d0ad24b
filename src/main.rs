use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use refmap::{Config, IndexingSession, ScanRequest};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "refmap")]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
))]
#[command(about = "Incremental declaration and cross-reference indexer")]
struct Cli {
    /// Configuration file (defaults to the user config file if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index a file, a folder or the whole project
    Scan {
        /// File or folder to scan, relative to the project root
        #[arg(long, short = 'p')]
        path: Option<PathBuf>,

        /// Also resolve and attribute references
        #[arg(long, short = 'r')]
        references: bool,

        /// Re-scan files even if their cache entry is current
        #[arg(long, short = 'f')]
        force: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage named hierarchy maps
    Maps {
        #[command(subcommand)]
        action: MapAction,
    },
    /// Show recorded oracle failures
    Errors {
        /// Remove all recorded failures
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Debug, Subcommand)]
enum MapAction {
    /// List stored maps
    List,
    /// Snapshot the current hierarchy under a name
    Create { name: String },
    /// Delete a stored map
    Delete { name: String },
    /// Print a stored map as JSON
    Show { name: String },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "refmap=debug" } else { "refmap=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_target(false)
        .init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        None => Config::new().context("Failed to load configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = load_config(cli.config.as_ref())?;
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to get current dir")?,
    };
    let session = IndexingSession::new(config, &root)
        .with_context(|| format!("Failed to open project {}", root.display()))?;

    match cli.command {
        Command::Scan {
            path,
            references,
            force,
            json,
        } => {
            let request = ScanRequest {
                target: path,
                with_references: references,
                force,
            };

            let cancel_token = CancellationToken::new();
            let on_interrupt = cancel_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, finishing files in progress");
                    on_interrupt.cancel();
                }
            });

            let report = session.scan_with_cancellation(request, cancel_token).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Indexed {}, skipped {}, failed {} ({} ms)",
                    report.indexed, report.skipped, report.failed, report.duration_ms
                );
                if references {
                    println!(
                        "References: {} attributed, {} without enclosing declaration",
                        report.references_resolved, report.unattributed_references
                    );
                    for unused in &report.unused {
                        println!("  unused: {}", unused);
                    }
                }
                let errors = session.error_log().len();
                if errors > 0 {
                    println!("{} oracle failures recorded, see `refmap errors`", errors);
                }
            }
        }
        Command::Maps { action } => match action {
            MapAction::List => {
                for name in session.maps().list()? {
                    println!("{}", name);
                }
            }
            MapAction::Create { name } => {
                let path = session.create_map(&name).await?;
                println!("Created map '{}' at {}", name, path.display());
            }
            MapAction::Delete { name } => {
                session.maps().delete(&name)?;
                println!("Deleted map '{}'", name);
            }
            MapAction::Show { name } => {
                let root = session.maps().load(&name)?;
                println!("{}", serde_json::to_string_pretty(&root)?);
            }
        },
        Command::Errors { clear } => {
            if clear {
                let count = session.error_log().len();
                session.clear_errors()?;
                println!("Cleared {} recorded failures", count);
            } else {
                for record in session.error_log().records() {
                    println!(
                        "{} {}: {}",
                        record.command, record.input, record.underlying_error
                    );
                    if !record.output.trim().is_empty() {
                        println!("    {}", record.output.trim());
                    }
                }
            }
        }
    }

    Ok(())
}
