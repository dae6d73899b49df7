//! Binary entrypoint for the Confbbs CLI.
//!
//! Commands:
//! - `serve` - open the store, seed configured conferences, and hold the
//!   session registry open for transports until interrupted
//! - `init` - create a starter `config.toml`
//! - `status` - print conference and audit summaries from the store
//!
//! See the library crate docs for module-level details: `confbbs::`.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;

use confbbs::bbs::types::Conference;
use confbbs::bbs::SessionRegistry;
use confbbs::config::Config;
use confbbs::storage::{AuditLog, ConferenceStore, SledStoreBuilder, Stores};

#[derive(Parser)]
#[command(name = "confbbs")]
#[command(about = "A multi-user conferencing BBS backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conferencing core until interrupted
    Serve,
    /// Initialize a new configuration file
    Init,
    /// Show store status and recent administrative actions
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    if !matches!(cli.command, Commands::Init) {
        init_logging(&pre_config, cli.verbose);
    }

    match cli.command {
        Commands::Serve => {
            let config = pre_config.ok_or_else(|| {
                anyhow!(
                    "no usable config at {}; run `confbbs init` first",
                    cli.config
                )
            })?;
            serve(config).await
        }
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Wrote starter configuration to {}", cli.config);
            Ok(())
        }
        Commands::Status => {
            let config = pre_config.ok_or_else(|| {
                anyhow!(
                    "no usable config at {}; run `confbbs init` first",
                    cli.config
                )
            })?;
            status(config)
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Confbbs v{}", env!("CARGO_PKG_VERSION"));
    let stores = SledStoreBuilder::new(&config.storage.data_dir).open_stores()?;
    seed_conferences(&config, &stores)?;

    let registry = Arc::new(SessionRegistry::new());
    info!(
        "'{}' ready; transports attach sessions via the library API",
        config.bbs.name
    );

    tokio::signal::ctrl_c().await?;
    let killed = registry.shutdown_all("server shutdown");
    info!("shutdown: signaled {} session(s)", killed);
    Ok(())
}

fn seed_conferences(config: &Config, stores: &Stores) -> Result<()> {
    for (name, seed) in &config.conferences {
        if stores.conferences.exists(seed.id)? {
            continue;
        }
        let mut conference = Conference::new(
            seed.id,
            name.clone(),
            seed.permission_mask()?,
            seed.admin.unwrap_or(config.bbs.sysop),
        );
        if let Some(target) = seed.reply_conference {
            conference = conference.with_reply_conference(target);
        }
        stores.conferences.create(conference)?;
        info!("seeded conference '{}' (id {})", name, seed.id);
    }
    Ok(())
}

fn status(config: Config) -> Result<()> {
    let stores = SledStoreBuilder::new(&config.storage.data_dir).open_stores()?;
    let mut conferences = stores.conferences.list()?;
    conferences.sort_by_key(|c| c.id);

    println!("Conferences: {}", conferences.len());
    for c in &conferences {
        println!(
            "  {:>6}  {:<24} messages 1..{} (first {})",
            c.id, c.name, c.last_local, c.first_local
        );
    }

    let audit = stores.audit.recent(10)?;
    if audit.is_empty() {
        println!("No recent administrative actions.");
    } else {
        println!("Recent administrative actions:");
        for entry in audit {
            println!(
                "  {}",
                serde_json::to_string(&entry).unwrap_or_else(|_| "<unprintable>".to_string())
            );
        }
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    if let Some(cfg) = config {
        if let Some(ref file) = cfg.logging.file {
            match std::fs::OpenOptions::new().create(true).append(true).open(file) {
                Ok(f) => {
                    let sink = std::sync::Arc::new(std::sync::Mutex::new(f));
                    // When stdout is not a TTY (piped, service manager) the
                    // file is the only destination worth writing.
                    let is_tty = atty::is(atty::Stream::Stdout);
                    builder.format(move |_fmt, record| {
                        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                        let line = format!("{} [{}] {}", ts, record.level(), record.args());
                        if let Ok(mut guard) = sink.lock() {
                            let _ = writeln!(guard, "{}", line);
                        }
                        if is_tty {
                            println!("{}", line);
                        }
                        Ok(())
                    });
                }
                Err(e) => {
                    // Logger is not up yet; stderr is all we have.
                    eprintln!("cannot open log file {}: {}", file, e);
                }
            }
        }
    }
    let _ = builder.try_init();
}
