use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sessionguard::config::AppConfig;
use sessionguard::session::now_ms;
use sessionguard::store::{MemoryStore, SessionStore, ValkeyStore};
use sessionguard::SessionManager;

#[derive(Debug, Parser)]
#[command(name = "sessionguard", version, about = "Per-session API call throttling")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a session and replay a burst of calls against it
    Demo {
        /// Session owner
        #[arg(long, default_value = "user1")]
        owner: String,

        /// Endpoint key to call
        #[arg(long, default_value = "url1")]
        endpoint: String,

        /// Number of calls to make
        #[arg(long, default_value_t = 5)]
        calls: u32,

        /// Pause between calls in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Keep the session instead of deleting it afterwards
        #[arg(long)]
        keep: bool,
    },
    /// List owners with a tracked session
    Online {
        /// Drop owners whose sessions have expired before listing
        #[arg(long)]
        prune: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting sessionguard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(cli.config.as_deref())?;
    info!(
        store = config.store.url.as_deref().unwrap_or("memory"),
        key_prefix = %config.session.key_prefix,
        "Configuration loaded"
    );

    let store: Arc<dyn SessionStore> = match config.store.url.as_deref() {
        Some(url) => Arc::new(ValkeyStore::connect(url, config.store.pool_size).await?),
        None => Arc::new(MemoryStore::new()),
    };
    let manager = SessionManager::new(store, config.session)?;

    tokio::select! {
        result = run(&manager, cli.command) => result?,
        _ = shutdown_signal() => {}
    }

    info!("sessionguard stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(manager: &SessionManager<dyn SessionStore>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Demo {
            owner,
            endpoint,
            calls,
            delay_ms,
            keep,
        } => {
            let session_id = manager.start_session(&owner).await?;
            info!(owner = %owner, session_id = %session_id, "Session started");

            for n in 1..=calls {
                match manager.record_call(&session_id, &owner, &endpoint).await {
                    Ok(record) => {
                        let count = record.call_record(&endpoint).map(|c| c.count).unwrap_or(0);
                        info!(call = n, count = count, "Call accepted");
                    }
                    Err(e) if e.is_rejection() => {
                        let reset_in = manager.evaluator().until_reset(now_ms());
                        warn!(
                            call = n,
                            reason = %e,
                            reset_in_ms = reset_in.as_millis() as u64,
                            "Call rejected"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }

                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }

            let record = manager.get_session(&session_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);

            if !keep {
                manager.delete_session(&session_id).await?;
                info!(session_id = %session_id, "Session deleted");
            }
        }
        Command::Online { prune } => {
            if prune {
                let removed = manager.prune_online_users().await?;
                info!(removed = removed, "Pruned online users");
            }
            let mut users: Vec<(String, i64)> = manager.online_users().await?.into_iter().collect();
            users.sort_by(|a, b| b.1.cmp(&a.1));
            for (owner, last_seen) in users {
                println!("{}\t{}", owner, last_seen);
            }
        }
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
