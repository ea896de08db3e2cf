use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hookwatch::cache::PersistentCache;
use hookwatch::client::HookClient;
use hookwatch::config::Config;
use hookwatch::render::{render_event, take_unseen};
use hookwatch::server;
use hookwatch::store::EventStore;
use hookwatch::sync::{SyncConfig, SyncEngine};
use hookwatch::types::ChannelId;

#[derive(Debug, Parser)]
#[command(name = "hookwatch", about = "Capture webhooks and watch them arrive")]
struct Cli {
    /// Config file (defaults to the per-user config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the capture server.
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Follow one channel, keeping a local copy of everything seen.
    Watch {
        channel: String,
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// Send a JSON payload to a channel.
    Send {
        channel: String,
        #[arg(default_value = "{}")]
        payload: String,
        #[arg(long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config)?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.bind_addr = bind;
            }
            run_server(&cfg).await
        }
        Command::Watch {
            channel,
            server,
            cache,
        } => {
            if let Some(server) = server {
                cfg.server_url = server.into();
            }
            if let Some(cache) = cache {
                cfg.cache_path = cache;
            }
            run_watch(&cfg, ChannelId::new(channel)?).await
        }
        Command::Send {
            channel,
            payload,
            server,
        } => {
            if let Some(server) = server {
                cfg.server_url = server.into();
            }
            let body: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let client = HookClient::new(cfg.server_url.clone(), cfg.http_timeout())?;
            let ack = client.send_json(&ChannelId::new(channel)?, &body).await?;
            println!("{}", ack.webhook_id);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_server(cfg: &Config) -> Result<()> {
    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    let store = EventStore::new();
    let shutdown = CancellationToken::new();

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(server::serve(listener, store.clone(), server_shutdown));

    signal::ctrl_c().await?;
    info!(
        "shutdown signal received; {} events held across {} channels",
        store.len().await,
        store.channel_count().await
    );
    shutdown.cancel();
    server.await.context("server task join failed")?
}

async fn run_watch(cfg: &Config, channel: ChannelId) -> Result<()> {
    let client = HookClient::new(cfg.server_url.clone(), cfg.http_timeout())?;
    let cache = Arc::new(PersistentCache::new(cfg.cache_path.clone()));
    info!(
        "watching channel {} at {}/api/webhook/{} (cache {})",
        channel,
        client.base_url(),
        channel,
        cache.path().display()
    );

    let sync_cfg = SyncConfig {
        channel,
        poll_interval: cfg.poll_interval(),
    };
    let engine = SyncEngine::new(sync_cfg, Arc::new(client), cache);
    let handle = engine.start().await;
    let mut view_rx = handle.subscribe();
    let mut shown: HashSet<String> = HashSet::new();

    loop {
        let view = view_rx.borrow_and_update().clone();
        for event in take_unseen(&view, &mut shown) {
            print!("{}", render_event(event));
        }
        tokio::select! {
            _ = signal::ctrl_c() => break,
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("stopping watcher");
    handle.stop().await
}
