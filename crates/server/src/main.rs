//! Binary entry point: loads configuration, initialises the database pool
//! and migrations, installs the process-wide Supervisor and Event Bus,
//! warms previously-paired sessions, and serves the HTTP surface until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use salvo::prelude::*;
use wagate_server::adapter::stub::StubAdapter;
use wagate_server::{config, event_bus, routing, signal, Supervisor};

/// Minimal CLI scaffolding: a config-file override and a one-shot migration
/// path for deploy scripts that want migrations applied without a listener
/// coming up.
#[derive(Parser, Debug)]
#[command(name = "wagate-server", about = "Multi-tenant WhatsApp Web session gateway")]
struct Args {
    /// Path to a TOML config file layered under environment variables.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run pending migrations and exit without starting the HTTP listener.
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let server_config = config::load(args.config.as_deref())?;
    init_tracing(&server_config.rust_log, &server_config.log_format);

    wagate_data::init(&server_config.db)?;
    tracing::info!("database pool ready, migrations applied");

    if args.migrate_only {
        return Ok(());
    }

    config::set(server_config);

    let adapter = Arc::new(StubAdapter::new());
    let bus = event_bus::EVENT_BUS.clone();
    Supervisor::new(adapter, bus.clone()).install();
    event_bus::spawn_heartbeat(bus);

    let warmup = wagate_server::supervisor::get().warm_sessions().await?;
    tracing::info!(
        total = warmup.total,
        attempted = warmup.attempted,
        connected = warmup.connected,
        failed = warmup.failed,
        "warm-up complete"
    );

    let service = Service::new(routing::router()).catcher(Catcher::default().hoop(wagate_server::hoops::catch_status_error));
    let acceptor = TcpListener::new(config::get().listen_addr.as_str()).bind().await;
    tracing::info!(addr = %config::get().listen_addr, "listening");

    Server::new(acceptor)
        .serve_with_graceful_shutdown(
            service,
            async {
                signal::wait_for_shutdown_signal().await;
                signal::shutdown(wagate_server::supervisor::get()).await;
            },
            None,
        )
        .await;

    Ok(())
}

fn init_tracing(rust_log: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(rust_log));
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
