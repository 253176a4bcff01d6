use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sentrydns::server;

/// An ad-blocking DNS resolver front end: classic UDP/53, DNS-over-TLS/853,
/// and DNS-over-HTTPS/5053, all sharing one resolution pipeline.
#[derive(Parser, Debug)]
#[command(name = "sentrydns", version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log verbosity, e.g. "info", "debug", "sentrydns=trace,warn".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_path = args.config.with_file_name("sentrydns.db");
    let hostname = hostname_string();

    let runtime = match server::bootstrap(args.config, db_path.to_string_lossy().as_ref(), hostname).await {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup failure");
            std::process::exit(1);
        }
    };

    wait_for_signal().await;
    tracing::info!("shutdown signal received");
    runtime.shutdown.shutdown().await;
}

fn hostname_string() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
