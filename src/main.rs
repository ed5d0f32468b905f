#![forbid(unsafe_code)]

//! `shell-bridge` — serves one TCP client with a local shell.
//!
//! Resolves configuration, binds the listener, relays bytes between the
//! client and the shell, and exits once the shell does.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use shell_bridge::cli::{Cli, LogFormat};
use shell_bridge::config::{resolve_port, BridgeConfig};
use shell_bridge::session::Session;
use shell_bridge::{AppError, Result};

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("shell-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_from_path(path)?,
        None => BridgeConfig::default(),
    };
    config.port = resolve_port(args.port.as_deref(), config.port).map_err(|err| {
        error!(%err, "shell bridge failed");
        err
    })?;
    info!(addr = %config.bind_addr(), shell = %config.shell, "configuration loaded");

    let mut session = Session::new(config);
    let report = session.run().await.map_err(|err| {
        error!(%err, "shell bridge failed");
        err
    })?;

    info!(
        peer = %report.peer,
        exit_code = ?report.exit_code,
        "shell bridge session complete"
    );
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
