mod cli;
mod config;
mod coordinator;
mod daemon;
mod domain;
mod error;
mod infra;
mod server;

use clap::Parser;
use cli::Cli;
use error::TabbyError;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let pid_path = cli
        .pid_file
        .clone()
        .unwrap_or_else(|| infra::pidfile::pid_file_path(&cli.session));

    // Hook mode: poke the running daemon and get out of its way.
    if cli.send_refresh {
        infra::tmux::signal_refresh(&pid_path, &cli.session)?;
        return Ok(());
    }

    preflight_checks()?;

    let _guard = init_tracing(&cli.session);
    let cfg = config::load_config(cli.config.as_deref())?;
    let socket_path = cli
        .socket
        .clone()
        .unwrap_or_else(|| infra::pidfile::socket_path(&cli.session));

    info!(session = %cli.session, socket = %socket_path.display(), "daemon starting");
    daemon::run(cli.session, cfg, socket_path, pid_path).await?;
    info!("daemon stopped");
    Ok(())
}

fn preflight_checks() -> Result<(), TabbyError> {
    if !infra::tmux::TmuxClient::is_available() {
        return Err(TabbyError::TmuxNotInstalled);
    }
    Ok(())
}

/// Initialize tracing with a file appender. Returns a guard that must be
/// held for the lifetime of the program (dropping it flushes the writer).
fn init_tracing(session: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, EnvFilter};

    let log_dir = config::global_config_dir();
    if std::fs::create_dir_all(&log_dir).is_err() {
        return None;
    }

    let file_appender =
        tracing_appender::rolling::never(&log_dir, format!("daemon-{session}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Some(guard)
}
