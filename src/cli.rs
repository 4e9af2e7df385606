use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tabby-daemon", version, about = "Per-window sidebar daemon for tmux")]
pub struct Cli {
    /// tmux session this daemon serves
    #[arg(long)]
    pub session: String,

    /// Control socket path (defaults to <tmpdir>/tabby-daemon-<session>.sock)
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// PID file path (defaults to <tmpdir>/tabby-daemon-<session>.pid)
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Config file path (defaults to ~/.config/tabby/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Signal the running daemon to refresh, then exit. Used by tmux hooks.
    #[arg(long)]
    pub send_refresh: bool,
}
