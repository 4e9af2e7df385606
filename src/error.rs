use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabbyError {
    #[error("tmux server unreachable")]
    TmuxUnavailable,

    #[error("session {0} no longer exists")]
    SessionGone(String),

    #[error("tmux error: {0}")]
    Tmux(String),

    #[error("tmux command timed out: {0}")]
    TmuxTimeout(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("tmux not installed. Install with: brew install tmux")]
    TmuxNotInstalled,

    #[error("no daemon running for session {0}")]
    DaemonNotRunning(String),
}

impl TabbyError {
    /// Transient tmux failures are absorbed at the component boundary and
    /// treated as "no change this tick". Everything else escalates.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Tmux(_) | Self::TmuxTimeout(_) | Self::TmuxUnavailable
        )
    }
}
