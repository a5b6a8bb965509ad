use shared::error::WireError;
use thiserror::Error;

/// Failure reported by the command channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("engine channel unavailable")]
    Unavailable,
    #[error("engine called without a command")]
    EmptyCommand,
    #[error("{command}: {message}")]
    Backend { command: String, message: String },
    #[error("{command}: malformed engine response: {source}")]
    Malformed { command: String, source: WireError },
}

impl ChannelError {
    /// Text shown to the user for this failure.
    pub fn message(&self) -> String {
        match self {
            Self::Backend { message, .. } => message.clone(),
            Self::Malformed { source, .. } => format!("malformed engine response: {source}"),
            other => other.to_string(),
        }
    }
}

/// Failure delivered through a dispatch ticket.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("dispatch of {command} panicked")]
    Internal { command: String },
    #[error("no async runtime available to dispatch {command}")]
    NoRuntime { command: String },
    #[error("request dropped before dispatch")]
    Dropped,
    #[error("unexpected response shape: {0}")]
    Decode(String),
}
