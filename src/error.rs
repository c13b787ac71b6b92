//! Error types shared by the supervisor, the workers and the binary.

use std::io;
use std::path::PathBuf;

/// Failures that stop a process or reject a command.
///
/// Protocol-level client errors never surface here; they are handled at the
/// connection boundary (see [`crate::codec::ProtocolError`]).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(&'static str),

    #[error("failed to read config {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid listen target `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("create_socket[{target}]: {source}")]
    Bind { target: String, source: io::Error },

    #[error("failed to fork: {0}")]
    Fork(io::Error),

    #[error("pidfile {path}: {source}")]
    PidFile { path: PathBuf, source: io::Error },

    #[error("Master already running")]
    AlreadyRunning,

    #[error("Master not run")]
    NotRunning,

    #[error("Master stop failed")]
    StopTimeout,

    #[error("Unknown command:{0}")]
    UnknownCommand(String),

    #[error("unknown application `{0}`")]
    UnknownApp(String),

    #[error("application `{app}` does not speak {protocol}")]
    UnsupportedProtocol { app: String, protocol: String },

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("signal registration failed: {0}")]
    Signal(io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
