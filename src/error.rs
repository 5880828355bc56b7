use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenPlatformError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Open platform rejected the call (code {code}): {msg}")]
    Application { code: i64, msg: String },

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl OpenPlatformError {
    /// Failures that come from talking to the remote service rather than
    /// from local misuse.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Application { .. } | Self::Timeout(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid forward proxy: {0}")]
    Proxy(String),
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("compression failed: {0}")]
    Compression(String),

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    #[error("unsupported envelope version")]
    Version,

    #[error("malformed envelope: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, OpenPlatformError>;
