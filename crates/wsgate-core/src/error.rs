use thiserror::Error;

/// Errors produced by the gate and its sessions.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("timeout")]
    Timeout,

    #[error("terminated")]
    Terminated,

    #[error("authorization denied: {0}")]
    AuthDenied(String),

    #[error("verification endpoint unavailable after {attempts} attempts: {last_error}")]
    VerifyUnavailable { attempts: u32, last_error: String },

    #[error("invalid verification request: {0}")]
    Request(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        GateError::Codec(e.to_string())
    }
}

pub type GateResult<T> = Result<T, GateError>;
