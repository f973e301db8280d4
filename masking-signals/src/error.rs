use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("signal service timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
    #[error("signal service unavailable: {0}")]
    Unavailable(String),
    #[error("signal service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response from signal service: {0}")]
    InvalidResponse(String),
}

impl SignalError {
    /// Transport failures and server-side errors may succeed on a later attempt;
    /// client errors and malformed payloads will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse(_) => false,
        }
    }
}
