use thiserror::Error;

/// Failure of a single messaging-platform call. Never fatal to moderation:
/// callers log it with context and fall back to a safe state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{method}: not found ({detail})")]
    NotFound { method: String, detail: String },
    #[error("{method}: rate limited")]
    RateLimited { method: String, retry_after_secs: Option<u64> },
    #[error("{method}: platform rejected call: {code}")]
    Platform { method: String, code: String },
    #[error("{method}: transport failure: {detail}")]
    Transport { method: String, detail: String },
    #[error("{method}: unexpected response: {detail}")]
    Decode { method: String, detail: String },
}

impl ApiError {
    pub fn not_found(method: &str, detail: impl Into<String>) -> Self {
        Self::NotFound { method: method.to_owned(), detail: detail.into() }
    }

    pub fn platform(method: &str, code: impl Into<String>) -> Self {
        Self::Platform { method: method.to_owned(), code: code.into() }
    }

    pub fn transport(method: &str, detail: impl Into<String>) -> Self {
        Self::Transport { method: method.to_owned(), detail: detail.into() }
    }

    pub fn decode(method: &str, detail: impl Into<String>) -> Self {
        Self::Decode { method: method.to_owned(), detail: detail.into() }
    }

    pub fn method(&self) -> &str {
        match self {
            Self::NotFound { method, .. }
            | Self::RateLimited { method, .. }
            | Self::Platform { method, .. }
            | Self::Transport { method, .. }
            | Self::Decode { method, .. } => method,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short machine-friendly class for structured logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Platform { .. } => "platform",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
        }
    }
}
