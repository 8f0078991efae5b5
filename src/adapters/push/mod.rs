pub mod fcm;

pub use fcm::FcmProvider;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Token is no longer registered")]
    Unregistered,
    #[error("Token is malformed")]
    InvalidToken,
    #[error("Rate limit exceeded")]
    QuotaExceeded,
    #[error("Provider rejected request ({}): {message}", code.as_deref().unwrap_or("no code"))]
    Rejected { code: Option<String>, message: String },
    #[error("External service error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    /// Whether the provider has told us the token itself is unusable.
    #[must_use]
    pub const fn is_token_dead(&self) -> bool {
        matches!(self, Self::Unregistered | Self::InvalidToken)
    }
}

#[async_trait]
pub trait MessagingProvider: Send + Sync + std::fmt::Debug {
    /// Sends a silent probe to `token` to confirm the provider still knows it.
    ///
    /// # Errors
    /// Returns `ProviderError::Unregistered` or `ProviderError::InvalidToken` if the token is dead.
    async fn send_probe(&self, token: &str) -> Result<(), ProviderError>;

    /// Subscribes `tokens` to `topic`. Fails if any token could not be subscribed.
    ///
    /// # Errors
    /// Returns a `ProviderError` describing the first rejection.
    async fn subscribe(&self, tokens: &[String], topic: &str) -> Result<(), ProviderError>;
}
