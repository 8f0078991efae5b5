use crate::domain::token::TokenRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_TOKEN_LEN: usize = 4096;
const MAX_TOPIC_LEN: usize = 900;

/// Body of a registration message: a device token and the topic it should join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub token: String,
    pub topic: String,
}

impl RegistrationRequest {
    /// Decodes and validates a raw queue message body.
    ///
    /// # Errors
    /// Returns `RecordFailure::MalformedInput` if the body is not JSON, a field is missing or
    /// not a string, or a field fails validation.
    pub fn parse(body: &str) -> Result<Self, RecordFailure> {
        let request: Self = serde_json::from_str(body).map_err(|e| RecordFailure::MalformedInput(e.to_string()))?;
        request.validate().map_err(RecordFailure::MalformedInput)?;
        Ok(Self { token: request.token.trim().to_string(), topic: request.topic.trim().to_string() })
    }

    /// Validates the token and topic fields.
    ///
    /// # Errors
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err("Token cannot be empty".into());
        }
        if token.chars().count() > MAX_TOKEN_LEN {
            return Err(format!("Token is too long (max {MAX_TOKEN_LEN} characters)"));
        }

        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err("Topic cannot be empty".into());
        }
        if topic.chars().count() > MAX_TOPIC_LEN {
            return Err(format!("Topic is too long (max {MAX_TOPIC_LEN} characters)"));
        }
        if !topic.chars().all(|c| c.is_ascii_alphanumeric() || "-_.~%".contains(c)) {
            return Err("Topic contains invalid characters".into());
        }
        Ok(())
    }
}

/// A message leased from the registration queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub message_id: String,
    pub body: String,
}

impl QueueRecord {
    #[must_use]
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self { message_id: message_id.into(), body: body.into() }
    }
}

/// Why a single record could not be registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordFailure {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Token is no longer valid: {0}")]
    ProviderValidationDead(String),
    #[error("Token validation inconclusive: {0}")]
    ProviderValidationTransient(String),
    #[error("Token store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Unexpected fault: {0}")]
    UnexpectedFault(String),
}

impl RecordFailure {
    /// Short label used for logs and metric attributes.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::ProviderValidationDead(_) => "token_dead",
            Self::ProviderValidationTransient(_) => "validation_transient",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::UnexpectedFault(_) => "unexpected_fault",
        }
    }
}

/// The stages a record moves through while being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState {
    Received,
    Parsed(RegistrationRequest),
    Validated(RegistrationRequest),
    Stored { record: TokenRecord, topic: String, inserted: bool },
    Subscribed,
    SubscriptionFailed,
    Skipped,
    Failed(RecordFailure),
}

impl RecordState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Parsed(_) => "parsed",
            Self::Validated(_) => "validated",
            Self::Stored { .. } => "stored",
            Self::Subscribed => "subscribed",
            Self::SubscriptionFailed => "subscription_failed",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// Terminal result for one queue record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Subscribed,
    SubscriptionFailed,
    Skipped,
    Failed(RecordFailure),
}

impl RecordOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::SubscriptionFailed => "subscription_failed",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Batch acknowledgment: only the identifiers in `batch_item_failures` are redelivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub succeeded: Vec<String>,
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    pub fn record(&mut self, message_id: String, outcome: &RecordOutcome) {
        if outcome.is_success() {
            self.succeeded.push(message_id);
        } else {
            self.batch_item_failures.push(BatchItemFailure { item_identifier: message_id });
        }
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.batch_item_failures.is_empty()
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.batch_item_failures.iter().map(|f| f.item_identifier.as_str())
    }
}
