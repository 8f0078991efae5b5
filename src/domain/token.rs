use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 90;

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Unset,
    Subscribed,
    Failed,
}

impl SubscriptionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Subscribed => "subscribed",
            Self::Failed => "failed",
        }
    }

    /// Only `unset` may move, and only to a terminal status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Unset, Self::Subscribed | Self::Failed))
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Self::Unset),
            "subscribed" => Ok(Self::Subscribed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown subscription status: {other}")),
        }
    }
}

/// A registered device token as persisted in the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub created_at: i64,
    pub expire_at: i64,
    pub topics: Vec<String>,
    pub subscription_status: SubscriptionStatus,
    pub last_attempt_at: Option<i64>,
}

impl TokenRecord {
    /// Builds the record written on first registration of `token`.
    #[must_use]
    pub fn new(token: impl Into<String>, topic: impl Into<String>, now: i64, ttl_days: i64) -> Self {
        Self {
            token: token.into(),
            created_at: now,
            expire_at: expiry_from(now, ttl_days),
            topics: vec![topic.into()],
            subscription_status: SubscriptionStatus::Unset,
            last_attempt_at: None,
        }
    }

    /// Records the outcome of a subscription attempt made at `now`.
    ///
    /// Returns `false` and leaves the record untouched if the status has already been decided.
    pub fn record_attempt(&mut self, status: SubscriptionStatus, now: i64) -> bool {
        if !self.subscription_status.can_transition_to(status) {
            return false;
        }
        self.subscription_status = status;
        self.last_attempt_at = Some(now);
        true
    }
}

#[must_use]
pub const fn expiry_from(now: i64, ttl_days: i64) -> i64 {
    now.saturating_add(ttl_days.saturating_mul(SECS_PER_DAY))
}

#[must_use]
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
