//! Shared error types for rule feeds and the rule language.

use thiserror::Error;

/// A rule that cannot be used and is skipped.
///
/// None of these are fatal: the rule is logged and dropped, and the rest of the
/// feed keeps working.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule {rule_id}: selector `{selector}` is not a class/ID selector list")]
    InvalidSelector { rule_id: String, selector: String },

    #[error("rule {rule_id}: invalid url pattern `{pattern}`: {reason}")]
    InvalidPattern {
        rule_id: String,
        pattern: String,
        reason: String,
    },

    #[error("rule {rule_id}: sound {sound_id} cannot be resolved to a url")]
    UnresolvedSound { rule_id: String, sound_id: String },

    #[error("rule {rule_id}: malformed row: {reason}")]
    Malformed { rule_id: String, reason: String },
}

impl RuleError {
    /// Id of the offending rule.
    pub fn rule_id(&self) -> &str {
        match self {
            RuleError::InvalidSelector { rule_id, .. }
            | RuleError::InvalidPattern { rule_id, .. }
            | RuleError::UnresolvedSound { rule_id, .. }
            | RuleError::Malformed { rule_id, .. } => rule_id,
        }
    }
}

/// Failure to obtain or decode a rule feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed feed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed request failed with HTTP {status}")]
    Http { status: u16 },

    #[error("network error: {0}")]
    Network(String),
}
