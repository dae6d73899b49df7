use thiserror::Error;

use crate::bbs::types::{ConferenceId, MessageId, UserId};
use crate::storage::StoreError;

/// Errors surfaced by the conferencing engine.
///
/// Navigation exhaustion ([`BbsError::NoMoreMessages`], [`BbsError::NoMoreNews`])
/// is the normal end of a seek operation, not a fault; front ends render it as
/// a prompt, not an error screen. Not-found variants are frequently swallowed
/// as "skip" during bulk scans because concurrent deletion is expected.
#[derive(Debug, Error)]
pub enum BbsError {
    /// Conference absent (possibly deleted concurrently).
    #[error("conference {0} not found")]
    ConferenceNotFound(ConferenceId),

    /// Message absent or no visible occurrence remains.
    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    /// The acting user holds no membership in the conference.
    #[error("not a member of conference {0}")]
    NotMember(ConferenceId),

    /// Missing permission bit; carries enough context for a localized render.
    #[error("permission denied in conference {conference}: {required} required")]
    PermissionDenied {
        conference: ConferenceId,
        required: &'static str,
    },

    /// The current conference holds nothing further to read.
    #[error("no more messages")]
    NoMoreMessages,

    /// No conference anywhere holds unread messages.
    #[error("no more news")]
    NoMoreNews,

    #[error("user {0} is already logged in")]
    AlreadyLoggedIn(UserId),

    #[error("user {0} is not logged in")]
    NotLoggedIn(UserId),

    /// Rejected user input (bad name, oversized or empty content).
    #[error("invalid input: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// Persistence collaborator fault. Never partially applied: the engine
    /// rolls back any in-flight post before returning this.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Unexpected internal condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BbsError {
    /// True for the "ran out of things to read" family.
    pub fn is_navigation_exhausted(&self) -> bool {
        matches!(self, BbsError::NoMoreMessages | BbsError::NoMoreNews)
    }
}

pub type BbsResult<T> = Result<T, BbsError>;
