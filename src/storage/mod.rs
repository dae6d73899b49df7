//! # Storage Module - Persistence Collaborators
//!
//! The engine consumes three store-shaped collaborators, expressed here as
//! object-safe traits so the SQL/embedded backend is swappable without
//! touching navigation or posting logic:
//!
//! - [`MessageStore`] - messages, occurrences, reply linkage
//! - [`ConferenceStore`] - conference records and mailbox provisioning
//! - [`MembershipStore`] - per-(user, conference) read positions and masks
//!
//! All store operations are synchronous request/response; the only suspension
//! point in the engine is event-mailbox polling. The shipped implementation is
//! the sled-backed [`SledStore`](sleddb::SledStore), which implements all
//! three traits plus the [`AuditLog`] used for deletion trails.
//!
//! ## Numbering
//!
//! Local sequence numbers are unique and monotonically assigned per
//! conference. Two concurrent posts computing the same next number is an
//! expected race: implementations must retry with the next candidate number
//! internally and never surface the collision to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bbs::types::{
    Conference, ConferenceId, LocalNumber, Membership, Message, MessageHeader, MessageId,
    MessageOccurrence, OccurrenceKind, UserId,
};

pub mod sleddb;

pub use sleddb::{SledStore, SledStoreBuilder};

/// Errors that can arise inside a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("conference {0} not found")]
    ConferenceNotFound(ConferenceId),

    #[error("conference {0} already exists")]
    ConferenceExists(ConferenceId),

    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    #[error("no occurrence of message {message} in conference {conference}")]
    OccurrenceNotFound {
        conference: ConferenceId,
        message: MessageId,
    },

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

impl StoreError {
    /// True for the absent-record family that bulk scans skip over.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ConferenceNotFound(_)
                | StoreError::MessageNotFound(_)
                | StoreError::OccurrenceNotFound { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Input to [`MessageStore::add_message`]. The store assigns the global id
/// and the local number; thread resolution stays the posting engine's job,
/// so `thread` arrives pre-computed for replies and `None` for roots (the
/// store then sets the root's thread to its own freshly assigned id).
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub author: UserId,
    pub author_name: &'a str,
    pub conference: ConferenceId,
    pub reply_to: Option<MessageId>,
    pub thread: Option<MessageId>,
    pub subject: &'a str,
    pub body: &'a str,
}

pub trait MessageStore: Send + Sync {
    /// Create a message plus its first occurrence (kind `Created`) in one
    /// atomic unit. No partial state may remain on error.
    fn add_message(&self, draft: NewMessage<'_>) -> StoreResult<MessageOccurrence>;

    /// Pin an existing message into another conference under a fresh local
    /// number (kind `Copied` or `Moved`).
    fn add_occurrence(
        &self,
        message: MessageId,
        conference: ConferenceId,
        posted_by: UserId,
        kind: OccurrenceKind,
    ) -> StoreResult<MessageOccurrence>;

    fn load_message(&self, id: MessageId) -> StoreResult<Message>;

    fn load_header(&self, id: MessageId) -> StoreResult<MessageHeader>;

    /// Every occurrence of the message, deletion markers included.
    fn occurrences_of(&self, id: MessageId) -> StoreResult<Vec<MessageOccurrence>>;

    /// The occurrence of `id` in `conference`, skipping deletion markers.
    fn occurrence_in_conference(
        &self,
        conference: ConferenceId,
        id: MessageId,
    ) -> StoreResult<Option<MessageOccurrence>>;

    /// The earliest-created live occurrence system-wide.
    fn earliest_occurrence(&self, id: MessageId) -> StoreResult<MessageOccurrence>;

    /// The occurrence holding `local` in `conference`, if present (deletion
    /// markers included; callers decide visibility).
    fn occurrence_at(
        &self,
        conference: ConferenceId,
        local: LocalNumber,
    ) -> StoreResult<Option<MessageOccurrence>>;

    /// First live occurrence with a local number strictly greater than
    /// `after`. Local numbers are not contiguous after deletions, so unread
    /// scans go through this rather than marker arithmetic.
    fn first_occurrence_after(
        &self,
        conference: ConferenceId,
        after: LocalNumber,
    ) -> StoreResult<Option<MessageOccurrence>>;

    /// Headers of the direct replies to `id`, in creation order. Replies
    /// whose records vanished concurrently are skipped.
    fn replies_of(&self, id: MessageId) -> StoreResult<Vec<MessageHeader>>;

    /// Hard-remove an occurrence (rollback path). When the last occurrence
    /// of a message goes, the message record goes with it. Returns whether
    /// anything was removed.
    fn drop_occurrence(&self, conference: ConferenceId, local: LocalNumber) -> StoreResult<bool>;

    /// Flip an occurrence to the `Deleted` marker kind, keeping the row.
    fn mark_occurrence_deleted(
        &self,
        conference: ConferenceId,
        local: LocalNumber,
    ) -> StoreResult<bool>;
}

pub trait ConferenceStore: Send + Sync {
    fn load(&self, id: ConferenceId) -> StoreResult<Conference>;

    fn create(&self, conference: Conference) -> StoreResult<()>;

    fn exists(&self, id: ConferenceId) -> StoreResult<bool>;

    fn list(&self) -> StoreResult<Vec<Conference>>;

    /// Load-or-create the mailbox conference for `user` (conference id ==
    /// user id). Mailboxes accept posts and replies from anyone so mail can
    /// be delivered without a membership.
    fn ensure_mailbox(&self, user: UserId) -> StoreResult<Conference>;
}

pub trait MembershipStore: Send + Sync {
    /// All memberships of `user` ordered by conference id, with the implicit
    /// own-mailbox membership synthesized when no stored row exists for it.
    fn list_by_user(&self, user: UserId) -> StoreResult<Vec<Membership>>;

    /// The stored row only; no mailbox synthesis.
    fn lookup(&self, user: UserId, conference: ConferenceId) -> StoreResult<Option<Membership>>;

    /// Insert a membership. An existing row keeps its read position but takes
    /// the new grant/deny masks.
    fn join(&self, membership: Membership) -> StoreResult<()>;

    /// Batch-write read-position markers. Rows absent from the store are
    /// created (first flush of a synthesized mailbox membership).
    fn save_read_positions(&self, user: UserId, memberships: &[Membership]) -> StoreResult<()>;
}

/// One line in the administrative audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conference: Option<ConferenceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuditEntry {
    pub fn new(action: &str, actor: UserId) -> Self {
        AuditEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor,
            conference: None,
            message: None,
            details: None,
        }
    }
}

pub trait AuditLog: Send + Sync {
    fn append(&self, entry: AuditEntry) -> StoreResult<()>;

    /// Newest-first page of audit entries.
    fn recent(&self, limit: usize) -> StoreResult<Vec<AuditEntry>>;
}

/// The bundle of collaborators a session works against. Cloning is cheap;
/// every session task holds its own copy.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub conferences: Arc<dyn ConferenceStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub audit: Arc<dyn AuditLog>,
}

impl Stores {
    /// Wire all collaborator roles to one [`SledStore`].
    pub fn from_sled(store: Arc<SledStore>) -> Self {
        Stores {
            messages: store.clone(),
            conferences: store.clone(),
            memberships: store.clone(),
            audit: store,
        }
    }
}
