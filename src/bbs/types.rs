//! Core data model for the conferencing engine.
//!
//! A [`Message`] is immutable once created and exists independently of any
//! conference; its visibility is carried by one or more [`MessageOccurrence`]
//! records, each pinning the message into a conference under a per-conference
//! local number. Read state is tracked per (user, conference) in
//! [`Membership`] rows, never on the message itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbs::perms::PermissionMask;

/// Identifier types. A user's private mailbox is the conference whose id
/// equals the user id, so the two spaces intentionally share a scalar type.
pub type UserId = u64;
pub type ConferenceId = u64;
pub type MessageId = u64;
/// Per-conference sequence number. 0 means "nothing read yet" when used as a
/// read-position marker; assigned numbers start at 1.
pub type LocalNumber = u32;

pub const MESSAGE_SCHEMA_VERSION: u8 = 1;
pub const OCCURRENCE_SCHEMA_VERSION: u8 = 1;
pub const CONFERENCE_SCHEMA_VERSION: u8 = 1;
pub const MEMBERSHIP_SCHEMA_VERSION: u8 = 1;

/// An immutable posted message. The author display name is snapshotted at
/// post time; renames later never rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub schema_version: u8,
    pub id: MessageId,
    pub created: DateTime<Utc>,
    pub author: UserId,
    pub author_name: String,
    pub reply_to: Option<MessageId>,
    /// Root message's own id, inherited by every reply in the discussion.
    pub thread: MessageId,
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            id: self.id,
            created: self.created,
            author: self.author,
            author_name: self.author_name.clone(),
            reply_to: self.reply_to,
            thread: self.thread,
            subject: self.subject.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.reply_to.is_none()
    }
}

/// Everything about a message except its body. Cheap enough to load in bulk
/// when walking reply lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageHeader {
    pub id: MessageId,
    pub created: DateTime<Utc>,
    pub author: UserId,
    pub author_name: String,
    pub reply_to: Option<MessageId>,
    pub thread: MessageId,
    pub subject: String,
}

/// How an occurrence came to exist in its conference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceKind {
    Created,
    Copied,
    Moved,
    /// Deletion marker. The occurrence row stays so local numbering keeps its
    /// history; other occurrences of the same message may remain visible.
    Deleted,
}

/// One appearance of a message in one conference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageOccurrence {
    pub schema_version: u8,
    pub message: MessageId,
    pub conference: ConferenceId,
    pub local_number: LocalNumber,
    pub kind: OccurrenceKind,
    pub created: DateTime<Utc>,
    pub posted_by: UserId,
}

impl MessageOccurrence {
    pub fn is_deleted(&self) -> bool {
        matches!(self.kind, OccurrenceKind::Deleted)
    }
}

/// A named conference. `first_local`/`last_local` bound the local numbers
/// currently present; `last_local` only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conference {
    pub schema_version: u8,
    pub id: ConferenceId,
    pub name: String,
    pub first_local: LocalNumber,
    pub last_local: LocalNumber,
    /// Where replies to this conference's messages should land instead of
    /// here, when set to a different conference.
    pub reply_conference: Option<ConferenceId>,
    pub default_permissions: PermissionMask,
    pub admin: UserId,
    pub created: DateTime<Utc>,
}

impl Conference {
    pub fn new(
        id: ConferenceId,
        name: impl Into<String>,
        default_permissions: PermissionMask,
        admin: UserId,
    ) -> Self {
        Conference {
            schema_version: CONFERENCE_SCHEMA_VERSION,
            id,
            name: name.into(),
            first_local: 1,
            last_local: 0,
            reply_conference: None,
            default_permissions,
            admin,
            created: Utc::now(),
        }
    }

    pub fn with_reply_conference(mut self, target: ConferenceId) -> Self {
        self.reply_conference = Some(target);
        self
    }

    /// True when this conference is some user's private mailbox.
    pub fn is_mailbox_of(&self, user: UserId) -> bool {
        self.id == user
    }
}

/// Per-(user, conference) state: the read-position marker plus permission
/// overrides layered on the conference default mask.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub schema_version: u8,
    pub user: UserId,
    pub conference: ConferenceId,
    /// Highest local number known read. 0 = nothing read.
    pub read_position: LocalNumber,
    pub grant: PermissionMask,
    pub deny: PermissionMask,
    pub joined: DateTime<Utc>,
}

impl Membership {
    pub fn new(user: UserId, conference: ConferenceId) -> Self {
        Membership {
            schema_version: MEMBERSHIP_SCHEMA_VERSION,
            user,
            conference,
            read_position: 0,
            grant: 0,
            deny: 0,
            joined: Utc::now(),
        }
    }

    /// The implicit membership every user holds in their own mailbox.
    pub fn mailbox(user: UserId) -> Self {
        let mut m = Membership::new(user, user);
        m.grant = crate::bbs::perms::ALL;
        m
    }
}

/// Asynchronous notices delivered to a session's event mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Private chat line from another logged-in user.
    Chat {
        from: UserId,
        from_name: String,
        text: String,
    },
    /// System-wide notice fanned out to every session.
    Broadcast {
        from: UserId,
        from_name: String,
        text: String,
    },
    /// A message appeared in a conference the recipient is a member of.
    NewMessage {
        conference: ConferenceId,
        message: MessageId,
        author: UserId,
    },
    /// The session was force-terminated; the command loop must unwind.
    Shutdown { reason: String },
}

/// What the session should do next, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// An unread reply is pending on the reply stack.
    NextReply,
    /// Unread messages exist in the current conference.
    NextMessage,
    /// Unread messages exist, but only in other conferences.
    NextConference,
    /// Nothing unread anywhere.
    NoAction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbs::perms;

    #[test]
    fn mailbox_membership_is_self_conference() {
        let m = Membership::mailbox(42);
        assert_eq!(m.user, 42);
        assert_eq!(m.conference, 42);
        assert_eq!(m.grant, perms::ALL);
        assert_eq!(m.read_position, 0);
    }

    #[test]
    fn new_conference_starts_empty() {
        let c = Conference::new(7, "general", perms::READ | perms::WRITE, 1);
        assert_eq!(c.first_local, 1);
        assert_eq!(c.last_local, 0);
        assert!(c.reply_conference.is_none());
    }
}
