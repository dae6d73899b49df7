//! Sled-backed implementation of the persistence collaborators.
//!
//! All record families live in named trees of one `sled::Db`, values are
//! bincode with explicit schema versions, and composite keys are big-endian
//! so prefix/range scans come back in id order:
//!
//! ```text
//! conferences   conf(8)                      -> Conference
//! messages      msg(8)                       -> Message
//! occurrences   conf(8) ++ local(4)          -> MessageOccurrence
//! occ_index     msg(8) ++ conf(8) ++ local(4)-> ()       (occurrence lookup by message)
//! replies       parent(8) ++ child(8)        -> ()       (direct-reply linkage)
//! memberships   user(8) ++ conf(8)           -> Membership
//! counters      "message_id"                 -> u64 BE
//! audit         nanos(16, zero padded)       -> AuditEntry (JSON, grep-friendly)
//! ```
//!
//! Local numbers are claimed with `compare_and_swap` against the occurrences
//! tree: when two posts race for the same number, the loser bumps to the next
//! candidate and tries again. The collision never reaches the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sled::IVec;

use crate::bbs::perms;
use crate::bbs::types::{
    Conference, ConferenceId, LocalNumber, Membership, Message, MessageHeader, MessageId,
    MessageOccurrence, OccurrenceKind, UserId, CONFERENCE_SCHEMA_VERSION,
    MEMBERSHIP_SCHEMA_VERSION, MESSAGE_SCHEMA_VERSION, OCCURRENCE_SCHEMA_VERSION,
};

use super::{
    AuditEntry, AuditLog, ConferenceStore, MembershipStore, MessageStore, NewMessage, StoreError,
    StoreResult,
};

const TREE_CONFERENCES: &str = "conferences";
const TREE_MESSAGES: &str = "messages";
const TREE_OCCURRENCES: &str = "occurrences";
const TREE_OCC_INDEX: &str = "occ_index";
const TREE_REPLIES: &str = "replies";
const TREE_MEMBERSHIPS: &str = "memberships";
const TREE_COUNTERS: &str = "counters";
const TREE_AUDIT: &str = "audit";

const KEY_MESSAGE_ID: &[u8] = b"message_id";

fn conference_key(id: ConferenceId) -> [u8; 8] {
    id.to_be_bytes()
}

fn message_key(id: MessageId) -> [u8; 8] {
    id.to_be_bytes()
}

fn occurrence_key(conference: ConferenceId, local: LocalNumber) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..8].copy_from_slice(&conference.to_be_bytes());
    key[8..].copy_from_slice(&local.to_be_bytes());
    key
}

fn occ_index_key(message: MessageId, conference: ConferenceId, local: LocalNumber) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..8].copy_from_slice(&message.to_be_bytes());
    key[8..16].copy_from_slice(&conference.to_be_bytes());
    key[16..].copy_from_slice(&local.to_be_bytes());
    key
}

fn reply_key(parent: MessageId, child: MessageId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&parent.to_be_bytes());
    key[8..].copy_from_slice(&child.to_be_bytes());
    key
}

fn membership_key(user: UserId, conference: ConferenceId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..].copy_from_slice(&conference.to_be_bytes());
    key
}

fn expect_schema(entity: &'static str, expected: u8, found: u8) -> StoreResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch {
            entity,
            expected,
            found,
        })
    }
}

fn next_timestamp_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000)
}

/// Helper builder so tests can easily create throwaway stores in temp dirs.
pub struct SledStoreBuilder {
    path: PathBuf,
}

impl SledStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> StoreResult<SledStore> {
        SledStore::open(self.path)
    }

    /// Open and wrap in the [`super::Stores`] bundle in one step.
    pub fn open_stores(self) -> StoreResult<super::Stores> {
        Ok(super::Stores::from_sled(Arc::new(self.open()?)))
    }
}

/// Sled-backed persistence for conferences, messages, occurrences and
/// memberships.
pub struct SledStore {
    db: sled::Db,
    conferences: sled::Tree,
    messages: sled::Tree,
    occurrences: sled::Tree,
    occ_index: sled::Tree,
    replies: sled::Tree,
    memberships: sled::Tree,
    counters: sled::Tree,
    audit: sled::Tree,
}

impl SledStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let conferences = db.open_tree(TREE_CONFERENCES)?;
        let messages = db.open_tree(TREE_MESSAGES)?;
        let occurrences = db.open_tree(TREE_OCCURRENCES)?;
        let occ_index = db.open_tree(TREE_OCC_INDEX)?;
        let replies = db.open_tree(TREE_REPLIES)?;
        let memberships = db.open_tree(TREE_MEMBERSHIPS)?;
        let counters = db.open_tree(TREE_COUNTERS)?;
        let audit = db.open_tree(TREE_AUDIT)?;
        Ok(Self {
            db,
            conferences,
            messages,
            occurrences,
            occ_index,
            replies,
            memberships,
            counters,
            audit,
        })
    }

    fn serialize<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> StoreResult<T> {
        Ok(bincode::deserialize(&bytes)?)
    }

    fn flush_writes(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn next_message_id(&self) -> StoreResult<MessageId> {
        let new = self.counters.update_and_fetch(KEY_MESSAGE_ID, |old| {
            let current = old
                .and_then(|b| <[u8; 8]>::try_from(b).ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            Some(current.saturating_add(1).to_be_bytes().to_vec())
        })?;
        let bytes = new.ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "message id counter vanished during update",
            ))
        })?;
        let arr: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
            StoreError::SchemaMismatch {
                entity: "message_id counter",
                expected: 8,
                found: bytes.len() as u8,
            }
        })?;
        Ok(u64::from_be_bytes(arr))
    }

    fn load_conference_record(&self, id: ConferenceId) -> StoreResult<Conference> {
        let bytes = self
            .conferences
            .get(conference_key(id))?
            .ok_or(StoreError::ConferenceNotFound(id))?;
        let conference: Conference = Self::deserialize(bytes)?;
        expect_schema(
            "conference",
            CONFERENCE_SCHEMA_VERSION,
            conference.schema_version,
        )?;
        Ok(conference)
    }

    fn load_occurrence_at(
        &self,
        conference: ConferenceId,
        local: LocalNumber,
    ) -> StoreResult<Option<MessageOccurrence>> {
        match self.occurrences.get(occurrence_key(conference, local))? {
            Some(bytes) => {
                let occ: MessageOccurrence = Self::deserialize(bytes)?;
                expect_schema("occurrence", OCCURRENCE_SCHEMA_VERSION, occ.schema_version)?;
                Ok(Some(occ))
            }
            None => Ok(None),
        }
    }

    /// Claim the next free local number in `conference` and write the
    /// occurrence under it. A lost race on the number moves to the next
    /// candidate and retries; the caller never sees the collision.
    fn place_occurrence(
        &self,
        conference: &Conference,
        message: MessageId,
        posted_by: UserId,
        kind: OccurrenceKind,
    ) -> StoreResult<MessageOccurrence> {
        let mut local = conference.last_local.saturating_add(1);
        let occ = loop {
            let occ = MessageOccurrence {
                schema_version: OCCURRENCE_SCHEMA_VERSION,
                message,
                conference: conference.id,
                local_number: local,
                kind,
                created: Utc::now(),
                posted_by,
            };
            let bytes = Self::serialize(&occ)?;
            match self.occurrences.compare_and_swap(
                occurrence_key(conference.id, local),
                None as Option<&[u8]>,
                Some(bytes),
            )? {
                Ok(()) => break occ,
                Err(_) => {
                    local = local.saturating_add(1);
                }
            }
        };
        self.occ_index
            .insert(occ_index_key(message, conference.id, local), &[])?;
        self.bump_last_local(conference.id, local)?;
        Ok(occ)
    }

    fn bump_last_local(&self, conference: ConferenceId, local: LocalNumber) -> StoreResult<()> {
        let key = conference_key(conference);
        loop {
            let current = self
                .conferences
                .get(key)?
                .ok_or(StoreError::ConferenceNotFound(conference))?;
            let mut record: Conference = Self::deserialize(current.clone())?;
            if record.last_local >= local {
                return Ok(());
            }
            record.last_local = local;
            let updated = Self::serialize(&record)?;
            match self
                .conferences
                .compare_and_swap(key, Some(current), Some(updated))?
            {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
    }
}

impl MessageStore for SledStore {
    fn add_message(&self, draft: NewMessage<'_>) -> StoreResult<MessageOccurrence> {
        let conference = self.load_conference_record(draft.conference)?;
        let id = self.next_message_id()?;
        let thread = draft.thread.unwrap_or(id);
        let message = Message {
            schema_version: MESSAGE_SCHEMA_VERSION,
            id,
            created: Utc::now(),
            author: draft.author,
            author_name: draft.author_name.to_string(),
            reply_to: draft.reply_to,
            thread,
            subject: draft.subject.to_string(),
            body: draft.body.to_string(),
        };
        self.messages
            .insert(message_key(id), Self::serialize(&message)?)?;
        if let Some(parent) = draft.reply_to {
            if let Err(e) = self.replies.insert(reply_key(parent, id), &[]) {
                let _ = self.messages.remove(message_key(id));
                return Err(e.into());
            }
        }
        let occ = match self.place_occurrence(&conference, id, draft.author, OccurrenceKind::Created)
        {
            Ok(occ) => occ,
            Err(e) => {
                // Undo the half-created message so no partial state remains.
                if let Some(parent) = draft.reply_to {
                    let _ = self.replies.remove(reply_key(parent, id));
                }
                let _ = self.messages.remove(message_key(id));
                return Err(e);
            }
        };
        self.flush_writes()?;
        Ok(occ)
    }

    fn add_occurrence(
        &self,
        message: MessageId,
        conference: ConferenceId,
        posted_by: UserId,
        kind: OccurrenceKind,
    ) -> StoreResult<MessageOccurrence> {
        let record = self.load_conference_record(conference)?;
        if self.messages.get(message_key(message))?.is_none() {
            return Err(StoreError::MessageNotFound(message));
        }
        let occ = self.place_occurrence(&record, message, posted_by, kind)?;
        self.flush_writes()?;
        Ok(occ)
    }

    fn load_message(&self, id: MessageId) -> StoreResult<Message> {
        let bytes = self
            .messages
            .get(message_key(id))?
            .ok_or(StoreError::MessageNotFound(id))?;
        let message: Message = Self::deserialize(bytes)?;
        expect_schema("message", MESSAGE_SCHEMA_VERSION, message.schema_version)?;
        Ok(message)
    }

    fn load_header(&self, id: MessageId) -> StoreResult<MessageHeader> {
        Ok(self.load_message(id)?.header())
    }

    fn occurrences_of(&self, id: MessageId) -> StoreResult<Vec<MessageOccurrence>> {
        let mut found = Vec::new();
        for entry in self.occ_index.scan_prefix(message_key(id)) {
            let (key, _) = entry?;
            if key.len() != 20 {
                continue;
            }
            let conference = u64::from_be_bytes(key[8..16].try_into().expect("8-byte slice"));
            let local = u32::from_be_bytes(key[16..20].try_into().expect("4-byte slice"));
            if let Some(occ) = self.load_occurrence_at(conference, local)? {
                found.push(occ);
            }
        }
        Ok(found)
    }

    fn occurrence_in_conference(
        &self,
        conference: ConferenceId,
        id: MessageId,
    ) -> StoreResult<Option<MessageOccurrence>> {
        let mut prefix = [0u8; 16];
        prefix[..8].copy_from_slice(&id.to_be_bytes());
        prefix[8..].copy_from_slice(&conference.to_be_bytes());
        for entry in self.occ_index.scan_prefix(prefix) {
            let (key, _) = entry?;
            if key.len() != 20 {
                continue;
            }
            let local = u32::from_be_bytes(key[16..20].try_into().expect("4-byte slice"));
            if let Some(occ) = self.load_occurrence_at(conference, local)? {
                if !occ.is_deleted() {
                    return Ok(Some(occ));
                }
            }
        }
        Ok(None)
    }

    fn earliest_occurrence(&self, id: MessageId) -> StoreResult<MessageOccurrence> {
        self.occurrences_of(id)?
            .into_iter()
            .filter(|o| !o.is_deleted())
            .min_by(|a, b| {
                a.created
                    .cmp(&b.created)
                    .then(a.conference.cmp(&b.conference))
                    .then(a.local_number.cmp(&b.local_number))
            })
            .ok_or(StoreError::MessageNotFound(id))
    }

    fn occurrence_at(
        &self,
        conference: ConferenceId,
        local: LocalNumber,
    ) -> StoreResult<Option<MessageOccurrence>> {
        self.load_occurrence_at(conference, local)
    }

    fn first_occurrence_after(
        &self,
        conference: ConferenceId,
        after: LocalNumber,
    ) -> StoreResult<Option<MessageOccurrence>> {
        let Some(start) = after.checked_add(1) else {
            return Ok(None);
        };
        let lo = occurrence_key(conference, start);
        let hi = occurrence_key(conference, LocalNumber::MAX);
        for entry in self.occurrences.range(lo..=hi) {
            let (_, bytes) = entry?;
            let occ: MessageOccurrence = Self::deserialize(bytes)?;
            if !occ.is_deleted() {
                return Ok(Some(occ));
            }
        }
        Ok(None)
    }

    fn replies_of(&self, id: MessageId) -> StoreResult<Vec<MessageHeader>> {
        let mut headers = Vec::new();
        for entry in self.replies.scan_prefix(message_key(id)) {
            let (key, _) = entry?;
            if key.len() != 16 {
                continue;
            }
            let child = u64::from_be_bytes(key[8..16].try_into().expect("8-byte slice"));
            match self.load_message(child) {
                Ok(message) => headers.push(message.header()),
                // A reply removed concurrently is not an error, just absent.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(headers)
    }

    fn drop_occurrence(&self, conference: ConferenceId, local: LocalNumber) -> StoreResult<bool> {
        let Some(bytes) = self.occurrences.remove(occurrence_key(conference, local))? else {
            return Ok(false);
        };
        let occ: MessageOccurrence = Self::deserialize(bytes)?;
        self.occ_index
            .remove(occ_index_key(occ.message, conference, local))?;
        if self.occurrences_of(occ.message)?.is_empty() {
            if let Some(mb) = self.messages.remove(message_key(occ.message))? {
                let message: Message = Self::deserialize(mb)?;
                if let Some(parent) = message.reply_to {
                    self.replies.remove(reply_key(parent, message.id))?;
                }
            }
        }
        self.flush_writes()?;
        Ok(true)
    }

    fn mark_occurrence_deleted(
        &self,
        conference: ConferenceId,
        local: LocalNumber,
    ) -> StoreResult<bool> {
        let Some(mut occ) = self.load_occurrence_at(conference, local)? else {
            return Ok(false);
        };
        occ.kind = OccurrenceKind::Deleted;
        self.occurrences
            .insert(occurrence_key(conference, local), Self::serialize(&occ)?)?;
        self.flush_writes()?;
        Ok(true)
    }
}

impl ConferenceStore for SledStore {
    fn load(&self, id: ConferenceId) -> StoreResult<Conference> {
        self.load_conference_record(id)
    }

    fn create(&self, conference: Conference) -> StoreResult<()> {
        let key = conference_key(conference.id);
        let bytes = Self::serialize(&conference)?;
        match self
            .conferences
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                self.flush_writes()?;
                Ok(())
            }
            Err(_) => Err(StoreError::ConferenceExists(conference.id)),
        }
    }

    fn exists(&self, id: ConferenceId) -> StoreResult<bool> {
        Ok(self.conferences.contains_key(conference_key(id))?)
    }

    fn list(&self) -> StoreResult<Vec<Conference>> {
        let mut all = Vec::new();
        for entry in self.conferences.iter() {
            let (_, bytes) = entry?;
            all.push(Self::deserialize(bytes)?);
        }
        Ok(all)
    }

    fn ensure_mailbox(&self, user: UserId) -> StoreResult<Conference> {
        loop {
            match self.load_conference_record(user) {
                Ok(conference) => return Ok(conference),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            let mailbox = Conference::new(
                user,
                format!("mailbox-{}", user),
                perms::WRITE | perms::REPLY,
                user,
            );
            match self.create(mailbox.clone()) {
                Ok(()) => return Ok(mailbox),
                // Lost a provisioning race: loop around and load the winner.
                Err(StoreError::ConferenceExists(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl MembershipStore for SledStore {
    fn list_by_user(&self, user: UserId) -> StoreResult<Vec<Membership>> {
        let mut rows: Vec<Membership> = Vec::new();
        for entry in self.memberships.scan_prefix(user.to_be_bytes()) {
            let (_, bytes) = entry?;
            let membership: Membership = Self::deserialize(bytes)?;
            expect_schema(
                "membership",
                MEMBERSHIP_SCHEMA_VERSION,
                membership.schema_version,
            )?;
            rows.push(membership);
        }
        if !rows.iter().any(|m| m.conference == user) {
            // Every user is implicitly a member of their own mailbox.
            let mailbox = Membership::mailbox(user);
            let at = rows
                .iter()
                .position(|m| m.conference > user)
                .unwrap_or(rows.len());
            rows.insert(at, mailbox);
        }
        Ok(rows)
    }

    fn lookup(&self, user: UserId, conference: ConferenceId) -> StoreResult<Option<Membership>> {
        match self.memberships.get(membership_key(user, conference))? {
            Some(bytes) => Ok(Some(Self::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn join(&self, membership: Membership) -> StoreResult<()> {
        let key = membership_key(membership.user, membership.conference);
        let row = match self.memberships.get(key)? {
            Some(bytes) => {
                let mut existing: Membership = Self::deserialize(bytes)?;
                existing.grant = membership.grant;
                existing.deny = membership.deny;
                existing
            }
            None => membership,
        };
        self.memberships.insert(key, Self::serialize(&row)?)?;
        self.flush_writes()?;
        Ok(())
    }

    fn save_read_positions(&self, user: UserId, memberships: &[Membership]) -> StoreResult<()> {
        for m in memberships {
            let key = membership_key(user, m.conference);
            let row = match self.memberships.get(key)? {
                Some(bytes) => {
                    let mut existing: Membership = Self::deserialize(bytes)?;
                    existing.read_position = m.read_position;
                    existing
                }
                None => m.clone(),
            };
            self.memberships.insert(key, Self::serialize(&row)?)?;
        }
        self.flush_writes()?;
        Ok(())
    }
}

impl AuditLog for SledStore {
    fn append(&self, entry: AuditEntry) -> StoreResult<()> {
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let mut stamp = next_timestamp_nanos();
        loop {
            let key = format!("{:020}", stamp).into_bytes();
            match self
                .audit
                .compare_and_swap(key, None as Option<&[u8]>, Some(bytes.clone()))?
            {
                Ok(()) => break,
                Err(_) => stamp += 1,
            }
        }
        self.flush_writes()?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let mut entries = Vec::new();
        for item in self.audit.iter().rev().take(limit) {
            let (_, bytes) = item?;
            match serde_json::from_slice(&bytes) {
                Ok(entry) => entries.push(entry),
                Err(_) => continue, // skip malformed lines
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SledStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = SledStoreBuilder::new(dir.path()).open().expect("store");
        (dir, store)
    }

    fn seed_conference(store: &SledStore, id: ConferenceId) {
        store
            .create(Conference::new(
                id,
                format!("conf-{}", id),
                perms::READ | perms::WRITE,
                1,
            ))
            .expect("create conference");
    }

    #[test]
    fn add_message_assigns_ids_and_local_numbers() {
        let (_dir, store) = open_store();
        seed_conference(&store, 100);

        let a = store
            .add_message(NewMessage {
                author: 1,
                author_name: "alice",
                conference: 100,
                reply_to: None,
                thread: None,
                subject: "first",
                body: "hello",
            })
            .expect("post a");
        let b = store
            .add_message(NewMessage {
                author: 1,
                author_name: "alice",
                conference: 100,
                reply_to: None,
                thread: None,
                subject: "second",
                body: "again",
            })
            .expect("post b");

        assert_eq!(a.local_number, 1);
        assert_eq!(b.local_number, 2);
        assert!(b.message > a.message);

        // A root's thread is its own id.
        let msg = store.load_message(a.message).expect("load");
        assert_eq!(msg.thread, a.message);
        assert_eq!(store.load(100).expect("conf").last_local, 2);
    }

    #[test]
    fn drop_last_occurrence_purges_message() {
        let (_dir, store) = open_store();
        seed_conference(&store, 100);
        let occ = store
            .add_message(NewMessage {
                author: 1,
                author_name: "alice",
                conference: 100,
                reply_to: None,
                thread: None,
                subject: "gone soon",
                body: "x",
            })
            .expect("post");

        assert!(store.drop_occurrence(100, occ.local_number).expect("drop"));
        assert!(matches!(
            store.load_message(occ.message),
            Err(StoreError::MessageNotFound(_))
        ));
        // Dropping again is a no-op, not an error.
        assert!(!store.drop_occurrence(100, occ.local_number).expect("redrop"));
    }

    #[test]
    fn deleted_marker_hides_from_scans_but_keeps_row() {
        let (_dir, store) = open_store();
        seed_conference(&store, 100);
        let occ = store
            .add_message(NewMessage {
                author: 1,
                author_name: "alice",
                conference: 100,
                reply_to: None,
                thread: None,
                subject: "s",
                body: "b",
            })
            .expect("post");

        assert!(store
            .mark_occurrence_deleted(100, occ.local_number)
            .expect("mark"));
        assert!(store
            .first_occurrence_after(100, 0)
            .expect("scan")
            .is_none());
        assert!(store
            .occurrence_in_conference(100, occ.message)
            .expect("lookup")
            .is_none());
        // The row survives as a marker and the message record stays.
        let kept = store
            .occurrence_at(100, occ.local_number)
            .expect("at")
            .expect("row kept");
        assert!(kept.is_deleted());
        assert!(store.load_message(occ.message).is_ok());
    }

    #[test]
    fn mailbox_membership_is_synthesized() {
        let (_dir, store) = open_store();
        let rows = store.list_by_user(9).expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].conference, 9);
        assert_eq!(rows[0].read_position, 0);
    }

    #[test]
    fn save_read_positions_round_trips() {
        let (_dir, store) = open_store();
        let mut rows = store.list_by_user(9).expect("list");
        rows[0].read_position = 17;
        store.save_read_positions(9, &rows).expect("save");

        let reloaded = store.list_by_user(9).expect("relist");
        assert_eq!(reloaded[0].read_position, 17);
    }
}
