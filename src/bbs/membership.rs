//! Session-scoped cache of one user's memberships and read positions.
//!
//! During a session this cache is the only writer of read-position state;
//! the store sees changes only on [`MembershipTracker::flush`], which batches
//! every dirty marker in one call. Flushing per message read would multiply
//! store writes by the user's reading speed, so the tracker accumulates and
//! the navigator flushes on conference switch and logout.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, warn};

use crate::bbs::errors::{BbsError, BbsResult};
use crate::bbs::types::{ConferenceId, LocalNumber, Membership, UserId};
use crate::storage::{ConferenceStore, MembershipStore, MessageStore};

pub struct MembershipTracker {
    user: UserId,
    /// Store order: conference id ascending. This ordering is what "next
    /// conference with unread" cycles through.
    memberships: Vec<Membership>,
    dirty: HashSet<ConferenceId>,
    /// Messages read ahead of the marker, per conference. Depth-first reply
    /// traversal reads high local numbers while lower-numbered siblings are
    /// still unread; the marker only advances over contiguous runs, and the
    /// gap lives here until it closes. Session-transient: the stored model
    /// knows nothing but the marker, so read-ahead state dies with the
    /// session.
    read_ahead: HashMap<ConferenceId, BTreeSet<LocalNumber>>,
}

impl MembershipTracker {
    /// Load the user's memberships (the implicit mailbox row included).
    pub fn load(user: UserId, store: &dyn MembershipStore) -> BbsResult<Self> {
        let memberships = store.list_by_user(user)?;
        debug!(
            "loaded {} memberships for user {}",
            memberships.len(),
            user
        );
        Ok(MembershipTracker {
            user,
            memberships,
            dirty: HashSet::new(),
            read_ahead: HashMap::new(),
        })
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn memberships(&self) -> &[Membership] {
        &self.memberships
    }

    pub fn membership(&self, conference: ConferenceId) -> Option<&Membership> {
        self.memberships
            .iter()
            .find(|m| m.conference == conference)
    }

    pub fn is_member(&self, conference: ConferenceId) -> bool {
        self.membership(conference).is_some()
    }

    pub fn conference_ids(&self) -> impl Iterator<Item = ConferenceId> + '_ {
        self.memberships.iter().map(|m| m.conference)
    }

    pub fn read_position(&self, conference: ConferenceId) -> Option<LocalNumber> {
        self.membership(conference).map(|m| m.read_position)
    }

    /// A local number counts as read when it does not exceed the marker or
    /// was read ahead of it. Non-members have no read state; callers treat
    /// that as invisible.
    pub fn is_read(&self, conference: ConferenceId, local: LocalNumber) -> bool {
        match self.read_position(conference) {
            Some(marker) => {
                local <= marker
                    || self
                        .read_ahead
                        .get(&conference)
                        .is_some_and(|set| set.contains(&local))
            }
            None => false,
        }
    }

    /// Unread count for one conference: `last_local - marker`, clamped to 0.
    /// Known approximation: local numbers are not contiguous after deletions,
    /// so this can overcount rows that no longer exist; kept for
    /// compatibility with the stored marker semantics. A conference deleted
    /// concurrently counts as 0, never as an error.
    pub fn unread_count(
        &self,
        conference: ConferenceId,
        conferences: &dyn ConferenceStore,
    ) -> u64 {
        let Some(membership) = self.membership(conference) else {
            return 0;
        };
        match conferences.load(conference) {
            Ok(record) => u64::from(record.last_local.saturating_sub(membership.read_position)),
            Err(e) if e.is_not_found() => 0,
            Err(e) => {
                warn!(
                    "unread scan skipping conference {} for user {}: {}",
                    conference, self.user, e
                );
                0
            }
        }
    }

    pub fn total_unread(&self, conferences: &dyn ConferenceStore) -> u64 {
        self.memberships
            .iter()
            .map(|m| self.unread_count(m.conference, conferences))
            .sum()
    }

    /// First membership in order with anything unread.
    pub fn first_conference_with_unread(
        &self,
        conferences: &dyn ConferenceStore,
    ) -> Option<ConferenceId> {
        self.memberships
            .iter()
            .map(|m| m.conference)
            .find(|&c| self.unread_count(c, conferences) > 0)
    }

    /// Scan memberships starting just after `start`, wrapping around the
    /// whole cycle (so `start` itself is considered last), and return the
    /// first conference with unread messages.
    pub fn next_conference_with_unread(
        &self,
        start: ConferenceId,
        conferences: &dyn ConferenceStore,
    ) -> Option<ConferenceId> {
        if self.memberships.is_empty() {
            return None;
        }
        let len = self.memberships.len();
        let pivot = self
            .memberships
            .iter()
            .position(|m| m.conference > start)
            .unwrap_or(0);
        for i in 0..len {
            let candidate = self.memberships[(pivot + i) % len].conference;
            if self.unread_count(candidate, conferences) > 0 {
                return Some(candidate);
            }
        }
        None
    }

    /// Local number of the next unread message in `conference`, gap-aware:
    /// asks the store for the first live occurrence past the marker instead
    /// of assuming `marker + 1` still exists, and skips anything already
    /// read ahead of the marker.
    pub fn next_unread_local_number(
        &self,
        conference: ConferenceId,
        messages: &dyn MessageStore,
    ) -> BbsResult<Option<LocalNumber>> {
        let Some(membership) = self.membership(conference) else {
            return Ok(None);
        };
        let mut after = membership.read_position;
        loop {
            match messages.first_occurrence_after(conference, after)? {
                Some(occ) if self.is_read(conference, occ.local_number) => {
                    after = occ.local_number;
                }
                Some(occ) => return Ok(Some(occ.local_number)),
                None => return Ok(None),
            }
        }
    }

    /// Record `local` as read. The marker advances when no live unread
    /// message precedes `local`; a read past a still-unread gap is parked in
    /// the read-ahead set until the gap closes. Idempotent: re-reading
    /// changes nothing and the marker never moves backwards. Returns whether
    /// any state changed.
    pub fn mark_read(
        &mut self,
        conference: ConferenceId,
        local: LocalNumber,
        messages: &dyn MessageStore,
    ) -> BbsResult<bool> {
        let user = self.user;
        let Some(membership) = self
            .memberships
            .iter_mut()
            .find(|m| m.conference == conference)
        else {
            return Ok(false);
        };
        let ahead = self.read_ahead.entry(conference).or_default();
        if local <= membership.read_position || ahead.contains(&local) {
            return Ok(false);
        }
        // Walk the live occurrences between marker and `local`; anything
        // there that is not already read ahead is an unread gap.
        let mut cursor = membership.read_position;
        let gap_free = loop {
            match messages.first_occurrence_after(conference, cursor)? {
                Some(occ) if occ.local_number >= local => break true,
                Some(occ) if ahead.contains(&occ.local_number) => cursor = occ.local_number,
                Some(_) => break false,
                None => break true,
            }
        };
        if !gap_free {
            ahead.insert(local);
            return Ok(true);
        }
        membership.read_position = local;
        // The gap closed: pull in read-ahead reads that are now contiguous.
        loop {
            match messages.first_occurrence_after(conference, membership.read_position)? {
                Some(occ) if ahead.remove(&occ.local_number) => {
                    membership.read_position = occ.local_number;
                }
                _ => break,
            }
        }
        ahead.retain(|&n| n > membership.read_position);
        self.dirty.insert(conference);
        debug!(
            "user {} read position in conference {} -> {}",
            user, conference, membership.read_position
        );
        Ok(true)
    }

    /// Move the marker of `conference` back by `n` (floor 0), re-exposing the
    /// most recently read messages as unread. The caller must discard any
    /// reply-stack state, which may reference messages no longer counted as
    /// read.
    pub fn rollback(&mut self, conference: ConferenceId, n: LocalNumber) -> Option<LocalNumber> {
        let membership = self
            .memberships
            .iter_mut()
            .find(|m| m.conference == conference)?;
        membership.read_position = membership.read_position.saturating_sub(n);
        // Read-ahead state may reference messages no longer counted as read.
        self.read_ahead.remove(&conference);
        self.dirty.insert(conference);
        Some(membership.read_position)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Write all dirty markers to the store in one batch. Mandatory before
    /// the tracker is discarded or reloaded; read-state otherwise dies with
    /// the session.
    pub fn flush(&mut self, store: &dyn MembershipStore) -> BbsResult<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let batch: Vec<Membership> = self
            .memberships
            .iter()
            .filter(|m| self.dirty.contains(&m.conference))
            .cloned()
            .collect();
        store.save_read_positions(self.user, &batch)?;
        debug!(
            "flushed {} read positions for user {}",
            batch.len(),
            self.user
        );
        self.dirty.clear();
        Ok(())
    }

    /// Re-snapshot memberships from the store. Any dirty markers are flushed
    /// first so no read-state is lost across the reload.
    pub fn reload(&mut self, store: &dyn MembershipStore) -> BbsResult<()> {
        self.flush(store)?;
        self.memberships = store.list_by_user(self.user)?;
        self.read_ahead.clear();
        Ok(())
    }
}

impl Drop for MembershipTracker {
    fn drop(&mut self) {
        if self.is_dirty() {
            // The owning session must flush before letting go; this is a bug
            // in the caller, not a recoverable state.
            warn!(
                "membership tracker for user {} dropped with {} unflushed read positions",
                self.user,
                self.dirty.len()
            );
        }
    }
}
