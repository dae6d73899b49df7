//! Message creation: target-conference resolution, permission checks, thread
//! linkage, mailbox cross-posting, and post-commit event fan-out.
//!
//! Every public operation is a scoped unit of work against the stores: the
//! occurrences it creates are staged in a [`UnitOfWork`] guard and undone on
//! any error path before the error is returned, so a store fault never leaves
//! a partial occurrence, a dangling thread link, or a broadcast for a message
//! that does not exist. The new-message event goes out only after commit.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::bbs::errors::{BbsError, BbsResult};
use crate::bbs::membership::MembershipTracker;
use crate::bbs::perms;
use crate::bbs::registry::SessionRegistry;
use crate::bbs::perms::PermissionMask;
use crate::bbs::types::{
    Conference, ConferenceId, Membership, MessageId, MessageOccurrence, OccurrenceKind,
    SessionEvent, UserId,
};
use crate::storage::{
    AuditEntry, AuditLog, ConferenceStore, MembershipStore, MessageStore, NewMessage, Stores,
};
use crate::validation::{sanitize_body, sanitize_subject};

/// The acting session's identity, as seen by the engine. Borrowed from the
/// session navigator per call; the engine itself is session-agnostic.
pub struct PostContext<'a> {
    pub user: UserId,
    pub user_name: &'a str,
    pub current_conference: ConferenceId,
    pub tracker: &'a MembershipTracker,
}

/// Most-relevant-occurrence rule: (a) the caller's current conference when
/// the message appears there, (b) else the first conference in the caller's
/// membership order holding an occurrence, (c) else the earliest-created
/// occurrence system-wide. This is what keeps local numbers meaningful per
/// viewer even though a message is one object with many appearances.
pub fn resolve_occurrence(
    messages: &dyn MessageStore,
    tracker: &MembershipTracker,
    current_conference: ConferenceId,
    id: MessageId,
) -> BbsResult<MessageOccurrence> {
    if let Some(occ) = resolve_visible_occurrence(messages, tracker, current_conference, id)? {
        return Ok(occ);
    }
    messages.earliest_occurrence(id).map_err(|e| {
        if e.is_not_found() {
            BbsError::MessageNotFound(id)
        } else {
            e.into()
        }
    })
}

/// Tiers (a) and (b) of the resolution rule only: the occurrence the user can
/// actually see through a membership. `None` when the message appears solely
/// in conferences the user does not belong to.
pub fn resolve_visible_occurrence(
    messages: &dyn MessageStore,
    tracker: &MembershipTracker,
    current_conference: ConferenceId,
    id: MessageId,
) -> BbsResult<Option<MessageOccurrence>> {
    if tracker.is_member(current_conference) {
        if let Some(occ) = messages.occurrence_in_conference(current_conference, id)? {
            return Ok(Some(occ));
        }
    }
    let all = messages.occurrences_of(id)?;
    for membership in tracker.memberships() {
        if membership.conference == current_conference {
            continue;
        }
        if let Some(occ) = all
            .iter()
            .find(|o| o.conference == membership.conference && !o.is_deleted())
        {
            return Ok(Some(occ.clone()));
        }
    }
    Ok(None)
}

/// Staged occurrences of one engine operation. Commit forgets them; dropping
/// the guard without commit hard-removes them in reverse creation order.
struct UnitOfWork<'a> {
    messages: &'a dyn MessageStore,
    actor: UserId,
    staged: Vec<(ConferenceId, u32)>,
    committed: bool,
}

impl<'a> UnitOfWork<'a> {
    fn begin(messages: &'a dyn MessageStore, actor: UserId) -> Self {
        UnitOfWork {
            messages,
            actor,
            staged: Vec::new(),
            committed: false,
        }
    }

    fn track(&mut self, occ: &MessageOccurrence) {
        self.staged.push((occ.conference, occ.local_number));
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (conference, local) in self.staged.iter().rev() {
            if let Err(e) = self.messages.drop_occurrence(*conference, *local) {
                // Nothing left to do but leave a trail for the operator.
                error!(
                    "rollback failed for user {}: occurrence {}/{} stuck: {}",
                    self.actor, conference, local, e
                );
            }
        }
        if !self.staged.is_empty() {
            warn!(
                "rolled back {} staged occurrence(s) for user {}",
                self.staged.len(),
                self.actor
            );
        }
    }
}

pub struct PostingEngine {
    stores: Stores,
    registry: Arc<SessionRegistry>,
}

impl PostingEngine {
    pub fn new(stores: Stores, registry: Arc<SessionRegistry>) -> Self {
        PostingEngine { stores, registry }
    }

    fn effective_mask(&self, ctx: &PostContext<'_>, conference: &Conference) -> PermissionMask {
        match ctx.tracker.membership(conference.id) {
            Some(m) => perms::effective(conference.default_permissions, m.grant, m.deny),
            None => conference.default_permissions,
        }
    }

    fn require(
        &self,
        ctx: &PostContext<'_>,
        conference: &Conference,
        ok: bool,
        required: &'static str,
    ) -> BbsResult<()> {
        if ok {
            Ok(())
        } else {
            debug!(
                "user {} denied {} in conference {}",
                ctx.user, required, conference.id
            );
            Err(BbsError::PermissionDenied {
                conference: conference.id,
                required,
            })
        }
    }

    fn load_conference(&self, id: ConferenceId) -> BbsResult<Conference> {
        self.stores.conferences.load(id).map_err(|e| {
            if e.is_not_found() {
                BbsError::ConferenceNotFound(id)
            } else {
                e.into()
            }
        })
    }

    fn announce(&self, ctx: &PostContext<'_>, occ: &MessageOccurrence) {
        self.registry.broadcast_event(
            SessionEvent::NewMessage {
                conference: occ.conference,
                message: occ.message,
                author: ctx.user,
            },
            Some(ctx.user),
        );
    }

    /// Post a new root message into `conference`. Requires WRITE there.
    pub fn post(
        &self,
        ctx: &PostContext<'_>,
        conference: ConferenceId,
        subject: &str,
        body: &str,
    ) -> BbsResult<MessageOccurrence> {
        let subject = sanitize_subject(subject)?;
        let body = sanitize_body(body)?;
        let target = self.load_conference(conference)?;
        let mask = self.effective_mask(ctx, &target);
        self.require(ctx, &target, perms::can_write(mask), "WRITE")?;

        let mut work = UnitOfWork::begin(self.stores.messages.as_ref(), ctx.user);
        let occ = self
            .stores
            .messages
            .add_message(NewMessage {
                author: ctx.user,
                author_name: ctx.user_name,
                conference: target.id,
                reply_to: None,
                thread: None,
                subject: &subject,
                body: &body,
            })
            .map_err(|e| self.store_failure(ctx.user, "post", e))?;
        work.track(&occ);
        work.commit();

        info!(
            "user {} posted message {} as {}:{}",
            ctx.user, occ.message, occ.conference, occ.local_number
        );
        self.announce(ctx, &occ);
        Ok(occ)
    }

    /// Reply to an existing message. Requires REPLY (or WRITE) in the target
    /// conference, which is the reply-conference of the conference holding
    /// the most relevant occurrence of the parent, when one is declared, and
    /// the poster's current conference otherwise.
    pub fn reply(
        &self,
        ctx: &PostContext<'_>,
        reply_to: MessageId,
        subject: &str,
        body: &str,
    ) -> BbsResult<MessageOccurrence> {
        let subject = sanitize_subject(subject)?;
        let body = sanitize_body(body)?;

        let parent = self
            .stores
            .messages
            .load_header(reply_to)
            .map_err(|e| -> BbsError {
                if e.is_not_found() {
                    BbsError::MessageNotFound(reply_to)
                } else {
                    e.into()
                }
            })?;
        let parent_occ = resolve_occurrence(
            self.stores.messages.as_ref(),
            ctx.tracker,
            ctx.current_conference,
            reply_to,
        )?;
        let parent_conf = self.load_conference(parent_occ.conference)?;
        let target_id = match parent_conf.reply_conference {
            Some(rc) if rc != parent_conf.id => rc,
            _ => ctx.current_conference,
        };
        let target = self.load_conference(target_id)?;
        let mask = self.effective_mask(ctx, &target);
        self.require(ctx, &target, perms::can_reply(mask), "REPLY")?;

        let mut work = UnitOfWork::begin(self.stores.messages.as_ref(), ctx.user);
        let occ = self
            .stores
            .messages
            .add_message(NewMessage {
                author: ctx.user,
                author_name: ctx.user_name,
                conference: target.id,
                reply_to: Some(reply_to),
                // The whole discussion shares the root's id, however the
                // reply chain branches or crosses conferences.
                thread: Some(parent.thread),
                subject: &subject,
                body: &body,
            })
            .map_err(|e| self.store_failure(ctx.user, "reply", e))?;
        work.track(&occ);

        let mut mail_copy = None;
        if target.id == ctx.user && parent.author != ctx.user {
            // The reply landed in the replier's own mailbox: without a copy
            // the original author would never see it. Deliver one to their
            // mailbox, pre-marked read there.
            mail_copy = Some(self.cross_post_to_author(ctx, &mut work, occ.message, parent.author)?);
        }
        work.commit();

        info!(
            "user {} replied to {} with message {} in conference {}",
            ctx.user, reply_to, occ.message, occ.conference
        );
        self.announce(ctx, &occ);
        if let Some(copy) = mail_copy {
            self.announce(ctx, &copy);
        }
        Ok(occ)
    }

    /// Pin an existing message into `target` under a fresh local number.
    /// Requires WRITE there; thread id and authorship are untouched.
    pub fn copy(
        &self,
        ctx: &PostContext<'_>,
        message: MessageId,
        target: ConferenceId,
    ) -> BbsResult<MessageOccurrence> {
        self.stores
            .messages
            .load_header(message)
            .map_err(|e| -> BbsError {
                if e.is_not_found() {
                    BbsError::MessageNotFound(message)
                } else {
                    e.into()
                }
            })?;
        let target_conf = self.load_conference(target)?;
        let mask = self.effective_mask(ctx, &target_conf);
        self.require(ctx, &target_conf, perms::can_write(mask), "WRITE")?;

        let mut work = UnitOfWork::begin(self.stores.messages.as_ref(), ctx.user);
        let occ = self
            .stores
            .messages
            .add_occurrence(message, target, ctx.user, OccurrenceKind::Copied)
            .map_err(|e| self.store_failure(ctx.user, "copy", e))?;
        work.track(&occ);
        work.commit();

        info!(
            "user {} copied message {} into {}:{}",
            ctx.user, message, occ.conference, occ.local_number
        );
        self.announce(ctx, &occ);
        Ok(occ)
    }

    /// Mark the occurrence of `message` in the caller's current conference as
    /// deleted. Allowed for the message author and holders of ADMIN in the
    /// conference. Other occurrences of the message stay visible.
    pub fn delete(&self, ctx: &PostContext<'_>, message: MessageId) -> BbsResult<MessageOccurrence> {
        let header = self
            .stores
            .messages
            .load_header(message)
            .map_err(|e| -> BbsError {
                if e.is_not_found() {
                    BbsError::MessageNotFound(message)
                } else {
                    e.into()
                }
            })?;
        let conference = self.load_conference(ctx.current_conference)?;
        let occ = self
            .stores
            .messages
            .occurrence_in_conference(conference.id, message)?
            .ok_or(BbsError::MessageNotFound(message))?;

        let mask = self.effective_mask(ctx, &conference);
        let allowed = header.author == ctx.user || perms::can_admin(mask);
        self.require(ctx, &conference, allowed, "ADMIN")?;

        self.stores
            .messages
            .mark_occurrence_deleted(occ.conference, occ.local_number)
            .map_err(|e| self.store_failure(ctx.user, "delete", e))?;

        let mut entry = AuditEntry::new("DELETE", ctx.user);
        entry.conference = Some(occ.conference);
        entry.message = Some(message);
        if let Err(e) = self.stores.audit.append(entry) {
            warn!("audit append failed for delete by user {}: {}", ctx.user, e);
        }
        info!(
            "user {} deleted occurrence {}:{} of message {}",
            ctx.user, occ.conference, occ.local_number, message
        );
        Ok(occ)
    }

    /// Create the pre-read mail copy in the original author's mailbox and
    /// advance that user's *stored* read marker over it. The live tracker of
    /// a logged-in recipient is never touched from here; they learn of the
    /// reply through the new-message event instead.
    fn cross_post_to_author(
        &self,
        ctx: &PostContext<'_>,
        work: &mut UnitOfWork<'_>,
        message: MessageId,
        author: UserId,
    ) -> BbsResult<MessageOccurrence> {
        let mailbox = self
            .stores
            .conferences
            .ensure_mailbox(author)
            .map_err(|e| self.store_failure(ctx.user, "cross-post", e))?;
        let copy = self
            .stores
            .messages
            .add_occurrence(message, mailbox.id, ctx.user, OccurrenceKind::Copied)
            .map_err(|e| self.store_failure(ctx.user, "cross-post", e))?;
        work.track(&copy);

        let mut row = match self.stores.memberships.lookup(author, mailbox.id)? {
            Some(existing) => existing,
            None => Membership::mailbox(author),
        };
        if copy.local_number > row.read_position {
            row.read_position = copy.local_number;
        }
        self.stores
            .memberships
            .save_read_positions(author, std::slice::from_ref(&row))
            .map_err(|e| self.store_failure(ctx.user, "cross-post", e))?;
        debug!(
            "cross-posted reply {} into mailbox of user {} as local {}",
            message, author, copy.local_number
        );
        Ok(copy)
    }

    fn store_failure(
        &self,
        user: UserId,
        operation: &str,
        e: crate::storage::StoreError,
    ) -> BbsError {
        // Acting user id goes to the log for audit; the caller gets the
        // wrapped store error without internals.
        error!("store failure during {} by user {}: {}", operation, user, e);
        e.into()
    }
}
