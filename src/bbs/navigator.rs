//! Per-connection session state machine.
//!
//! A [`SessionNavigator`] is created by login and owns everything the session
//! mutates: its membership tracker, reply stack, current conference and
//! cached next-action suggestion. No other session ever touches this state;
//! cross-session effects arrive only through the event mailbox. The one
//! suspension point is [`SessionNavigator::poll_event`] - every other
//! operation is synchronous against the stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bbs::errors::{BbsError, BbsResult};
use crate::bbs::membership::MembershipTracker;
use crate::bbs::posting::{PostContext, PostingEngine};
use crate::bbs::registry::{DeliveryFilter, SessionRegistry};
use crate::bbs::replies::{ReadContext, ReplyNavigator};
use crate::bbs::types::{
    ConferenceId, Message, MessageId, MessageOccurrence, NextAction, SessionEvent, UserId,
};
use crate::storage::{ConferenceStore, MessageStore, Stores};

pub struct SessionNavigator {
    user: UserId,
    user_name: String,
    session: Uuid,
    current_conference: ConferenceId,
    last_read: Option<MessageId>,
    tracker: MembershipTracker,
    replies: ReplyNavigator,
    /// Cached result of [`SessionNavigator::suggest_next_action`],
    /// invalidated by any read, post, rollback or conference switch so
    /// repeated polling stays cheap.
    suggestion: Option<NextAction>,
    login_time: DateTime<Utc>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    filter: Arc<DeliveryFilter>,
    stores: Stores,
    engine: PostingEngine,
    registry: Arc<SessionRegistry>,
}

impl SessionNavigator {
    /// Log `user` in: register with the session registry (single login is
    /// enforced there), provision the mailbox conference, load memberships,
    /// and land in the first conference with unread messages - or the user's
    /// own mailbox when nothing is waiting.
    pub fn login(
        registry: Arc<SessionRegistry>,
        stores: Stores,
        user: UserId,
        user_name: &str,
    ) -> BbsResult<Self> {
        let handle = registry.register(user, user_name)?;
        let prepared = (|| -> BbsResult<(MembershipTracker, ConferenceId)> {
            stores.conferences.ensure_mailbox(user)?;
            let tracker = MembershipTracker::load(user, stores.memberships.as_ref())?;
            let current = tracker
                .first_conference_with_unread(stores.conferences.as_ref())
                .unwrap_or(user);
            Ok((tracker, current))
        })();
        let (tracker, current_conference) = match prepared {
            Ok(v) => v,
            Err(e) => {
                // Login failed after registration: free the slot again.
                registry.unregister(user, handle.session);
                return Err(e);
            }
        };

        handle.filter.set_conferences(tracker.conference_ids());
        let engine = PostingEngine::new(stores.clone(), registry.clone());
        info!(
            "session {} for user {} starts in conference {}",
            handle.session, user, current_conference
        );
        Ok(SessionNavigator {
            user,
            user_name: user_name.to_string(),
            session: handle.session,
            current_conference,
            last_read: None,
            tracker,
            replies: ReplyNavigator::new(),
            suggestion: None,
            login_time: Utc::now(),
            events: handle.events,
            filter: handle.filter,
            stores,
            engine,
            registry,
        })
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn current_conference(&self) -> ConferenceId {
        self.current_conference
    }

    pub fn last_read(&self) -> Option<MessageId> {
        self.last_read
    }

    pub fn login_time(&self) -> DateTime<Utc> {
        self.login_time
    }

    pub fn unread_in_current(&self) -> u64 {
        self.tracker
            .unread_count(self.current_conference, self.stores.conferences.as_ref())
    }

    fn invalidate_suggestion(&mut self) {
        self.suggestion = None;
        self.filter.set_suggestion(None);
    }

    /// Mark the message read everywhere the user can see it: every occurrence
    /// in every conference the user belongs to, not only the one just viewed.
    /// Keeps the same physical message from resurfacing as unread under a
    /// different membership.
    fn mark_read_everywhere(&mut self, message: MessageId) -> BbsResult<()> {
        for occ in self.stores.messages.occurrences_of(message)? {
            if self.tracker.is_member(occ.conference) {
                self.tracker.mark_read(
                    occ.conference,
                    occ.local_number,
                    self.stores.messages.as_ref(),
                )?;
            }
        }
        Ok(())
    }

    /// Shared tail of every read operation: fan out read marks, stack the
    /// message's replies for depth-first traversal, remember it as last read.
    fn finish_read(&mut self, message: &Message) -> BbsResult<()> {
        self.mark_read_everywhere(message.id)?;
        let reply_ids: Vec<MessageId> = self
            .stores
            .messages
            .replies_of(message.id)?
            .into_iter()
            .map(|h| h.id)
            .collect();
        self.replies.push(reply_ids);
        self.last_read = Some(message.id);
        self.invalidate_suggestion();
        Ok(())
    }

    /// Read the next unread message in the current conference.
    pub fn read_next(&mut self) -> BbsResult<Message> {
        let local = self
            .tracker
            .next_unread_local_number(self.current_conference, self.stores.messages.as_ref())?
            .ok_or(BbsError::NoMoreMessages)?;
        let occ = self
            .stores
            .messages
            .occurrence_at(self.current_conference, local)?
            .ok_or(BbsError::NoMoreMessages)?;
        let message = self.stores.messages.load_message(occ.message)?;
        self.finish_read(&message)?;
        debug!(
            "user {} read {}:{} (message {})",
            self.user, self.current_conference, local, message.id
        );
        Ok(message)
    }

    /// Read the next pending unread reply, depth-first. Its own replies are
    /// stacked in turn, so the traversal keeps descending before it widens.
    pub fn read_next_reply(&mut self) -> BbsResult<Message> {
        let ctx = ReadContext {
            tracker: &self.tracker,
            messages: self.stores.messages.as_ref(),
            current_conference: self.current_conference,
        };
        let id = self.replies.pop(&ctx)?.ok_or(BbsError::NoMoreMessages)?;
        let message = self.stores.messages.load_message(id)?;
        self.finish_read(&message)?;
        debug!("user {} read reply {}", self.user, id);
        Ok(message)
    }

    /// Move to the next conference with unread messages, flushing read state
    /// for the conference being left. Fails with "no more news" when nothing
    /// else has unread.
    pub fn goto_next_conference(&mut self) -> BbsResult<ConferenceId> {
        let next = self
            .tracker
            .next_conference_with_unread(self.current_conference, self.stores.conferences.as_ref())
            .filter(|&c| c != self.current_conference)
            .ok_or(BbsError::NoMoreNews)?;
        self.switch_to(next)?;
        Ok(next)
    }

    /// Jump to a specific conference the user is a member of.
    pub fn goto_conference(&mut self, conference: ConferenceId) -> BbsResult<ConferenceId> {
        if !self.tracker.is_member(conference) {
            return Err(BbsError::NotMember(conference));
        }
        if conference != self.current_conference {
            self.switch_to(conference)?;
        }
        Ok(conference)
    }

    fn switch_to(&mut self, conference: ConferenceId) -> BbsResult<()> {
        // Flush before the switch so read state for the conference being
        // left cannot be lost if this session never comes back.
        self.tracker.flush(self.stores.memberships.as_ref())?;
        self.replies.clear();
        self.last_read = None;
        self.current_conference = conference;
        self.invalidate_suggestion();
        info!("user {} moved to conference {}", self.user, conference);
        Ok(())
    }

    /// What should the user do next? Cached until something changes.
    pub fn suggest_next_action(&mut self) -> BbsResult<NextAction> {
        if let Some(cached) = self.suggestion {
            return Ok(cached);
        }
        let action = self.compute_suggestion()?;
        self.suggestion = Some(action);
        self.filter.set_suggestion(Some(action));
        Ok(action)
    }

    fn compute_suggestion(&mut self) -> BbsResult<NextAction> {
        let ctx = ReadContext {
            tracker: &self.tracker,
            messages: self.stores.messages.as_ref(),
            current_conference: self.current_conference,
        };
        if self.replies.peek(&ctx)?.is_some() {
            return Ok(NextAction::NextReply);
        }
        if self.tracker.total_unread(self.stores.conferences.as_ref()) == 0 {
            return Ok(NextAction::NoAction);
        }
        if self
            .tracker
            .unread_count(self.current_conference, self.stores.conferences.as_ref())
            > 0
        {
            Ok(NextAction::NextMessage)
        } else {
            Ok(NextAction::NextConference)
        }
    }

    /// Push the read marker of the current conference back by `n`, making the
    /// most recently read messages unread again. The reply stack is discarded
    /// because it may reference messages no longer counted as read.
    pub fn rollback_unread(&mut self, n: u32) -> BbsResult<u32> {
        let marker = self
            .tracker
            .rollback(self.current_conference, n)
            .ok_or(BbsError::NotMember(self.current_conference))?;
        self.replies.clear();
        self.invalidate_suggestion();
        info!(
            "user {} rolled back {} in conference {}, marker now {}",
            self.user, n, self.current_conference, marker
        );
        Ok(marker)
    }

    pub fn post(
        &mut self,
        conference: ConferenceId,
        subject: &str,
        body: &str,
    ) -> BbsResult<MessageOccurrence> {
        let occ = self
            .engine
            .post(&self.post_context(), conference, subject, body)?;
        self.invalidate_suggestion();
        Ok(occ)
    }

    pub fn reply(
        &mut self,
        reply_to: MessageId,
        subject: &str,
        body: &str,
    ) -> BbsResult<MessageOccurrence> {
        let occ = self
            .engine
            .reply(&self.post_context(), reply_to, subject, body)?;
        self.invalidate_suggestion();
        Ok(occ)
    }

    pub fn copy_message(
        &mut self,
        message: MessageId,
        target: ConferenceId,
    ) -> BbsResult<MessageOccurrence> {
        let occ = self.engine.copy(&self.post_context(), message, target)?;
        self.invalidate_suggestion();
        Ok(occ)
    }

    pub fn delete_message(&mut self, message: MessageId) -> BbsResult<MessageOccurrence> {
        let occ = self.engine.delete(&self.post_context(), message)?;
        self.invalidate_suggestion();
        Ok(occ)
    }

    fn post_context(&self) -> PostContext<'_> {
        PostContext {
            user: self.user,
            user_name: &self.user_name,
            current_conference: self.current_conference,
            tracker: &self.tracker,
        }
    }

    /// Timed receive on the session's event mailbox; the transport's polling
    /// loop calls this between commands. Returns `None` on timeout or when
    /// the mailbox producer side is gone. A `Shutdown` event means the
    /// session was killed - the caller must unwind and call
    /// [`SessionNavigator::logout`].
    pub async fn poll_event(&mut self, timeout: Duration) -> Option<SessionEvent> {
        match tokio::time::timeout(timeout, self.events.recv()).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => None,
            Err(_) => None,
        }
    }

    /// End the session: flush read positions, then release the registry slot.
    /// The flush happens first so a store fault still leaves the user able to
    /// log in again while the error propagates.
    pub fn logout(mut self) -> BbsResult<()> {
        let flushed = self.tracker.flush(self.stores.memberships.as_ref());
        self.registry.unregister(self.user, self.session);
        info!("user {} logged out", self.user);
        flushed
    }
}

impl Drop for SessionNavigator {
    fn drop(&mut self) {
        // Normal exits go through logout(); this is the safety net for a
        // session killed or dropped mid-command.
        if self.tracker.is_dirty() {
            if let Err(e) = self.tracker.flush(self.stores.memberships.as_ref()) {
                warn!(
                    "user {}: losing read positions on session drop: {}",
                    self.user, e
                );
            }
        }
        self.registry.unregister(self.user, self.session);
    }
}
