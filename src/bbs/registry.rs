//! Process-wide session registry and event bus.
//!
//! One explicit [`SessionRegistry`] instance is constructed at server startup
//! and handed to every session; tests build a fresh one each. The registry
//! enforces at most one logged-in session per user and fans events out to
//! per-session mailboxes (unbounded tokio channels, so producers never
//! block).
//!
//! Registration state and event delivery are observed together under one
//! lock: "session exists" cannot change between a deliverability check and
//! the enqueue. Nothing awaits while the lock is held.
//!
//! New-message events are filtered per recipient through a [`DeliveryFilter`]
//! snapshot the owning session publishes (membership set + cached next-action
//! suggestion). The registry never reaches into another session's tracker;
//! cross-session effects travel only as queued events.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bbs::errors::{BbsError, BbsResult};
use crate::bbs::types::{ConferenceId, NextAction, SessionEvent, UserId};

/// Per-session delivery snapshot. Written only by the owning session, read by
/// the registry during broadcast.
#[derive(Default)]
pub struct DeliveryFilter {
    state: Mutex<FilterState>,
}

#[derive(Default)]
struct FilterState {
    conferences: HashSet<ConferenceId>,
    suggestion: Option<NextAction>,
}

impl DeliveryFilter {
    pub fn set_conferences(&self, conferences: impl IntoIterator<Item = ConferenceId>) {
        let mut state = self.state.lock().expect("filter lock");
        state.conferences = conferences.into_iter().collect();
    }

    pub fn set_suggestion(&self, suggestion: Option<NextAction>) {
        let mut state = self.state.lock().expect("filter lock");
        state.suggestion = suggestion;
    }

    /// A new-message notice is worth delivering only when the session is a
    /// member of the affected conference and would actually learn something:
    /// a session already told to read next message/reply gains nothing.
    fn wants_new_message(&self, conference: ConferenceId) -> bool {
        let state = self.state.lock().expect("filter lock");
        state.conferences.contains(&conference)
            && !matches!(
                state.suggestion,
                Some(NextAction::NextMessage) | Some(NextAction::NextReply)
            )
    }
}

struct SessionEntry {
    session: Uuid,
    user_name: String,
    login_time: DateTime<Utc>,
    sender: mpsc::UnboundedSender<SessionEvent>,
    filter: Arc<DeliveryFilter>,
}

/// What [`SessionRegistry::register`] hands the new session: its instance id,
/// the receive half of its mailbox, and the shared filter it must keep
/// published.
pub struct SessionHandle {
    pub session: Uuid,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub filter: Arc<DeliveryFilter>,
}

/// Row returned by [`SessionRegistry::who`].
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub user: UserId,
    pub user_name: String,
    pub login_time: DateTime<Utc>,
    pub session: Uuid,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry::default()
    }

    /// Register a session for `user`, enforcing single login. A stale entry
    /// whose mailbox receiver is gone (session died without logout) is
    /// reclaimed rather than blocking the user forever.
    pub fn register(&self, user: UserId, user_name: &str) -> BbsResult<SessionHandle> {
        let mut sessions = self.sessions.lock().expect("registry lock");
        if let Some(existing) = sessions.get(&user) {
            if !existing.sender.is_closed() {
                return Err(BbsError::AlreadyLoggedIn(user));
            }
            warn!("reclaiming dead session entry for user {}", user);
        }
        let (sender, events) = mpsc::unbounded_channel();
        let session = Uuid::new_v4();
        let filter = Arc::new(DeliveryFilter::default());
        sessions.insert(
            user,
            SessionEntry {
                session,
                user_name: user_name.to_string(),
                login_time: Utc::now(),
                sender,
                filter: filter.clone(),
            },
        );
        info!("user {} ({}) logged in, session {}", user, user_name, session);
        Ok(SessionHandle {
            session,
            events,
            filter,
        })
    }

    /// Remove the entry for `user`, but only if it still belongs to
    /// `session`: a killed session must not unregister its successor.
    pub fn unregister(&self, user: UserId, session: Uuid) -> bool {
        let mut sessions = self.sessions.lock().expect("registry lock");
        match sessions.get(&user) {
            Some(entry) if entry.session == session => {
                sessions.remove(&user);
                info!("user {} logged out, session {}", user, session);
                true
            }
            _ => false,
        }
    }

    pub fn is_logged_in(&self, user: UserId) -> bool {
        self.sessions
            .lock()
            .expect("registry lock")
            .contains_key(&user)
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().expect("registry lock").len()
    }

    /// Deliver one event to one user's mailbox.
    pub fn send_event(&self, user: UserId, event: SessionEvent) -> BbsResult<()> {
        let sessions = self.sessions.lock().expect("registry lock");
        let entry = sessions.get(&user).ok_or(BbsError::NotLoggedIn(user))?;
        entry
            .sender
            .send(event)
            .map_err(|_| BbsError::NotLoggedIn(user))
    }

    /// Enqueue `event` into every registered session's mailbox, except the
    /// originator's. New-message events are additionally gated by each
    /// recipient's delivery filter.
    pub fn broadcast_event(&self, event: SessionEvent, origin: Option<UserId>) -> usize {
        let sessions = self.sessions.lock().expect("registry lock");
        let mut delivered = 0;
        for (user, entry) in sessions.iter() {
            if Some(*user) == origin {
                continue;
            }
            if let SessionEvent::NewMessage { conference, .. } = &event {
                if !entry.filter.wants_new_message(*conference) {
                    continue;
                }
            }
            if entry.sender.send(event.clone()).is_err() {
                debug!("mailbox for user {} gone, skipping delivery", user);
            } else {
                delivered += 1;
            }
        }
        delivered
    }

    /// One-line chat to a single logged-in user.
    pub fn send_chat(
        &self,
        from: UserId,
        from_name: &str,
        to: UserId,
        text: &str,
    ) -> BbsResult<()> {
        debug!(
            "chat {} -> {}: {}",
            from,
            to,
            crate::logutil::escape_log(text)
        );
        self.send_event(
            to,
            SessionEvent::Chat {
                from,
                from_name: from_name.to_string(),
                text: text.to_string(),
            },
        )
    }

    /// System-wide notice to every session except the sender's.
    pub fn broadcast_notice(&self, from: UserId, from_name: &str, text: &str) -> usize {
        info!(
            "broadcast from {}: {}",
            from,
            crate::logutil::escape_log(text)
        );
        self.broadcast_event(
            SessionEvent::Broadcast {
                from,
                from_name: from_name.to_string(),
                text: text.to_string(),
            },
            Some(from),
        )
    }

    /// Force-unregister `user` and signal their session to terminate. The
    /// shutdown event lands in the (still live) mailbox, waking any blocked
    /// poll immediately; the session loop unwinds and flushes from there.
    pub fn kill_session(&self, user: UserId, reason: &str) -> BbsResult<()> {
        let mut sessions = self.sessions.lock().expect("registry lock");
        let entry = sessions.remove(&user).ok_or(BbsError::NotLoggedIn(user))?;
        info!("killing session {} of user {}: {}", entry.session, user, reason);
        let _ = entry.sender.send(SessionEvent::Shutdown {
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Kill every session (server shutdown). Returns how many were signaled.
    pub fn shutdown_all(&self, reason: &str) -> usize {
        let mut sessions = self.sessions.lock().expect("registry lock");
        let count = sessions.len();
        for (user, entry) in sessions.drain() {
            debug!("shutdown signal to user {} session {}", user, entry.session);
            let _ = entry.sender.send(SessionEvent::Shutdown {
                reason: reason.to_string(),
            });
        }
        count
    }

    /// Logged-in users, for WHO-style listings.
    pub fn who(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().expect("registry lock");
        let mut list: Vec<SessionInfo> = sessions
            .iter()
            .map(|(user, entry)| SessionInfo {
                user: *user,
                user_name: entry.user_name.clone(),
                login_time: entry.login_time,
                session: entry.session,
            })
            .collect();
        list.sort_by_key(|info| info.user);
        list
    }
}
