//! Depth-first reply traversal over a stack of pending reply lists.
//!
//! Reading a message with replies pushes one frame holding those reply ids;
//! reading a reply pushes a frame for *its* replies on top, so "next reply"
//! walks the discussion depth-first without ever materializing the full
//! tree. Frames only reference strictly older frames (a call stack, not a
//! tree), so the structure is a plain `Vec`.

use crate::bbs::errors::BbsResult;
use crate::bbs::membership::MembershipTracker;
use crate::bbs::posting::resolve_visible_occurrence;
use crate::bbs::types::{ConferenceId, MessageId};
use crate::storage::MessageStore;

/// Read-side context for deciding whether a reply id is still worth
/// returning: the occurrence it resolves to must be visible to the user and
/// not yet read.
pub struct ReadContext<'a> {
    pub tracker: &'a MembershipTracker,
    pub messages: &'a dyn MessageStore,
    pub current_conference: ConferenceId,
}

struct Frame {
    ids: Vec<MessageId>,
    cursor: usize,
}

impl Frame {
    fn exhausted(&self) -> bool {
        self.cursor >= self.ids.len()
    }
}

#[derive(Default)]
pub struct ReplyNavigator {
    frames: Vec<Frame>,
}

impl ReplyNavigator {
    pub fn new() -> Self {
        ReplyNavigator { frames: Vec::new() }
    }

    /// Push a frame of pending reply ids. Empty lists are not stacked.
    pub fn push(&mut self, ids: Vec<MessageId>) {
        if !ids.is_empty() {
            self.frames.push(Frame { ids, cursor: 0 });
        }
    }

    /// Discard all pending state. Called when the user jumps away (conference
    /// switch, unread rollback): stacked ids may no longer match read state.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Next unread reply without consuming it. Exhausted frames are dropped
    /// and ids that resolve to already-read (or invisible) occurrences are
    /// consumed on the way, so a later `pop` lands on the same id this
    /// returned.
    pub fn peek(&mut self, ctx: &ReadContext<'_>) -> BbsResult<Option<MessageId>> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };
            if frame.exhausted() {
                self.frames.pop();
                continue;
            }
            let id = frame.ids[frame.cursor];
            let occurrence = resolve_visible_occurrence(
                ctx.messages,
                ctx.tracker,
                ctx.current_conference,
                id,
            )?;
            match occurrence {
                Some(occ) if !ctx.tracker.is_read(occ.conference, occ.local_number) => {
                    return Ok(Some(id));
                }
                // Already read via another navigation path, or not visible in
                // any conference the user belongs to: skip it.
                _ => {
                    frame.cursor += 1;
                }
            }
        }
    }

    /// Next unread reply, consuming it.
    pub fn pop(&mut self, ctx: &ReadContext<'_>) -> BbsResult<Option<MessageId>> {
        let found = self.peek(ctx)?;
        if found.is_some() {
            if let Some(frame) = self.frames.last_mut() {
                frame.cursor += 1;
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbs::perms;
    use crate::bbs::types::{Conference, Membership};
    use crate::storage::{
        ConferenceStore, MembershipStore, NewMessage, SledStoreBuilder, Stores,
    };
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Stores) {
        let dir = TempDir::new().expect("tempdir");
        let stores = SledStoreBuilder::new(dir.path())
            .open_stores()
            .expect("stores");
        stores
            .conferences
            .create(Conference::new(100, "general", perms::ALL, 1))
            .expect("conference");
        stores
            .memberships
            .join(Membership::new(7, 100))
            .expect("join");
        (dir, stores)
    }

    fn post(stores: &Stores, reply_to: Option<MessageId>, subject: &str) -> MessageId {
        let thread = reply_to.map(|parent| {
            stores
                .messages
                .load_header(parent)
                .expect("parent header")
                .thread
        });
        stores
            .messages
            .add_message(NewMessage {
                author: 1,
                author_name: "poster",
                conference: 100,
                reply_to,
                thread,
                subject,
                body: "text",
            })
            .expect("post")
            .message
    }

    #[test]
    fn empty_push_is_ignored() {
        let mut nav = ReplyNavigator::new();
        nav.push(Vec::new());
        assert!(nav.is_empty());
    }

    #[test]
    fn pop_consumes_and_skips_read_branches() {
        let (_dir, stores) = fixture();
        let root = post(&stores, None, "root");
        let r1 = post(&stores, Some(root), "r1");
        let r2 = post(&stores, Some(root), "r2");

        let mut tracker =
            MembershipTracker::load(7, stores.memberships.as_ref()).expect("tracker");
        // r1 was already read through some other path.
        let occ1 = stores
            .messages
            .occurrence_in_conference(100, r1)
            .expect("occ")
            .expect("present");
        tracker
            .mark_read(100, occ1.local_number, stores.messages.as_ref())
            .expect("mark");

        let mut nav = ReplyNavigator::new();
        nav.push(vec![r1, r2]);

        let ctx = ReadContext {
            tracker: &tracker,
            messages: stores.messages.as_ref(),
            current_conference: 100,
        };
        assert_eq!(nav.peek(&ctx).expect("peek"), Some(r2));
        assert_eq!(nav.pop(&ctx).expect("pop"), Some(r2));
        // Same traversal never yields an id twice.
        assert_eq!(nav.pop(&ctx).expect("pop again"), None);
        assert!(nav.is_empty());
    }
}
