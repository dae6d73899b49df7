//! Unread accounting: idempotent read marks, wrap-around conference scan,
//! flush/reload round trips, and unread rollback.

mod common;

use common::{join, open_stores, seed_conference, stored_read_position};
use confbbs::bbs::membership::MembershipTracker;
use confbbs::bbs::perms;
use confbbs::bbs::SessionNavigator;
use confbbs::storage::MessageStore;
use confbbs::storage::NewMessage;

const GENERAL: u64 = 100;
const MISC: u64 = 200;

fn post_n(stores: &confbbs::storage::Stores, conference: u64, n: usize) {
    for i in 0..n {
        stores
            .messages
            .add_message(NewMessage {
                author: 99,
                author_name: "poster",
                conference,
                reply_to: None,
                thread: None,
                subject: &format!("subject {}", i),
                body: "body",
            })
            .expect("post");
    }
}

#[test]
fn mark_read_is_idempotent() {
    let (_dir, stores) = open_stores();
    seed_conference(&stores, GENERAL, "general", perms::READ | perms::WRITE);
    join(&stores, 7, GENERAL);
    post_n(&stores, GENERAL, 3);

    let mut tracker = MembershipTracker::load(7, stores.memberships.as_ref()).expect("tracker");
    assert_eq!(tracker.unread_count(GENERAL, stores.conferences.as_ref()), 3);

    assert!(tracker
        .mark_read(GENERAL, 1, stores.messages.as_ref())
        .expect("mark"));
    assert_eq!(tracker.unread_count(GENERAL, stores.conferences.as_ref()), 2);
    // Reading the same occurrence again changes nothing.
    assert!(!tracker
        .mark_read(GENERAL, 1, stores.messages.as_ref())
        .expect("remark"));
    assert_eq!(tracker.unread_count(GENERAL, stores.conferences.as_ref()), 2);

    tracker.flush(stores.memberships.as_ref()).expect("flush");
}

#[test]
fn next_conference_with_unread_is_none_iff_nothing_unread() {
    let (_dir, stores) = open_stores();
    seed_conference(&stores, GENERAL, "general", perms::READ | perms::WRITE);
    seed_conference(&stores, MISC, "misc", perms::READ | perms::WRITE);
    join(&stores, 7, GENERAL);
    join(&stores, 7, MISC);

    let mut tracker = MembershipTracker::load(7, stores.memberships.as_ref()).expect("tracker");
    assert_eq!(tracker.total_unread(stores.conferences.as_ref()), 0);
    assert!(tracker
        .next_conference_with_unread(GENERAL, stores.conferences.as_ref())
        .is_none());

    post_n(&stores, MISC, 2);
    assert_eq!(tracker.total_unread(stores.conferences.as_ref()), 2);
    assert_eq!(
        tracker.next_conference_with_unread(GENERAL, stores.conferences.as_ref()),
        Some(MISC)
    );

    tracker
        .mark_read(MISC, 1, stores.messages.as_ref())
        .expect("mark 1");
    tracker
        .mark_read(MISC, 2, stores.messages.as_ref())
        .expect("mark 2");
    assert_eq!(tracker.total_unread(stores.conferences.as_ref()), 0);
    assert!(tracker
        .next_conference_with_unread(GENERAL, stores.conferences.as_ref())
        .is_none());
    tracker.flush(stores.memberships.as_ref()).expect("flush");
}

#[test]
fn flush_then_reload_round_trips_markers() {
    let (_dir, stores) = open_stores();
    seed_conference(&stores, GENERAL, "general", perms::READ | perms::WRITE);
    seed_conference(&stores, MISC, "misc", perms::READ | perms::WRITE);
    join(&stores, 7, GENERAL);
    join(&stores, 7, MISC);
    post_n(&stores, GENERAL, 5);
    post_n(&stores, MISC, 2);

    let mut tracker = MembershipTracker::load(7, stores.memberships.as_ref()).expect("tracker");
    for local in 1..=4 {
        tracker
            .mark_read(GENERAL, local, stores.messages.as_ref())
            .expect("mark");
    }
    tracker
        .mark_read(MISC, 1, stores.messages.as_ref())
        .expect("mark");
    tracker.flush(stores.memberships.as_ref()).expect("flush");
    tracker.reload(stores.memberships.as_ref()).expect("reload");

    assert_eq!(tracker.read_position(GENERAL), Some(4));
    assert_eq!(tracker.read_position(MISC), Some(1));
    assert_eq!(stored_read_position(&stores, 7, GENERAL), 4);
    assert_eq!(stored_read_position(&stores, 7, MISC), 1);
}

#[test]
fn rollback_reexposes_messages_and_discards_reply_stack() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    seed_conference(&stores, GENERAL, "general", perms::READ | perms::WRITE);
    join(&stores, 7, GENERAL);

    // A root with one reply, plus a later root.
    let root = stores
        .messages
        .add_message(NewMessage {
            author: 99,
            author_name: "poster",
            conference: GENERAL,
            reply_to: None,
            thread: None,
            subject: "root",
            body: "body",
        })
        .expect("root");
    stores
        .messages
        .add_message(NewMessage {
            author: 99,
            author_name: "poster",
            conference: GENERAL,
            reply_to: Some(root.message),
            thread: Some(root.message),
            subject: "re: root",
            body: "body",
        })
        .expect("reply");

    let mut sam = SessionNavigator::login(registry, stores.clone(), 7, "sam").expect("login");
    assert_eq!(sam.current_conference(), GENERAL);
    let first = sam.read_next().expect("read root");
    assert_eq!(first.id, root.message);
    assert_eq!(sam.unread_in_current(), 1);

    // Roll both back: everything is unread again and the pending reply
    // traversal is gone, so reading restarts from the root.
    sam.rollback_unread(2).expect("rollback");
    assert_eq!(sam.unread_in_current(), 2);
    let again = sam.read_next().expect("read root again");
    assert_eq!(again.id, root.message);
    sam.logout().expect("logout");
}
