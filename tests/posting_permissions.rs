//! Permission enforcement on post, reply and copy.

mod common;

use common::{join, join_with, open_stores, seed_conference};
use confbbs::bbs::perms;
use confbbs::bbs::{BbsError, SessionNavigator};

const CLOSED: u64 = 100;

#[test]
fn reply_permission_without_write_allows_comments_only() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    // Read-only by default: posting rights come from membership grants.
    seed_conference(&stores, CLOSED, "closed", perms::READ);
    join_with(&stores, 1, CLOSED, perms::WRITE, 0); // alice: full posting
    join_with(&stores, 2, CLOSED, perms::REPLY, 0); // bob: comments only
    join(&stores, 3, CLOSED); // carol: read only

    let mut alice =
        SessionNavigator::login(registry.clone(), stores.clone(), 1, "alice").expect("login a");
    let m1 = alice.post(CLOSED, "announcement", "text").expect("alice posts");
    alice.logout().expect("logout a");

    let mut bob =
        SessionNavigator::login(registry.clone(), stores.clone(), 2, "bob").expect("login b");
    bob.goto_conference(CLOSED).expect("goto");
    // REPLY without WRITE: commenting works, posting does not.
    bob.reply(m1.message, "re: announcement", "comment").expect("bob replies");
    assert!(matches!(
        bob.post(CLOSED, "own thread", "text"),
        Err(BbsError::PermissionDenied {
            conference: CLOSED,
            required: "WRITE",
        })
    ));
    bob.logout().expect("logout b");

    let mut carol =
        SessionNavigator::login(registry, stores.clone(), 3, "carol").expect("login c");
    carol.goto_conference(CLOSED).expect("goto");
    assert!(matches!(
        carol.reply(m1.message, "re: announcement", "me too"),
        Err(BbsError::PermissionDenied {
            conference: CLOSED,
            required: "REPLY",
        })
    ));
    carol.logout().expect("logout c");
}

#[test]
fn write_implies_reply() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    seed_conference(&stores, CLOSED, "closed", perms::READ | perms::WRITE);
    join(&stores, 1, CLOSED);
    join(&stores, 2, CLOSED);

    let mut alice =
        SessionNavigator::login(registry.clone(), stores.clone(), 1, "alice").expect("login a");
    let m1 = alice.post(CLOSED, "thread", "text").expect("post");
    alice.logout().expect("logout a");

    // No REPLY bit anywhere, but WRITE covers commenting.
    let mut bob =
        SessionNavigator::login(registry, stores.clone(), 2, "bob").expect("login b");
    bob.goto_conference(CLOSED).expect("goto");
    bob.reply(m1.message, "re: thread", "works").expect("reply via WRITE");
    bob.logout().expect("logout b");
}

#[test]
fn deny_mask_revokes_the_conference_default() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    seed_conference(&stores, CLOSED, "closed", perms::READ | perms::WRITE);
    join_with(&stores, 2, CLOSED, 0, perms::WRITE | perms::REPLY);

    let mut bob =
        SessionNavigator::login(registry, stores.clone(), 2, "bob").expect("login");
    assert!(matches!(
        bob.post(CLOSED, "nope", "text"),
        Err(BbsError::PermissionDenied { .. })
    ));
    bob.logout().expect("logout");
}

#[test]
fn copy_requires_write_in_target() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    seed_conference(&stores, CLOSED, "closed", perms::READ | perms::WRITE);
    seed_conference(&stores, 200, "vault", perms::READ);
    join(&stores, 1, CLOSED);
    join(&stores, 1, 200);

    let mut alice =
        SessionNavigator::login(registry, stores.clone(), 1, "alice").expect("login");
    let m1 = alice.post(CLOSED, "original", "text").expect("post");
    assert!(matches!(
        alice.copy_message(m1.message, 200),
        Err(BbsError::PermissionDenied {
            conference: 200,
            required: "WRITE",
        })
    ));
    alice.logout().expect("logout");
}
