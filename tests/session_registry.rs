//! Session registry: single login, targeted events, kill semantics.

mod common;

use std::time::{Duration, Instant};

use common::open_stores;
use confbbs::bbs::types::SessionEvent;
use confbbs::bbs::{BbsError, SessionNavigator};

const ALICE: u64 = 1;
const BOB: u64 = 2;

fn chat(from: u64, text: &str) -> SessionEvent {
    SessionEvent::Chat {
        from,
        from_name: format!("user-{}", from),
        text: text.to_string(),
    }
}

#[test]
fn duplicate_login_is_refused() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();

    let first = SessionNavigator::login(registry.clone(), stores.clone(), ALICE, "alice")
        .expect("first login");
    assert!(matches!(
        SessionNavigator::login(registry.clone(), stores.clone(), ALICE, "alice"),
        Err(BbsError::AlreadyLoggedIn(ALICE))
    ));
    first.logout().expect("logout");
    // The slot is free again.
    SessionNavigator::login(registry, stores, ALICE, "alice")
        .expect("relogin")
        .logout()
        .expect("logout");
}

#[tokio::test]
async fn send_event_requires_a_live_session() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();

    // Nobody home yet.
    assert!(matches!(
        registry.send_event(ALICE, chat(BOB, "you there?")),
        Err(BbsError::NotLoggedIn(ALICE))
    ));

    let mut alice = SessionNavigator::login(registry.clone(), stores.clone(), ALICE, "alice")
        .expect("login");
    registry
        .send_event(ALICE, chat(BOB, "you there?"))
        .expect("chat delivered");

    let event = alice
        .poll_event(Duration::from_millis(500))
        .await
        .expect("event");
    match event {
        SessionEvent::Chat { from, text, .. } => {
            assert_eq!(from, BOB);
            assert_eq!(text, "you there?");
        }
        other => panic!("expected chat, got {:?}", other),
    }
    alice.logout().expect("logout");
}

#[tokio::test]
async fn poll_times_out_quietly_when_idle() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    let mut alice =
        SessionNavigator::login(registry, stores, ALICE, "alice").expect("login");
    assert!(alice.poll_event(Duration::from_millis(50)).await.is_none());
    alice.logout().expect("logout");
}

#[tokio::test]
async fn kill_wakes_a_blocked_poll_immediately() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    let alice = SessionNavigator::login(registry.clone(), stores.clone(), ALICE, "alice")
        .expect("login");

    let waiter = tokio::spawn(async move {
        let mut alice = alice;
        let started = Instant::now();
        let event = alice.poll_event(Duration::from_secs(30)).await;
        (event, started.elapsed(), alice)
    });
    // Let the waiter block on its mailbox first.
    tokio::time::sleep(Duration::from_millis(50)).await;
    registry.kill_session(ALICE, "administrator").expect("kill");

    let (event, waited, alice) = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("woke well before the poll timeout")
        .expect("no panic");
    assert!(matches!(event, Some(SessionEvent::Shutdown { .. })));
    assert!(waited < Duration::from_secs(5));

    // The slot was already freed; a new login works while the killed
    // session is still unwinding, and its logout must not evict it.
    let replacement = SessionNavigator::login(registry.clone(), stores.clone(), ALICE, "alice")
        .expect("relogin after kill");
    alice.logout().expect("killed session unwinds");
    assert!(registry.is_logged_in(ALICE));
    replacement.logout().expect("logout");
}

#[tokio::test]
async fn broadcast_reaches_everyone_but_the_origin() {
    let (_dir, stores) = open_stores();
    let registry = common::fresh_registry();
    let mut alice = SessionNavigator::login(registry.clone(), stores.clone(), ALICE, "alice")
        .expect("login a");
    let mut bob =
        SessionNavigator::login(registry.clone(), stores.clone(), BOB, "bob").expect("login b");

    let notice = SessionEvent::Broadcast {
        from: ALICE,
        from_name: "alice".to_string(),
        text: "going down in 5".to_string(),
    };
    let delivered = registry.broadcast_event(notice, Some(ALICE));
    assert_eq!(delivered, 1);

    assert!(matches!(
        bob.poll_event(Duration::from_millis(500)).await,
        Some(SessionEvent::Broadcast { from: ALICE, .. })
    ));
    assert!(alice.poll_event(Duration::from_millis(50)).await.is_none());

    alice.logout().expect("logout a");
    bob.logout().expect("logout b");
}
