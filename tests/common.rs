//! Test utilities & fixtures.
//! Builds throwaway sled stores in temp dirs and seeds conferences and
//! memberships for the navigation/posting suites.

use std::sync::Arc;

use confbbs::bbs::perms::PermissionMask;
use confbbs::bbs::registry::SessionRegistry;
use confbbs::bbs::types::{Conference, ConferenceId, Membership, UserId};
use confbbs::storage::{ConferenceStore, MembershipStore, SledStoreBuilder, Stores};
use tempfile::TempDir;

/// Open a fresh store in a temp dir. Keep the `TempDir` alive for the test's
/// duration or the store directory disappears under it.
#[allow(dead_code)]
pub fn open_stores() -> (TempDir, Stores) {
    let dir = TempDir::new().expect("tempdir");
    let stores = SledStoreBuilder::new(dir.path())
        .open_stores()
        .expect("open stores");
    (dir, stores)
}

#[allow(dead_code)]
pub fn fresh_registry() -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new())
}

#[allow(dead_code)]
pub fn seed_conference(
    stores: &Stores,
    id: ConferenceId,
    name: &str,
    default_permissions: PermissionMask,
) {
    stores
        .conferences
        .create(Conference::new(id, name, default_permissions, 1))
        .expect("create conference");
}

#[allow(dead_code)]
pub fn seed_conference_with_reply_target(
    stores: &Stores,
    id: ConferenceId,
    name: &str,
    default_permissions: PermissionMask,
    reply_conference: ConferenceId,
) {
    stores
        .conferences
        .create(
            Conference::new(id, name, default_permissions, 1)
                .with_reply_conference(reply_conference),
        )
        .expect("create conference");
}

#[allow(dead_code)]
pub fn join(stores: &Stores, user: UserId, conference: ConferenceId) {
    stores
        .memberships
        .join(Membership::new(user, conference))
        .expect("join conference");
}

/// Join with explicit permission overrides layered on the conference default.
#[allow(dead_code)]
pub fn join_with(
    stores: &Stores,
    user: UserId,
    conference: ConferenceId,
    grant: PermissionMask,
    deny: PermissionMask,
) {
    let mut membership = Membership::new(user, conference);
    membership.grant = grant;
    membership.deny = deny;
    stores.memberships.join(membership).expect("join conference");
}

/// Stored read position for (user, conference), 0 when no row exists.
#[allow(dead_code)]
pub fn stored_read_position(stores: &Stores, user: UserId, conference: ConferenceId) -> u32 {
    stores
        .memberships
        .lookup(user, conference)
        .expect("lookup membership")
        .map(|m| m.read_position)
        .unwrap_or(0)
}
