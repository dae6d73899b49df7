//! # BBS (Bulletin Board System) Core Module
//!
//! This module implements the conferencing core of Confbbs: threaded message
//! navigation, per-user unread tracking, posting with cross-conference
//! occurrence resolution, and the process-wide session registry with its
//! event bus.
//!
//! ## Components
//!
//! - [`navigator`] - per-connection session state machine (read/seek/post)
//! - [`posting`] - target-conference resolution, thread linkage, cross-posting
//! - [`membership`] - session-scoped unread/read-position cache
//! - [`replies`] - depth-first reply-stack traversal
//! - [`registry`] - single-login enforcement and event fan-out
//! - [`types`] - messages, occurrences, conferences, memberships, events
//! - [`perms`] - permission bits and effective-mask computation
//! - [`errors`] - the engine's error taxonomy
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ SessionNavigator │ ← one per connection, owns its session state
//! └──────────────────┘
//!     │           │
//! ┌───────────┐ ┌──────────────┐
//! │ Posting   │ │ Membership / │ ← unread truth + reply stack
//! │ Engine    │ │ ReplyNav     │
//! └───────────┘ └──────────────┘
//!     │
//! ┌──────────────────┐
//! │ SessionRegistry  │ ← shared; mailbox fan-out, single login
//! └──────────────────┘
//! ```
//!
//! ## Session Lifecycle
//!
//! 1. Transport authenticates a user (outside this crate's scope)
//! 2. [`navigator::SessionNavigator::login`] registers the session and loads
//!    its memberships; duplicate logins are refused
//! 3. The command loop drives read/seek/post operations and polls the event
//!    mailbox between commands
//! 4. `logout` (or a kill signal) flushes read positions and frees the slot

pub mod errors;
pub mod membership;
pub mod navigator;
pub mod perms;
pub mod posting;
pub mod registry;
pub mod replies;
pub mod types;

pub use errors::{BbsError, BbsResult};
pub use membership::MembershipTracker;
pub use navigator::SessionNavigator;
pub use posting::PostingEngine;
pub use registry::{SessionRegistry, SessionInfo};
pub use replies::ReplyNavigator;
pub use types::{NextAction, SessionEvent};
