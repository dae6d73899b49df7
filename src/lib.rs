//! # Confbbs - Multi-User Conferencing BBS Backend
//!
//! Confbbs is the conferencing core of a classic BBS: users post and read
//! threaded messages inside named conferences, track unread state per
//! conference, navigate replies depth-first, and exchange live chat and
//! broadcast notices while logged in. Transports (telnet/SSH front ends,
//! command parsers, editors) sit on top of this crate and drive it through
//! the session API.
//!
//! ## Features
//!
//! - **Conferences & Occurrences**: one message, many appearances - each
//!   conference sees the message under its own local sequence number.
//! - **Unread Tracking**: per-user read-position markers, cached per session
//!   and flushed in batches, with wrap-around "next conference with news".
//! - **Depth-First Reply Navigation**: a reply stack walks discussions
//!   without materializing whole threads, skipping branches already read.
//! - **Thread Linkage**: every reply inherits the root's thread id across
//!   arbitrary branching and cross-posting.
//! - **Mailboxes**: each user's private mailbox is a conference whose id is
//!   the user id; replies to mail are cross-posted back to the author.
//! - **Session Registry & Event Bus**: single login per user, per-session
//!   event mailboxes, filtered new-message fan-out, immediate kill wake-up.
//! - **Async Design**: built with Tokio; stores are synchronous, the event
//!   mailbox is the single suspension point.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use confbbs::bbs::{SessionNavigator, SessionRegistry};
//! use confbbs::storage::{SledStoreBuilder, Stores};
//!
//! fn main() -> anyhow::Result<()> {
//!     let stores: Stores = SledStoreBuilder::new("./data").open_stores()?;
//!     let registry = Arc::new(SessionRegistry::new());
//!
//!     let mut session = SessionNavigator::login(registry, stores, 42, "alice")?;
//!     while let Ok(message) = session.read_next() {
//!         println!("{}: {}", message.author_name, message.subject);
//!     }
//!     session.logout()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bbs`] - navigation, posting, membership tracking, session registry
//! - [`storage`] - store traits and the sled-backed implementation
//! - [`config`] - configuration management and validation
//! - [`validation`] - input validation and sanitization utilities
//! - [`logutil`] - log line sanitization helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Session API     │ ← navigator + registry (this crate's surface)
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Posting /       │ ← resolution, thread linkage, unread truth
//! │ Membership Core │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Storage Layer   │ ← trait-shaped collaborators (sled shipped)
//! └─────────────────┘
//! ```

pub mod bbs;
pub mod config;
pub mod logutil;
pub mod storage;
pub mod validation;
