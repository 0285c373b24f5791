//! Storage layer.
//!
//! - [`ProjectDatabase`]: the transactional project file (`SQLite`)
//! - [`codec`]: asset payload compression
//!
//! The store keeps no caches of its own; cache tiers live in
//! [`crate::session`] and are coordinated by [`crate::services`].

// Dropping a connection guard slightly early buys nothing here.
#![allow(clippy::significant_drop_tightening)]

pub mod codec;
mod connection;
mod database;

pub(crate) use connection::acquire_lock;
pub use connection::BUSY_TIMEOUT_MS;
pub use database::ProjectDatabase;
