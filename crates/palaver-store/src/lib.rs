//! # palaver-store
//!
//! The backend-as-a-service boundary of the application, implemented as a
//! local engine with the same contract the hosted service exposes:
//!
//! - [`RealtimeDb`]: a path-addressed, hierarchical value tree with atomic
//!   multi-path updates, server-assigned timestamps, chronologically ordered
//!   push keys, and child-added / child-removed / value-changed watches.
//! - [`AuthService`]: account management and the current signed-in
//!   principal, including reauthentication for sensitive operations.
//! - [`BlobStore`]: opaque byte storage addressed by URL, used only for
//!   profile pictures.
//!
//! The client crate never assumes more than this surface, so swapping in a
//! remote implementation means reimplementing these three types, not the
//! application logic above them.

pub mod auth;
pub mod blobs;
pub mod database;
pub mod path;
pub mod push_id;

mod error;
mod tree;

pub use auth::{AuthService, Principal, Reauth};
pub use blobs::BlobStore;
pub use database::{server_timestamp, RealtimeDb, StoreEvent, WatchHandle};
pub use error::{AuthError, Result, StoreError};
pub use path::StorePath;
