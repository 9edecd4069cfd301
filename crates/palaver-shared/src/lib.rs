//! # palaver-shared
//!
//! Domain types shared between the store and client crates: user and chat
//! identifiers, the records persisted in the realtime tree, and the common
//! error taxonomy.

pub mod constants;
pub mod types;

mod error;

pub use error::DomainError;
pub use types::*;
