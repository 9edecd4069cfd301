use thiserror::Error;

use palaver_shared::DomainError;
use palaver_store::{AuthError, StoreError};

/// Errors surfaced by client operations.
///
/// Benign races (accepting an already-consumed request, rejecting an absent
/// one) are NOT errors here; they come back as successful no-op outcomes,
/// because the desired end state already holds.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The operation requires a signed-in principal.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Empty or malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A user or chat identifier failed validation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Message text was blank after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// A message operation was attempted with no conversation open.
    #[error("no active conversation")]
    NoActiveChat,

    /// Auth provider failure. Wrong credentials on reauthentication arrive
    /// here as [`AuthError::InvalidCredential`], distinct from generic
    /// failure, so a caller can prompt again.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The store (or blob store) could not complete the operation.
    #[error("remote unavailable: {0}")]
    Remote(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
