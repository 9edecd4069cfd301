use thiserror::Error;

/// Errors produced by the keyed store and blob store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend is unreachable. Every operation fails with this while the
    /// connection is down; callers decide whether to fail soft.
    #[error("store unreachable")]
    Offline,

    /// A path string was empty or contained an empty segment.
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    /// A record existed but did not deserialize into the expected shape.
    #[error("malformed record at {path}: {source}")]
    MalformedRecord {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Blob payload exceeded the configured size cap.
    #[error("blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    /// Blob payload was empty, or a blob URL did not resolve.
    #[error("blob error: {0}")]
    Blob(String),

    /// Generic I/O error from the blob backing directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by the auth provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// An account already exists for this email.
    #[error("email already in use")]
    EmailInUse,

    /// Unknown email or wrong password.
    ///
    /// Reported distinctly from other failures so a caller can prompt for
    /// the credential again (wrong password on reauthentication must not be
    /// shown as a generic error).
    #[error("invalid credential")]
    InvalidCredential,

    /// No principal is signed in.
    #[error("not signed in")]
    NotSignedIn,

    /// A sensitive operation was attempted without fresh reauthentication.
    #[error("recent reauthentication required")]
    ReauthRequired,

    /// Invalid identifier in an auth payload.
    #[error("invalid account data: {0}")]
    InvalidAccount(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
