//! # palaver-client
//!
//! The application core of a direct-messaging client: identity resolution,
//! the friend-relationship engine, the per-user conversation directory, the
//! message channel, user search, and profile management. Everything above
//! the store boundary and below the UI.
//!
//! A [`ChatClient`] owns shared handles to the three backend services and an
//! explicit [`SessionContext`]; all state a view needs flows through it, and
//! all subscriptions it opens are torn down when it signs out or is dropped.

pub mod config;
pub mod directory;
pub mod friends;
pub mod identity;
pub mod messages;
pub mod profile;
pub mod search;
pub mod session;

mod error;

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use palaver_store::{AuthService, BlobStore, RealtimeDb};

pub use config::ClientConfig;
pub use directory::DirectoryEvent;
pub use error::{ClientError, Result};
pub use friends::AcceptOutcome;
pub use session::SessionContext;

/// One user's client: backend handles plus session state.
///
/// Methods are spread across this crate's modules by responsibility
/// (`identity`, `friends`, `directory`, `messages`, `search`, `profile`).
pub struct ChatClient {
    pub(crate) db: Arc<RealtimeDb>,
    pub(crate) auth: Arc<AuthService>,
    pub(crate) blobs: Arc<BlobStore>,
    pub(crate) config: ClientConfig,
    pub(crate) session: SessionContext,
}

impl ChatClient {
    pub fn new(
        db: Arc<RealtimeDb>,
        auth: Arc<AuthService>,
        blobs: Arc<BlobStore>,
        config: ClientConfig,
    ) -> Self {
        Self {
            db,
            auth,
            blobs,
            config,
            session: SessionContext::new(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("user", &self.session.principal().map(|p| p.uid.clone()))
            .finish_non_exhaustive()
    }
}

/// Install the global tracing subscriber (respects `RUST_LOG`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("palaver_client=debug,palaver_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
