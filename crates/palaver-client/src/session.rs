//! Per-client session context.
//!
//! Current principal, resolved username, the open conversation, the live
//! watch handles, and the username values staged across the signup redirect
//! all live here as one explicit object owned by the [`ChatClient`], never
//! as ambient globals.
//!
//! [`ChatClient`]: crate::ChatClient

use std::collections::HashSet;

use palaver_shared::ChatId;
use palaver_store::{Principal, WatchHandle};

/// Mutable state of one signed-in (or signing-in) client.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// The authenticated principal, mirrored from the auth provider.
    pub(crate) principal: Option<Principal>,

    /// The resolved username, once identity resolution has run.
    pub(crate) username: Option<String>,

    /// The conversation currently open, if any.
    pub(crate) active_chat: Option<ChatId>,

    // Username values staged around the signup handoff, in descending
    // resolution priority. All three are cleared once resolution succeeds
    // against the store.
    /// Carried through a same-session signup redirect (highest priority).
    pub(crate) redirect_username: Option<String>,
    /// Confirmed at signup, persisted for the redirect chain.
    pub(crate) confirmed_username: Option<String>,
    /// Staged before account creation as a last-resort backup.
    pub(crate) pending_username: Option<String>,

    /// The single live message watch. Replaced wholesale when another
    /// conversation is opened; never more than one.
    pub(crate) message_watch: Option<WatchHandle>,

    /// The live directory watch plus the conversation ids already delivered,
    /// used to de-duplicate additions.
    pub(crate) directory_watch: Option<WatchHandle>,
    pub(crate) directory_seen: HashSet<ChatId>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn active_chat(&self) -> Option<&ChatId> {
        self.active_chat.as_ref()
    }

    /// Drop every live subscription and forget the signed-in user.
    pub(crate) fn clear(&mut self) {
        self.principal = None;
        self.username = None;
        self.active_chat = None;
        self.message_watch = None;
        self.directory_watch = None;
        self.directory_seen.clear();
        // Staged signup values survive a sign-out only until resolution has
        // consumed them; clearing here keeps a stale name from leaking into
        // the next session.
        self.redirect_username = None;
        self.confirmed_username = None;
        self.pending_username = None;
    }
}
