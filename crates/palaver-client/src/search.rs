//! User search over the account directory.
//!
//! Matching is a case-insensitive substring test on the username; results
//! rank exact matches first, then by where in the name the term matched,
//! with the scan order preserved among ties.

use tracing::{debug, warn};

use palaver_shared::constants::USERS_ROOT;
use palaver_shared::{Presence, UserId, UserRecord};
use palaver_store::StorePath;

use crate::error::Result;
use crate::ChatClient;

impl ChatClient {
    /// Find users whose username contains `term`, best matches first.
    ///
    /// Terms shorter than the configured minimum yield an empty result
    /// rather than an error, and the signed-in user is never listed (matched
    /// by uid and, as a guard against duplicate accounts, by email).
    pub async fn search_users(&self, term: &str) -> Result<Vec<(UserId, UserRecord)>> {
        let me = self.require_uid()?;
        let term = term.trim().to_lowercase();
        if term.chars().count() < self.config.min_search_term_len {
            return Ok(Vec::new());
        }

        let own_email = self
            .session
            .principal
            .as_ref()
            .map(|p| p.email.to_lowercase())
            .unwrap_or_default();

        let mut matches: Vec<(UserId, UserRecord)> = Vec::new();
        for (uid, record) in self.all_users().await? {
            if uid == me || record.email.to_lowercase() == own_email {
                continue;
            }
            if record.username.to_lowercase().contains(&term) {
                matches.push((uid, record));
            }
        }

        // Stable, so ties keep their scan order.
        matches.sort_by_key(|(_, record)| {
            let name = record.username.to_lowercase();
            let position = name.find(&term).unwrap_or(usize::MAX);
            (name != term, position)
        });

        debug!(term, matches = matches.len(), "user search");
        Ok(matches)
    }

    /// Every other account in the directory, sorted by username.
    pub async fn list_users(&self) -> Result<Vec<(UserId, UserRecord)>> {
        let mut users = self.all_users().await?;
        if let Some(me) = self.session.principal.as_ref().map(|p| p.uid.clone()) {
            users.retain(|(uid, _)| uid != &me);
        }
        users.sort_by_key(|(_, record)| record.username.to_lowercase());
        Ok(users)
    }

    /// Other accounts currently flagged with `presence`.
    pub async fn list_users_by_presence(
        &self,
        presence: Presence,
    ) -> Result<Vec<(UserId, UserRecord)>> {
        let mut users = self.list_users().await?;
        users.retain(|(_, record)| record.status == presence);
        Ok(users)
    }

    async fn all_users(&self) -> Result<Vec<(UserId, UserRecord)>> {
        let root = StorePath::from_segments([USERS_ROOT])?;
        let Some(snapshot) = self.db.get(&root).await? else {
            return Ok(Vec::new());
        };
        let Some(map) = snapshot.as_object() else {
            return Ok(Vec::new());
        };

        let mut users = Vec::with_capacity(map.len());
        for (key, value) in map {
            let Ok(uid) = UserId::new(key.as_str()) else {
                warn!(key, "skipping malformed user key");
                continue;
            };
            match serde_json::from_value::<UserRecord>(value.clone()) {
                Ok(record) => users.push((uid, record)),
                Err(e) => warn!(key, error = %e, "skipping malformed user record"),
            }
        }
        Ok(users)
    }
}
