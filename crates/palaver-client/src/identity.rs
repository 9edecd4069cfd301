//! Signup, sign-in, presence, and username resolution.
//!
//! The username has historically had several competing sources of truth (the
//! signup form, the auth provider's display name, the database record, the
//! email address). [`ChatClient::resolve_username`] reconciles them with a
//! fixed priority order and writes the winner back everywhere, so every
//! surface agrees afterwards.

use serde_json::json;
use tracing::{debug, info, warn};

use palaver_shared::constants::{USERNAMES_ROOT, USERS_ROOT};
use palaver_shared::{Presence, UserRecord};
use palaver_store::{server_timestamp, Principal, StorePath, StoreError};

use crate::error::{ClientError, Result};
use crate::ChatClient;

impl ChatClient {
    /// Create an account, its user record, and the username reference.
    ///
    /// The chosen username is staged in the session before account creation
    /// and confirmed after, so [`resolve_username`](Self::resolve_username)
    /// can repair the record even if the store write below fails.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<Principal> {
        let username = username.trim();
        if email.trim().is_empty() || password.is_empty() || username.is_empty() {
            return Err(ClientError::InvalidArgument(
                "email, password and username are all required".into(),
            ));
        }
        if username.len() < self.config.min_username_len {
            return Err(ClientError::InvalidArgument(format!(
                "username must be at least {} characters",
                self.config.min_username_len
            )));
        }
        if password.len() < self.config.min_password_len {
            return Err(ClientError::InvalidArgument(format!(
                "password must be at least {} characters",
                self.config.min_password_len
            )));
        }

        self.session.pending_username = Some(username.to_string());

        let principal = match self.auth.create_account(email, password).await {
            Ok(p) => p,
            Err(e) => {
                self.session.pending_username = None;
                return Err(e.into());
            }
        };
        self.auth.update_display_name(&principal.uid, username).await?;
        let principal = self.auth.current().unwrap_or(principal);
        self.session.principal = Some(principal.clone());
        self.session.confirmed_username = Some(username.to_string());

        let record = json!({
            "username": username,
            "email": principal.email,
            "profilePicture": "",
            "bio": "",
            "status": "online",
            "createdAt": server_timestamp(),
        });
        let user_path = StorePath::from_segments([USERS_ROOT, principal.uid.as_str()])?;
        let name_path =
            StorePath::from_segments([USERNAMES_ROOT, &username.to_lowercase()])?;

        // The account exists either way; a failed record write is repaired
        // by the next resolve_username() from the staged values.
        self.db
            .update([
                (user_path, Some(record)),
                (name_path, Some(json!(principal.uid.as_str()))),
            ])
            .await?;

        info!(uid = %principal.uid, username, "account created");
        Ok(principal)
    }

    /// Sign in to an existing account.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<Principal> {
        let principal = self.auth.sign_in(email, password).await?;
        self.session.principal = Some(principal.clone());
        debug!(uid = %principal.uid, "signed in");
        Ok(principal)
    }

    /// Resolve the definitive username for the signed-in user.
    ///
    /// Priority: redirect-carried value, confirmed signup value, the
    /// database record, the auth display name, the staged pending value,
    /// then the email local-part. The winner is written back to both the
    /// database record and the auth display name when either disagrees
    /// (idempotent: re-running with an agreed value writes nothing), and the
    /// transient staged values are cleared.
    ///
    /// Never fails on an unreachable store: the best locally available
    /// guess is returned instead and the staged values are kept for a later
    /// repair, so the caller is never blocked.
    pub async fn resolve_username(&mut self) -> Result<String> {
        let principal = self
            .session
            .principal
            .clone()
            .ok_or(ClientError::NotAuthenticated)?;

        let user_path = StorePath::from_segments([USERS_ROOT, principal.uid.as_str()])?;
        let record: Option<UserRecord> = match self.db.get_record(&user_path).await {
            Ok(r) => r,
            Err(StoreError::Offline) => {
                let guess = self.local_username_guess(&principal);
                warn!(uid = %principal.uid, "store unreachable, using local username guess");
                self.session.username = Some(guess.clone());
                return Ok(guess);
            }
            Err(e) => return Err(e.into()),
        };

        let stored = record
            .as_ref()
            .map(|r| r.username.clone())
            .filter(|u| !u.is_empty());

        let resolved = self
            .session
            .redirect_username
            .clone()
            .or_else(|| self.session.confirmed_username.clone())
            .or(stored.clone())
            .or_else(|| principal.display_name.clone())
            .or_else(|| self.session.pending_username.clone())
            .unwrap_or_else(|| email_local_part(&principal.email));

        // Write back to the record when missing or disagreeing.
        if stored.as_deref() != Some(resolved.as_str()) {
            let mut fields = serde_json::Map::new();
            fields.insert("username".into(), json!(resolved));
            fields.insert("status".into(), json!("online"));
            if record.is_none() {
                fields.insert("email".into(), json!(principal.email));
                fields.insert("createdAt".into(), server_timestamp());
            }
            let writes: Vec<_> = fields
                .into_iter()
                .map(|(k, v)| {
                    user_path
                        .child(&k)
                        .map(|p| (p, Some(v)))
                        .map_err(ClientError::from)
                })
                .collect::<Result<_>>()?;
            if let Err(e) = self.db.update(writes).await {
                warn!(error = %e, "username write-back failed");
            } else {
                debug!(uid = %principal.uid, username = %resolved, "username written back");
            }
        }

        // Align the auth display name.
        if principal.display_name.as_deref() != Some(resolved.as_str()) {
            if let Err(e) = self.auth.update_display_name(&principal.uid, &resolved).await {
                warn!(error = %e, "display name update failed");
            } else if let Some(p) = self.auth.current() {
                self.session.principal = Some(p);
            }
        }

        // The staged values have served their purpose.
        self.session.redirect_username = None;
        self.session.confirmed_username = None;
        self.session.pending_username = None;

        self.session.username = Some(resolved.clone());
        Ok(resolved)
    }

    fn local_username_guess(&self, principal: &Principal) -> String {
        self.session
            .redirect_username
            .clone()
            .or_else(|| self.session.confirmed_username.clone())
            .or_else(|| principal.display_name.clone())
            .or_else(|| self.session.pending_username.clone())
            .unwrap_or_else(|| email_local_part(&principal.email))
    }

    /// Stage a username carried through a same-session redirect. Takes
    /// highest priority at the next resolution.
    pub fn carry_redirect_username(&mut self, username: &str) {
        self.session.redirect_username = Some(username.to_string());
    }

    /// Best-effort liveness flag write.
    pub async fn set_presence(&self, presence: Presence) -> Result<()> {
        let principal = self
            .session
            .principal
            .as_ref()
            .ok_or(ClientError::NotAuthenticated)?;
        let path =
            StorePath::from_segments([USERS_ROOT, principal.uid.as_str(), "status"])?;
        self.db
            .set(&path, serde_json::to_value(presence).expect("presence serializes"))
            .await?;
        Ok(())
    }

    /// Mark the user offline, release every live subscription, and sign out.
    ///
    /// The provider session is only cleared when it still belongs to this
    /// client; another client's sign-in must survive our sign-out.
    pub async fn sign_out(&mut self) {
        let uid = self.session.principal.as_ref().map(|p| p.uid.clone());
        if uid.is_some() {
            if let Err(e) = self.set_presence(Presence::Offline).await {
                warn!(error = %e, "could not mark user offline during sign-out");
            }
        }
        self.session.clear();
        if uid.is_some() && self.auth.current().map(|p| p.uid) == uid {
            self.auth.sign_out().await;
        }
        debug!("signed out");
    }
}

fn email_local_part(email: &str) -> String {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => local.to_string(),
        _ => "User".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_local_part_fallbacks() {
        assert_eq!(email_local_part("amy@example.com"), "amy");
        assert_eq!(email_local_part("@example.com"), "User");
        assert_eq!(email_local_part("not-an-email"), "User");
    }
}
