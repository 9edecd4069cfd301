//! Profile management: the own-record view, avatar storage, and the
//! credential operations that require a fresh password proof.

use serde_json::json;
use tracing::{info, warn};

use palaver_shared::constants::{USERS_ROOT, USER_CHATS_ROOT};
use palaver_shared::{Presence, UserRecord};
use palaver_store::{server_timestamp, StorePath};

use crate::error::{ClientError, Result};
use crate::ChatClient;

impl ChatClient {
    /// The signed-in user's record, created with sensible defaults when the
    /// store has none (a signup whose record write was lost).
    pub async fn load_profile(&self) -> Result<UserRecord> {
        let me = self.require_uid()?;
        let path = StorePath::from_segments([USERS_ROOT, me.as_str()])?;

        if let Some(record) = self.db.get_record::<UserRecord>(&path).await? {
            return Ok(record);
        }

        let record = UserRecord {
            username: self.own_username().await?,
            email: self
                .session
                .principal
                .as_ref()
                .map(|p| p.email.clone())
                .unwrap_or_default(),
            status: Presence::Online,
            profile_picture: None,
            bio: None,
            created_at: 0,
        };
        let mut value = serde_json::to_value(&record).map_err(|e| {
            ClientError::InvalidArgument(format!("profile does not serialize: {e}"))
        })?;
        if let Some(map) = value.as_object_mut() {
            map.insert("createdAt".into(), server_timestamp());
        }
        self.db.set(&path, value).await?;
        info!(uid = %me, "profile record repaired");
        Ok(record)
    }

    /// Update the display fields of the profile.
    ///
    /// The username is mirrored to the auth display name and to the session,
    /// so the next resolution sees one consistent value.
    pub async fn update_profile(&mut self, username: &str, bio: &str) -> Result<()> {
        let me = self.require_uid()?;
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::InvalidArgument(
                "username cannot be empty".into(),
            ));
        }

        let base = StorePath::from_segments([USERS_ROOT, me.as_str()])?;
        self.db
            .update([
                (base.child("username")?, Some(json!(username))),
                (base.child("bio")?, Some(json!(bio))),
            ])
            .await?;

        // Best-effort mirror: the provider refuses unless this client's
        // principal is still the signed-in one, and the next resolution
        // repairs a skipped mirror from the record.
        if let Err(e) = self.auth.update_display_name(&me, username).await {
            warn!(uid = %me, error = %e, "display name mirror skipped");
        }
        self.session.username = Some(username.to_string());
        info!(uid = %me, username, "profile updated");
        Ok(())
    }

    /// Store `bytes` as the avatar and point the profile at it.
    ///
    /// The size cap is enforced before any byte is persisted. A previous
    /// avatar is deleted best-effort once the new one is referenced.
    pub async fn set_avatar(&self, bytes: &[u8]) -> Result<String> {
        let me = self.require_uid()?;
        if bytes.len() > self.config.max_avatar_bytes {
            return Err(ClientError::InvalidArgument(format!(
                "avatar is {} bytes, limit is {}",
                bytes.len(),
                self.config.max_avatar_bytes
            )));
        }

        let path = StorePath::from_segments([USERS_ROOT, me.as_str()])?;
        let previous = self
            .db
            .get_record::<UserRecord>(&path)
            .await?
            .and_then(|r| r.profile_picture)
            .filter(|url| !url.is_empty());

        let url = self.blobs.upload(bytes).await?;
        self.db
            .set(&path.child("profilePicture")?, json!(url))
            .await?;

        if let Some(old) = previous {
            if let Err(e) = self.blobs.delete(&old).await {
                warn!(url = old, error = %e, "failed to delete replaced avatar");
            }
        }
        info!(uid = %me, "avatar updated");
        Ok(url)
    }

    /// Change the account password after re-proving the current one.
    pub async fn change_password(&self, current: &str, new_password: &str) -> Result<()> {
        let me = self.require_uid()?;
        if new_password.chars().count() < self.config.min_password_len {
            return Err(ClientError::InvalidArgument(format!(
                "password must be at least {} characters",
                self.config.min_password_len
            )));
        }
        let proof = self.auth.reauthenticate(&me, current).await?;
        self.auth.change_password(proof, new_password).await?;
        info!("password changed");
        Ok(())
    }

    /// Permanently delete the account after re-proving the password.
    ///
    /// Removes the user record, the directory, and the avatar blob before
    /// the credential itself; per-conversation data stays behind for the
    /// other participants.
    pub async fn delete_account(&mut self, password: &str) -> Result<()> {
        let me = self.require_uid()?;
        let proof = self.auth.reauthenticate(&me, password).await?;

        let user_path = StorePath::from_segments([USERS_ROOT, me.as_str()])?;
        if let Ok(Some(record)) = self.db.get_record::<UserRecord>(&user_path).await {
            if let Some(url) = record.profile_picture.filter(|u| !u.is_empty()) {
                if let Err(e) = self.blobs.delete(&url).await {
                    warn!(url, error = %e, "failed to delete avatar during account removal");
                }
            }
        }

        let directory = StorePath::from_segments([USER_CHATS_ROOT, me.as_str()])?;
        self.db
            .update([(user_path, None), (directory, None)])
            .await?;

        self.auth.delete_account(proof).await?;
        self.session.clear();
        info!(uid = %me, "account deleted");
        Ok(())
    }
}
