//! The friend-relationship engine: status probes, the request lifecycle,
//! and conversation bootstrap.
//!
//! The two invariants that matter here:
//!
//! - friend edges are symmetric: `friends/A/B` and `friends/B/A` are only
//!   ever written together, in the same atomic update that consumes the
//!   request and creates the conversation, so a half-written pair is never
//!   observable;
//! - a request that has already been consumed by a concurrent actor is a
//!   benign no-op, not a failure.

use serde_json::json;
use tracing::{debug, info, warn};

use palaver_shared::constants::{
    CHATS_ROOT, FRIENDS_ROOT, FRIEND_REQUESTS_ROOT, USERS_ROOT, USER_CHATS_ROOT,
};
use palaver_shared::{ChatId, FriendEntry, FriendRequest, RelationshipStatus, UserId, UserRecord};
use palaver_store::{server_timestamp, StorePath, WatchHandle};

use crate::error::{ClientError, Result};
use crate::ChatClient;

/// Result of [`ChatClient::accept_friend_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The request was consumed: edges, conversation, and directory entries
    /// now exist.
    Accepted,
    /// No pending request was found; it was already accepted or withdrawn
    /// elsewhere. The desired end state (no pending request) already holds.
    AlreadyResolved,
}

impl ChatClient {
    /// Relationship between the signed-in user and `other`.
    ///
    /// Checks the friend edge, then the outbound request, then the inbound
    /// request, short-circuiting on the first match; the edge check comes
    /// first so a symmetric edge always beats a stale request row. A store
    /// failure reports [`RelationshipStatus::Unknown`] rather than failing
    /// the probe.
    pub async fn relationship_status(&self, other: &UserId) -> Result<RelationshipStatus> {
        let me = self.require_uid()?;

        let probes = [
            (
                StorePath::from_segments([FRIENDS_ROOT, me.as_str(), other.as_str()])?,
                RelationshipStatus::Friends,
            ),
            (
                StorePath::from_segments([FRIEND_REQUESTS_ROOT, other.as_str(), me.as_str()])?,
                RelationshipStatus::PendingSent,
            ),
            (
                StorePath::from_segments([FRIEND_REQUESTS_ROOT, me.as_str(), other.as_str()])?,
                RelationshipStatus::PendingReceived,
            ),
        ];

        for (path, status) in probes {
            match self.db.exists(&path).await {
                Ok(true) => return Ok(status),
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, other = %other, "relationship probe failed");
                    return Ok(RelationshipStatus::Unknown);
                }
            }
        }
        Ok(RelationshipStatus::None)
    }

    /// Create (or refresh) a pending request from the signed-in user to
    /// `target`.
    ///
    /// Idempotent under retry: re-sending overwrites the single row keyed by
    /// `(target, self)` with a fresh timestamp.
    pub async fn send_friend_request(&self, target: &UserId) -> Result<()> {
        let me = self.require_uid()?;
        if target == &me {
            return Err(ClientError::InvalidArgument(
                "cannot send a friend request to yourself".into(),
            ));
        }

        let username = self.own_username().await?;
        let path = StorePath::from_segments([FRIEND_REQUESTS_ROOT, target.as_str(), me.as_str()])?;
        self.db
            .set(
                &path,
                json!({ "username": username, "timestamp": server_timestamp() }),
            )
            .await?;
        info!(target = %target, "friend request sent");
        Ok(())
    }

    /// Accept a pending request from `requester`.
    ///
    /// On success, one atomic multi-path update writes both edge directions,
    /// creates the conversation and both directory entries when absent, and
    /// deletes the request row.
    pub async fn accept_friend_request(&self, requester: &UserId) -> Result<AcceptOutcome> {
        let me = self.require_uid()?;

        let request_path =
            StorePath::from_segments([FRIEND_REQUESTS_ROOT, me.as_str(), requester.as_str()])?;
        let Some(request) = self.db.get_record::<FriendRequest>(&request_path).await? else {
            debug!(requester = %requester, "no pending request; treating accept as resolved");
            return Ok(AcceptOutcome::AlreadyResolved);
        };

        let my_username = self.own_username().await?;
        let chat_id = ChatId::between(&me, requester);
        let chat_exists = self
            .db
            .exists(&StorePath::from_segments([CHATS_ROOT, chat_id.as_str()])?)
            .await?;

        let edge = |owner: &UserId,
                    other: &UserId,
                    name: &str|
         -> Result<(StorePath, Option<serde_json::Value>)> {
            Ok((
                StorePath::from_segments([FRIENDS_ROOT, owner.as_str(), other.as_str()])?,
                Some(json!({ "username": name, "timestamp": server_timestamp() })),
            ))
        };

        let mut writes = vec![
            edge(&me, requester, &request.username)?,
            edge(requester, &me, &my_username)?,
            (request_path, None),
        ];
        if !chat_exists {
            writes.extend(conversation_bundle(&chat_id, &me, requester)?);
        }

        self.db.update(writes).await?;
        info!(requester = %requester, chat = %chat_id, "friend request accepted");
        Ok(AcceptOutcome::Accepted)
    }

    /// Delete a pending request from `requester`. No-op when already gone.
    pub async fn reject_friend_request(&self, requester: &UserId) -> Result<()> {
        let me = self.require_uid()?;
        let path =
            StorePath::from_segments([FRIEND_REQUESTS_ROOT, me.as_str(), requester.as_str()])?;
        self.db.remove(&path).await?;
        debug!(requester = %requester, "friend request rejected");
        Ok(())
    }

    /// Ensure a conversation with `other` exists and return its id.
    ///
    /// Same bootstrap bundle as acceptance minus the friend edges; used for
    /// the explicit "message" action on an existing friend.
    pub async fn start_chat(&self, other: &UserId) -> Result<ChatId> {
        let me = self.require_uid()?;
        if other == &me {
            return Err(ClientError::InvalidArgument(
                "cannot start a chat with yourself".into(),
            ));
        }

        let chat_id = ChatId::between(&me, other);
        let chat_path = StorePath::from_segments([CHATS_ROOT, chat_id.as_str()])?;
        if !self.db.exists(&chat_path).await? {
            self.db
                .update(conversation_bundle(&chat_id, &me, other)?)
                .await?;
            debug!(chat = %chat_id, "conversation created");
        }
        Ok(chat_id)
    }

    /// Current friends of the signed-in user.
    pub async fn list_friends(&self) -> Result<Vec<(UserId, FriendEntry)>> {
        let me = self.require_uid()?;
        let path = StorePath::from_segments([FRIENDS_ROOT, me.as_str()])?;
        self.list_edges(&path).await
    }

    /// Pending inbound requests (the request badge is their count).
    pub async fn list_friend_requests(&self) -> Result<Vec<(UserId, FriendRequest)>> {
        let me = self.require_uid()?;
        let path = StorePath::from_segments([FRIEND_REQUESTS_ROOT, me.as_str()])?;
        self.list_edges(&path).await
    }

    /// Watch the signed-in user's friends subtree (full snapshots).
    pub fn watch_friends(&self) -> Result<WatchHandle> {
        let me = self.require_uid()?;
        let path = StorePath::from_segments([FRIENDS_ROOT, me.as_str()])?;
        Ok(self.db.watch_value(path)?)
    }

    /// Watch the signed-in user's inbound request subtree (full snapshots).
    pub fn watch_friend_requests(&self) -> Result<WatchHandle> {
        let me = self.require_uid()?;
        let path = StorePath::from_segments([FRIEND_REQUESTS_ROOT, me.as_str()])?;
        Ok(self.db.watch_value(path)?)
    }

    async fn list_edges<T: serde::de::DeserializeOwned>(
        &self,
        path: &StorePath,
    ) -> Result<Vec<(UserId, T)>> {
        let Some(map) = self.db.get(path).await? else {
            return Ok(Vec::new());
        };
        let Some(map) = map.as_object() else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let Ok(uid) = UserId::new(key.as_str()) else {
                warn!(key, "skipping malformed edge key");
                continue;
            };
            match serde_json::from_value::<T>(value.clone()) {
                Ok(entry) => entries.push((uid, entry)),
                Err(e) => warn!(key, error = %e, "skipping malformed edge record"),
            }
        }
        Ok(entries)
    }

    pub(crate) fn require_uid(&self) -> Result<UserId> {
        self.session
            .principal
            .as_ref()
            .map(|p| p.uid.clone())
            .ok_or(ClientError::NotAuthenticated)
    }

    /// The signed-in user's username: the resolved session value, else the
    /// stored record, else the auth display name, else the email local-part.
    pub(crate) async fn own_username(&self) -> Result<String> {
        if let Some(name) = &self.session.username {
            return Ok(name.clone());
        }
        let principal = self
            .session
            .principal
            .as_ref()
            .ok_or(ClientError::NotAuthenticated)?;
        let path = StorePath::from_segments([USERS_ROOT, principal.uid.as_str()])?;
        if let Some(record) = self.db.get_record::<UserRecord>(&path).await? {
            if !record.username.is_empty() {
                return Ok(record.username);
            }
        }
        Ok(principal
            .display_name
            .clone()
            .unwrap_or_else(|| match principal.email.split_once('@') {
                Some((local, _)) if !local.is_empty() => local.to_string(),
                _ => "User".to_string(),
            }))
    }
}

/// The writes that bring a conversation into existence: the participants map
/// and one directory entry per participant.
fn conversation_bundle(
    chat_id: &ChatId,
    a: &UserId,
    b: &UserId,
) -> Result<Vec<(StorePath, Option<serde_json::Value>)>> {
    Ok(vec![
        (
            StorePath::from_segments([CHATS_ROOT, chat_id.as_str(), "participants"])?,
            Some(json!({ (a.as_str()): true, (b.as_str()): true })),
        ),
        (
            StorePath::from_segments([USER_CHATS_ROOT, a.as_str(), chat_id.as_str()])?,
            Some(json!({ "timestamp": server_timestamp(), "unread": false })),
        ),
        (
            StorePath::from_segments([USER_CHATS_ROOT, b.as_str(), chat_id.as_str()])?,
            Some(json!({ "timestamp": server_timestamp(), "unread": false })),
        ),
    ])
}
