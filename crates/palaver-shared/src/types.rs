//! Identifiers and record shapes for the realtime tree.
//!
//! Every record struct derives `Serialize`/`Deserialize` and maps one-to-one
//! onto a subtree of the store, so reads and writes go through
//! `serde_json::to_value`/`from_value` without hand-written field plumbing.

use serde::{Deserialize, Serialize};

use crate::constants::CHAT_ID_SEPARATOR;
use crate::error::DomainError;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// A stable user identifier, assigned by the auth provider.
///
/// The inner string is opaque except for two structural rules: it is never
/// empty and never contains [`CHAT_ID_SEPARATOR`]. Those two rules are what
/// make [`ChatId::between`] collision-free and reversible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::EmptyUserId);
        }
        if id.contains(CHAT_ID_SEPARATOR) {
            return Err(DomainError::ReservedCharacter(CHAT_ID_SEPARATOR));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// ChatId
// ---------------------------------------------------------------------------

/// Canonical identifier for a two-party conversation.
///
/// Derived, never stored on its own: the lexicographically smaller user id,
/// the separator, then the larger one. Both participants derive the same id
/// regardless of who initiates, so a pair of users can only ever have one
/// conversation record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Derive the conversation id for a pair of users.
    ///
    /// Pure; order of the two arguments does not matter.
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{lo}{CHAT_ID_SEPARATOR}{hi}"))
    }

    /// Parse a raw string back into a chat id, checking its shape.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let (a, b) = raw
            .split_once(CHAT_ID_SEPARATOR)
            .ok_or_else(|| DomainError::MalformedChatId(raw.to_string()))?;
        let a = UserId::new(a).map_err(|_| DomainError::MalformedChatId(raw.to_string()))?;
        let b = UserId::new(b).map_err(|_| DomainError::MalformedChatId(raw.to_string()))?;
        Ok(Self::between(&a, &b))
    }

    /// The two participants encoded in the id, in lexicographic order.
    pub fn participants(&self) -> (UserId, UserId) {
        // Construction guarantees exactly one separator between valid ids.
        let (a, b) = self
            .0
            .split_once(CHAT_ID_SEPARATOR)
            .expect("chat id always contains the separator");
        (UserId(a.to_string()), UserId(b.to_string()))
    }

    /// The participant that is not `me`, if `me` is part of this chat.
    pub fn other_participant(&self, me: &UserId) -> Option<UserId> {
        let (a, b) = self.participants();
        if &a == me {
            Some(b)
        } else if &b == me {
            Some(a)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Liveness flag toggled on connect/disconnect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A user record at `users/{uid}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub status: Presence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Server-assigned creation time, epoch millis.
    #[serde(default)]
    pub created_at: i64,
}

/// One direction of a symmetric friend edge, at `friends/{owner}/{other}`.
///
/// The username is denormalized so friend lists render without a join; it can
/// go stale when the friend renames and that is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendEntry {
    pub username: String,
    /// Epoch millis, server-assigned at acceptance.
    pub timestamp: i64,
}

/// A pending request at `friendRequests/{recipient}/{requester}`.
///
/// Same shape as [`FriendEntry`]; the path, not the payload, carries the
/// direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequest {
    pub username: String,
    pub timestamp: i64,
}

/// An immutable chat message at `chats/{chatId}/messages/{pushKey}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub sender: UserId,
    pub sender_name: String,
    /// Server-assigned epoch millis; ordering authority for the log.
    pub timestamp: i64,
}

/// Conversation summary at `chats/{chatId}/lastMessage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub text: String,
    pub sender: UserId,
    pub timestamp: i64,
}

/// Per-user directory entry at `userChats/{uid}/{chatId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatListEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub unread: bool,
}

// ---------------------------------------------------------------------------
// Relationship status
// ---------------------------------------------------------------------------

/// Relationship between the caller and another user.
///
/// A symmetric friend edge always wins over a stale request row, which is why
/// probes check edges before requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    None,
    Friends,
    /// The caller sent a request that is still pending.
    PendingSent,
    /// The other user sent a request the caller has not answered.
    PendingReceived,
    /// The store could not be reached; the real status is unknown.
    Unknown,
}
