//! The session directory: one entry per conversation the signed-in user
//! participates in, with preview text, recency, and the unread flag.

use tracing::{debug, warn};

use palaver_shared::constants::USER_CHATS_ROOT;
use palaver_shared::{ChatId, ChatListEntry};
use palaver_store::{StoreEvent, StorePath};

use crate::error::Result;
use crate::ChatClient;

/// A change to the signed-in user's conversation directory.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    /// A conversation appeared in the directory.
    Added { chat: ChatId, entry: ChatListEntry },
    /// A conversation left the directory (account deletion, cleanup).
    Removed { chat: ChatId },
}

impl ChatClient {
    /// Subscribe to the signed-in user's directory and return its current
    /// contents, most recent first.
    ///
    /// Replaces any previous subscription. Entries returned here are marked
    /// as seen, so [`recv_directory_event`] only reports conversations that
    /// appear or disappear afterwards.
    ///
    /// [`recv_directory_event`]: ChatClient::recv_directory_event
    pub async fn subscribe_directory(&mut self) -> Result<Vec<(ChatId, ChatListEntry)>> {
        let me = self.require_uid()?;
        let path = StorePath::from_segments([USER_CHATS_ROOT, me.as_str()])?;

        let mut watch = self.db.watch_children(path, None)?;
        self.session.directory_seen.clear();

        // The replay is queued before the watch is handed back, so draining
        // it here cannot race a live commit.
        let mut entries = Vec::new();
        while let Some(event) = watch.try_recv() {
            if let StoreEvent::ChildAdded { key, value } = event {
                let Some((chat, entry)) = decode_entry(&key, value) else {
                    continue;
                };
                self.session.directory_seen.insert(chat.clone());
                entries.push((chat, entry));
            }
        }
        entries.sort_by(|(_, a), (_, b)| b.timestamp.cmp(&a.timestamp));

        self.session.directory_watch = Some(watch);
        debug!(conversations = entries.len(), "directory subscribed");
        Ok(entries)
    }

    /// Next directory change, or `None` when no subscription is live (or it
    /// has been cancelled).
    pub async fn recv_directory_event(&mut self) -> Option<DirectoryEvent> {
        let watch = self.session.directory_watch.as_mut()?;
        loop {
            match watch.recv().await? {
                StoreEvent::ChildAdded { key, value } => {
                    let Some((chat, entry)) = decode_entry(&key, value) else {
                        continue;
                    };
                    // Membership only: a commit that rewrites an existing
                    // entry (new preview, unread toggles) is not an addition.
                    if self.session.directory_seen.insert(chat.clone()) {
                        return Some(DirectoryEvent::Added { chat, entry });
                    }
                }
                StoreEvent::ChildRemoved { key } => {
                    let Ok(chat) = ChatId::parse(&key) else {
                        continue;
                    };
                    if self.session.directory_seen.remove(&chat) {
                        return Some(DirectoryEvent::Removed { chat });
                    }
                }
                StoreEvent::Value(_) => {}
            }
        }
    }

    /// Drop the directory subscription.
    pub fn unsubscribe_directory(&mut self) {
        self.session.directory_watch = None;
        self.session.directory_seen.clear();
    }

    /// Clear the unread flag on `chat`. Best-effort: a store failure is
    /// logged and swallowed, since a stale badge must not fail the caller.
    pub async fn mark_read(&self, chat: &ChatId) {
        let Ok(me) = self.require_uid() else { return };
        let write = async {
            let path = StorePath::from_segments([
                USER_CHATS_ROOT,
                me.as_str(),
                chat.as_str(),
                "unread",
            ])?;
            self.db.set(&path, serde_json::json!(false)).await
        };
        if let Err(e) = write.await {
            warn!(chat = %chat, error = %e, "failed to clear unread flag");
        }
    }
}

fn decode_entry(key: &str, value: serde_json::Value) -> Option<(ChatId, ChatListEntry)> {
    let chat = match ChatId::parse(key) {
        Ok(chat) => chat,
        Err(e) => {
            warn!(key, error = %e, "skipping malformed directory key");
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(entry) => Some((chat, entry)),
        Err(e) => {
            warn!(key, error = %e, "skipping malformed directory entry");
            None
        }
    }
}
