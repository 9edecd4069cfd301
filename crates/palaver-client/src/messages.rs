//! The message channel: opening a conversation, streaming its history and
//! live traffic, and the fan-out performed on every send.

use serde_json::json;
use tracing::{debug, info, warn};

use palaver_shared::constants::{CHATS_ROOT, USER_CHATS_ROOT};
use palaver_shared::{ChatId, Message, UserId};
use palaver_store::{server_timestamp, StoreEvent, StorePath};

use crate::error::{ClientError, Result};
use crate::ChatClient;

impl ChatClient {
    /// Open `chat`: install its message watch and clear its unread flag.
    ///
    /// The previous conversation's watch (if any) is replaced wholesale, so
    /// at most one message stream is ever live per client. History is capped
    /// to the configured limit, oldest of the retained window first.
    pub async fn open_chat(&mut self, chat: ChatId) -> Result<()> {
        let _ = self.require_uid()?;

        let path = StorePath::from_segments([CHATS_ROOT, chat.as_str(), "messages"])?;
        let watch = self
            .db
            .watch_children(path, Some(self.config.message_history_limit))?;

        self.session.message_watch = Some(watch);
        self.session.active_chat = Some(chat.clone());
        self.mark_read(&chat).await;
        debug!(chat = %chat, "conversation opened");
        Ok(())
    }

    /// Close the open conversation and drop its watch.
    pub fn close_chat(&mut self) {
        self.session.active_chat = None;
        self.session.message_watch = None;
    }

    /// Next message in the open conversation. Yields the capped history
    /// first, then live messages; `None` when no conversation is open or the
    /// watch has been cancelled.
    pub async fn recv_message(&mut self) -> Option<Message> {
        let watch = self.session.message_watch.as_mut()?;
        loop {
            match watch.recv().await? {
                StoreEvent::ChildAdded { key, value } => {
                    match serde_json::from_value::<Message>(value) {
                        Ok(message) => return Some(message),
                        Err(e) => warn!(key, error = %e, "skipping malformed message"),
                    }
                }
                StoreEvent::ChildRemoved { .. } | StoreEvent::Value(_) => {}
            }
        }
    }

    /// Non-blocking variant of [`recv_message`](ChatClient::recv_message).
    pub fn try_recv_message(&mut self) -> Option<Message> {
        let watch = self.session.message_watch.as_mut()?;
        loop {
            match watch.try_recv()? {
                StoreEvent::ChildAdded { key, value } => {
                    match serde_json::from_value::<Message>(value) {
                        Ok(message) => return Some(message),
                        Err(e) => warn!(key, error = %e, "skipping malformed message"),
                    }
                }
                StoreEvent::ChildRemoved { .. } | StoreEvent::Value(_) => {}
            }
        }
    }

    /// Send `text` to the open conversation.
    ///
    /// Whitespace-only input is rejected before anything is written. The
    /// message append is the one write that can fail the call; the preview
    /// and directory mirrors after it are best-effort, so a flaky mirror
    /// never loses a delivered message.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let me = self.require_uid()?;
        let chat = self
            .session
            .active_chat
            .clone()
            .ok_or(ClientError::NoActiveChat)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let sender_name = self.own_username().await?;
        let body = json!({
            "text": text,
            "sender": me.as_str(),
            "senderName": sender_name,
            "timestamp": server_timestamp(),
        });

        let messages = StorePath::from_segments([CHATS_ROOT, chat.as_str(), "messages"])?;
        let key = self.db.push(&messages, body).await?;
        info!(chat = %chat, key, "message sent");

        if let Err(e) = self.mirror_send(&chat, &me, text).await {
            warn!(chat = %chat, error = %e, "message mirrors failed");
        }
        Ok(())
    }

    /// The preview and per-participant directory writes that follow a send.
    async fn mirror_send(&self, chat: &ChatId, sender: &UserId, text: &str) -> Result<()> {
        let last_message = StorePath::from_segments([CHATS_ROOT, chat.as_str(), "lastMessage"])?;
        let mut writes = vec![(
            last_message,
            Some(json!({
                "text": text,
                "sender": sender.as_str(),
                "timestamp": server_timestamp(),
            })),
        )];

        let (a, b) = chat.participants();
        for participant in [a, b] {
            let entry =
                StorePath::from_segments([USER_CHATS_ROOT, participant.as_str(), chat.as_str()])?;
            writes.push((
                entry,
                Some(json!({
                    "lastMessage": text,
                    "timestamp": server_timestamp(),
                    "unread": &participant != sender,
                })),
            ));
        }

        self.db.update(writes).await?;
        Ok(())
    }
}
