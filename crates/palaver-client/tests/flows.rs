//! End-to-end flows through two clients sharing one backend.

use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use palaver_client::{AcceptOutcome, ChatClient, ClientConfig, ClientError};
use palaver_shared::{ChatId, Presence, RelationshipStatus, UserId};
use palaver_store::{AuthService, BlobStore, RealtimeDb, StorePath};

struct Backend {
    db: Arc<RealtimeDb>,
    auth: Arc<AuthService>,
    blobs: Arc<BlobStore>,
    _blob_dir: TempDir,
}

impl Backend {
    async fn new() -> Result<Self> {
        let blob_dir = tempfile::tempdir()?;
        Ok(Self {
            db: RealtimeDb::new(),
            auth: Arc::new(AuthService::new()),
            blobs: Arc::new(
                BlobStore::new(blob_dir.path().to_path_buf(), 5 * 1024 * 1024).await?,
            ),
            _blob_dir: blob_dir,
        })
    }

    fn client(&self) -> ChatClient {
        ChatClient::new(
            Arc::clone(&self.db),
            Arc::clone(&self.auth),
            Arc::clone(&self.blobs),
            ClientConfig::default(),
        )
    }

    async fn signed_up(&self, email: &str, username: &str) -> Result<(ChatClient, UserId)> {
        let mut client = self.client();
        let principal = client.sign_up(email, "hunter22", username).await?;
        Ok((client, principal.uid))
    }
}

async fn befriend(
    alice: &ChatClient,
    bob: &ChatClient,
    alice_uid: &UserId,
    bob_uid: &UserId,
) -> Result<ChatId> {
    alice.send_friend_request(bob_uid).await?;
    assert_eq!(
        bob.accept_friend_request(alice_uid).await?,
        AcceptOutcome::Accepted
    );
    Ok(ChatId::between(alice_uid, bob_uid))
}

#[tokio::test]
async fn accepting_a_request_creates_edges_chat_and_directory_entries() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    alice.send_friend_request(&bob_uid).await?;
    assert_eq!(
        alice.relationship_status(&bob_uid).await?,
        RelationshipStatus::PendingSent
    );
    assert_eq!(
        bob.relationship_status(&alice_uid).await?,
        RelationshipStatus::PendingReceived
    );

    assert_eq!(
        bob.accept_friend_request(&alice_uid).await?,
        AcceptOutcome::Accepted
    );

    // Both edge directions exist and carry the counterpart's username.
    let alices_friends = alice.list_friends().await?;
    let bobs_friends = bob.list_friends().await?;
    assert_eq!(alices_friends.len(), 1);
    assert_eq!(alices_friends[0].0, bob_uid);
    assert_eq!(alices_friends[0].1.username, "Bob");
    assert_eq!(bobs_friends[0].1.username, "Alice");
    assert_eq!(
        alice.relationship_status(&bob_uid).await?,
        RelationshipStatus::Friends
    );

    // The request row is consumed.
    assert!(bob.list_friend_requests().await?.is_empty());

    // The conversation exists with exactly the two participants.
    let chat = ChatId::between(&alice_uid, &bob_uid);
    let participants = backend
        .db
        .get(&StorePath::from_segments([
            "chats",
            chat.as_str(),
            "participants",
        ])?)
        .await?
        .expect("participants map");
    assert_eq!(participants.as_object().map(|m| m.len()), Some(2));
    assert_eq!(participants[alice_uid.as_str()], serde_json::json!(true));
    assert_eq!(participants[bob_uid.as_str()], serde_json::json!(true));

    // Both directories list the conversation, unread.
    let mut alice = alice;
    let entries = alice.subscribe_directory().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, chat);
    assert!(!entries[0].1.unread);
    Ok(())
}

#[tokio::test]
async fn accepting_a_consumed_request_is_a_no_op() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    befriend(&alice, &bob, &alice_uid, &bob_uid).await?;
    assert_eq!(
        bob.accept_friend_request(&alice_uid).await?,
        AcceptOutcome::AlreadyResolved
    );
    // And for a request that never existed.
    assert_eq!(
        alice.accept_friend_request(&bob_uid).await?,
        AcceptOutcome::AlreadyResolved
    );
    Ok(())
}

#[tokio::test]
async fn resending_a_request_keeps_a_single_row() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, _) = backend.signed_up("alice@example.com", "Alice").await?;
    let (bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    alice.send_friend_request(&bob_uid).await?;
    let first = bob.list_friend_requests().await?;
    assert_eq!(first.len(), 1);
    let first_timestamp = first[0].1.timestamp;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    alice.send_friend_request(&bob_uid).await?;

    let requests = bob.list_friend_requests().await?;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1.username, "Alice");
    // The overwrite carries the second send's server timestamp.
    assert!(requests[0].1.timestamp > first_timestamp);
    Ok(())
}

#[tokio::test]
async fn rejecting_clears_the_pending_state() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    alice.send_friend_request(&bob_uid).await?;
    bob.reject_friend_request(&alice_uid).await?;

    assert_eq!(
        alice.relationship_status(&bob_uid).await?,
        RelationshipStatus::None
    );
    assert!(bob.list_friends().await?.is_empty());
    // Rejecting again is a no-op.
    bob.reject_friend_request(&alice_uid).await?;
    Ok(())
}

#[tokio::test]
async fn messages_flow_with_history_preview_and_unread_flags() -> Result<()> {
    let backend = Backend::new().await?;
    let (mut alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (mut bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    let chat = befriend(&alice, &bob, &alice_uid, &bob_uid).await?;

    alice.open_chat(chat.clone()).await?;
    alice.send_message("hello there").await?;

    // Bob sees the send as unread in his directory.
    let entries = bob.subscribe_directory().await?;
    assert!(entries[0].1.unread);
    assert_eq!(entries[0].1.last_message.as_deref(), Some("hello there"));

    // Opening the conversation replays the history and clears the flag.
    bob.open_chat(chat.clone()).await?;
    let message = bob.try_recv_message().expect("history replay");
    assert_eq!(message.text, "hello there");
    assert_eq!(message.sender, alice_uid);
    assert_eq!(message.sender_name, "Alice");
    assert!(message.timestamp > 0);

    let entries = bob.subscribe_directory().await?;
    assert!(!entries[0].1.unread);

    // Live delivery in the other direction. The sender sees their own
    // message first.
    let echo = alice.recv_message().await.expect("own message echo");
    assert_eq!(echo.text, "hello there");
    bob.send_message("hi yourself").await?;
    let reply = alice.recv_message().await.expect("live message");
    assert_eq!(reply.text, "hi yourself");
    assert_eq!(reply.sender, bob_uid);
    Ok(())
}

#[tokio::test]
async fn whitespace_messages_are_rejected_before_any_write() -> Result<()> {
    let backend = Backend::new().await?;
    let (mut alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    let chat = befriend(&alice, &bob, &alice_uid, &bob_uid).await?;
    alice.open_chat(chat.clone()).await?;

    let before = backend
        .db
        .get(&StorePath::from_segments(["userChats", bob_uid.as_str()])?)
        .await?;

    assert!(matches!(
        alice.send_message("   \n\t ").await,
        Err(ClientError::EmptyMessage)
    ));

    let messages = backend
        .db
        .get(&StorePath::from_segments([
            "chats",
            chat.as_str(),
            "messages",
        ])?)
        .await?;
    assert!(messages.is_none());
    let after = backend
        .db
        .get(&StorePath::from_segments(["userChats", bob_uid.as_str()])?)
        .await?;
    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn sending_without_an_open_conversation_fails() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, _) = backend.signed_up("alice@example.com", "Alice").await?;
    assert!(matches!(
        alice.send_message("hello").await,
        Err(ClientError::NoActiveChat)
    ));
    Ok(())
}

#[tokio::test]
async fn closed_conversations_stop_delivering() -> Result<()> {
    let backend = Backend::new().await?;
    let (mut alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (mut bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    let chat = befriend(&alice, &bob, &alice_uid, &bob_uid).await?;
    alice.open_chat(chat.clone()).await?;
    bob.open_chat(chat.clone()).await?;
    alice.close_chat();

    bob.send_message("anyone there?").await?;
    assert!(alice.try_recv_message().is_none());
    Ok(())
}

#[tokio::test]
async fn directory_reports_additions_after_subscription() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (mut bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    assert!(bob.subscribe_directory().await?.is_empty());

    let chat = befriend(&alice, &bob, &alice_uid, &bob_uid).await?;
    match bob.recv_directory_event().await {
        Some(palaver_client::DirectoryEvent::Added { chat: added, .. }) => {
            assert_eq!(added, chat);
        }
        other => panic!("expected an addition, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn search_ranks_exact_then_match_position() -> Result<()> {
    let backend = Backend::new().await?;
    let (searcher, _) = backend.signed_up("search@example.com", "Searcher").await?;
    backend.signed_up("liz@example.com", "Liz").await?;
    backend.signed_up("lizzie@example.com", "Lizzie").await?;
    backend.signed_up("beth@example.com", "Elizabeth").await?;

    let results = searcher.search_users("liz").await?;
    let names: Vec<&str> = results.iter().map(|(_, r)| r.username.as_str()).collect();
    assert_eq!(names, ["Liz", "Lizzie", "Elizabeth"]);
    Ok(())
}

#[tokio::test]
async fn search_excludes_self_and_short_terms() -> Result<()> {
    let backend = Backend::new().await?;
    let (searcher, _) = backend.signed_up("liz@example.com", "Liz").await?;
    backend.signed_up("lizzie@example.com", "Lizzie").await?;

    let results = searcher.search_users("liz").await?;
    let names: Vec<&str> = results.iter().map(|(_, r)| r.username.as_str()).collect();
    assert_eq!(names, ["Lizzie"]);

    assert!(searcher.search_users("l").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn relationship_probe_degrades_to_unknown_when_offline() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, _) = backend.signed_up("alice@example.com", "Alice").await?;
    let (_, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    backend.db.set_online(false);
    assert_eq!(
        alice.relationship_status(&bob_uid).await?,
        RelationshipStatus::Unknown
    );
    Ok(())
}

#[tokio::test]
async fn username_resolution_survives_an_unreachable_store() -> Result<()> {
    let backend = Backend::new().await?;
    let mut client = backend.client();
    client
        .sign_up("carol@example.com", "hunter22", "Carol")
        .await?;

    backend.db.set_online(false);
    assert_eq!(client.resolve_username().await?, "Carol");

    // Back online, resolution settles on the stored value.
    backend.db.set_online(true);
    assert_eq!(client.resolve_username().await?, "Carol");
    assert_eq!(client.session().username(), Some("Carol"));
    Ok(())
}

#[tokio::test]
async fn deleting_an_account_removes_record_and_directory() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (mut bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    befriend(&alice, &bob, &alice_uid, &bob_uid).await?;
    bob.delete_account("hunter22").await?;

    assert!(backend
        .db
        .get(&StorePath::from_segments(["users", bob_uid.as_str()])?)
        .await?
        .is_none());
    assert!(backend
        .db
        .get(&StorePath::from_segments(["userChats", bob_uid.as_str()])?)
        .await?
        .is_none());
    assert!(bob.session().principal().is_none());

    // The search index no longer surfaces the deleted account.
    let results = alice.search_users("Bob").await?;
    assert!(results.is_empty());
    Ok(())
}

#[tokio::test]
async fn directory_reports_a_removal_exactly_once() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (mut bob, bob_uid) = backend.signed_up("bob@example.com", "Bob").await?;

    let chat = befriend(&alice, &bob, &alice_uid, &bob_uid).await?;
    let entries = bob.subscribe_directory().await?;
    assert_eq!(entries.len(), 1);

    let entry_path = StorePath::from_segments(["userChats", bob_uid.as_str(), chat.as_str()])?;
    backend.db.remove(&entry_path).await?;
    // Deleting an entry that is already gone must not surface again.
    backend.db.remove(&entry_path).await?;
    backend
        .db
        .set(
            &entry_path,
            serde_json::json!({ "timestamp": 1, "unread": false }),
        )
        .await?;

    match bob.recv_directory_event().await {
        Some(palaver_client::DirectoryEvent::Removed { chat: removed }) => {
            assert_eq!(removed, chat);
        }
        other => panic!("expected a removal, got {other:?}"),
    }
    // The very next event is the re-addition: the duplicate removal was
    // swallowed in between.
    match bob.recv_directory_event().await {
        Some(palaver_client::DirectoryEvent::Added { chat: added, .. }) => {
            assert_eq!(added, chat);
        }
        other => panic!("expected an addition, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn profile_rename_cannot_touch_another_signed_in_account() -> Result<()> {
    let backend = Backend::new().await?;
    let (mut alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    // Bob signed up last, so the shared provider's session is his.
    backend.signed_up("bob@example.com", "Bob").await?;

    alice.update_profile("Mallory", "").await?;

    // Alice's own record took the rename; Bob's provider account did not.
    let record = backend
        .db
        .get(&StorePath::from_segments([
            "users",
            alice_uid.as_str(),
            "username",
        ])?)
        .await?;
    assert_eq!(record, Some(serde_json::json!("Mallory")));

    let mut bob = backend.client();
    let principal = bob.sign_in("bob@example.com", "hunter22").await?;
    assert_eq!(principal.display_name.as_deref(), Some("Bob"));
    Ok(())
}

#[tokio::test]
async fn credential_changes_require_the_providers_session() -> Result<()> {
    let backend = Backend::new().await?;
    let (alice, _) = backend.signed_up("alice@example.com", "Alice").await?;
    backend.signed_up("bob@example.com", "Bob").await?;

    // The provider's session is Bob's; Alice's proof request must fail
    // instead of minting a proof against his account.
    assert!(matches!(
        alice.change_password("hunter22", "correct-horse").await,
        Err(ClientError::Auth(_))
    ));

    let mut bob = backend.client();
    bob.sign_in("bob@example.com", "hunter22").await?;
    Ok(())
}

#[tokio::test]
async fn signing_out_leaves_the_other_clients_session_intact() -> Result<()> {
    let backend = Backend::new().await?;
    let (mut alice, _) = backend.signed_up("alice@example.com", "Alice").await?;
    let (mut bob, _) = backend.signed_up("bob@example.com", "Bob").await?;

    alice.sign_out().await;

    // Bob never signed out; his provider-backed operations still work.
    bob.update_profile("Bob", "still here").await?;
    bob.change_password("hunter22", "correct-horse").await?;
    Ok(())
}

#[tokio::test]
async fn presence_toggles_through_sign_out() -> Result<()> {
    let backend = Backend::new().await?;
    let (mut alice, alice_uid) = backend.signed_up("alice@example.com", "Alice").await?;
    let (bob, _) = backend.signed_up("bob@example.com", "Bob").await?;

    let online = bob.list_users_by_presence(Presence::Online).await?;
    assert!(online.iter().any(|(uid, _)| uid == &alice_uid));

    alice.sign_out().await;
    let online = bob.list_users_by_presence(Presence::Online).await?;
    assert!(!online.iter().any(|(uid, _)| uid == &alice_uid));
    Ok(())
}
