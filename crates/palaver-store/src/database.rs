//! The keyed realtime store.
//!
//! [`RealtimeDb`] holds a hierarchical value tree behind a single lock and
//! pushes change notifications to registered watchers. The contract mirrors
//! the hosted service the application was written against:
//!
//! - every write is committed atomically, including multi-path [`update`]s
//!   that touch several subtrees at once;
//! - timestamps written through [`server_timestamp`] are resolved to epoch
//!   millis at commit time, so client clock skew never reorders the log;
//! - [`push`] assigns chronologically ordered insertion keys;
//! - a watched path delivers events in commit order, and a cancelled watch
//!   delivers nothing further.
//!
//! There is no cross-path ordering guarantee between two separate commits:
//! a consumer may observe a message append before or after the directory
//! mirror write that accompanies it.
//!
//! [`update`]: RealtimeDb::update
//! [`push`]: RealtimeDb::push

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::path::StorePath;
use crate::push_id::PushIdGenerator;
use crate::tree;

/// Sentinel resolved to the store's clock at commit time.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// A change notification delivered to a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Full snapshot of the watched path (`None` when nothing is stored
    /// there). Emitted on registration and after every commit touching the
    /// path.
    Value(Option<Value>),
    /// A direct child appeared under the watched path. Emitted once per
    /// existing child on registration, then live.
    ChildAdded { key: String, value: Value },
    /// A direct child disappeared from under the watched path.
    ChildRemoved { key: String },
}

#[derive(Debug, Clone, Copy)]
enum WatchKind {
    Value,
    Children { limit_last: Option<usize> },
}

struct Watcher {
    id: u64,
    path: StorePath,
    kind: WatchKind,
    tx: mpsc::UnboundedSender<StoreEvent>,
}

struct DbState {
    tree: Value,
    watchers: Vec<Watcher>,
    push_gen: PushIdGenerator,
    next_watch_id: u64,
}

/// In-memory realtime database. Cheap to share via `Arc`.
pub struct RealtimeDb {
    state: Mutex<DbState>,
    online: AtomicBool,
}

impl RealtimeDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DbState {
                tree: Value::Object(serde_json::Map::new()),
                watchers: Vec::new(),
                push_gen: PushIdGenerator::new(),
                next_watch_id: 0,
            }),
            online: AtomicBool::new(true),
        })
    }

    /// Simulate the backend dropping off the network. While offline every
    /// operation fails with [`StoreError::Offline`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        debug!(online, "store connectivity changed");
    }

    fn check_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Offline)
        }
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read the value at `path`, if any.
    pub async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        self.check_online()?;
        let state = self.state.lock().expect("db lock poisoned");
        Ok(tree::get_at(&state.tree, path).cloned())
    }

    /// Whether anything is stored at or under `path`.
    pub async fn exists(&self, path: &StorePath) -> Result<bool> {
        Ok(self.get(path).await?.is_some())
    }

    /// Read and deserialize the record at `path`.
    pub async fn get_record<T: DeserializeOwned>(&self, path: &StorePath) -> Result<Option<T>> {
        match self.get(path).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::MalformedRecord {
                    path: path.to_string(),
                    source,
                }),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Replace the subtree at `path`.
    pub async fn set(&self, path: &StorePath, value: Value) -> Result<()> {
        self.update([(path.clone(), Some(value))]).await
    }

    /// Delete the subtree at `path`. No-op if nothing is stored there.
    pub async fn remove(&self, path: &StorePath) -> Result<()> {
        self.update([(path.clone(), None)]).await
    }

    /// Apply several writes as one atomic commit.
    ///
    /// `None` deletes the path. Either every write lands or (when the store
    /// is offline) none does; watchers observe the combined result, never an
    /// intermediate state.
    pub async fn update<I>(&self, writes: I) -> Result<()>
    where
        I: IntoIterator<Item = (StorePath, Option<Value>)>,
    {
        self.check_online()?;
        let now = Self::now_millis();
        let mut state = self.state.lock().expect("db lock poisoned");
        let writes: Vec<(StorePath, Option<Value>)> = writes
            .into_iter()
            .map(|(path, value)| (path, value.map(|mut v| {
                resolve_server_values(&mut v, now);
                v
            })))
            .collect();
        commit(&mut state, &writes);
        Ok(())
    }

    /// Append `value` under `path` with a store-assigned insertion key.
    /// Returns the new key.
    pub async fn push(&self, path: &StorePath, value: Value) -> Result<String> {
        self.check_online()?;
        let now = Self::now_millis();
        let mut state = self.state.lock().expect("db lock poisoned");
        let key = state.push_gen.next_id(now);
        let child = path.child(&key)?;
        let mut value = value;
        resolve_server_values(&mut value, now);
        commit(&mut state, &[(child, Some(value))]);
        Ok(key)
    }

    // ------------------------------------------------------------------
    // Watches
    // ------------------------------------------------------------------

    /// Watch the value at `path`. The current snapshot is delivered
    /// immediately, then again after every commit touching the path.
    pub fn watch_value(self: &Arc<Self>, path: StorePath) -> Result<WatchHandle> {
        self.register(path, WatchKind::Value)
    }

    /// Watch the direct children of `path`. Existing children are replayed
    /// as [`StoreEvent::ChildAdded`] in key order (capped to the last
    /// `limit_last` when given; push keys sort chronologically, so that is
    /// "the most recent N"), then additions and removals stream live.
    pub fn watch_children(
        self: &Arc<Self>,
        path: StorePath,
        limit_last: Option<usize>,
    ) -> Result<WatchHandle> {
        self.register(path, WatchKind::Children { limit_last })
    }

    fn register(self: &Arc<Self>, path: StorePath, kind: WatchKind) -> Result<WatchHandle> {
        self.check_online()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("db lock poisoned");
        let id = state.next_watch_id;
        state.next_watch_id += 1;

        // Replay current state before any live event can be observed.
        match kind {
            WatchKind::Value => {
                let snapshot = tree::get_at(&state.tree, &path).cloned();
                let _ = tx.send(StoreEvent::Value(snapshot));
            }
            WatchKind::Children { limit_last } => {
                let mut children: Vec<(String, Value)> = tree::get_at(&state.tree, &path)
                    .and_then(Value::as_object)
                    .map(|map| {
                        map.iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                children.sort_by(|(a, _), (b, _)| a.cmp(b));
                if let Some(limit) = limit_last {
                    if children.len() > limit {
                        children.drain(..children.len() - limit);
                    }
                }
                for (key, value) in children {
                    let _ = tx.send(StoreEvent::ChildAdded { key, value });
                }
            }
        }

        state.watchers.push(Watcher { id, path, kind, tx });
        trace!(watch_id = id, "registered store watch");

        Ok(WatchHandle {
            id,
            db: Arc::clone(self),
            rx,
        })
    }

    fn unregister(&self, id: u64) {
        let mut state = self.state.lock().expect("db lock poisoned");
        state.watchers.retain(|w| w.id != id);
        trace!(watch_id = id, "cancelled store watch");
    }
}

/// Handle to an open watch. Events are pulled with [`recv`]; dropping the
/// handle (or calling [`cancel`]) unregisters the watch, after which no
/// further events are delivered.
///
/// [`recv`]: WatchHandle::recv
/// [`cancel`]: WatchHandle::cancel
pub struct WatchHandle {
    id: u64,
    db: Arc<RealtimeDb>,
    rx: mpsc::UnboundedReceiver<StoreEvent>,
}

impl WatchHandle {
    /// Next event, or `None` once the watch is cancelled and drained.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](WatchHandle::recv).
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }

    /// Tear the watch down explicitly.
    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.db.unregister(self.id);
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Commit machinery
// ---------------------------------------------------------------------------

/// Replace every `{".sv": "timestamp"}` sentinel in `value` with `now`.
fn resolve_server_values(value: &mut Value, now: i64) {
    if value == &server_timestamp() {
        *value = json!(now);
        return;
    }
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                resolve_server_values(v, now);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                resolve_server_values(v, now);
            }
        }
        _ => {}
    }
}

/// Apply `writes` to the tree and notify watchers of the combined effect.
fn commit(state: &mut DbState, writes: &[(StorePath, Option<Value>)]) {
    // Direct-child keys each children-watcher must re-examine, with their
    // pre-commit existence.
    let mut touched: Vec<Vec<(String, bool)>> = Vec::with_capacity(state.watchers.len());
    // Value watchers whose subtree intersects any write.
    let mut dirty: Vec<bool> = Vec::with_capacity(state.watchers.len());

    for watcher in &state.watchers {
        let mut keys: Vec<(String, bool)> = Vec::new();
        let mut is_dirty = false;
        for (path, _) in writes {
            let intersects = path.starts_with(&watcher.path) || watcher.path.starts_with(path);
            if !intersects {
                continue;
            }
            is_dirty = true;
            if let WatchKind::Children { .. } = watcher.kind {
                match path.strip_prefix(&watcher.path) {
                    Some([first, ..]) => {
                        // Write below one direct child.
                        if !keys.iter().any(|(k, _)| k == first) {
                            let child = watcher
                                .path
                                .child(first)
                                .expect("segment validated at write time");
                            let existed = tree::get_at(&state.tree, &child).is_some();
                            keys.push((first.clone(), existed));
                        }
                    }
                    _ => {
                        // The watched node itself (or an ancestor) is being
                        // replaced: every current child is in play.
                        if let Some(map) =
                            tree::get_at(&state.tree, &watcher.path).and_then(Value::as_object)
                        {
                            for key in map.keys() {
                                if !keys.iter().any(|(k, _)| k == key) {
                                    keys.push((key.clone(), true));
                                }
                            }
                        }
                    }
                }
            }
        }
        touched.push(keys);
        dirty.push(is_dirty);
    }

    for (path, value) in writes {
        match value {
            Some(v) => tree::set_at(&mut state.tree, path, v.clone()),
            None => {
                tree::remove_at(&mut state.tree, path);
            }
        }
    }

    let tree = &state.tree;
    for (idx, watcher) in state.watchers.iter().enumerate() {
        if !dirty[idx] {
            continue;
        }
        match watcher.kind {
            WatchKind::Value => {
                let snapshot = tree::get_at(tree, &watcher.path).cloned();
                let _ = watcher.tx.send(StoreEvent::Value(snapshot));
            }
            WatchKind::Children { .. } => {
                // Additionally, a whole-node replacement may have introduced
                // children that did not exist before the commit.
                let mut keys = touched[idx].clone();
                if let Some(map) = tree::get_at(tree, &watcher.path).and_then(Value::as_object) {
                    for (path, _) in writes {
                        if path.strip_prefix(&watcher.path).is_some_and(<[String]>::is_empty)
                            || watcher.path.starts_with(path)
                        {
                            for key in map.keys() {
                                if !keys.iter().any(|(k, _)| k == key) {
                                    keys.push((key.clone(), false));
                                }
                            }
                        }
                    }
                }
                for (key, existed_before) in keys {
                    let child = watcher
                        .path
                        .child(&key)
                        .expect("key came from the tree or a validated path");
                    let now = tree::get_at(tree, &child).cloned();
                    match (existed_before, now) {
                        (false, Some(value)) => {
                            let _ = watcher.tx.send(StoreEvent::ChildAdded { key, value });
                        }
                        (true, None) => {
                            let _ = watcher.tx.send(StoreEvent::ChildRemoved { key });
                        }
                        // Modified in place or still absent: child-level
                        // watchers only report membership changes.
                        _ => {}
                    }
                }
            }
        }
    }

    // Watchers whose receiver is gone deliver nowhere; drop them.
    state.watchers.retain(|w| !w.tx.is_closed());
}

impl std::fmt::Debug for RealtimeDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeDb")
            .field("online", &self.online.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> StorePath {
        StorePath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn set_get_round_trip() {
        let db = RealtimeDb::new();
        db.set(&path("users/u1/status"), json!("online"))
            .await
            .unwrap();
        assert_eq!(
            db.get(&path("users/u1")).await.unwrap(),
            Some(json!({"status": "online"}))
        );
    }

    #[tokio::test]
    async fn update_is_atomic_across_paths() {
        let db = RealtimeDb::new();
        db.set(&path("friendRequests/u1/u2"), json!({"username": "bob"}))
            .await
            .unwrap();

        db.update([
            (path("friends/u1/u2"), Some(json!({"username": "bob"}))),
            (path("friends/u2/u1"), Some(json!({"username": "amy"}))),
            (path("friendRequests/u1/u2"), None),
        ])
        .await
        .unwrap();

        assert!(db.exists(&path("friends/u1/u2")).await.unwrap());
        assert!(db.exists(&path("friends/u2/u1")).await.unwrap());
        assert!(!db.exists(&path("friendRequests/u1/u2")).await.unwrap());
    }

    #[tokio::test]
    async fn offline_fails_every_operation() {
        let db = RealtimeDb::new();
        db.set_online(false);
        assert!(matches!(
            db.get(&path("users/u1")).await,
            Err(StoreError::Offline)
        ));
        assert!(matches!(
            db.set(&path("users/u1"), json!(1)).await,
            Err(StoreError::Offline)
        ));
        db.set_online(true);
        assert!(db.get(&path("users/u1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_timestamp_resolves_to_millis() {
        let db = RealtimeDb::new();
        db.set(&path("users/u1"), json!({"created_at": server_timestamp()}))
            .await
            .unwrap();
        let created = db
            .get(&path("users/u1/created_at"))
            .await
            .unwrap()
            .unwrap();
        assert!(created.as_i64().unwrap() > 1_600_000_000_000);
    }

    #[tokio::test]
    async fn value_watch_sees_initial_and_live_snapshots() {
        let db = RealtimeDb::new();
        let mut watch = db.watch_value(path("users/u1")).unwrap();
        assert_eq!(watch.recv().await, Some(StoreEvent::Value(None)));

        db.set(&path("users/u1/status"), json!("online"))
            .await
            .unwrap();
        assert_eq!(
            watch.recv().await,
            Some(StoreEvent::Value(Some(json!({"status": "online"}))))
        );
    }

    #[tokio::test]
    async fn children_watch_replays_then_streams() {
        let db = RealtimeDb::new();
        db.set(&path("userChats/u1/a_b"), json!({"unread": false}))
            .await
            .unwrap();

        let mut watch = db.watch_children(path("userChats/u1"), None).unwrap();
        assert_eq!(
            watch.recv().await,
            Some(StoreEvent::ChildAdded {
                key: "a_b".into(),
                value: json!({"unread": false})
            })
        );

        db.set(&path("userChats/u1/a_c"), json!({"unread": true}))
            .await
            .unwrap();
        assert_eq!(
            watch.recv().await,
            Some(StoreEvent::ChildAdded {
                key: "a_c".into(),
                value: json!({"unread": true})
            })
        );

        db.remove(&path("userChats/u1/a_b")).await.unwrap();
        assert_eq!(
            watch.recv().await,
            Some(StoreEvent::ChildRemoved { key: "a_b".into() })
        );
    }

    #[tokio::test]
    async fn children_watch_modification_is_silent() {
        let db = RealtimeDb::new();
        db.set(&path("userChats/u1/a_b"), json!({"unread": false}))
            .await
            .unwrap();
        let mut watch = db.watch_children(path("userChats/u1"), None).unwrap();
        watch.recv().await; // replay

        db.set(&path("userChats/u1/a_b/unread"), json!(true))
            .await
            .unwrap();
        assert_eq!(watch.try_recv(), None);
    }

    #[tokio::test]
    async fn children_watch_limit_last_caps_replay() {
        let db = RealtimeDb::new();
        for i in 0..5 {
            db.push(&path("chats/a_b/messages"), json!({"n": i}))
                .await
                .unwrap();
        }
        let mut watch = db
            .watch_children(path("chats/a_b/messages"), Some(3))
            .unwrap();
        let mut seen = Vec::new();
        while let Some(ev) = watch.try_recv() {
            if let StoreEvent::ChildAdded { value, .. } = ev {
                seen.push(value["n"].as_i64().unwrap());
            }
        }
        assert_eq!(seen, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn cancelled_watch_goes_quiet() {
        let db = RealtimeDb::new();
        let mut watch = db.watch_children(path("chats/a_b/messages"), None).unwrap();
        assert_eq!(watch.try_recv(), None);
        watch.cancel();

        db.push(&path("chats/a_b/messages"), json!({"text": "hi"}))
            .await
            .unwrap();
        // The watcher registry no longer holds the sender.
        let state = db.state.lock().unwrap();
        assert!(state.watchers.is_empty());
    }

    #[tokio::test]
    async fn push_keys_are_ordered() {
        let db = RealtimeDb::new();
        let k1 = db.push(&path("chats/a_b/messages"), json!(1)).await.unwrap();
        let k2 = db.push(&path("chats/a_b/messages"), json!(2)).await.unwrap();
        assert!(k1 < k2);
    }
}
