// =============================================================================
// JSON Store — users, tracked pairs, and the dispatched-signal log
// =============================================================================
//
// One JSON document on disk, mirrored in memory behind a `RwLock`. A mutation
// is applied to a copy, the copy is saved with the tmp + rename pattern
// through `tokio::fs`, and only then does it replace the in-memory state. A
// failed save leaves memory untouched. Saves are serialized by `save_gate`
// so each one starts from the last committed document.
//
// Users and pairs are written by the chat front end; the relay only reads
// them. A subscriber is a user with `paid == true`. Unpaid users still count
// towards the globally tracked symbol set.
// =============================================================================

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::interfaces::{DispatchRecord, SignalLog, SubscriberDirectory};

/// Oldest log entries are dropped past this many.
const MAX_SIGNAL_LOG: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub paid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPair {
    pub user_id: i64,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub user_pairs: Vec<UserPair>,
    #[serde(default)]
    pub signals: Vec<DispatchRecord>,
}

pub struct JsonStore {
    path: PathBuf,
    data: RwLock<StoreData>,
    save_gate: tokio::sync::Mutex<()>,
}

impl JsonStore {
    /// Load the store at `path`, or start empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read store from {}", path.display()))?;
            let data: StoreData = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse store JSON from {}", path.display()))?;
            info!(
                path = %path.display(),
                users = data.users.len(),
                pairs = data.user_pairs.len(),
                signals = data.signals.len(),
                "store loaded"
            );
            data
        } else {
            info!(path = %path.display(), "no store file yet, starting empty");
            StoreData::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            save_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// The whole signal log, oldest first.
    pub fn signals(&self) -> Vec<DispatchRecord> {
        self.data.read().signals.clone()
    }

    /// The last `limit` log entries, newest first.
    pub fn recent_signals(&self, limit: usize) -> Vec<DispatchRecord> {
        self.data.read().signals.iter().rev().take(limit).cloned().collect()
    }

    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut StoreData) + Send,
    {
        let _gate = self.save_gate.lock().await;
        let mut next = self.data.read().clone();
        f(&mut next);
        self.persist(&next).await?;
        *self.data.write() = next;
        Ok(())
    }

    async fn persist(&self, data: &StoreData) -> Result<()> {
        let content = serde_json::to_string_pretty(data).context("failed to serialise store to JSON")?;
        let tmp_path = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, &content)
            .await
            .with_context(|| format!("failed to write tmp store to {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to rename tmp store to {}", self.path.display()))?;

        debug!(path = %self.path.display(), "store saved (atomic)");
        Ok(())
    }
}

// Front-end writes, used here to seed test stores.
#[cfg(test)]
impl JsonStore {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a user, or update the paid flag of an existing one.
    pub async fn upsert_user(&self, id: i64, paid: bool) -> Result<()> {
        self.mutate(move |d| match d.users.iter_mut().find(|u| u.id == id) {
            Some(user) => user.paid = paid,
            None => d.users.push(User { id, paid }),
        })
        .await
    }

    /// Track `symbol` for `user_id`. Symbols are stored uppercase; repeats
    /// are ignored.
    pub async fn add_pair(&self, user_id: i64, symbol: &str) -> Result<()> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            anyhow::bail!("empty symbol");
        }
        self.mutate(move |d| {
            let pair = UserPair { user_id, symbol };
            if !d.user_pairs.contains(&pair) {
                d.user_pairs.push(pair);
            }
        })
        .await
    }

    pub async fn remove_pair(&self, user_id: i64, symbol: &str) -> Result<()> {
        let symbol = symbol.trim().to_uppercase();
        self.mutate(move |d| d.user_pairs.retain(|p| !(p.user_id == user_id && p.symbol == symbol)))
            .await
    }
}

#[async_trait]
impl SubscriberDirectory for JsonStore {
    async fn list_symbols_with_subscribers(&self) -> Result<Vec<(String, i64)>> {
        let data = self.data.read();
        let paid: HashSet<i64> = data.users.iter().filter(|u| u.paid).map(|u| u.id).collect();
        Ok(data
            .user_pairs
            .iter()
            .filter(|p| paid.contains(&p.user_id))
            .map(|p| (p.symbol.clone(), p.user_id))
            .collect())
    }

    async fn list_globally_tracked_symbols(&self) -> Result<HashSet<String>> {
        Ok(self.data.read().user_pairs.iter().map(|p| p.symbol.clone()).collect())
    }
}

#[async_trait]
impl SignalLog for JsonStore {
    async fn record_dispatched_signal(&self, record: DispatchRecord) -> Result<()> {
        self.mutate(move |d| {
            d.signals.push(record);
            if d.signals.len() > MAX_SIGNAL_LOG {
                let excess = d.signals.len() - MAX_SIGNAL_LOG;
                d.signals.drain(..excess);
            }
        })
        .await
    }
}

impl std::fmt::Debug for JsonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("JsonStore")
            .field("path", &self.path)
            .field("users", &data.users.len())
            .field("user_pairs", &data.user_pairs.len())
            .field("signals", &data.signals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn temp_store(name: &str) -> (PathBuf, JsonStore) {
        let dir = std::env::temp_dir().join(format!("relay-store-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let store = JsonStore::open(dir.join("store.json")).unwrap();
        (dir, store)
    }

    fn record(id: i64, symbol: &str, ts: i64) -> DispatchRecord {
        DispatchRecord {
            subscriber_id: id,
            symbol: symbol.to_string(),
            side: Side::Long,
            price: 100.0,
            confidence: 95,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn only_paid_users_are_subscribers() {
        let (dir, store) = temp_store("paid");
        store.upsert_user(1, true).await.unwrap();
        store.upsert_user(2, false).await.unwrap();
        store.add_pair(1, "btcusdt").await.unwrap();
        store.add_pair(2, "ETHUSDT").await.unwrap();
        store.add_pair(3, "SOLUSDT").await.unwrap(); // unknown user

        let subs = store.list_symbols_with_subscribers().await.unwrap();
        assert_eq!(subs, vec![("BTCUSDT".to_string(), 1)]);

        let tracked = store.list_globally_tracked_symbols().await.unwrap();
        assert_eq!(tracked.len(), 3);
        assert!(tracked.contains("ETHUSDT"));

        store.upsert_user(2, true).await.unwrap();
        assert_eq!(store.list_symbols_with_subscribers().await.unwrap().len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn pairs_are_deduplicated_and_removable() {
        let (dir, store) = temp_store("pairs");
        store.upsert_user(1, true).await.unwrap();
        store.add_pair(1, "BTCUSDT").await.unwrap();
        store.add_pair(1, " btcusdt ").await.unwrap();
        assert_eq!(store.list_symbols_with_subscribers().await.unwrap().len(), 1);
        assert!(store.add_pair(1, "  ").await.is_err());

        store.remove_pair(1, "btcusdt").await.unwrap();
        assert!(store.list_symbols_with_subscribers().await.unwrap().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let (dir, store) = temp_store("reopen");
        store.upsert_user(7, true).await.unwrap();
        store.add_pair(7, "XRPUSDT").await.unwrap();
        store.record_dispatched_signal(record(7, "XRPUSDT", 1_700_000_000)).await.unwrap();
        let path = store.path().to_path_buf();
        drop(store);

        let reopened = JsonStore::open(&path).unwrap();
        assert_eq!(reopened.signals(), vec![record(7, "XRPUSDT", 1_700_000_000)]);
        assert_eq!(
            reopened.list_symbols_with_subscribers().await.unwrap(),
            vec![("XRPUSDT".to_string(), 7)]
        );
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn signal_log_is_bounded() {
        let (dir, store) = temp_store("bounded");
        for i in 0..(MAX_SIGNAL_LOG as i64 + 3) {
            store.data.write().signals.push(record(1, "BTCUSDT", i));
        }
        store.record_dispatched_signal(record(1, "BTCUSDT", -1)).await.unwrap();

        let signals = store.signals();
        assert_eq!(signals.len(), MAX_SIGNAL_LOG);
        assert_eq!(signals.last().unwrap().timestamp, -1);
        assert_eq!(signals[0].timestamp, 4);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn failed_save_leaves_memory_unchanged() {
        let dir = std::env::temp_dir().join(format!("relay-store-missing-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        // Parent directory never created, so every save fails.
        let store = JsonStore::open(dir.join("store.json")).unwrap();

        assert!(store.record_dispatched_signal(record(1, "BTCUSDT", 10)).await.is_err());
        assert!(store.signals().is_empty());
        assert!(store.upsert_user(1, true).await.is_err());
        assert!(store.list_symbols_with_subscribers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_records_are_all_kept() {
        let (dir, store) = temp_store("concurrent");
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.record_dispatched_signal(record(i, "ETHUSDT", i)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.signals().len(), 16);
        let reopened = JsonStore::open(store.path()).unwrap();
        assert_eq!(reopened.signals().len(), 16);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn recent_signals_are_newest_first() {
        let (dir, store) = temp_store("recent");
        for ts in 1..=4 {
            store.record_dispatched_signal(record(1, "BTCUSDT", ts)).await.unwrap();
        }
        let recent: Vec<i64> = store.recent_signals(2).iter().map(|r| r.timestamp).collect();
        assert_eq!(recent, vec![4, 3]);
        assert_eq!(store.recent_signals(10).len(), 4);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corrupt_file_is_error() {
        let dir = std::env::temp_dir().join(format!("relay-store-corrupt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonStore::open(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
