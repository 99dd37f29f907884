//! Durable storage for the throttle counter
//!
//! Every instance of remaining-votes running on one machine shares a single
//! integer, the throttle debt in milliseconds. It lives in a string key-value
//! [`Storage`] under a fixed key and is read-modify-written without locking:
//! concurrent writers race and the last write wins.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// The key the throttle counter is stored under unless configured otherwise.
pub const DEFAULT_KEY: &str = "show-remaining-votes-throttle";

static STAGING_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Errors produced by [`Storage`] implementations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Reading a stored value failed.
    #[error("Failed to read {path:?}: {source}")]
    Read {
        /// Path of the value.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing a stored value failed.
    #[error("Failed to write {path:?}: {source}")]
    Write {
        /// Path of the value.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[async_trait]
/// String key-value storage shared by throttle users
pub trait Storage: Send + Sync {
    /// Fetch the value stored under `key`, `None` if nothing is stored.
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error>;
    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// Storage local to this process.
///
/// Clones share the same underlying map.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    items: Arc<Mutex<FxHashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create an empty `MemoryStorage`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage in a directory on disk, one file per key.
///
/// Processes pointed at the same directory share their values. Writes land in
/// a temporary sibling file which is then renamed over the value, a reader
/// sees either the old or the new value but never a partial one.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a new `FileStorage` rooted at `root`. The directory is created
    /// on first write.
    pub fn new<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { root: root.into() }
    }

    /// The directory values are stored in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Read { path, source }),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| Error::Write {
                path: self.root.clone(),
                source,
            })?;

        let path = self.path(key);
        let staging = self.root.join(format!(
            ".{key}.{pid}.{seq}",
            pid = std::process::id(),
            seq = STAGING_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&staging, value)
            .await
            .map_err(|source| Error::Write {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| Error::Write { path, source })
    }
}

/// The throttle counter, a non-negative number of milliseconds kept in
/// [`Storage`] as a decimal string.
#[derive(Debug, Clone)]
pub struct ThrottleStore<S> {
    storage: S,
    key: String,
}

impl<S> ThrottleStore<S>
where
    S: Storage,
{
    /// Create a new `ThrottleStore` keeping its counter under `key`.
    pub fn new<K>(storage: S, key: K) -> Self
    where
        K: Into<String>,
    {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// The key the counter is stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the counter.
    ///
    /// A missing, non-numeric or unreadable value reads as zero.
    pub async fn get(&self) -> u64 {
        match self.storage.get_item(&self.key).await {
            Ok(Some(value)) => value.trim().parse().unwrap_or_else(|_| {
                debug!("throttle value {value:?} is not numeric, treating as 0");
                0
            }),
            Ok(None) => 0,
            Err(err) => {
                warn!("failed to read throttle counter, treating as 0: {err}");
                0
            }
        }
    }

    /// Add `delta` to the counter, returning the stored value.
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying storage cannot be
    /// written.
    pub async fn increase(&self, delta: u64) -> Result<u64, Error> {
        let value = self.get().await.saturating_add(delta);
        self.storage.set_item(&self.key, &value.to_string()).await?;
        Ok(value)
    }

    /// Subtract `delta` from the counter, returning the stored value.
    ///
    /// A zero counter is left untouched. Otherwise the result is clamped at
    /// zero, the counter is never stored negative.
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying storage cannot be
    /// written.
    pub async fn decrease(&self, delta: u64) -> Result<u64, Error> {
        let current = self.get().await;
        if current == 0 {
            return Ok(0);
        }
        let value = current.saturating_sub(delta);
        self.storage.set_item(&self.key, &value.to_string()).await?;
        Ok(value)
    }

    /// Store zero, dropping all outstanding debt.
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying storage cannot be
    /// written.
    pub async fn reset(&self) -> Result<(), Error> {
        self.storage.set_item(&self.key, "0").await
    }
}

#[cfg(test)]
mod test {
    use proptest::{collection, prelude::*};

    use super::*;

    fn memory_store() -> ThrottleStore<MemoryStorage> {
        ThrottleStore::new(MemoryStorage::new(), DEFAULT_KEY)
    }

    #[tokio::test]
    async fn increase_then_decrease_returns_to_zero() {
        let store = memory_store();
        assert_eq!(store.increase(1000).await.expect("increase failed"), 1000);
        assert_eq!(store.get().await, 1000);
        assert_eq!(store.decrease(1000).await.expect("decrease failed"), 0);
        assert_eq!(store.get().await, 0);
    }

    #[tokio::test]
    async fn decrease_at_zero_stays_zero() {
        let storage = MemoryStorage::new();
        let store = ThrottleStore::new(storage.clone(), DEFAULT_KEY);
        assert_eq!(store.decrease(1000).await.expect("decrease failed"), 0);
        assert_eq!(store.get().await, 0);
        // Nothing was written for a zero counter.
        assert_eq!(
            storage.get_item(DEFAULT_KEY).await.expect("read failed"),
            None
        );
    }

    #[tokio::test]
    async fn decrease_past_zero_clamps() {
        let store = memory_store();
        store.increase(400).await.expect("increase failed");
        assert_eq!(store.decrease(1000).await.expect("decrease failed"), 0);
        assert_eq!(store.get().await, 0);
    }

    #[tokio::test]
    async fn non_numeric_value_reads_as_zero() {
        let storage = MemoryStorage::new();
        storage
            .set_item(DEFAULT_KEY, "NaN")
            .await
            .expect("write failed");
        let store = ThrottleStore::new(storage, DEFAULT_KEY);
        assert_eq!(store.get().await, 0);
        assert_eq!(store.increase(1000).await.expect("increase failed"), 1000);
    }

    #[tokio::test]
    async fn padded_value_is_parsed() {
        let storage = MemoryStorage::new();
        storage
            .set_item(DEFAULT_KEY, " 3000\n")
            .await
            .expect("write failed");
        let store = ThrottleStore::new(storage, DEFAULT_KEY);
        assert_eq!(store.get().await, 3000);
    }

    #[tokio::test]
    async fn reset_clears_debt() {
        let store = memory_store();
        store.increase(5000).await.expect("increase failed");
        store.reset().await.expect("reset failed");
        assert_eq!(store.get().await, 0);
    }

    #[tokio::test]
    async fn file_storage_is_shared_between_handles() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let root = dir.path().join("state");

        let first = ThrottleStore::new(FileStorage::new(&root), DEFAULT_KEY);
        let second = ThrottleStore::new(FileStorage::new(&root), DEFAULT_KEY);
        assert_eq!(first.get().await, 0);

        first.increase(1000).await.expect("increase failed");
        second.increase(1000).await.expect("increase failed");
        assert_eq!(first.get().await, 2000);

        let raw = std::fs::read_to_string(root.join(DEFAULT_KEY)).expect("value not on disk");
        assert_eq!(raw, "2000");

        second.decrease(1000).await.expect("decrease failed");
        assert_eq!(first.get().await, 1000);
    }

    #[tokio::test]
    async fn file_storage_missing_value_is_absent() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let storage = FileStorage::new(dir.path());
        assert_eq!(storage.get_item("nope").await.expect("read failed"), None);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Increase(u16),
        Decrease(u16),
    }

    fn ops() -> impl Strategy<Value = Vec<Op>> {
        collection::vec(
            prop_oneof![
                any::<u16>().prop_map(Op::Increase),
                any::<u16>().prop_map(Op::Decrease),
            ],
            0..64,
        )
    }

    // The stored counter tracks a saturating model exactly and equal
    // increases and decreases cancel out.
    proptest! {
        #[test]
        fn counter_matches_saturating_model(ops in ops()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime could not be built");
            runtime.block_on(async {
                let store = memory_store();
                let mut model: u64 = 0;
                for op in ops {
                    let stored = match op {
                        Op::Increase(d) => {
                            model += u64::from(d);
                            store.increase(u64::from(d)).await.expect("increase failed")
                        }
                        Op::Decrease(d) => {
                            model = model.saturating_sub(u64::from(d));
                            store.decrease(u64::from(d)).await.expect("decrease failed")
                        }
                    };
                    prop_assert_eq!(stored, model);
                    prop_assert_eq!(store.get().await, model);
                }
                Ok(())
            })?;
        }

        #[test]
        fn balanced_steps_return_to_zero(steps in 1_u16..64, step in 1_u64..10_000) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime could not be built");
            runtime.block_on(async {
                let store = memory_store();
                for _ in 0..steps {
                    store.increase(step).await.expect("increase failed");
                }
                for _ in 0..steps {
                    store.decrease(step).await.expect("decrease failed");
                }
                prop_assert_eq!(store.get().await, 0);
                Ok(())
            })?;
        }
    }
}
