//! # Document Store
//!
//! The persistence boundary of the lifecycle engine: one record per
//! document keyed by access key, with compare-and-swap commits.
//!
//! The CAS discipline is what makes the engine's optimistic concurrency
//! sound across processes: an operation reads a record at a version,
//! performs its I/O without holding anything, and commits against the
//! version it read — a conflicting writer makes the commit fail instead
//! of silently clobbering state.
//!
//! [`MemoryStore`] is the reference implementation. Production
//! deployments put a database behind the same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use mdfe_core::AccessKey;
use thiserror::Error;

use crate::document::{DocumentRecord, DocumentStatus};

/// Errors from document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the access key.
    #[error("document not found: {access_key}")]
    NotFound {
        /// The access key that was looked up.
        access_key: AccessKey,
    },

    /// A record already exists for the access key.
    #[error("document already exists: {access_key}")]
    AlreadyExists {
        /// The access key that collided.
        access_key: AccessKey,
    },

    /// The record changed since it was read.
    #[error("version conflict for {access_key}: expected {expected}, actual {actual}")]
    VersionConflict {
        /// The access key being committed.
        access_key: AccessKey,
        /// The version the writer read.
        expected: u64,
        /// The version currently stored.
        actual: u64,
    },

    /// Backend failure (connectivity, serialization, …).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A record together with the store version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    /// Monotonically increasing per-record version.
    pub version: u64,
    /// The stored value.
    pub value: T,
}

/// The persistence trait the engine runs against.
///
/// Implementations must provide compare-and-swap semantics on
/// [`DocumentStore::commit()`]; everything else in the engine's
/// concurrency model builds on that.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record. Fails if the access key already exists.
    async fn insert(&self, record: DocumentRecord) -> Result<(), StoreError>;

    /// Load a record with its current version.
    async fn load(&self, key: &AccessKey) -> Result<Versioned<DocumentRecord>, StoreError>;

    /// Commit a record read at `expected_version`. Returns the new
    /// version on success, [`StoreError::VersionConflict`] if another
    /// writer got there first.
    async fn commit(
        &self,
        expected_version: u64,
        record: DocumentRecord,
    ) -> Result<u64, StoreError>;

    /// Access keys of every document currently in the given status.
    async fn list_by_status(&self, status: DocumentStatus) -> Result<Vec<AccessKey>, StoreError>;
}

/// In-memory reference store over a concurrent map.
///
/// Per-key atomicity comes from the map's entry locking: an insert or
/// commit holds the entry while it checks and writes, so CAS is sound
/// under concurrent tasks.
#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<String, Versioned<DocumentRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let key = record.access_key.as_str().to_string();
        match self.documents.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                access_key: record.access_key,
            }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Versioned {
                    version: 1,
                    value: record,
                });
                Ok(())
            }
        }
    }

    async fn load(&self, key: &AccessKey) -> Result<Versioned<DocumentRecord>, StoreError> {
        self.documents
            .get(key.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                access_key: key.clone(),
            })
    }

    async fn commit(
        &self,
        expected_version: u64,
        record: DocumentRecord,
    ) -> Result<u64, StoreError> {
        let key = record.access_key.as_str().to_string();
        let mut entry = self
            .documents
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound {
                access_key: record.access_key.clone(),
            })?;
        if entry.version != expected_version {
            return Err(StoreError::VersionConflict {
                access_key: record.access_key,
                expected: expected_version,
                actual: entry.version,
            });
        }
        entry.version += 1;
        entry.value = record;
        Ok(entry.version)
    }

    async fn list_by_status(&self, status: DocumentStatus) -> Result<Vec<AccessKey>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.value.status == status)
            .map(|entry| entry.value.access_key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Created, ManifestDocument};
    use mdfe_core::{AccessKeyFields, CanonicalBytes, Cnpj, EmissionType, Timestamp, Uf};

    fn record(number: u32) -> DocumentRecord {
        let emitted_at = Timestamp::parse("2026-08-04T10:00:00Z").unwrap();
        let key = AccessKey::build(&AccessKeyFields {
            uf: Uf::SP,
            emitted_at,
            issuer: Cnpj::new("12345678000190").unwrap(),
            series: 1,
            number,
            emission_type: EmissionType::Normal,
            entropy_code: number,
        })
        .unwrap();
        let form = CanonicalBytes::new(&serde_json::json!({"chMDFe": key.as_str()})).unwrap();
        ManifestDocument::<Created>::new(key, form, emitted_at).into()
    }

    #[tokio::test]
    async fn insert_then_load() {
        let store = MemoryStore::new();
        let rec = record(1);
        let key = rec.access_key.clone();
        store.insert(rec).await.unwrap();

        let loaded = store.load(&key).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.value.access_key, key);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryStore::new();
        store.insert(record(1)).await.unwrap();
        let err = store.insert(record(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let store = MemoryStore::new();
        let key = record(9).access_key;
        assert!(matches!(
            store.load(&key).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn commit_bumps_version() {
        let store = MemoryStore::new();
        let rec = record(1);
        let key = rec.access_key.clone();
        store.insert(rec).await.unwrap();

        let loaded = store.load(&key).await.unwrap();
        let v2 = store.commit(loaded.version, loaded.value).await.unwrap();
        assert_eq!(v2, 2);
        assert_eq!(store.load(&key).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn stale_commit_conflicts() {
        let store = MemoryStore::new();
        let rec = record(1);
        let key = rec.access_key.clone();
        store.insert(rec).await.unwrap();

        let first = store.load(&key).await.unwrap();
        let second = store.load(&key).await.unwrap();

        store.commit(first.version, first.value).await.unwrap();
        let err = store
            .commit(second.version, second.value)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = MemoryStore::new();
        let mut submitting = record(1);
        submitting
            .try_transition(DocumentStatus::Signed, None)
            .unwrap();
        submitting
            .try_transition(DocumentStatus::Submitting, None)
            .unwrap();
        let submitting_key = submitting.access_key.clone();
        store.insert(submitting).await.unwrap();
        store.insert(record(2)).await.unwrap();

        let listed = store
            .list_by_status(DocumentStatus::Submitting)
            .await
            .unwrap();
        assert_eq!(listed, vec![submitting_key]);

        let created = store.list_by_status(DocumentStatus::Created).await.unwrap();
        assert_eq!(created.len(), 1);
    }
}
