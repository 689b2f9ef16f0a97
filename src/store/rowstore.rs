//! Row-store reader (§4.2): batched, bounded-parallel range reads against
//! one configured row-store instance.
//!
//! `RowStoreClient` is the narrow, out-of-scope collaborator boundary —
//! the real row-store client library lives outside this crate; we depend
//! only on `read_row`/`read_range`. `RocksDbRowStore` is a concrete,
//! testable implementation backing that trait with a local RocksDB
//! instance, adapted from the teacher's persistence layer, so the fan-out
//! and cancellation logic above it can be exercised without a live
//! cluster.

use crate::codec::CodecError;
use crate::key::Token;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Recommended chunk size for batched range reads (§4.2, §5).
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// The column family every row-store instance reads a single qualifier
/// from (§6 "one, named by configuration").
pub const ROW_STORE_COLUMN_FAMILY: &str = "csv";

#[derive(Error, Debug)]
pub enum RowStoreError {
    #[error("row-store fetch failed: {0}")]
    Fetch(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("column family not found: {0}")]
    ColumnFamily(String),
}

pub type RowStoreResult<T> = Result<T, RowStoreError>;

/// Either exact keys or key ranges. Both forms are supported, never mixed
/// within a single call (§4.2).
#[derive(Debug, Clone)]
pub enum RowSet {
    Keys(Vec<String>),
    Ranges(Vec<(String, String)>),
}

impl RowSet {
    pub fn len(&self) -> usize {
        match self {
            RowSet::Keys(k) => k.len(),
            RowSet::Ranges(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn chunks(&self, size: usize) -> Vec<RowSet> {
        match self {
            RowSet::Keys(keys) => keys
                .chunks(size.max(1))
                .map(|c| RowSet::Keys(c.to_vec()))
                .collect(),
            RowSet::Ranges(ranges) => ranges
                .chunks(size.max(1))
                .map(|c| RowSet::Ranges(c.to_vec()))
                .collect(),
        }
    }
}

/// Narrow row-store client boundary. One instance == one named, ordered
/// column family / table (§3).
#[async_trait]
pub trait RowStoreClient: Send + Sync {
    async fn read_row(&self, key: &str) -> RowStoreResult<Option<Vec<u8>>>;
    async fn read_range(&self, start: &str, end: &str) -> RowStoreResult<Vec<(String, Vec<u8>)>>;
}

/// Read a row-set from one row-store instance in bounded-parallel batches
/// (§4.2). `decode` is caller-supplied; a decode error drops the row and
/// continues, a fetch error is fatal for the whole call and cancels the
/// remaining in-flight chunks (short-circuit scope per §9).
pub async fn read_rows<R, D, T>(
    client: Arc<dyn RowStoreClient>,
    row_set: RowSet,
    decode: D,
    token_fn: T,
) -> RowStoreResult<std::collections::HashMap<Token, R>>
where
    R: Send + 'static,
    D: Fn(&str, &[u8]) -> Result<R, CodecError> + Send + Sync + 'static,
    T: Fn(&str) -> Token + Send + Sync + 'static,
{
    read_rows_chunked(client, row_set, decode, token_fn, DEFAULT_CHUNK_SIZE).await
}

pub async fn read_rows_chunked<R, D, T>(
    client: Arc<dyn RowStoreClient>,
    row_set: RowSet,
    decode: D,
    token_fn: T,
    chunk_size: usize,
) -> RowStoreResult<std::collections::HashMap<Token, R>>
where
    R: Send + 'static,
    D: Fn(&str, &[u8]) -> Result<R, CodecError> + Send + Sync + 'static,
    T: Fn(&str) -> Token + Send + Sync + 'static,
{
    let mut results = std::collections::HashMap::new();
    if row_set.is_empty() {
        return Ok(results);
    }

    let decode = Arc::new(decode);
    let token_fn = Arc::new(token_fn);
    let cancelled = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<(Token, R)>(row_set.len().max(1));

    let chunks = row_set.chunks(chunk_size);
    let mut join_set = tokio::task::JoinSet::new();

    for chunk in chunks {
        let client = Arc::clone(&client);
        let decode = Arc::clone(&decode);
        let token_fn = Arc::clone(&token_fn);
        let cancelled = Arc::clone(&cancelled);
        let tx = tx.clone();
        join_set.spawn(async move {
            if cancelled.load(Ordering::Relaxed) {
                return Ok(());
            }
            let rows = fetch_chunk(client.as_ref(), &chunk).await;
            let rows = match rows {
                Ok(r) => r,
                Err(e) => {
                    cancelled.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            };
            for (key, bytes) in rows {
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }
                if bytes.is_empty() {
                    continue;
                }
                match decode(&key, &bytes) {
                    Ok(record) => {
                        let token = token_fn(&key);
                        if tx.send((token, record)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(key = %key, error = %e, "dropping row: decode error");
                    }
                }
            }
            Ok::<(), RowStoreError>(())
        });
    }
    drop(tx);

    let mut first_error = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(join_err) => {
                warn!(error = %join_err, "row-store fetch task panicked");
                if first_error.is_none() {
                    first_error = Some(RowStoreError::Fetch(join_err.to_string()));
                }
            }
        }
    }

    while let Some((token, record)) = rx.recv().await {
        results.insert(token, record);
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    Ok(results)
}

async fn fetch_chunk(
    client: &dyn RowStoreClient,
    chunk: &RowSet,
) -> RowStoreResult<Vec<(String, Vec<u8>)>> {
    match chunk {
        RowSet::Keys(keys) => {
            let mut rows = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(bytes) = client.read_row(key).await? {
                    rows.push((key.clone(), bytes));
                }
            }
            Ok(rows)
        }
        RowSet::Ranges(ranges) => {
            let mut rows = Vec::new();
            for (start, end) in ranges {
                rows.extend(client.read_range(start, end).await?);
            }
            Ok(rows)
        }
    }
}

/// RocksDB-backed `RowStoreClient`, standing in for the real row-store
/// client library this crate treats as external. One qualifier per row,
/// stored under `ROW_STORE_COLUMN_FAMILY` (adapted from the teacher's
/// `persistence::storage::PersistentStorage::open`).
pub struct RocksDbRowStore {
    db: Arc<DB>,
}

impl RocksDbRowStore {
    pub fn open(path: impl AsRef<Path>) -> RowStoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(
            ROW_STORE_COLUMN_FAMILY,
            Options::default(),
        )];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn put(&self, key: &str, value: &[u8]) -> RowStoreResult<()> {
        let cf = self
            .db
            .cf_handle(ROW_STORE_COLUMN_FAMILY)
            .ok_or_else(|| RowStoreError::ColumnFamily(ROW_STORE_COLUMN_FAMILY.to_string()))?;
        self.db.put_cf(&cf, key.as_bytes(), value)?;
        Ok(())
    }
}

#[async_trait]
impl RowStoreClient for RocksDbRowStore {
    async fn read_row(&self, key: &str) -> RowStoreResult<Option<Vec<u8>>> {
        let cf = self
            .db
            .cf_handle(ROW_STORE_COLUMN_FAMILY)
            .ok_or_else(|| RowStoreError::ColumnFamily(ROW_STORE_COLUMN_FAMILY.to_string()))?;
        Ok(self.db.get_cf(&cf, key.as_bytes())?)
    }

    async fn read_range(&self, start: &str, end: &str) -> RowStoreResult<Vec<(String, Vec<u8>)>> {
        let cf = self
            .db
            .cf_handle(ROW_STORE_COLUMN_FAMILY)
            .ok_or_else(|| RowStoreError::ColumnFamily(ROW_STORE_COLUMN_FAMILY.to_string()))?;
        let iter = self
            .db
            .iterator_cf(&cf, rocksdb::IteratorMode::From(start.as_bytes(), rocksdb::Direction::Forward));
        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            let key_str = String::from_utf8_lossy(&key).to_string();
            if key_str.as_str() >= end {
                break;
            }
            out.push((key_str, value.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TriplesRecord;
    use tempfile::TempDir;

    fn noop_decode(_key: &str, bytes: &[u8]) -> Result<TriplesRecord, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::from)
    }

    #[tokio::test]
    async fn missing_row_is_absent_not_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksDbRowStore::open(dir.path()).unwrap());
        let result = read_rows(
            store,
            RowSet::Keys(vec!["triples/does-not-exist".to_string()]),
            noop_decode,
            crate::key::dcid_heuristic_token,
        )
        .await
        .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn decode_error_drops_row_but_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksDbRowStore::open(dir.path()).unwrap());
        store.put("triples/geoId/06", b"not valid json").unwrap();
        let result = read_rows(
            Arc::clone(&store) as Arc<dyn RowStoreClient>,
            RowSet::Keys(vec!["triples/geoId/06".to_string()]),
            noop_decode,
            crate::key::dcid_heuristic_token,
        )
        .await
        .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn decodes_present_row() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksDbRowStore::open(dir.path()).unwrap());
        store
            .put("triples/geoId/06", br#"{"triples":[]}"#)
            .unwrap();
        let result = read_rows(
            Arc::clone(&store) as Arc<dyn RowStoreClient>,
            RowSet::Keys(vec!["triples/geoId/06".to_string()]),
            noop_decode,
            crate::key::dcid_heuristic_token,
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 1);
    }
}
