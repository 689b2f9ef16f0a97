//! The multi-source read path: row-store reader, overlay hot cache,
//! change-notification subscriber, and the store facade that fans out
//! across all of them (§4.2-§4.5).

pub mod facade;
pub mod overlay;
pub mod rowstore;
pub mod subscriber;

pub use facade::{FanOutResult, InstanceKind, RowStoreInstance, StoreFacade};
pub use overlay::{DecodeErrorPolicy, OverlayCache, OverlaySnapshot, DEFAULT_DECODE_CONCURRENCY};
pub use rowstore::{
    RocksDbRowStore, RowSet, RowStoreClient, RowStoreError, RowStoreResult, DEFAULT_CHUNK_SIZE,
};
pub use subscriber::{ChangeNotificationSubscriber, OverlayLoadError, OverlaySource};
