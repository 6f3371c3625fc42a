//! Client-side sync core for club records: a local cache kept consistent
//! with the remote store through optimistic writes and realtime changes,
//! plus the pure helpers views need (ordering, filtering, CSV export).

pub mod cache;
pub mod collection;
pub mod error;
pub mod export;
pub mod gate;
pub mod http;
pub mod ordering;
pub mod record;
pub mod remote;
pub mod retry;
pub mod subscription;
pub mod view;

pub use cache::{Applied, CacheState, EntityCache};
pub use collection::{Collection, DetailView, FetchOutcome};
pub use error::StoreError;
pub use gate::{RequestGate, RequestState};
pub use http::HttpRemoteStore;
pub use record::{Fields, Pipelined, Record, Searchable};
pub use remote::{ChangeEvent, ChangeFeed, RemoteStore};
pub use retry::{with_retry, RetryConfig};
pub use subscription::RealtimeSubscription;
pub use view::{SortDirection, SortSpec, StatusFilter, ViewFilter, ViewMode};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod tests_support;
