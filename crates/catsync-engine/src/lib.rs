//! Feed-to-catalog reconciliation: fetch a feed, map records, diff against
//! the remote catalog and the tracking table, then write creates, updates
//! and deletes through direct calls or bulk jobs.

pub mod bulk;
pub mod categorizer;
pub mod coordinator;
pub mod direct;
pub mod error;
pub mod feed;
pub mod mapper;
pub mod outcome;
pub mod resolver;
pub mod store;
pub mod strategy;
pub mod sweeper;
pub mod sync;

pub use coordinator::{RunCoordinator, RunGuard, RunSync, TriggerOutcome};
pub use error::SyncError;
pub use feed::{extract_records, FeedFetcher, SourceFetcher};
pub use mapper::{map_record, MappedEntity, SkipReason};
pub use store::{
    ConfigStore, MemoryStore, PgStore, StoreError, SyncLogEntry, SyncLogStore, TrackingRecord,
    TrackingStore,
};
pub use sweeper::CleanupSummary;
pub use sync::{EngineSettings, RunOptions, RunSummary, Stores, SyncEngine, DEFAULT_LIMIT};
