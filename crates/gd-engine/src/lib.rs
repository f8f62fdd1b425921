//! Guardian Policy Engine
//!
//! This crate keeps a host enforcement surface in step with compiled filter
//! lists and user overrides, and applies the per-site policy to page events.
//!
//! # Modules
//!
//! - `engine`: The coordinator and its event dispatch
//! - `sync`: Capacity-bounded full replace of the active rule set
//! - `overrides`: User allow/block rules in the reserved ID range
//! - `policy`: Global switch and per-host whitelist
//! - `host`: Traits for the host primitives, with in-memory versions
//! - `store`: Persisted key/value state

pub mod config;
pub mod engine;
pub mod events;
pub mod fetcher;
pub mod host;
pub mod overrides;
pub mod policy;
pub mod popup;
pub mod state;
pub mod store;
pub mod sync;
pub mod tabs;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineError, EngineStatus, SiteStatus};
pub use events::{EngineEvent, EventOutcome, PagePush, RefreshReport};
pub use fetcher::{FetchError, HttpFetcher, ListFetcher, StaticFetcher};
pub use host::{HostBindings, HostError, PageMessage, TabId};
pub use overrides::{OverrideError, OverrideRule, OverrideStore};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
pub use sync::{SyncError, SyncOutcome, SyncReport};
