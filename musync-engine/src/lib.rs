//! musync engine library
//!
//! Year resolution and library synchronization:
//! - Multi-provider release lookup with per-provider rate limiting
//! - Heuristic release scoring and confidence-gated year decisions
//! - Tiered album-year cache and pending-verification queue
//! - Integrity-checked library snapshot with incremental delta detection

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod delta;
pub mod error;
pub mod library;
pub mod pending;
pub mod pipeline;
pub mod providers;
pub mod rate_limit;
pub mod retry;
pub mod scoring;
pub mod snapshot;
pub mod store;
pub mod strategy;
pub mod types;

pub use crate::config::SyncConfig;
pub use crate::coordinator::{AlbumRequest, Resolution, ResolutionOutcome, YearResolutionCoordinator};
pub use crate::error::{ProviderError, SyncError, SyncResult};
pub use crate::pipeline::{SyncPipeline, SyncReport};
