//! Album-year caching
//!
//! [`key`] owns normalization; [`tiered`] layers memory over the persistent
//! album-year and negative-result repositories.

pub mod key;
pub mod tiered;

pub use key::{normalize, AlbumKey};
pub use tiered::{CacheLookup, CacheTier, TieredCache, TieredCacheConfig};
