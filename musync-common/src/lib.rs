//! # musync common library
//!
//! Shared code for the musync workspace:
//! - Common error and result types
//! - Bootstrap configuration loading and root folder resolution
//! - Atomic file writes used by every persisted artifact
//! - Tracing initialisation
//! - Time helpers

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
