//! Reconciles a local TV library against remote episode metadata and
//! executes the resulting worklist.
//!
//! - [`source`] fetches show graphs from TheTVDB and TVmaze.
//! - [`finder`] turns indexer search results into download actions.
//! - [`identifier`] decides which images and sidecar files are stale.
//! - [`engine`] runs the queued actions with pause, cancel and progress.

pub mod config;
pub mod engine;
pub mod finder;
pub mod identifier;
pub mod library;
pub mod logging;
pub mod source;


pub use config::AppConfig;
