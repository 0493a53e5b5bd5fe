mod candidate;
mod feed;
mod matcher;

pub use candidate::{
    CandidateFinder, FinderReport, ScanSettings, ScanType, SearchProgress, dedupe_by_destination,
};
pub use feed::{IndexerClient, parse_feed};
pub use matcher::EpisodeMatcher;

/// Finder result type
pub type Result<T> = std::result::Result<T, FinderError>;

/// Finder error types
#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Indexer returned HTTP {status}")]
    Status { status: u16 },

    #[error("Feed error: {0}")]
    Feed(#[from] quick_xml::DeError),

    #[error("Configuration error: {0}")]
    Config(String),
}
