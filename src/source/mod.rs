mod cache;
mod http;
mod json;
mod resolver;
mod token;
mod traits;
mod types;

pub mod tvdb;
pub mod tvmaze;

pub use cache::{CacheStats, MetadataCache};
pub use http::{HttpClient, RequestError, RetryPolicy};
pub use json::Fields;
pub use resolver::{ForeignId, IdLookup, LookupHit, SeriesIdentityResolver};
pub use token::{Clock, SystemClock, TokenProvider, TokenState, TokenThresholds};
#[cfg(test)]
pub(crate) use token::ManualClock;
pub use traits::MetadataSource;
pub use types::{
    Actor, Artwork, ArtworkKind, Episode, ExternalIds, Provider, Season, SeriesIdentity,
    SeriesInfo,
};
pub use tvdb::TvdbClient;
pub use tvmaze::TvMazeClient;

/// Metadata source result type
pub type Result<T> = std::result::Result<T, SourceError>;

/// Failures surfaced by metadata source clients
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The provider definitively reports that the show does not exist.
    #[error("show not found on {to} (looked up via {from} using {}): {message}", .tried.join(", "))]
    NotFound {
        tried: Vec<String>,
        from: Provider,
        to: Provider,
        message: String,
    },

    /// Transport-level failure; the same request may succeed later.
    #[error("could not reach {provider}: {message}")]
    Connectivity {
        provider: Provider,
        status: Option<u16>,
        message: String,
    },

    /// A successful response was missing a required field.
    #[error("{provider} response is missing or has a malformed '{field}' field")]
    Consistency { provider: Provider, field: String },

    #[error("{provider} rejected our credentials: {message}")]
    Auth { provider: Provider, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SourceError {
    pub(crate) fn consistency(provider: Provider, field: impl Into<String>) -> Self {
        Self::Consistency {
            provider,
            field: field.into(),
        }
    }

    pub(crate) fn connectivity(provider: Provider, err: &RequestError) -> Self {
        Self::Connectivity {
            provider,
            status: err.status(),
            message: err.to_string(),
        }
    }

    /// Whether retrying the same call later could succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
