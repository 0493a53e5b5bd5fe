use super::{Provider, Result, SeriesIdentity, SeriesInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Core trait for metadata providers
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Which provider this client talks to
    fn provider(&self) -> Provider;

    /// Human-readable provider name
    fn name(&self) -> &'static str;

    /// Whether this provider needs a bearer token
    fn requires_token(&self) -> bool {
        false
    }

    /// Fetch the full show graph (seasons, episodes, cast, artwork)
    async fn fetch_series(&self, identity: &SeriesIdentity) -> Result<SeriesInfo>;

    /// Shows changed since `since`, as provider id -> change epoch seconds
    async fn fetch_updates(&self, since: Option<DateTime<Utc>>) -> Result<HashMap<u64, i64>>;
}
