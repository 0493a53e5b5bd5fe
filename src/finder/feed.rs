use super::{FinderError, Result};
use crate::config::IndexerConfig;
use crate::library::{FeedItem, ProcessedEpisode};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    size: Option<u64>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: String,
    #[serde(rename = "@length")]
    length: Option<u64>,
}

/// Torznab-style search client for an indexer aggregator
#[derive(Clone)]
pub struct IndexerClient {
    config: IndexerConfig,
    http: reqwest::Client,
}

impl IndexerClient {
    pub fn new(config: IndexerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tvrecon/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    pub const fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Check the settings needed to build a search URL
    pub fn validate(&self) -> Result<()> {
        if self.config.server.trim().is_empty() {
            return Err(FinderError::Config("indexer server is not set".to_string()));
        }
        if self.config.api_key.trim().is_empty() {
            return Err(FinderError::Config("indexer api key is not set".to_string()));
        }
        Ok(())
    }

    fn root(&self) -> String {
        format!("http://{}:{}", self.config.server, self.config.port)
    }

    /// `.../api?t=tvsearch&q=..&tvdbid=..&season=..&ep=..&apikey=..`
    #[must_use]
    pub fn search_url(&self, name: &str, tvdb: Option<u64>, season: i32, episode: i32) -> String {
        format!(
            "{}{}/api?t=tvsearch&q={}&tvdbid={}&season={}&ep={}&apikey={}",
            self.root(),
            self.config.path,
            urlencoding::encode(name),
            tvdb.map(|id| id.to_string()).unwrap_or_default(),
            season,
            episode,
            urlencoding::encode(&self.config.api_key)
        )
    }

    /// Link to the indexer's own UI with a search for the episode filled in
    #[must_use]
    pub fn dashboard_search_url(&self, episode: &ProcessedEpisode) -> String {
        let query = format!("{} {}", episode.show.display_name(), episode.tag());
        format!(
            "{}/UI/Dashboard#search={}",
            self.root(),
            urlencoding::encode(&query)
        )
    }

    pub async fn search(&self, url: &str) -> Result<Vec<FeedItem>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FinderError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        let items = parse_feed(&body)?;
        debug!("Indexer returned {} item(s)", items.len());
        Ok(items)
    }
}

/// Parse an RSS/Torznab feed; items without a title or link are skipped
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let rss: Rss = quick_xml::de::from_str(xml)?;

    Ok(rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let title = item.title.filter(|t| !t.trim().is_empty())?;
            let enclosure_length = item.enclosure.as_ref().and_then(|e| e.length);
            let url = item
                .link
                .filter(|l| !l.trim().is_empty())
                .or(item.enclosure.map(|e| e.url))?;
            let published = item
                .pub_date
                .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                .map(|d| d.with_timezone(&Utc));
            Some(FeedItem {
                title: title.trim().to_string(),
                url: url.trim().to_string(),
                published,
                size: item.size.or(enclosure_length),
            })
        })
        .collect())
}
