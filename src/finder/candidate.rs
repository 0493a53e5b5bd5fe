use super::{EpisodeMatcher, IndexerClient, Result};
use crate::engine::{Action, ActionKind, ActionQueue};
use crate::library::{CandidateMatch, PreviouslySeenEpisodes, ProcessedEpisode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Kind of library scan a search runs as part of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    #[default]
    Full,
    Quick,
    Recent,
}

#[derive(Debug, Clone, Default)]
pub struct ScanSettings {
    pub scan_type: ScanType,
    /// Started by a schedule rather than a user
    pub unattended: bool,
    pub cancel: CancellationToken,
}

impl ScanSettings {
    pub fn new(scan_type: ScanType) -> Self {
        Self {
            scan_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn unattended(mut self) -> Self {
        self.unattended = true;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Where a search pass has got to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchProgress {
    pub current: usize,
    pub total: usize,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinderReport {
    pub searched: usize,
    /// Missing placeholders swapped for downloads
    pub replaced: usize,
    pub downloads_added: usize,
    pub failed: usize,
    pub skipped_seen: usize,
    pub cancelled: bool,
    /// Why the whole pass was skipped, if it was
    pub skipped: Option<String>,
}

/// Searches the indexer for every missing episode in a queue
pub struct CandidateFinder {
    client: IndexerClient,
    seen: Arc<PreviouslySeenEpisodes>,
    progress: Mutex<SearchProgress>,
}

impl CandidateFinder {
    pub fn new(client: IndexerClient, seen: Arc<PreviouslySeenEpisodes>) -> Self {
        Self {
            client,
            seen,
            progress: Mutex::new(SearchProgress::default()),
        }
    }

    pub const fn client(&self) -> &IndexerClient {
        &self.client
    }

    pub fn progress(&self) -> SearchProgress {
        self.progress.lock().clone()
    }

    fn set_progress(&self, current: usize, total: usize, label: impl Into<String>) {
        *self.progress.lock() = SearchProgress {
            current,
            total,
            label: label.into(),
        };
    }

    /// Reason this scan should not search at all
    fn skip_reason(&self, settings: &ScanSettings) -> Option<String> {
        let config = self.client.config();
        if !config.enabled {
            return Some("indexer searching is disabled".to_string());
        }
        if settings.unattended && config.manual_scan_only {
            return Some("this is an unattended scan".to_string());
        }
        if settings.scan_type == ScanType::Full && config.skip_on_full_scan {
            return Some("this is a full scan".to_string());
        }
        if let Err(e) = self.client.validate() {
            return Some(e.to_string());
        }
        None
    }

    /// Search every missing placeholder in `queue`, replacing each one
    /// that gets hits with its download actions.
    pub async fn find(&self, queue: &ActionQueue, settings: &ScanSettings) -> FinderReport {
        let mut report = FinderReport::default();

        if let Some(reason) = self.skip_reason(settings) {
            info!("Searching the indexer is skipped: {}", reason);
            report.skipped = Some(reason);
            return report;
        }

        let missing = queue.missing();
        let total = missing.len() + 2;
        self.set_progress(1, total, "Searching indexer...");

        for (index, placeholder) in missing.iter().enumerate() {
            if settings.cancel.is_cancelled() {
                info!("Indexer search cancelled");
                report.cancelled = true;
                break;
            }

            let ActionKind::Missing { ref episode } = *placeholder.kind() else {
                continue;
            };
            self.set_progress(index + 2, total, episode.to_string());

            if self.seen.contains(episode) {
                debug!("{} was downloaded before, not searching", episode);
                report.skipped_seen += 1;
                continue;
            }

            report.searched += 1;
            let candidates = match self.candidates_for(episode).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("Indexer search for {} failed: {}", episode, e);
                    report.failed += 1;
                    continue;
                }
            };
            if candidates.is_empty() {
                continue;
            }

            let destination = placeholder.destination().to_path_buf();
            let downloads = dedupe_by_destination(
                candidates
                    .into_iter()
                    .map(|c| Action::download_episode(c, destination.clone()))
                    .collect(),
            );

            let inserted = queue.replace(&[placeholder.id()], downloads);
            info!(
                "Found {} download(s) for {}",
                inserted.len(),
                episode
            );
            report.replaced += 1;
            report.downloads_added += inserted.len();
        }

        self.set_progress(total, total, "Indexer search complete");
        report
    }

    /// Feed items that match `episode`
    pub async fn candidates_for(&self, episode: &ProcessedEpisode) -> Result<Vec<CandidateMatch>> {
        let name = EpisodeMatcher::simplify_name(episode.show.search_term());
        let url = self.client.search_url(
            &name,
            episode.show.identity.tvdb,
            episode.season(),
            episode.number(),
        );

        let items = self.client.search(&url).await?;
        Ok(items
            .into_iter()
            .filter(|item| EpisodeMatcher::is_match(item, episode))
            .inspect(|item| debug!("{} matches {}", item.title, episode))
            .map(|item| CandidateMatch {
                item,
                episode: episode.clone(),
            })
            .collect())
    }
}

/// Keep the first action for each destination path
pub fn dedupe_by_destination(actions: Vec<Action>) -> Vec<Action> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    actions
        .into_iter()
        .filter(|a| seen.insert(a.destination().to_path_buf()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;

    fn finder(config: IndexerConfig) -> CandidateFinder {
        CandidateFinder::new(
            IndexerClient::new(config).unwrap(),
            Arc::new(PreviouslySeenEpisodes::new()),
        )
    }

    fn enabled() -> IndexerConfig {
        IndexerConfig {
            enabled: true,
            api_key: "key".to_string(),
            ..IndexerConfig::default()
        }
    }

    #[test]
    fn test_skip_rules() {
        let manual_only = finder(IndexerConfig {
            manual_scan_only: true,
            ..enabled()
        });
        assert!(
            manual_only
                .skip_reason(&ScanSettings::new(ScanType::Quick).unattended())
                .is_some()
        );
        assert!(
            manual_only
                .skip_reason(&ScanSettings::new(ScanType::Quick))
                .is_none()
        );

        let no_full = finder(IndexerConfig {
            skip_on_full_scan: true,
            ..enabled()
        });
        assert!(no_full.skip_reason(&ScanSettings::new(ScanType::Full)).is_some());
        assert!(no_full.skip_reason(&ScanSettings::new(ScanType::Recent)).is_none());
    }

    #[tokio::test]
    async fn test_disabled_finder_leaves_queue_alone() {
        let queue = ActionQueue::new("downloads");
        let report = finder(IndexerConfig::default())
            .find(&queue, &ScanSettings::default())
            .await;
        assert!(report.skipped.is_some());
        assert_eq!(report.searched, 0);
    }
}
