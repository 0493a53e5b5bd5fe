//! Read-only view of the user's show library.
//!
//! Show preferences are owned by an external configuration store; this
//! module only models what the reconciliation pipeline reads from it.

use crate::source::{Episode, Provider, SeriesIdentity, SeriesInfo};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// One show in the library together with the user's preferences for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowItem {
    pub identity: SeriesIdentity,
    /// Provider the show's episode list comes from
    pub provider: Provider,
    pub show_name: String,
    pub custom_name: Option<String>,
    /// Overrides the name sent to search indexers
    pub search_name: Option<String>,
    pub folder: PathBuf,
    /// Explicit per-season folders; others fall back to `Season N`
    pub season_folders: HashMap<i32, PathBuf>,
    pub ignored_seasons: HashSet<i32>,
    pub do_missing_check: bool,
}

impl ShowItem {
    pub fn new(
        identity: SeriesIdentity,
        show_name: impl Into<String>,
        folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity,
            provider: Provider::TvMaze,
            show_name: show_name.into(),
            custom_name: None,
            search_name: None,
            folder: folder.into(),
            season_folders: HashMap::new(),
            ignored_seasons: HashSet::new(),
            do_missing_check: true,
        }
    }

    #[must_use]
    pub const fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn with_custom_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_search_name(mut self, name: impl Into<String>) -> Self {
        self.search_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_season_folder(mut self, season: i32, folder: impl Into<PathBuf>) -> Self {
        self.season_folders.insert(season, folder.into());
        self
    }

    #[must_use]
    pub fn ignoring_season(mut self, season: i32) -> Self {
        self.ignored_seasons.insert(season);
        self
    }

    /// Name shown to the user and used for file names
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.show_name)
    }

    /// Name used when querying indexers
    pub fn search_term(&self) -> &str {
        self.search_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.display_name())
    }

    pub fn is_ignored(&self, season: i32) -> bool {
        self.ignored_seasons.contains(&season)
    }

    pub fn season_folder(&self, season: i32) -> PathBuf {
        if let Some(folder) = self.season_folders.get(&season) {
            return folder.clone();
        }
        if season == 0 {
            self.folder.join("Specials")
        } else {
            self.folder.join(format!("Season {season}"))
        }
    }
}

/// An episode as it applies to one library show
#[derive(Debug, Clone)]
pub struct ProcessedEpisode {
    pub show: Arc<ShowItem>,
    pub series: Arc<SeriesInfo>,
    pub episode: Episode,
}

impl ProcessedEpisode {
    pub const fn new(show: Arc<ShowItem>, series: Arc<SeriesInfo>, episode: Episode) -> Self {
        Self {
            show,
            series,
            episode,
        }
    }

    /// Every non-ignored episode of a show graph
    pub fn for_series(show: &Arc<ShowItem>, series: &Arc<SeriesInfo>) -> Vec<Self> {
        series
            .episodes
            .iter()
            .filter(|e| !show.is_ignored(e.season))
            .map(|e| Self::new(Arc::clone(show), Arc::clone(series), e.clone()))
            .collect()
    }

    pub const fn id(&self) -> u64 {
        self.episode.id
    }

    pub const fn season(&self) -> i32 {
        self.episode.season
    }

    pub const fn number(&self) -> i32 {
        self.episode.number
    }

    /// `S02E05`
    pub fn tag(&self) -> String {
        format!("S{:02}E{:02}", self.episode.season, self.episode.number)
    }

    pub fn season_folder(&self) -> PathBuf {
        self.show.season_folder(self.episode.season)
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.series.last_updated
    }
}

impl std::fmt::Display for ProcessedEpisode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.show.display_name(), self.tag())
    }
}

/// Produces target file names; supplied by the caller's naming rules
pub trait EpisodeNamer: Send + Sync {
    /// File name without extension
    fn file_stem(&self, episode: &ProcessedEpisode) -> String;

    /// Destination path without extension
    fn destination(&self, episode: &ProcessedEpisode) -> PathBuf {
        episode.season_folder().join(self.file_stem(episode))
    }
}

/// `Show S01E02` naming
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamer;

impl EpisodeNamer for DefaultNamer {
    fn file_stem(&self, episode: &ProcessedEpisode) -> String {
        sanitize_file_name(&format!("{} {}", episode.show.display_name(), episode.tag()))
    }
}

/// Replace characters that are not allowed in file names
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Episodes already obtained once, so they are not searched for again
#[derive(Debug, Default)]
pub struct PreviouslySeenEpisodes {
    ids: RwLock<HashSet<u64>>,
}

impl PreviouslySeenEpisodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let seen = Self::new();
        for id in ids {
            seen.record(id);
        }
        seen
    }

    /// Provider ids of zero are placeholders and never recorded
    pub fn record(&self, id: u64) {
        if id == 0 {
            return;
        }
        if self.ids.write().insert(id) {
            debug!("Recorded episode {} as seen", id);
        }
    }

    pub fn contains(&self, episode: &ProcessedEpisode) -> bool {
        self.ids.read().contains(&episode.id())
    }

    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }

    /// Sorted snapshot for persistence
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.ids.read().iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// One item from an indexer search feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// A feed item proposed to satisfy a missing episode
#[derive(Debug, Clone)]
pub struct CandidateMatch {
    pub item: FeedItem,
    pub episode: ProcessedEpisode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(season: i32, number: i32) -> ProcessedEpisode {
        let show = Arc::new(ShowItem::new(
            SeriesIdentity::new().with_tvmaze(1),
            "Show: Name",
            "/tv/Show",
        ));
        let series = Arc::new(SeriesInfo::new(Provider::TvMaze, 1, "Show: Name"));
        ProcessedEpisode::new(show, series, Episode::new(10, 1, season, number, "Ep"))
    }

    #[test]
    fn test_default_naming() {
        let ep = episode(2, 5);
        assert_eq!(DefaultNamer.file_stem(&ep), "Show_ Name S02E05");
        assert_eq!(
            DefaultNamer.destination(&ep),
            PathBuf::from("/tv/Show/Season 2/Show_ Name S02E05")
        );
    }

    #[test]
    fn test_specials_folder_and_overrides() {
        let show = ShowItem::new(SeriesIdentity::new(), "X", "/tv/X")
            .with_season_folder(3, "/other/X3")
            .with_search_name("  ");
        assert_eq!(show.season_folder(0), PathBuf::from("/tv/X/Specials"));
        assert_eq!(show.season_folder(3), PathBuf::from("/other/X3"));
        assert_eq!(show.search_term(), "X");
    }

    #[test]
    fn test_seen_ignores_placeholder_ids() {
        let seen = PreviouslySeenEpisodes::from_ids([0, 10, 10]);
        assert_eq!(seen.ids(), vec![10]);
        assert!(seen.contains(&episode(1, 1)));
    }
}
