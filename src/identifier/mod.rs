//! Decides which local artifacts (images, sidecar metadata) need to be
//! produced for a show, season or episode.
//!
//! Every strategy is independent and owns one artifact kind. The
//! [`IdentifierPipeline`] fans a target out to all of them and collects the
//! actions they propose. When two strategies want the same file, the one
//! registered first wins.

mod images;
mod mede8er;
mod nfo;
mod pytivo;
mod wdtv;

pub use images::{EpisodeThumbnail, Fanart, FolderImage, KodiImages, SeriesImage};
pub use mede8er::Mede8erView;
pub use nfo::KodiNfo;
pub use pytivo::PyTivoMetadata;
pub use wdtv::WdtvMetadata;

use crate::engine::{Action, CompletionListener};
use crate::library::{ProcessedEpisode, ShowItem};
use crate::source::SeriesInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Identifier result type
pub type Result<T> = std::result::Result<T, IdentifierError>;

/// Identifier error types
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    #[error("Render error: {0}")]
    Render(#[from] quick_xml::SeError),
}

/// Groups strategies for forced refreshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Metadata,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Metadata => write!(f, "metadata"),
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" | "images" => Ok(Self::Image),
            "metadata" => Ok(Self::Metadata),
            _ => Err(format!("Unknown artifact kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Show,
    Season,
    Episode,
}

/// What a strategy is asked about
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Show {
        show: &'a ShowItem,
        series: &'a SeriesInfo,
    },
    Season {
        show: &'a ShowItem,
        series: &'a SeriesInfo,
        season: i32,
    },
    /// An episode together with the video file that holds it
    Episode {
        episode: &'a ProcessedEpisode,
        video: &'a Path,
    },
}

impl Target<'_> {
    pub const fn kind(&self) -> TargetKind {
        match self {
            Self::Show { .. } => TargetKind::Show,
            Self::Season { .. } => TargetKind::Season,
            Self::Episode { .. } => TargetKind::Episode,
        }
    }

    /// Change marker of the metadata behind the target
    pub fn last_updated(&self) -> DateTime<Utc> {
        match self {
            Self::Show { series, .. } | Self::Season { series, .. } => series.last_updated,
            Self::Episode { episode, .. } => episode.last_updated(),
        }
    }
}

/// One artifact rule
pub trait IdentifierStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn artifact_kind(&self) -> ArtifactKind;

    /// Target kinds this strategy looks at
    fn targets(&self) -> &'static [TargetKind];

    /// Actions needed for `target`. With `force` the staleness check is
    /// skipped.
    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>>;

    /// A file finished processing
    fn notify_complete(&self, _path: &Path) {}

    /// Forget per-run state
    fn reset(&self) {}
}

/// Whether `file` exists and was written no earlier than `last_updated`
pub fn is_current(file: &Path, last_updated: DateTime<Utc>) -> bool {
    std::fs::metadata(file)
        .and_then(|m| m.modified())
        .map(|modified| DateTime::<Utc>::from(modified) >= last_updated)
        .unwrap_or(false)
}

/// Whether an artifact at `file` has to be (re)produced
pub(crate) fn needs_refresh(file: &Path, last_updated: DateTime<Utc>, force: bool) -> bool {
    force || !is_current(file, last_updated)
}

/// Ordered registry of identifier strategies
pub struct IdentifierPipeline {
    strategies: Vec<Box<dyn IdentifierStrategy>>,
}

impl IdentifierPipeline {
    pub fn new(strategies: Vec<Box<dyn IdentifierStrategy>>) -> Self {
        Self { strategies }
    }

    /// Every built-in strategy in registry order
    pub fn with_defaults() -> Self {
        Self::new(vec![
            Box::new(FolderImage::new()),
            Box::new(EpisodeThumbnail),
            Box::new(Fanart),
            Box::new(Mede8erView),
            Box::new(PyTivoMetadata),
            Box::new(WdtvMetadata),
            Box::new(SeriesImage::new()),
            Box::new(KodiNfo::new()),
            Box::new(KodiImages),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn run(&self, target: &Target<'_>, force: bool, only: Option<ArtifactKind>) -> Vec<Action> {
        let kind = target.kind();
        let mut actions: Vec<Action> = Vec::new();
        let mut destinations = HashSet::new();

        for strategy in &self.strategies {
            if !strategy.targets().contains(&kind) {
                continue;
            }
            if let Some(only) = only
                && strategy.artifact_kind() != only
            {
                continue;
            }

            match strategy.propose_actions(target, force) {
                Ok(proposed) => {
                    if !proposed.is_empty() {
                        debug!("{} proposed {} action(s)", strategy.name(), proposed.len());
                    }
                    for action in proposed {
                        if destinations.insert(action.destination().to_path_buf()) {
                            actions.push(action);
                        } else {
                            debug!(
                                "{} already proposed by an earlier strategy",
                                action.destination().display()
                            );
                        }
                    }
                }
                Err(e) => warn!("{} failed: {}", strategy.name(), e),
            }
        }

        actions
    }

    pub fn process_show(&self, show: &ShowItem, series: &SeriesInfo) -> Vec<Action> {
        self.run(&Target::Show { show, series }, false, None)
    }

    pub fn process_season(&self, show: &ShowItem, series: &SeriesInfo, season: i32) -> Vec<Action> {
        self.run(&Target::Season { show, series, season }, false, None)
    }

    pub fn process_episode(&self, episode: &ProcessedEpisode, video: &Path) -> Vec<Action> {
        self.run(&Target::Episode { episode, video }, false, None)
    }

    /// Re-produce every `kind` artifact of a show regardless of staleness
    pub fn force_update_show(
        &self,
        kind: ArtifactKind,
        show: &ShowItem,
        series: &SeriesInfo,
    ) -> Vec<Action> {
        self.run(&Target::Show { show, series }, true, Some(kind))
    }

    pub fn force_update_season(
        &self,
        kind: ArtifactKind,
        show: &ShowItem,
        series: &SeriesInfo,
        season: i32,
    ) -> Vec<Action> {
        self.run(&Target::Season { show, series, season }, true, Some(kind))
    }

    pub fn force_update_episode(
        &self,
        kind: ArtifactKind,
        episode: &ProcessedEpisode,
        video: &Path,
    ) -> Vec<Action> {
        self.run(&Target::Episode { episode, video }, true, Some(kind))
    }

    pub fn notify_complete(&self, path: &Path) {
        for strategy in &self.strategies {
            strategy.notify_complete(path);
        }
    }

    pub fn reset(&self) {
        for strategy in &self.strategies {
            strategy.reset();
        }
    }
}

impl Default for IdentifierPipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CompletionListener for IdentifierPipeline {
    fn on_complete(&self, action: &Action) {
        self.notify_complete(action.destination());
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::library::{ProcessedEpisode, ShowItem};
    use crate::source::{Episode, Provider, SeriesIdentity, SeriesInfo};
    use chrono::{DateTime, Utc};
    use std::path::Path;
    use std::sync::Arc;

    pub fn show(folder: &Path) -> ShowItem {
        ShowItem::new(SeriesIdentity::new().with_tvdb(81189), "Breaking Bad", folder)
    }

    pub fn series(last_updated: DateTime<Utc>) -> SeriesInfo {
        let mut series = SeriesInfo::new(Provider::TvMaze, 169, "Breaking Bad");
        series.last_updated = last_updated;
        series.poster_url = Some("http://img/poster.jpg".to_string());
        series.overview = Some("A chemist turns to crime.".to_string());
        series.network = Some("AMC".to_string());
        series.genres = vec!["Drama".to_string(), "Crime".to_string()];
        series.external_ids.tvdb = Some(81189);
        series.external_ids.imdb = Some("tt0903747".to_string());
        let mut episode = Episode::new(1, 169, 1, 1, "Pilot");
        episode.image_url = Some("http://img/s01e01.jpg".to_string());
        episode.writers = vec!["Vince Gilligan".to_string()];
        series.episodes.push(episode);
        series
    }

    pub fn episode(folder: &Path, last_updated: DateTime<Utc>) -> ProcessedEpisode {
        let series = series(last_updated);
        let episode = series.episodes[0].clone();
        ProcessedEpisode::new(Arc::new(show(folder)), Arc::new(series), episode)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("folder.jpg");
        assert!(!is_current(&file, DateTime::<Utc>::UNIX_EPOCH));

        std::fs::write(&file, b"jpg").unwrap();
        assert!(is_current(&file, Utc::now() - Duration::hours(1)));
        assert!(!is_current(&file, Utc::now() + Duration::hours(1)));
    }

    #[test]
    fn test_pipeline_skips_current_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let series = series(Utc::now() - Duration::days(1));
        let pipeline = IdentifierPipeline::with_defaults();

        let first = pipeline.process_show(&show, &series);
        assert!(!first.is_empty());

        for action in &first {
            std::fs::write(action.destination(), b"x").unwrap();
        }
        pipeline.reset();
        assert!(pipeline.process_show(&show, &series).is_empty());
    }

    #[test]
    fn test_force_filters_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let series = series(Utc::now() - Duration::days(1));
        let pipeline = IdentifierPipeline::with_defaults();

        let images = pipeline.force_update_show(ArtifactKind::Image, &show, &series);
        let names: Vec<_> = images
            .iter()
            .filter_map(|a| a.destination().file_name())
            .filter_map(|n| n.to_str())
            .collect();
        assert!(names.contains(&"folder.jpg"));
        assert!(!names.contains(&"tvshow.nfo"));
        assert!(!names.contains(&"View.xml"));
    }

    #[test]
    fn test_registry_order() {
        assert_eq!(
            IdentifierPipeline::with_defaults().strategy_names(),
            [
                "folder image",
                "episode thumbnail",
                "fanart",
                "mede8er view",
                "pytivo metadata",
                "wdtv metadata",
                "series image",
                "kodi nfo",
                "kodi images"
            ]
        );
    }

    #[test]
    fn test_episode_fans_out_to_episode_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let episode = episode(dir.path(), Utc::now());
        let video = dir.path().join("Season 1").join("Breaking Bad S01E01.mkv");
        let pipeline = IdentifierPipeline::with_defaults();

        let mut files: Vec<_> = pipeline
            .process_episode(&episode, &video)
            .iter()
            .filter_map(|a| a.destination().file_name()?.to_str().map(String::from))
            .collect();
        files.sort();
        assert_eq!(
            files,
            [
                "Breaking Bad S01E01-thumb.jpg",
                "Breaking Bad S01E01.jpg",
                "Breaking Bad S01E01.mkv.txt",
                "Breaking Bad S01E01.nfo",
                "Breaking Bad S01E01.xml"
            ]
        );

        let forced = pipeline.force_update_episode(ArtifactKind::Image, &episode, &video);
        assert_eq!(forced.len(), 2);
    }

    #[test]
    fn test_shared_destination_proposed_once() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let mut series = series(Utc::now());
        series.artwork.push(crate::source::Artwork {
            id: None,
            kind: crate::source::ArtworkKind::Fanart,
            season: None,
            url: "http://img/fanart.jpg".to_string(),
            rating: 8,
        });

        let actions = IdentifierPipeline::with_defaults().process_show(&show, &series);
        let fanart = actions
            .iter()
            .filter(|a| a.destination() == dir.path().join("fanart.jpg"))
            .count();
        assert_eq!(fanart, 1);
        assert!(actions.iter().any(|a| a.destination() == dir.path().join("poster.jpg")));
    }

    #[test]
    fn test_artifact_kind_from_str() {
        assert_eq!("Images".parse::<ArtifactKind>().unwrap(), ArtifactKind::Image);
        assert!("posters".parse::<ArtifactKind>().is_err());
    }
}
