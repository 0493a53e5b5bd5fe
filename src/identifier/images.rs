use super::{ArtifactKind, IdentifierStrategy, Result, Target, TargetKind, needs_refresh};
use crate::engine::Action;
use crate::source::{ArtworkKind, SeriesInfo};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const FOLDER_IMAGE: &str = "folder.jpg";
const FANART_IMAGE: &str = "fanart.jpg";
const SERIES_IMAGE: &str = "series.jpg";

/// `folder.jpg` poster in the show folder and every season folder
#[derive(Debug, Default)]
pub struct FolderImage {
    /// Folders an image was already proposed for in this run
    done: Mutex<HashSet<PathBuf>>,
}

impl FolderImage {
    pub fn new() -> Self {
        Self::default()
    }

    fn propose(
        &self,
        folder: PathBuf,
        url: Option<&str>,
        target: &Target<'_>,
        force: bool,
    ) -> Vec<Action> {
        let Some(url) = url else {
            return Vec::new();
        };
        let file = folder.join(FOLDER_IMAGE);
        if !needs_refresh(&file, target.last_updated(), force) {
            return Vec::new();
        }
        if !self.done.lock().insert(folder) {
            return Vec::new();
        }
        vec![Action::download_artifact(url, file)]
    }
}

impl IdentifierStrategy for FolderImage {
    fn name(&self) -> &'static str {
        "folder image"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Image
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Show, TargetKind::Season]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        Ok(match *target {
            Target::Show { show, series } => {
                let url = series.poster_url.as_deref().or_else(|| {
                    series
                        .best_artwork(ArtworkKind::Poster, None)
                        .map(|a| a.url.as_str())
                });
                self.propose(show.folder.clone(), url, target, force)
            }
            Target::Season { show, series, season } => {
                self.propose(
                    show.season_folder(season),
                    series.season_poster(season),
                    target,
                    force,
                )
            }
            Target::Episode { .. } => Vec::new(),
        })
    }

    fn reset(&self) {
        self.done.lock().clear();
    }
}

/// Still image next to each video file
#[derive(Debug, Clone, Copy, Default)]
pub struct EpisodeThumbnail;

impl IdentifierStrategy for EpisodeThumbnail {
    fn name(&self) -> &'static str {
        "episode thumbnail"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Image
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Episode]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        let Target::Episode { episode, video } = *target else {
            return Ok(Vec::new());
        };
        let Some(ref url) = episode.episode.image_url else {
            return Ok(Vec::new());
        };

        let file = video.with_extension("jpg");
        if !needs_refresh(&file, target.last_updated(), force) {
            return Ok(Vec::new());
        }
        Ok(vec![Action::download_artifact(url, file)])
    }
}

/// `fanart.jpg` background in the show folder
#[derive(Debug, Clone, Copy, Default)]
pub struct Fanart;

impl Fanart {
    fn file(folder: &Path) -> PathBuf {
        folder.join(FANART_IMAGE)
    }
}

impl IdentifierStrategy for Fanart {
    fn name(&self) -> &'static str {
        "fanart"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Image
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Show]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        let Target::Show { show, series } = *target else {
            return Ok(Vec::new());
        };
        let Some(artwork) = series.best_artwork(ArtworkKind::Fanart, None) else {
            return Ok(Vec::new());
        };

        let file = Self::file(&show.folder);
        if !needs_refresh(&file, target.last_updated(), force) {
            return Ok(Vec::new());
        }
        Ok(vec![Action::download_artifact(&artwork.url, file)])
    }
}

/// WD TV `series.jpg` poster in every season folder
#[derive(Debug, Default)]
pub struct SeriesImage {
    done: Mutex<HashSet<PathBuf>>,
}

impl SeriesImage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentifierStrategy for SeriesImage {
    fn name(&self) -> &'static str {
        "series image"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Image
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Season]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        let Target::Season { show, series, season } = *target else {
            return Ok(Vec::new());
        };
        let Some(url) = series.season_poster(season) else {
            return Ok(Vec::new());
        };

        let file = show.season_folder(season).join(SERIES_IMAGE);
        if !needs_refresh(&file, target.last_updated(), force) {
            return Ok(Vec::new());
        }
        // seasons can share a folder
        if !self.done.lock().insert(file.clone()) {
            return Ok(Vec::new());
        }
        Ok(vec![Action::download_artifact(url, file)])
    }

    fn reset(&self) {
        self.done.lock().clear();
    }
}

/// Kodi artwork set.
///
/// `poster.jpg`, `banner.jpg` and `fanart.jpg` go in the show folder, next
/// to `seasonNN-poster.jpg` (`season-specials-poster.jpg` for season 0) and
/// season banners. Episodes get `<video>-thumb.jpg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KodiImages;

impl KodiImages {
    fn season_prefix(season: i32) -> String {
        if season == 0 {
            "season-specials".to_string()
        } else {
            format!("season{season:02}")
        }
    }

    fn thumb_for(video: &Path) -> PathBuf {
        let mut name = video.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
        name.push("-thumb.jpg");
        video.with_file_name(name)
    }
}

fn best_url(series: &SeriesInfo, kind: ArtworkKind, season: Option<i32>) -> Option<String> {
    series.best_artwork(kind, season).map(|a| a.url.clone())
}

fn artwork_action(
    url: Option<&str>,
    file: PathBuf,
    target: &Target<'_>,
    force: bool,
) -> Option<Action> {
    let url = url?;
    needs_refresh(&file, target.last_updated(), force).then(|| Action::download_artifact(url, file))
}

impl IdentifierStrategy for KodiImages {
    fn name(&self) -> &'static str {
        "kodi images"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Image
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Show, TargetKind::Season, TargetKind::Episode]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        Ok(match *target {
            Target::Show { show, series } => {
                let poster = series
                    .poster_url
                    .clone()
                    .or_else(|| best_url(series, ArtworkKind::Poster, None));
                [
                    (poster, "poster.jpg"),
                    (best_url(series, ArtworkKind::Banner, None), "banner.jpg"),
                    (best_url(series, ArtworkKind::Fanart, None), FANART_IMAGE),
                ]
                .into_iter()
                .filter_map(|(url, name)| {
                    artwork_action(url.as_deref(), show.folder.join(name), target, force)
                })
                .collect()
            }
            Target::Season { show, series, season } => {
                let prefix = Self::season_prefix(season);
                [
                    (series.season_poster(season).map(String::from), "poster"),
                    (best_url(series, ArtworkKind::Banner, Some(season)), "banner"),
                ]
                .into_iter()
                .filter_map(|(url, kind)| {
                    let file = show.folder.join(format!("{prefix}-{kind}.jpg"));
                    artwork_action(url.as_deref(), file, target, force)
                })
                .collect()
            }
            Target::Episode { episode, video } => artwork_action(
                episode.episode.image_url.as_deref(),
                Self::thumb_for(video),
                target,
                force,
            )
            .into_iter()
            .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{episode, series, show};
    use super::*;
    use crate::engine::ActionKind;
    use crate::source::Artwork;
    use chrono::{Duration, Utc};

    #[test]
    fn test_folder_image_memo_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let series = series(Utc::now());
        let strategy = FolderImage::new();
        let target = Target::Show { show: &show, series: &series };

        assert_eq!(strategy.propose_actions(&target, false).unwrap().len(), 1);
        assert!(strategy.propose_actions(&target, true).unwrap().is_empty());

        strategy.reset();
        let actions = strategy.propose_actions(&target, false).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions[0].kind(),
            ActionKind::DownloadArtifact { url } if url == "http://img/poster.jpg"
        ));
    }

    #[test]
    fn test_season_folder_image_targets_season_folder() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let series = series(Utc::now());
        let target = Target::Season {
            show: &show,
            series: &series,
            season: 2,
        };

        let actions = FolderImage::new().propose_actions(&target, false).unwrap();
        assert_eq!(actions[0].destination(), dir.path().join("Season 2").join("folder.jpg"));
    }

    #[test]
    fn test_thumbnail_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let episode = episode(dir.path(), Utc::now() - Duration::days(1));
        let video = dir.path().join("Breaking Bad S01E01.mkv");
        std::fs::write(video.with_extension("jpg"), b"jpg").unwrap();
        let target = Target::Episode {
            episode: &episode,
            video: &video,
        };

        assert!(EpisodeThumbnail.propose_actions(&target, false).unwrap().is_empty());
        let forced = EpisodeThumbnail.propose_actions(&target, true).unwrap();
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].destination(), video.with_extension("jpg"));
    }

    #[test]
    fn test_fanart_uses_best_rated() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let mut series = series(Utc::now());
        for (url, rating) in [("http://img/low.jpg", 10), ("http://img/high.jpg", 90)] {
            series.artwork.push(Artwork {
                id: None,
                kind: ArtworkKind::Fanart,
                season: None,
                url: url.to_string(),
                rating,
            });
        }

        let actions = Fanart
            .propose_actions(&Target::Show { show: &show, series: &series }, false)
            .unwrap();
        assert!(matches!(
            actions[0].kind(),
            ActionKind::DownloadArtifact { url } if url == "http://img/high.jpg"
        ));
    }

    #[test]
    fn test_series_image_once_per_season_folder() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let series = series(Utc::now());
        let strategy = SeriesImage::new();
        let target = Target::Season {
            show: &show,
            series: &series,
            season: 1,
        };

        let actions = strategy.propose_actions(&target, false).unwrap();
        assert_eq!(actions[0].destination(), dir.path().join("Season 1").join("series.jpg"));
        assert!(strategy.propose_actions(&target, false).unwrap().is_empty());
        assert!(
            strategy
                .propose_actions(&Target::Show { show: &show, series: &series }, false)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_kodi_image_names() {
        let dir = tempfile::tempdir().unwrap();
        let show = show(dir.path());
        let mut series = series(Utc::now());
        series.artwork.push(Artwork {
            id: None,
            kind: ArtworkKind::Banner,
            season: None,
            url: "http://img/banner.jpg".to_string(),
            rating: 1,
        });

        let names = |actions: Vec<Action>| -> Vec<String> {
            actions
                .iter()
                .filter_map(|a| a.destination().file_name()?.to_str().map(String::from))
                .collect()
        };

        let show_target = Target::Show { show: &show, series: &series };
        assert_eq!(
            names(KodiImages.propose_actions(&show_target, false).unwrap()),
            ["poster.jpg", "banner.jpg"]
        );

        let specials = Target::Season {
            show: &show,
            series: &series,
            season: 0,
        };
        assert_eq!(
            names(KodiImages.propose_actions(&specials, false).unwrap()),
            ["season-specials-poster.jpg"]
        );

        let episode = episode(dir.path(), Utc::now());
        let video = dir.path().join("Season 1").join("Breaking Bad S01E01.mkv");
        let episode_target = Target::Episode {
            episode: &episode,
            video: &video,
        };
        assert_eq!(
            names(KodiImages.propose_actions(&episode_target, false).unwrap()),
            ["Breaking Bad S01E01-thumb.jpg"]
        );
    }
}
