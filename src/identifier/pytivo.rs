use super::{ArtifactKind, IdentifierStrategy, Result, Target, TargetKind, needs_refresh};
use crate::engine::Action;
use crate::library::ProcessedEpisode;
use std::fmt::Write as _;
use std::path::PathBuf;

/// pyTivo `<video file>.txt` metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct PyTivoMetadata;

impl PyTivoMetadata {
    /// `video.mkv` -> `video.mkv.txt`
    fn file_for(video: &std::path::Path) -> PathBuf {
        let mut name = video.as_os_str().to_owned();
        name.push(".txt");
        PathBuf::from(name)
    }

    pub fn render(episode: &ProcessedEpisode) -> String {
        let series = &episode.series;
        let ep = &episode.episode;
        let show_name = episode.show.display_name();
        let mut out = String::new();

        // `key : value` lines; multi-valued keys repeat
        let mut line = |key: &str, value: &str| {
            let value = value.replace(['\r', '\n'], " ");
            let _ = writeln!(out, "{key} : {}", value.trim());
        };

        line("title", show_name);
        line("seriesTitle", show_name);
        line("episodeTitle", &ep.name);
        line("episodeNumber", &format!("{}{:02}", ep.season, ep.number));
        line("isEpisode", "true");
        if let Some(ref overview) = ep.overview {
            line("description", overview);
        }
        if let Some(aired) = ep.first_aired {
            line("originalAirDate", &format!("{}T00:00:00Z", aired.format("%Y-%m-%d")));
        }
        if let Some(ref network) = series.network {
            line("callsign", network);
        }
        for genre in &series.genres {
            line("vProgramGenre", genre);
        }
        for director in &ep.directors {
            line("vDirector", director);
        }
        for writer in &ep.writers {
            line("vWriter", writer);
        }
        for actor in &series.actors {
            line("vActor", &actor.name);
        }

        out
    }
}

impl IdentifierStrategy for PyTivoMetadata {
    fn name(&self) -> &'static str {
        "pytivo metadata"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Metadata
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Episode]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        let Target::Episode { episode, video } = *target else {
            return Ok(Vec::new());
        };

        let file = Self::file_for(video);
        if !needs_refresh(&file, target.last_updated(), force) {
            return Ok(Vec::new());
        }
        Ok(vec![Action::write_metadata(file, Self::render(episode))])
    }
}
