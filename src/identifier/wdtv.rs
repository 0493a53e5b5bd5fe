use super::{ArtifactKind, IdentifierStrategy, Result, Target, TargetKind, needs_refresh};
use crate::engine::Action;
use crate::library::ProcessedEpisode;
use quick_xml::se::to_string;
use serde::Serialize;

/// WD TV Live `<video>.xml` episode details
#[derive(Debug, Clone, Copy, Default)]
pub struct WdtvMetadata;

#[derive(Serialize)]
#[serde(rename = "details")]
struct Details {
    id: u64,
    title: String,
    series_name: String,
    episode_name: String,
    season_number: i32,
    episode_number: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    firstaired: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    genre: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    studio: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    actor: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    director: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overview: Option<String>,
}

impl From<&ProcessedEpisode> for Details {
    fn from(e: &ProcessedEpisode) -> Self {
        let ep = &e.episode;
        let series_name = e.show.display_name().to_string();
        Self {
            id: ep.id,
            title: format!("{} {} - {}", series_name, e.tag(), ep.name),
            series_name,
            episode_name: ep.name.clone(),
            season_number: ep.season,
            episode_number: ep.number,
            firstaired: ep.first_aired.map(|d| d.format("%Y-%m-%d").to_string()),
            genre: e.series.genres.clone(),
            runtime: ep.runtime.clone().or_else(|| e.series.runtime.clone()),
            studio: e.series.network.clone(),
            actor: e.series.actors.iter().map(|a| a.name.clone()).collect(),
            director: ep.directors.clone(),
            overview: ep.overview.clone(),
        }
    }
}

impl WdtvMetadata {
    pub fn render(episode: &ProcessedEpisode) -> Result<String> {
        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
            to_string(&Details::from(episode))?
        ))
    }
}

impl IdentifierStrategy for WdtvMetadata {
    fn name(&self) -> &'static str {
        "wdtv metadata"
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

        let file = video.with_extension("xml");
        if !needs_refresh(&file, target.last_updated(), force) {
            return Ok(Vec::new());
        }
        Ok(vec![Action::write_metadata(file, Self::render(episode)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::episode;
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::path::Path;

    #[test]
    fn test_render() {
        let mut episode = episode(Path::new("/tv/Breaking Bad"), Utc::now());
        episode.episode.first_aired = NaiveDate::from_ymd_opt(2008, 1, 20);
        let xml = WdtvMetadata::render(&episode).unwrap();

        assert!(xml.contains("<details><id>1</id>"));
        assert!(xml.contains("<series_name>Breaking Bad</series_name>"));
        assert!(xml.contains("<episode_name>Pilot</episode_name>"));
        assert!(xml.contains("<season_number>1</season_number><episode_number>1</episode_number>"));
        assert!(xml.contains("<firstaired>2008-01-20</firstaired>"));
        assert!(xml.contains("<genre>Drama</genre><genre>Crime</genre>"));
        assert!(xml.contains("<studio>AMC</studio>"));
        assert!(!xml.contains("<director>"));
    }

    #[test]
    fn test_sits_next_to_video() {
        let dir = tempfile::tempdir().unwrap();
        let episode = episode(dir.path(), Utc::now());
        let video = dir.path().join("Breaking Bad S01E01.mkv");
        let target = Target::Episode {
            episode: &episode,
            video: &video,
        };

        let actions = WdtvMetadata.propose_actions(&target, false).unwrap();
        assert_eq!(actions[0].destination(), dir.path().join("Breaking Bad S01E01.xml"));
    }
}
