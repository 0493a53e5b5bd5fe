use super::{ArtifactKind, IdentifierStrategy, Result, Target, TargetKind, needs_refresh};
use crate::engine::Action;
use crate::library::ProcessedEpisode;
use crate::source::{Actor, ArtworkKind, Provider, SeriesInfo};
use parking_lot::Mutex;
use quick_xml::se::to_string;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const SHOW_NFO: &str = "tvshow.nfo";

/// Kodi/Jellyfin/Emby `tvshow.nfo` and per-episode `.nfo` files
#[derive(Debug, Default)]
pub struct KodiNfo {
    /// Files written during this run
    written: Mutex<HashSet<PathBuf>>,
}

impl KodiNfo {
    pub fn new() -> Self {
        Self::default()
    }

    fn propose(
        &self,
        file: PathBuf,
        target: &Target<'_>,
        force: bool,
        render: impl FnOnce() -> Result<String>,
    ) -> Result<Vec<Action>> {
        if self.written.lock().contains(&file) {
            return Ok(Vec::new());
        }
        if !needs_refresh(&file, target.last_updated(), force) {
            return Ok(Vec::new());
        }
        Ok(vec![Action::write_metadata(file, render()?)])
    }

    pub fn render_show(series: &SeriesInfo) -> Result<String> {
        Ok(with_header(&to_string(&TvShowNfo::from(series))?))
    }

    pub fn render_episode(episode: &ProcessedEpisode) -> Result<String> {
        Ok(with_header(&to_string(&EpisodeNfo::from(episode))?))
    }
}

fn with_header(xml: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n{xml}")
}

impl IdentifierStrategy for KodiNfo {
    fn name(&self) -> &'static str {
        "kodi nfo"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Metadata
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Show, TargetKind::Episode]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        match *target {
            Target::Show { show, series } => self.propose(
                show.folder.join(SHOW_NFO),
                target,
                force,
                || Self::render_show(series),
            ),
            Target::Episode { episode, video } => {
                self.propose(video.with_extension("nfo"), target, force, || {
                    Self::render_episode(episode)
                })
            }
            Target::Season { .. } => Ok(Vec::new()),
        }
    }

    fn notify_complete(&self, path: &Path) {
        if path.extension().is_some_and(|ext| ext == "nfo") {
            self.written.lock().insert(path.to_path_buf());
        }
    }

    fn reset(&self) {
        self.written.lock().clear();
    }
}

// NFO structures

#[derive(Serialize)]
#[serde(rename = "tvshow")]
struct TvShowNfo {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    premiered: Option<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    studio: Option<String>,
    rating: f32,
    votes: i32,
    #[serde(rename = "uniqueid")]
    uniqueids: Vec<UniqueId>,
    genre: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    actor: Vec<ActorNfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    thumb: Vec<ThumbNfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fanart: Option<FanartNfo>,
}

impl From<&SeriesInfo> for TvShowNfo {
    fn from(s: &SeriesInfo) -> Self {
        let mut uniqueids = Vec::new();
        if let Some(tvdb) = s.external_ids.tvdb {
            uniqueids.push(UniqueId::new("tvdb", true, tvdb.to_string()));
        }
        if let Some(ref imdb) = s.external_ids.imdb {
            uniqueids.push(UniqueId::new("imdb", false, imdb.clone()));
        }
        if let Some(tvmaze) = s.external_ids.tvmaze {
            uniqueids.push(UniqueId::new("tvmaze", false, tvmaze.to_string()));
        }

        let mut thumb = Vec::new();
        if let Some(ref poster) = s.poster_url {
            thumb.push(ThumbNfo::new("poster", None, poster));
        }
        for season in &s.seasons {
            if let Some(ref url) = season.image_url {
                thumb.push(ThumbNfo::new("poster", Some(season.number), url));
            }
        }

        let fanart: Vec<ThumbNfo> = s
            .artwork
            .iter()
            .filter(|a| a.kind == ArtworkKind::Fanart)
            .map(|a| ThumbNfo::new("fanart", None, &a.url))
            .collect();

        let mut actors: Vec<&Actor> = s.actors.iter().collect();
        actors.sort_by_key(|a| a.sort_order);

        Self {
            title: s.name.clone(),
            plot: s.overview.clone(),
            premiered: s.first_aired.map(|d| d.format("%Y-%m-%d").to_string()),
            status: s.status.clone(),
            studio: s.network.clone(),
            rating: s.site_rating,
            votes: s.site_rating_votes,
            uniqueids,
            genre: s.genres.clone(),
            actor: actors.into_iter().map(ActorNfo::from).collect(),
            thumb,
            fanart: (!fanart.is_empty()).then_some(FanartNfo { thumb: fanart }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename = "episodedetails")]
struct EpisodeNfo {
    title: String,
    showtitle: String,
    season: i32,
    episode: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aired: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime: Option<String>,
    #[serde(rename = "uniqueid")]
    uniqueids: Vec<UniqueId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    credits: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    director: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumb: Option<String>,
}

impl From<&ProcessedEpisode> for EpisodeNfo {
    fn from(pe: &ProcessedEpisode) -> Self {
        let e = &pe.episode;
        let id_type = match pe.series.provider {
            Provider::TheTvdb => "tvdb",
            Provider::TvMaze => "tvmaze",
        };
        Self {
            title: e.name.clone(),
            showtitle: pe.show.display_name().to_string(),
            season: e.season,
            episode: e.number,
            plot: e.overview.clone(),
            aired: e.first_aired.map(|d| d.format("%Y-%m-%d").to_string()),
            runtime: e.runtime.clone(),
            uniqueids: vec![UniqueId::new(id_type, true, e.id.to_string())],
            credits: e.writers.clone(),
            director: e.directors.clone(),
            thumb: e.image_url.clone(),
        }
    }
}

#[derive(Serialize)]
struct UniqueId {
    #[serde(rename = "@type")]
    id_type: String,
    #[serde(rename = "@default")]
    default: bool,
    #[serde(rename = "$value")]
    value: String,
}

impl UniqueId {
    fn new(id_type: &str, default: bool, value: String) -> Self {
        Self {
            id_type: id_type.to_string(),
            default,
            value,
        }
    }
}

#[derive(Serialize)]
struct ActorNfo {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumb: Option<String>,
    order: i32,
}

impl From<&Actor> for ActorNfo {
    fn from(a: &Actor) -> Self {
        Self {
            name: a.name.clone(),
            role: a.role.clone(),
            thumb: a.image_url.clone(),
            order: a.sort_order,
        }
    }
}

#[derive(Serialize)]
struct ThumbNfo {
    #[serde(rename = "@aspect")]
    aspect: String,
    #[serde(rename = "@season", skip_serializing_if = "Option::is_none")]
    season: Option<i32>,
    #[serde(rename = "$value")]
    value: String,
}

impl ThumbNfo {
    fn new(aspect: &str, season: Option<i32>, url: &str) -> Self {
        Self {
            aspect: aspect.to_string(),
            season,
            value: url.to_string(),
        }
    }
}

#[derive(Serialize)]
struct FanartNfo {
    thumb: Vec<ThumbNfo>,
}
