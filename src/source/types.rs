use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote metadata providers known to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    TheTvdb,
    TvMaze,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TheTvdb => write!(f, "TheTVDB"),
            Self::TvMaze => write!(f, "TVmaze"),
        }
    }
}

/// Provider-neutral key for a show.
///
/// Any of the ids may be unknown. Once resolved for a session the value is
/// treated as immutable; resolution produces new provider ids rather than
/// patching an identity in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesIdentity {
    pub tvdb: Option<u64>,
    pub tvmaze: Option<u64>,
    pub imdb: Option<String>,
}

impl SeriesIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_tvdb(mut self, id: u64) -> Self {
        self.tvdb = Some(id);
        self
    }

    #[must_use]
    pub const fn with_tvmaze(mut self, id: u64) -> Self {
        self.tvmaze = Some(id);
        self
    }

    #[must_use]
    pub fn with_imdb(mut self, id: impl Into<String>) -> Self {
        self.imdb = Some(id.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Provider-local id for the given provider, if known
    pub const fn id_for(&self, provider: Provider) -> Option<u64> {
        match provider {
            Provider::TheTvdb => self.tvdb,
            Provider::TvMaze => self.tvmaze,
        }
    }

    pub const fn has_any(&self) -> bool {
        self.tvdb.is_some() || self.tvmaze.is_some() || self.imdb.is_some()
    }
}

impl std::fmt::Display for SeriesIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = self.tvdb {
            parts.push(format!("tvdb={id}"));
        }
        if let Some(id) = self.tvmaze {
            parts.push(format!("tvmaze={id}"));
        }
        if let Some(ref id) = self.imdb {
            parts.push(format!("imdb={id}"));
        }
        if parts.is_empty() {
            write!(f, "<no ids>")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Cross-reference ids reported by a provider for a show
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub tvdb: Option<u64>,
    pub tvmaze: Option<u64>,
    pub tvrage: Option<u64>,
    pub imdb: Option<String>,
}

/// Full show graph as returned by one provider fetch.
///
/// A graph is never patched in place: the next fetch replaces the whole
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub provider: Provider,
    /// Provider-local id
    pub id: u64,
    pub name: String,
    pub aliases: Vec<String>,
    pub overview: Option<String>,
    /// e.g. "Continuing", "Ended"
    pub status: String,
    pub show_type: Option<String>,
    pub genres: Vec<String>,
    pub network: Option<String>,
    pub language: Option<String>,
    pub runtime: Option<String>,
    pub first_aired: Option<NaiveDate>,
    pub airs_days: Option<String>,
    pub airs_time: Option<NaiveTime>,
    pub site_rating: f32,
    pub site_rating_votes: i32,
    pub external_ids: ExternalIds,
    pub poster_url: Option<String>,
    pub official_url: Option<String>,
    pub web_url: Option<String>,
    /// Server-side change marker; local artifacts older than this are stale
    pub last_updated: DateTime<Utc>,
    /// Set when the provider reported a change newer than this graph
    pub dirty: bool,
    pub seasons: Vec<Season>,
    pub episodes: Vec<Episode>,
    pub actors: Vec<Actor>,
    pub artwork: Vec<Artwork>,
}

impl SeriesInfo {
    /// Minimal graph, mostly useful for tests and search results
    pub fn new(provider: Provider, id: u64, name: impl Into<String>) -> Self {
        Self {
            provider,
            id,
            name: name.into(),
            aliases: Vec::new(),
            overview: None,
            status: "Unknown".to_string(),
            show_type: None,
            genres: Vec::new(),
            network: None,
            language: None,
            runtime: None,
            first_aired: None,
            airs_days: None,
            airs_time: None,
            site_rating: 0.0,
            site_rating_votes: 0,
            external_ids: ExternalIds::default(),
            poster_url: None,
            official_url: None,
            web_url: None,
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
            dirty: false,
            seasons: Vec::new(),
            episodes: Vec::new(),
            actors: Vec::new(),
            artwork: Vec::new(),
        }
    }

    pub fn season(&self, number: i32) -> Option<&Season> {
        self.seasons.iter().find(|s| s.number == number)
    }

    pub fn episodes_in_season(&self, number: i32) -> impl Iterator<Item = &Episode> {
        self.episodes.iter().filter(move |e| e.season == number)
    }

    pub fn episode(&self, season: i32, number: i32) -> Option<&Episode> {
        self.episodes
            .iter()
            .find(|e| e.season == season && e.number == number)
    }

    /// Highest-rated artwork of a kind, optionally restricted to one season
    pub fn best_artwork(&self, kind: ArtworkKind, season: Option<i32>) -> Option<&Artwork> {
        self.artwork
            .iter()
            .filter(|a| a.kind == kind && (season.is_none() || a.season == season))
            .max_by_key(|a| a.rating)
    }

    /// Poster for a season, falling back to the show poster
    pub fn season_poster(&self, number: i32) -> Option<&str> {
        self.season(number)
            .and_then(|s| s.image_url.as_deref())
            .or_else(|| {
                self.best_artwork(ArtworkKind::Season, Some(number))
                    .map(|a| a.url.as_str())
            })
            .or(self.poster_url.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub id: u64,
    /// Season number (0 for specials)
    pub number: i32,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: u64,
    pub series_id: u64,
    pub name: String,
    pub season: i32,
    pub number: i32,
    pub first_aired: Option<NaiveDate>,
    pub air_stamp: Option<DateTime<Utc>>,
    pub overview: Option<String>,
    pub runtime: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub writers: Vec<String>,
    pub directors: Vec<String>,
}

impl Episode {
    pub fn new(id: u64, series_id: u64, season: i32, number: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            series_id,
            name: name.into(),
            season,
            number,
            first_aired: None,
            air_stamp: None,
            overview: None,
            runtime: None,
            image_url: None,
            link_url: None,
            writers: Vec::new(),
            directors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: u64,
    pub name: String,
    pub role: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkKind {
    Poster,
    Fanart,
    Season,
    Banner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artwork {
    pub id: Option<u64>,
    pub kind: ArtworkKind,
    pub season: Option<i32>,
    pub url: String,
    pub rating: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let identity = SeriesIdentity::new().with_tvdb(81189).with_imdb("tt0903747");
        assert_eq!(identity.to_string(), "tvdb=81189, imdb=tt0903747");
        assert_eq!(SeriesIdentity::new().to_string(), "<no ids>");
    }

    #[test]
    fn test_empty_imdb_is_ignored() {
        let identity = SeriesIdentity::new().with_imdb("");
        assert!(identity.imdb.is_none());
        assert!(!identity.has_any());
    }

    #[test]
    fn test_season_poster_falls_back_to_show_poster() {
        let mut series = SeriesInfo::new(Provider::TvMaze, 1, "Show");
        series.poster_url = Some("http://img/show.jpg".to_string());
        series.artwork.push(Artwork {
            id: None,
            kind: ArtworkKind::Season,
            season: Some(2),
            url: "http://img/s2.jpg".to_string(),
            rating: 10,
        });

        assert_eq!(series.season_poster(2), Some("http://img/s2.jpg"));
        assert_eq!(series.season_poster(3), Some("http://img/show.jpg"));
    }
}
