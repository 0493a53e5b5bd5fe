use super::TVDB_ARTWORK_BASE;
use crate::source::{
    Actor, Artwork, ArtworkKind, Clock, Episode, ExternalIds, Fields, HttpClient, MetadataCache,
    MetadataSource, Provider, RequestError, Result, RetryPolicy, Season, SeriesIdentity,
    SeriesInfo, SourceError, TokenProvider, TokenThresholds,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client for TheTVDB, which needs a bearer token on every data call
pub struct TvdbClient {
    http: HttpClient,
    tokens: TokenProvider,
    cache: Option<MetadataCache>,
    retry: RetryPolicy,
}

impl TvdbClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        thresholds: TokenThresholds,
        timeout: Duration,
    ) -> Result<Self> {
        thresholds.validate()?;
        let http = HttpClient::new(base_url, timeout)
            .map_err(|e| SourceError::connectivity(Provider::TheTvdb, &e))?;
        let tokens = TokenProvider::new(http.clone(), Provider::TheTvdb, api_key, thresholds);

        Ok(Self {
            http,
            tokens,
            cache: None,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_cache(mut self, cache: MetadataCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tokens = self.tokens.with_clock(clock);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    async fn request(&self, endpoint: &str, tvdb: Option<u64>) -> Result<Value> {
        let token = self.tokens.get_token().await?;
        self.http
            .get_json_with_retry(endpoint, Some(&token), self.retry)
            .await
            .map_err(|e| self.map_error(&e, tvdb))
    }

    fn map_error(&self, err: &RequestError, tvdb: Option<u64>) -> SourceError {
        if err.is_unauthorized() {
            return SourceError::Auth {
                provider: Provider::TheTvdb,
                message: err.to_string(),
            };
        }
        match (err.is_not_found(), tvdb) {
            (true, Some(id)) => SourceError::NotFound {
                tried: vec![format!("tvdb={id}")],
                from: Provider::TheTvdb,
                to: Provider::TheTvdb,
                message: "the show may have been removed or merged".to_string(),
            },
            _ => SourceError::connectivity(Provider::TheTvdb, err),
        }
    }

    fn artwork_url(path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{TVDB_ARTWORK_BASE}{}", path.trim_start_matches('/'))
        }
    }

    fn parse_series(&self, doc: &Value) -> Result<SeriesInfo> {
        let root = Fields::new(doc, Provider::TheTvdb);
        let data = root.child("data")?;

        let id = data.u64("id")?;
        let mut series = SeriesInfo::new(Provider::TheTvdb, id, data.str("seriesName")?);
        series.aliases = data.strings("aliases");
        series.overview = data.opt_str("overview").map(String::from);
        series.status = data.str("status")?.to_string();
        series.network = data.opt_str("network").map(String::from);
        series.genres = data.strings("genre");
        series.first_aired = data.opt_date("firstAired");
        series.airs_days = data.opt_str("airsDayOfWeek").map(String::from);
        series.airs_time = data.opt_str("airsTime").and_then(parse_air_time);
        series.runtime = data.opt_str("runtime").map(String::from);
        series.language = data.opt_str("language").map(String::from);
        series.site_rating = data.opt_f64("siteRating").unwrap_or_default() as f32;
        series.site_rating_votes = data
            .opt_i64("siteRatingCount")
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or_default();
        series.poster_url = data.opt_str("poster").map(Self::artwork_url);
        series.external_ids = ExternalIds {
            tvdb: Some(id),
            tvmaze: None,
            tvrage: data.opt_u64("zap2itId"),
            imdb: data.opt_str("imdbId").map(String::from),
        };
        series.last_updated = data
            .opt_i64("lastUpdated")
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        for ep in data.array("episodes")? {
            series.episodes.push(Self::parse_episode(&ep, id)?);
        }

        let seasons: BTreeSet<i32> = series.episodes.iter().map(|e| e.season).collect();
        series.seasons = seasons
            .into_iter()
            .map(|number| Season {
                id: 0,
                number,
                name: None,
                overview: None,
                url: None,
                image_url: None,
            })
            .collect();

        for actor in data.opt_array("actors") {
            series.actors.push(Actor {
                id: actor.u64("id")?,
                name: actor.str("name")?.to_string(),
                role: actor.opt_str("role").map(String::from),
                image_url: actor.opt_str("image").map(Self::artwork_url),
                sort_order: actor
                    .opt_i64("sortOrder")
                    .and_then(|n| i32::try_from(n).ok())
                    .unwrap_or_default(),
            });
        }

        for art in data.opt_array("artwork") {
            let kind = match art.str("keyType")? {
                "poster" => ArtworkKind::Poster,
                "fanart" => ArtworkKind::Fanart,
                "season" => ArtworkKind::Season,
                "series" => ArtworkKind::Banner,
                other => {
                    debug!("Skipping TheTVDB artwork of type {}", other);
                    continue;
                }
            };
            let rating = art
                .opt_child("ratingsInfo")
                .and_then(|r| r.opt_f64("average"))
                .unwrap_or_default();
            series.artwork.push(Artwork {
                id: art.opt_u64("id"),
                kind,
                season: (kind == ArtworkKind::Season)
                    .then(|| art.opt_i64("subKey"))
                    .flatten()
                    .and_then(|n| i32::try_from(n).ok()),
                url: Self::artwork_url(art.str("fileName")?),
                rating: (rating * 10.0).round() as i32,
            });
        }

        Ok(series)
    }

    fn parse_episode(ep: &Fields<'_>, series_id: u64) -> Result<Episode> {
        let mut episode = Episode::new(
            ep.u64("id")?,
            series_id,
            ep.i32("airedSeason")?,
            ep.i32("airedEpisodeNumber")?,
            ep.opt_str("episodeName").unwrap_or_default(),
        );
        episode.first_aired = ep.opt_date("firstAired");
        episode.overview = ep.opt_str("overview").map(String::from);
        episode.image_url = ep.opt_str("filename").map(Self::artwork_url);
        episode.writers = ep.strings("writers");
        episode.directors = ep.strings("directors");
        Ok(episode)
    }
}

/// Air times arrive as "9:00 PM" or "21:00"
fn parse_air_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%I:%M %p")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

#[async_trait]
impl MetadataSource for TvdbClient {
    fn provider(&self) -> Provider {
        Provider::TheTvdb
    }

    fn name(&self) -> &'static str {
        "TheTVDB"
    }

    fn requires_token(&self) -> bool {
        true
    }

    async fn fetch_series(&self, identity: &SeriesIdentity) -> Result<SeriesInfo> {
        let Some(id) = identity.tvdb else {
            return Err(SourceError::NotFound {
                tried: vec![identity.to_string()],
                from: Provider::TvMaze,
                to: Provider::TheTvdb,
                message: "no TheTVDB id is known for this show".to_string(),
            });
        };

        if let Some(ref cache) = self.cache
            && let Some(cached) = cache.get_series(Provider::TheTvdb, id).await
            && !cached.dirty
        {
            debug!("TheTVDB cache hit for {}", id);
            return Ok((*cached).clone());
        }

        info!("Fetching show {} from TheTVDB", id);
        let endpoint = format!("/shows/{id}?embed=episodes,actors,artwork");
        let doc = self.request(&endpoint, Some(id)).await?;
        let series = self.parse_series(&doc)?;

        if let Some(ref cache) = self.cache {
            cache.set_series(series.clone()).await;
        }
        Ok(series)
    }

    async fn fetch_updates(&self, since: Option<DateTime<Utc>>) -> Result<HashMap<u64, i64>> {
        // the endpoint only accepts windows up to a week
        let since = since.unwrap_or_else(|| Utc::now() - ChronoDuration::days(7));
        let endpoint = format!("/updated/query?fromTime={}", since.timestamp());
        let doc = self.request(&endpoint, None).await?;

        let root = Fields::new(&doc, Provider::TheTvdb);
        let data = root.child("data")?;
        if data.is_null() {
            return Ok(HashMap::new());
        }

        let mut updates = HashMap::new();
        for item in root.array("data")? {
            let id = item.u64("id")?;
            match item.opt_i64("lastUpdated") {
                Some(t) => {
                    updates.insert(id, t);
                }
                None => warn!("TheTVDB update for {} has no timestamp", id),
            }
        }

        if let Some(ref cache) = self.cache {
            cache.apply_updates(Provider::TheTvdb, &updates).await;
        }
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> TvdbClient {
        TvdbClient::new(
            "http://localhost",
            "key",
            TokenThresholds::default(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_series() {
        let doc = json!({
            "data": {
                "id": 81189,
                "seriesName": "Breaking Bad",
                "aliases": [],
                "status": "Ended",
                "genre": ["Drama"],
                "firstAired": "2008-01-20",
                "airsTime": "9:00 PM",
                "imdbId": "tt0903747",
                "lastUpdated": 1_600_000_000,
                "poster": "posters/81189-1.jpg",
                "episodes": [
                    {"id": 349232, "airedSeason": 1, "airedEpisodeNumber": 1,
                     "episodeName": "Pilot", "writers": ["Vince Gilligan"], "directors": []}
                ],
                "actors": [{"id": 1, "name": "Bryan Cranston", "role": "Walter White", "sortOrder": 0}],
                "artwork": [
                    {"keyType": "season", "subKey": "1", "fileName": "seasons/1.jpg",
                     "ratingsInfo": {"average": 7.5}},
                    {"keyType": "fanart", "fileName": "fanart/1.jpg"}
                ]
            }
        });

        let series = client().parse_series(&doc).unwrap();
        assert_eq!(series.name, "Breaking Bad");
        assert_eq!(series.external_ids.imdb.as_deref(), Some("tt0903747"));
        assert_eq!(series.airs_time, NaiveTime::from_hms_opt(21, 0, 0));
        assert_eq!(series.episodes[0].writers, vec!["Vince Gilligan"]);
        assert_eq!(series.seasons.len(), 1);
        assert_eq!(series.artwork[0].season, Some(1));
        assert_eq!(series.artwork[0].rating, 75);
        assert_eq!(
            series.poster_url.as_deref(),
            Some("https://artworks.thetvdb.com/banners/posters/81189-1.jpg")
        );
    }

    #[test]
    fn test_missing_status_is_consistency_error() {
        let doc = json!({"data": {"id": 1, "seriesName": "X", "episodes": []}});
        match client().parse_series(&doc) {
            Err(SourceError::Consistency { field, .. }) => assert_eq!(field, "status"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_not_found_maps_to_permanent_error() {
        let err = RequestError::Status {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert!(client().map_error(&err, Some(5)).is_not_found());

        let err = RequestError::Status {
            status: 401,
            message: "Not Authorized".to_string(),
        };
        assert!(matches!(
            client().map_error(&err, Some(5)),
            SourceError::Auth { .. }
        ));
    }
}
