use crate::source::{
    Actor, Artwork, ArtworkKind, Episode, ExternalIds, Fields, ForeignId, HttpClient, IdLookup,
    LookupHit, MetadataCache, MetadataSource, Provider, RequestError, Result, RetryPolicy, Season,
    SeriesIdentity, SeriesIdentityResolver, SeriesInfo, SourceError,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid html tag regex"));

/// Show types that TVmaze keeps apart from genres but we treat as genres
const TYPE_GENRES: [&str; 5] = ["Animation", "Reality", "Documentary", "News", "Sports"];

/// Query used only to check that the service answers
const LIVENESS_QUERY: &str = "/singlesearch/shows?q=girls";

/// Client for TVmaze, which needs no credentials
pub struct TvMazeClient {
    http: HttpClient,
    cache: MetadataCache,
    resolver: SeriesIdentityResolver,
    lookup_retry: RetryPolicy,
    show_retry: RetryPolicy,
    updates_retry: RetryPolicy,
}

impl TvMazeClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        cache: MetadataCache,
    ) -> Result<Self> {
        let http = HttpClient::new(base_url, timeout)
            .map_err(|e| SourceError::connectivity(Provider::TvMaze, &e))?;

        Ok(Self {
            http,
            resolver: SeriesIdentityResolver::new(cache.clone()),
            cache,
            lookup_retry: RetryPolicy::default(),
            show_retry: RetryPolicy::new(5, Duration::from_secs(2)),
            updates_retry: RetryPolicy::default(),
        })
    }

    /// Retry schedule for the id lookups
    #[must_use]
    pub const fn with_lookup_retry(mut self, retry: RetryPolicy) -> Self {
        self.lookup_retry = retry;
        self
    }

    /// Retry schedule for the full show download
    #[must_use]
    pub const fn with_show_retry(mut self, retry: RetryPolicy) -> Self {
        self.show_retry = retry;
        self
    }

    #[must_use]
    pub const fn with_updates_retry(mut self, retry: RetryPolicy) -> Self {
        self.updates_retry = retry;
        self
    }

    /// Resolve an identity to a TVmaze show id
    pub async fn resolve_id(&self, identity: &SeriesIdentity) -> Result<u64> {
        self.resolver.resolve(identity, self).await
    }

    fn show_endpoint(id: u64) -> String {
        format!(
            "/shows/{id}?specials=1&embed[]=cast&embed[]=episodes&embed[]=crew&embed[]=akas&embed[]=seasons&embed[]=images"
        )
    }

    async fn lookup_endpoint(&self, endpoint: &str) -> Result<Option<LookupHit>> {
        match self
            .http
            .get_json_with_retry(endpoint, None, self.lookup_retry)
            .await
        {
            Ok(doc) => {
                let show = Fields::new(&doc, Provider::TvMaze);
                let tvdb = show
                    .opt_child("externals")
                    .and_then(|e| e.opt_u64("thetvdb"));
                Ok(Some(LookupHit {
                    id: show.u64("id")?,
                    tvdb,
                }))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(SourceError::connectivity(Provider::TvMaze, &e)),
        }
    }

    async fn fetch_show_doc(&self, id: u64) -> Result<Value> {
        let endpoint = Self::show_endpoint(id);
        match self
            .http
            .get_json_with_retry(&endpoint, None, self.show_retry)
            .await
        {
            Ok(doc) => Ok(doc),
            Err(e) if e.is_not_found() => Err(self.classify_missing(id, &e).await),
            Err(e) => Err(SourceError::connectivity(Provider::TvMaze, &e)),
        }
    }

    /// A 404 only means "no such show" if the service itself is answering
    async fn classify_missing(&self, id: u64, err: &RequestError) -> SourceError {
        if self.is_up().await {
            SourceError::NotFound {
                tried: vec![format!("tvmaze={id}")],
                from: Provider::TvMaze,
                to: Provider::TvMaze,
                message: "the show may have been removed or merged".to_string(),
            }
        } else {
            SourceError::connectivity(Provider::TvMaze, err)
        }
    }

    pub(crate) fn parse_series(doc: &Value) -> Result<SeriesInfo> {
        let show = Fields::new(doc, Provider::TvMaze);
        let id = show.u64("id")?;

        let mut series = SeriesInfo::new(Provider::TvMaze, id, clean_text(show.str("name")?));
        series.web_url = show.opt_str("url").map(String::from);
        series.official_url = show.opt_str("officialSite").map(String::from);
        series.language = show.opt_str("language").map(String::from);
        series.genres = show.strings("genres");
        series.show_type = show.opt_str("type").map(String::from);
        if let Some(show_type) = series.show_type.as_deref()
            && TYPE_GENRES.contains(&show_type)
            && !series.genres.iter().any(|g| g == show_type)
        {
            series.genres.push(show_type.to_string());
        }

        series.status = match show.str("status")? {
            "Running" => "Continuing".to_string(),
            other => other.to_string(),
        };
        series.runtime = show.opt_u64("runtime").map(|r| r.to_string());
        series.first_aired = show.opt_date("premiered");
        series.overview = show.opt_str("summary").map(clean_text);

        if let Some(schedule) = show.opt_child("schedule") {
            series.airs_time = schedule
                .opt_str("time")
                .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok());
            let days = schedule.strings("days");
            series.airs_days = (!days.is_empty()).then(|| days.join(", "));
        }

        if let Some(rating) = show.opt_child("rating") {
            series.site_rating = rating.opt_f64("average").unwrap_or_default() as f32;
        }
        series.site_rating_votes = show
            .opt_i64("weight")
            .and_then(|w| i32::try_from(w).ok())
            .unwrap_or_default();

        series.network = show
            .opt_child("network")
            .or_else(|| show.opt_child("webChannel"))
            .and_then(|n| n.opt_str("name"))
            .map(String::from);

        if let Some(externals) = show.opt_child("externals") {
            series.external_ids = ExternalIds {
                tvdb: externals.opt_u64("thetvdb"),
                tvmaze: Some(id),
                tvrage: externals.opt_u64("tvrage"),
                imdb: externals.opt_str("imdb").map(String::from),
            };
        } else {
            series.external_ids.tvmaze = Some(id);
        }

        let image = show.child("image")?;
        if !image.is_null() {
            series.poster_url = image
                .opt_str("original")
                .or_else(|| image.opt_str("medium"))
                .map(String::from);
        }

        series.last_updated = show
            .opt_i64("updated")
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let embedded = show.child("_embedded")?;

        for aka in embedded.array("akas")? {
            series.aliases.push(aka.str("name")?.to_string());
        }

        for (index, member) in embedded.array("cast")?.iter().enumerate() {
            let person = member.child("person")?;
            series.actors.push(Actor {
                id: person.u64("id")?,
                name: person.str("name")?.to_string(),
                role: member
                    .opt_child("character")
                    .and_then(|c| c.opt_str("name"))
                    .map(String::from),
                image_url: person
                    .opt_child("image")
                    .and_then(|i| i.opt_str("medium"))
                    .map(String::from),
                sort_order: i32::try_from(index).unwrap_or(i32::MAX),
            });
        }

        let mut writers = Vec::new();
        let mut directors = Vec::new();
        for member in embedded.array("crew")? {
            let role = member.str("type")?;
            let name = member.child("person")?.str("name")?.to_string();
            if role.ends_with("Writer") {
                writers.push(name);
            } else if role.ends_with("Director") {
                directors.push(name);
            }
        }

        for season in embedded.array("seasons")? {
            let number = season.i32("number")?;
            let image_url = season
                .opt_child("image")
                .and_then(|i| i.opt_str("original").or_else(|| i.opt_str("medium")))
                .map(String::from);
            if let Some(ref url) = image_url {
                series.artwork.push(Artwork {
                    id: None,
                    kind: ArtworkKind::Season,
                    season: Some(number),
                    url: url.clone(),
                    rating: 10,
                });
            }
            series.seasons.push(Season {
                id: season.u64("id")?,
                number,
                name: season.opt_str("name").map(String::from),
                overview: season.opt_str("summary").map(clean_text),
                url: season.opt_str("url").map(String::from),
                image_url,
            });
        }

        for image in embedded.array("images")? {
            let kind = match image.str("type")? {
                "poster" => ArtworkKind::Poster,
                "background" => ArtworkKind::Fanart,
                "banner" => ArtworkKind::Banner,
                _ => continue,
            };
            let Some(url) = image
                .opt_child("resolutions")
                .and_then(|r| r.opt_child("original"))
                .and_then(|o| o.opt_str("url"))
            else {
                continue;
            };
            let main = image.value().get("main").and_then(Value::as_bool) == Some(true);
            series.artwork.push(Artwork {
                id: image.opt_u64("id"),
                kind,
                season: None,
                url: url.to_string(),
                rating: if main { 10 } else { 5 },
            });
        }

        // specials come back without an episode number
        let mut special_count = 0;
        for ep in embedded.array("episodes")? {
            let (season, number) = match ep.opt_i64("number").and_then(|n| i32::try_from(n).ok()) {
                Some(number) => (ep.i32("season")?, number),
                None => {
                    special_count += 1;
                    (0, special_count)
                }
            };
            let mut episode = Episode::new(
                ep.u64("id")?,
                id,
                season,
                number,
                ep.opt_str("name").map(clean_text).unwrap_or_default(),
            );
            episode.first_aired = ep.opt_date("airdate");
            episode.air_stamp = ep
                .opt_str("airstamp")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            episode.runtime = ep.opt_u64("runtime").map(|r| r.to_string());
            episode.overview = ep.opt_str("summary").map(clean_text);
            episode.link_url = ep.opt_str("url").map(String::from);
            episode.image_url = ep
                .opt_child("image")
                .and_then(|i| i.opt_str("original").or_else(|| i.opt_str("medium")))
                .map(String::from);
            episode.writers = writers.clone();
            episode.directors = directors.clone();
            series.episodes.push(episode);
        }

        Ok(series)
    }
}

/// Decode HTML entities and drop markup from provider text
fn clean_text(value: &str) -> String {
    let stripped = HTML_TAG.replace_all(value, "");
    html_escape::decode_html_entities(stripped.trim()).into_owned()
}

#[async_trait]
impl IdLookup for TvMazeClient {
    fn provider(&self) -> Provider {
        Provider::TvMaze
    }

    async fn lookup(&self, id: &ForeignId) -> Result<Option<LookupHit>> {
        let endpoint = match id {
            ForeignId::Tvdb(tvdb) => format!("/lookup/shows?thetvdb={tvdb}"),
            ForeignId::Imdb(imdb) => {
                format!("/lookup/shows?imdb={}", urlencoding::encode(imdb))
            }
        };
        debug!("Looking up TVmaze show by {}", id);
        self.lookup_endpoint(&endpoint).await
    }

    async fn is_up(&self) -> bool {
        match self.http.get_json(LIVENESS_QUERY, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!("TVmaze liveness probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl MetadataSource for TvMazeClient {
    fn provider(&self) -> Provider {
        Provider::TvMaze
    }

    fn name(&self) -> &'static str {
        "TVmaze"
    }

    async fn fetch_series(&self, identity: &SeriesIdentity) -> Result<SeriesInfo> {
        let id = self.resolve_id(identity).await?;

        if let Some(cached) = self.cache.get_series(Provider::TvMaze, id).await
            && !cached.dirty
        {
            debug!("TVmaze cache hit for {}", id);
            return Ok((*cached).clone());
        }

        info!("Fetching show {} from TVmaze ({})", id, identity);
        let doc = self.fetch_show_doc(id).await?;
        let mut series = Self::parse_series(&doc)?;

        if let Some(tvdb) = identity.tvdb {
            if series.external_ids.tvdb.is_none() {
                series.external_ids.tvdb = Some(tvdb);
            }
            if let Some(ref imdb) = series.external_ids.imdb {
                self.cache.remember_imdb(tvdb, imdb.clone()).await;
            }
        }

        self.cache.set_series(series.clone()).await;
        Ok(series)
    }

    async fn fetch_updates(&self, since: Option<DateTime<Utc>>) -> Result<HashMap<u64, i64>> {
        let doc = self
            .http
            .get_json_with_retry("/updates/shows", None, self.updates_retry)
            .await
            .map_err(|e| SourceError::connectivity(Provider::TvMaze, &e))?;

        let Some(entries) = doc.as_object() else {
            return Err(SourceError::consistency(Provider::TvMaze, "updates"));
        };

        let floor = since.map_or(i64::MIN, |s| s.timestamp());
        let mut updates = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            let (Ok(id), Some(stamp)) = (key.parse::<u64>(), value.as_i64()) else {
                warn!("Ignoring malformed TVmaze update entry {}: {}", key, value);
                continue;
            };
            if stamp >= floor {
                updates.insert(id, stamp);
            }
        }

        self.cache.apply_updates(Provider::TvMaze, &updates).await;
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_show() -> Value {
        json!({
            "id": 169,
            "url": "https://www.tvmaze.com/shows/169/breaking-bad",
            "name": "Breaking Bad",
            "type": "Scripted",
            "language": "English",
            "genres": ["Drama", "Crime"],
            "status": "Running",
            "runtime": 60,
            "premiered": "2008-01-20",
            "officialSite": null,
            "schedule": {"time": "22:00", "days": ["Sunday"]},
            "rating": {"average": 9.2},
            "weight": 98,
            "network": null,
            "webChannel": {"name": "AMC+"},
            "externals": {"tvrage": 18164, "thetvdb": 81189, "imdb": "tt0903747"},
            "image": {"medium": "m.jpg", "original": "o.jpg"},
            "summary": "<p><b>Breaking Bad</b> follows Walter &amp; Jesse.</p>",
            "updated": 1_700_000_000,
            "_embedded": {
                "akas": [{"name": "Kemia"}],
                "cast": [{"person": {"id": 14245, "name": "Bryan Cranston", "image": {"medium": "bc.jpg"}},
                          "character": {"name": "Walter White"}}],
                "crew": [{"type": "Creator", "person": {"name": "Vince Gilligan"}},
                         {"type": "Co-Executive Director", "person": {"name": "Someone"}},
                         {"type": "Story Writer", "person": {"name": "Writer One"}}],
                "seasons": [{"id": 1, "number": 1, "summary": "<p>First</p>",
                             "image": {"original": "s1.jpg"}}],
                "images": [{"id": 5, "type": "background", "main": true,
                            "resolutions": {"original": {"url": "bg.jpg"}}}],
                "episodes": [
                    {"id": 12192, "season": 1, "number": 1, "name": "Pilot", "airdate": "2008-01-20",
                     "airstamp": "2008-01-21T03:00:00+00:00", "runtime": 60, "image": null,
                     "summary": "<p>Walt starts.</p>"},
                    {"id": 99, "season": 1, "number": null, "name": "Minisode"}
                ]
            }
        })
    }

    #[test]
    fn test_parse_show_graph() {
        let series = TvMazeClient::parse_series(&sample_show()).unwrap();

        assert_eq!(series.status, "Continuing");
        assert_eq!(series.network.as_deref(), Some("AMC+"));
        assert_eq!(
            series.overview.as_deref(),
            Some("Breaking Bad follows Walter & Jesse.")
        );
        assert_eq!(series.aliases, vec!["Kemia"]);
        assert_eq!(series.actors[0].role.as_deref(), Some("Walter White"));
        assert_eq!(series.episodes[0].writers, vec!["Writer One"]);
        assert_eq!(series.episodes[0].directors, vec!["Someone"]);
        assert_eq!(series.episodes[1].season, 0);
        assert_eq!(series.seasons[0].overview.as_deref(), Some("First"));
        assert_eq!(series.best_artwork(ArtworkKind::Fanart, None).unwrap().url, "bg.jpg");
        assert_eq!(series.last_updated.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_type_becomes_genre() {
        let mut doc = sample_show();
        doc["type"] = json!("Animation");
        let series = TvMazeClient::parse_series(&doc).unwrap();
        assert!(series.genres.contains(&"Animation".to_string()));
    }

    #[test]
    fn test_actor_without_name_is_consistency_error() {
        let mut doc = sample_show();
        doc["_embedded"]["cast"][0]["person"] = json!({"id": 1});
        match TvMazeClient::parse_series(&doc) {
            Err(SourceError::Consistency { field, provider }) => {
                assert_eq!(field, "name");
                assert_eq!(provider, Provider::TvMaze);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_image_key_is_consistency_error() {
        let mut doc = sample_show();
        doc.as_object_mut().unwrap().remove("image");
        assert!(matches!(
            TvMazeClient::parse_series(&doc),
            Err(SourceError::Consistency { .. })
        ));
    }

    fn client(server: &mockito::Server) -> TvMazeClient {
        TvMazeClient::new(
            server.url(),
            Duration::from_secs(5),
            MetadataCache::new(10, Duration::from_secs(60)),
        )
        .unwrap()
        .with_lookup_retry(RetryPolicy::new(3, Duration::from_millis(10)))
        .with_show_retry(RetryPolicy::new(5, Duration::from_millis(10)))
    }

    #[tokio::test]
    async fn test_lookup_and_show_fetch_retry_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let flaky_lookup = server
            .mock("GET", "/lookup/shows?thetvdb=81189")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;
        let lookup = server
            .mock("GET", "/lookup/shows?thetvdb=81189")
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":169,"externals":{"thetvdb":81189}}"#)
            .expect(1)
            .create_async()
            .await;
        let flaky_show = server
            .mock("GET", mockito::Matcher::Regex(r"^/shows/169".to_string()))
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let show = server
            .mock("GET", mockito::Matcher::Regex(r"^/shows/169".to_string()))
            .with_header("content-type", "application/json")
            .with_body(sample_show().to_string())
            .expect(1)
            .create_async()
            .await;

        let series = client(&server)
            .fetch_series(&SeriesIdentity::new().with_tvdb(81189))
            .await
            .unwrap();

        assert_eq!(series.id, 169);
        flaky_lookup.assert_async().await;
        lookup.assert_async().await;
        flaky_show.assert_async().await;
        show.assert_async().await;
    }

    #[tokio::test]
    async fn test_lookup_gives_up_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/lookup/shows?thetvdb=81189")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server)
            .fetch_series(&SeriesIdentity::new().with_tvdb(81189))
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Connectivity { .. }));
        lookup.assert_async().await;
    }
}
