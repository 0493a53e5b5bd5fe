use super::{MetadataCache, Provider, Result, SeriesIdentity, SourceError};
use async_trait::async_trait;
use tracing::{debug, error, info};

/// A foreign catalogue id a provider can be queried by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignId {
    Tvdb(u64),
    Imdb(String),
}

impl std::fmt::Display for ForeignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tvdb(id) => write!(f, "tvdb={id}"),
            Self::Imdb(id) => write!(f, "imdb={id}"),
        }
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupHit {
    /// Id on the provider that was queried
    pub id: u64,
    /// TheTVDB id the provider reports for the record, if any
    pub tvdb: Option<u64>,
}

/// Provider that can map foreign ids onto its own
#[async_trait]
pub trait IdLookup: Send + Sync {
    fn provider(&self) -> Provider;

    /// `Ok(None)` means the provider answered and has no such show.
    /// Transport failures come back as `Err`.
    async fn lookup(&self, id: &ForeignId) -> Result<Option<LookupHit>>;

    /// Cheap request used to tell "unknown show" apart from "provider down"
    async fn is_up(&self) -> bool;
}

/// Resolves a provider-neutral identity into one provider's series id.
///
/// Chain: direct id, cached mapping, lookup by TheTVDB id, lookup by imdb id.
#[derive(Clone)]
pub struct SeriesIdentityResolver {
    cache: MetadataCache,
}

impl SeriesIdentityResolver {
    pub const fn new(cache: MetadataCache) -> Self {
        Self { cache }
    }

    pub async fn resolve(&self, identity: &SeriesIdentity, lookup: &dyn IdLookup) -> Result<u64> {
        let target = lookup.provider();

        if let Some(id) = identity.id_for(target) {
            return Ok(id);
        }

        let Some(tvdb) = identity.tvdb else {
            return match identity.imdb {
                Some(ref imdb) => self.resolve_imdb_only(imdb, lookup).await,
                None => Err(SourceError::NotFound {
                    tried: Vec::new(),
                    from: Provider::TheTvdb,
                    to: target,
                    message: "the show has no ids to look up".to_string(),
                }),
            };
        };

        if let Some(id) = self.cache.get_mapping(Provider::TheTvdb, target, tvdb).await {
            debug!("Using cached mapping tvdb={} -> {} {}", tvdb, target, id);
            return Ok(id);
        }

        let primary = ForeignId::Tvdb(tvdb);
        if let Some(hit) = lookup.lookup(&primary).await? {
            self.remember(tvdb, target, hit.id).await;
            return Ok(hit.id);
        }

        let imdb = match identity.imdb {
            Some(ref imdb) => Some(imdb.clone()),
            None => self.cache.imdb_for_tvdb(tvdb).await,
        };
        let Some(imdb) = imdb else {
            return Err(SourceError::NotFound {
                tried: vec![primary.to_string()],
                from: Provider::TheTvdb,
                to: target,
                message: format!("please add the show to {target} or link it by id"),
            });
        };

        let secondary = ForeignId::Imdb(imdb);
        match lookup.lookup(&secondary).await? {
            Some(hit) => {
                if let Some(reported) = hit.tvdb
                    && reported != tvdb
                {
                    error!(
                        "Data issue: {} show {} found via {} reports tvdb={} but tvdb={} was requested",
                        target, hit.id, secondary, reported, tvdb
                    );
                }
                info!(
                    "Resolved tvdb={} on {} via {} fallback",
                    tvdb, target, secondary
                );
                self.remember(tvdb, target, hit.id).await;
                Ok(hit.id)
            }
            None => {
                let tried = vec![primary.to_string(), secondary.to_string()];
                if lookup.is_up().await {
                    Err(SourceError::NotFound {
                        tried,
                        from: Provider::TheTvdb,
                        to: target,
                        message: format!("please add the show to {target} or link it by id"),
                    })
                } else {
                    Err(SourceError::Connectivity {
                        provider: target,
                        status: Some(404),
                        message: format!(
                            "lookup of {} failed and {target} appears to be down",
                            tried.join(", ")
                        ),
                    })
                }
            }
        }
    }

    async fn resolve_imdb_only(&self, imdb: &str, lookup: &dyn IdLookup) -> Result<u64> {
        let target = lookup.provider();
        let id = ForeignId::Imdb(imdb.to_string());
        match lookup.lookup(&id).await? {
            Some(hit) => Ok(hit.id),
            None if lookup.is_up().await => Err(SourceError::NotFound {
                tried: vec![id.to_string()],
                from: Provider::TheTvdb,
                to: target,
                message: format!("please add the show to {target} or link it by id"),
            }),
            None => Err(SourceError::Connectivity {
                provider: target,
                status: Some(404),
                message: format!("lookup of {id} failed and {target} appears to be down"),
            }),
        }
    }

    async fn remember(&self, tvdb: u64, target: Provider, id: u64) {
        self.cache
            .set_mapping(Provider::TheTvdb, target, tvdb, id)
            .await;
    }
}
