use super::{HttpClient, Provider, RequestError, Result, SourceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Source of wall-clock time, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Token ages at which it is refreshed or re-acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenThresholds {
    pub stale_after_secs: u64,
    pub invalid_after_secs: u64,
}

impl TokenThresholds {
    pub const DEFAULT_STALE: Duration = Duration::from_secs(23 * 3600);
    pub const DEFAULT_INVALID: Duration = Duration::from_secs(24 * 3600 - 60);

    /// Build thresholds, rejecting a stale limit at or past the invalid one
    pub fn new(stale_after: Duration, invalid_after: Duration) -> Result<Self> {
        let thresholds = Self {
            stale_after_secs: stale_after.as_secs(),
            invalid_after_secs: invalid_after.as_secs(),
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stale_after_secs >= self.invalid_after_secs {
            return Err(SourceError::Config(format!(
                "token stale threshold ({}s) must be below invalid threshold ({}s)",
                self.stale_after_secs, self.invalid_after_secs
            )));
        }
        Ok(())
    }

    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub const fn invalid_after(&self) -> Duration {
        Duration::from_secs(self.invalid_after_secs)
    }

    /// Classify a token by its age
    pub fn state_for(&self, age: Duration) -> TokenState {
        if age >= self.invalid_after() {
            TokenState::Invalid
        } else if age >= self.stale_after() {
            TokenState::Stale
        } else {
            TokenState::Valid
        }
    }
}

impl Default for TokenThresholds {
    fn default() -> Self {
        Self {
            stale_after_secs: Self::DEFAULT_STALE.as_secs(),
            invalid_after_secs: Self::DEFAULT_INVALID.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unacquired,
    Valid,
    Stale,
    Invalid,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    acquired_at: DateTime<Utc>,
}

/// Bearer-token lifecycle for one provider client.
///
/// The cached token sits behind an async mutex held across the network
/// call, so concurrent callers queue behind a single login or refresh.
pub struct TokenProvider {
    http: HttpClient,
    provider: Provider,
    api_key: String,
    thresholds: TokenThresholds,
    clock: Arc<dyn Clock>,
    token: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        http: HttpClient,
        provider: Provider,
        api_key: impl Into<String>,
        thresholds: TokenThresholds,
    ) -> Self {
        Self {
            http,
            provider,
            api_key: api_key.into(),
            thresholds,
            clock: Arc::new(SystemClock),
            token: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub const fn thresholds(&self) -> TokenThresholds {
        self.thresholds
    }

    /// Current lifecycle state without touching the network
    pub async fn state(&self) -> TokenState {
        let guard = self.token.lock().await;
        self.state_of(guard.as_ref())
    }

    fn state_of(&self, token: Option<&CachedToken>) -> TokenState {
        match token {
            None => TokenState::Unacquired,
            Some(t) => self.thresholds.state_for(self.age(t)),
        }
    }

    fn age(&self, token: &CachedToken) -> Duration {
        (self.clock.now() - token.acquired_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Return a usable token, logging in or refreshing first when due.
    ///
    /// A failed login or refresh keeps the previous token; the next call
    /// tries again. Only a client that has never held a token gets an error.
    pub async fn get_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;

        let outcome = match self.state_of(guard.as_ref()) {
            TokenState::Valid => None,
            TokenState::Unacquired | TokenState::Invalid => Some(self.login().await),
            TokenState::Stale => {
                let current = guard.as_ref().map(|t| t.value.clone()).unwrap_or_default();
                Some(self.refresh(&current).await)
            }
        };

        match outcome {
            Some(Ok(value)) => {
                debug!("{} token updated ({} chars)", self.provider, value.len());
                *guard = Some(CachedToken {
                    value,
                    acquired_at: self.clock.now(),
                });
            }
            Some(Err(e)) => {
                error!("Could not update {} token: {}", self.provider, e);
            }
            None => {}
        }

        guard
            .as_ref()
            .map(|t| t.value.clone())
            .ok_or_else(|| SourceError::Auth {
                provider: self.provider,
                message: "no token has been obtained yet".to_string(),
            })
    }

    /// Drop the cached token so the next call performs a full login
    pub async fn invalidate(&self) {
        warn!("Discarding cached {} token", self.provider);
        *self.token.lock().await = None;
    }

    async fn login(&self) -> std::result::Result<String, RequestError> {
        info!("Logging in to {}", self.provider);
        let response = self
            .http
            .post_json("/login", &json!({ "apikey": self.api_key }))
            .await?;
        Self::extract(&response)
    }

    async fn refresh(&self, current: &str) -> std::result::Result<String, RequestError> {
        info!("Refreshing {} token", self.provider);
        let response = self.http.get_json("/refresh_token", Some(current)).await?;
        Self::extract(&response)
    }

    fn extract(response: &serde_json::Value) -> std::result::Result<String, RequestError> {
        response
            .get("token")
            .and_then(serde_json::Value::as_str)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .ok_or_else(|| RequestError::Decode("response has no 'token' field".to_string()))
    }
}

/// Clock that only moves when told to
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock(parking_lot::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self(parking_lot::Mutex::new(start))
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.0.lock();
        *now += chrono::Duration::from_std(by).unwrap_or_default();
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let t = TokenThresholds::default();
        assert_eq!(t.stale_after(), Duration::from_secs(82_800));
        assert_eq!(t.invalid_after(), Duration::from_secs(86_340));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let err = TokenThresholds::new(Duration::from_secs(10), Duration::from_secs(10));
        assert!(matches!(err, Err(SourceError::Config(_))));
    }

    #[test]
    fn test_state_boundaries() {
        let t = TokenThresholds::default();
        let hour = 3600;
        assert_eq!(t.state_for(Duration::from_secs(22 * hour)), TokenState::Valid);
        assert_eq!(t.state_for(Duration::from_secs(23 * hour)), TokenState::Stale);
        assert_eq!(
            t.state_for(Duration::from_secs(24 * hour - 61)),
            TokenState::Stale
        );
        assert_eq!(
            t.state_for(Duration::from_secs(24 * hour - 60)),
            TokenState::Invalid
        );
    }
}
