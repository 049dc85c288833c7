//! Football API client with cache read-through and retry
//!
//! Every `fetch_*` method follows the same path: build the cache key, try the
//! cache, and on a miss call upstream under the retry policy. Successful
//! envelopes with at least one result are written back with the resource's TTL.
//!
//! Concurrent misses on one key share a single upstream request: the first
//! caller leads, later callers wait for its outcome, success or failure.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::config::ClientConfig;
use super::error::ApiError;
use super::retry::{with_retry, RetryPolicy};
use super::transport::{HttpTransport, RawResponse, Transport, TransportError};
use super::types::{ApiStatus, Envelope, Resource, ResourceRequest};
use crate::cache::CacheManager;

/// Teams per league enriched by [`FootballClient::fetch_all_teams`]
pub const TEAMS_PER_LEAGUE: usize = 10;

type Outcome = Result<Envelope, ApiError>;

/// Published once by the leader of an in-flight request
type InflightSlot = watch::Receiver<Option<Outcome>>;

enum Role<'a> {
    Leader(watch::Sender<Option<Outcome>>, InflightGuard<'a>),
    Follower(InflightSlot),
}

/// Removes the in-flight entry when the leader finishes or is cancelled
struct InflightGuard<'a> {
    inflight: &'a DashMap<String, InflightSlot>,
    key: String,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

/// Runtime cache behaviour of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Whether responses are read from and written to the cache
    pub enabled: bool,
    /// TTL in seconds used for every resource instead of its default
    pub ttl_override: Option<u64>,
}

impl CacheSettings {
    /// TTL in seconds for responses of `resource`
    pub fn ttl_for(&self, resource: Resource) -> u64 {
        self.ttl_override.unwrap_or_else(|| resource.default_ttl_secs())
    }
}

/// Client for the football data API
pub struct FootballClient {
    transport: Arc<dyn Transport>,
    cache: CacheManager,
    settings: RwLock<CacheSettings>,
    retry: RetryPolicy,
    namespace: String,
    inflight: DashMap<String, InflightSlot>,
}

impl std::fmt::Debug for FootballClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FootballClient")
            .field("settings", &self.cache_settings())
            .field("retry", &self.retry)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl FootballClient {
    /// Creates a client that talks HTTP to `config.base_url`
    ///
    /// # Arguments
    /// * `config` - Upstream, retry and cache settings
    /// * `cache` - Cache shared with other components
    ///
    /// # Returns
    /// * `Ok(FootballClient)` - Ready to fetch
    /// * `Err(TransportError)` - If the HTTP client cannot be built
    pub fn new(config: ClientConfig, cache: CacheManager) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport), cache))
    }

    /// Creates a client on top of any [`Transport`]
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        cache: CacheManager,
    ) -> Self {
        Self {
            transport,
            cache,
            settings: RwLock::new(CacheSettings {
                enabled: config.cache_enabled,
                ttl_override: config.cache_ttl_override,
            }),
            retry: config.retry,
            namespace: config.cache_namespace,
            inflight: DashMap::new(),
        }
    }

    /// League table for a season
    pub async fn fetch_standings(&self, league_id: u32, season: u16) -> Result<Vec<Value>, ApiError> {
        self.fetch_items(ResourceRequest::standings(league_id, season))
            .await
    }

    /// Fixtures of a league season, optionally limited to a date range
    pub async fn fetch_fixtures(
        &self,
        league_id: u32,
        season: u16,
        from: Option<chrono::NaiveDate>,
        to: Option<chrono::NaiveDate>,
    ) -> Result<Vec<Value>, ApiError> {
        self.fetch_items(ResourceRequest::fixtures(league_id, season, from, to))
            .await
    }

    /// Upcoming fixtures of a league season
    pub async fn fetch_next_fixtures(
        &self,
        league_id: u32,
        season: u16,
        next: u32,
    ) -> Result<Vec<Value>, ApiError> {
        self.fetch_items(ResourceRequest::next_fixtures(league_id, season, next))
            .await
    }

    /// Most recent fixtures played by a team
    pub async fn fetch_team_recent_fixtures(
        &self,
        team_id: u32,
        last: u32,
    ) -> Result<Vec<Value>, ApiError> {
        self.fetch_items(ResourceRequest::team_recent_fixtures(team_id, last))
            .await
    }

    /// Teams of a league season
    pub async fn fetch_teams(&self, league_id: u32, season: u16) -> Result<Vec<Value>, ApiError> {
        self.fetch_items(ResourceRequest::teams(league_id, season))
            .await
    }

    /// Season statistics of one team
    ///
    /// # Returns
    /// * `Ok(Some(Value))` - The statistics object
    /// * `Ok(None)` - If upstream has nothing for this team and season
    /// * `Err(ApiError)` - If the request failed
    pub async fn fetch_team_statistics(
        &self,
        league_id: u32,
        team_id: u32,
        season: u16,
    ) -> Result<Option<Value>, ApiError> {
        let envelope = self
            .fetch(&ResourceRequest::team_statistics(league_id, team_id, season))
            .await?;
        Ok(envelope.into_single())
    }

    /// Every league known upstream
    pub async fn fetch_leagues(&self) -> Result<Vec<Value>, ApiError> {
        self.fetch_items(ResourceRequest::leagues()).await
    }

    /// One league by id
    pub async fn fetch_league(&self, league_id: u32) -> Result<Option<Value>, ApiError> {
        let envelope = self.fetch(&ResourceRequest::league(league_id)).await?;
        Ok(envelope.into_single())
    }

    /// Teams of several leagues, each with its most recent fixtures
    ///
    /// League names are matched case-insensitively against [`Self::fetch_leagues`];
    /// names with no match are skipped. Only the first [`TEAMS_PER_LEAGUE`]
    /// teams of a league are enriched with a `recent_fixtures` array.
    ///
    /// # Arguments
    /// * `league_names` - Leagues to look up, e.g. `["Premier League"]`
    /// * `season` - Season of the team lists
    /// * `matches_count` - Recent fixtures per team
    ///
    /// # Returns
    /// * `Ok(map)` - Teams keyed by the upstream league name. A league whose
    ///   teams cannot be fetched maps to an empty list, and a team whose
    ///   fixtures cannot be fetched gets an empty `recent_fixtures`.
    /// * `Err(ApiError)` - If the league list itself cannot be fetched
    pub async fn fetch_all_teams<S: AsRef<str>>(
        &self,
        league_names: &[S],
        season: u16,
        matches_count: u32,
    ) -> Result<BTreeMap<String, Vec<Value>>, ApiError> {
        let leagues = self.fetch_leagues().await?;

        let mut wanted: BTreeMap<String, u32> = BTreeMap::new();
        for entry in &leagues {
            let Some((id, name)) = league_id_and_name(entry) else {
                continue;
            };
            let requested = league_names
                .iter()
                .any(|wanted| wanted.as_ref().eq_ignore_ascii_case(name));
            if requested {
                wanted.entry(name.to_string()).or_insert(id);
            }
        }

        let mut results = BTreeMap::new();
        for (name, league_id) in wanted {
            let teams = match self.fetch_teams(league_id, season).await {
                Ok(teams) => self.with_recent_fixtures(teams, matches_count).await,
                Err(e) => {
                    error!(league = %name, league_id, error = %e, "Failed to fetch teams for league");
                    Vec::new()
                }
            };
            results.insert(name, teams);
        }

        Ok(results)
    }

    async fn with_recent_fixtures(&self, teams: Vec<Value>, matches_count: u32) -> Vec<Value> {
        let enriched = teams.into_iter().take(TEAMS_PER_LEAGUE).map(|mut team| async move {
            let team_id = team
                .pointer("/team/id")
                .and_then(Value::as_u64)
                .and_then(|id| u32::try_from(id).ok());
            let fixtures = match team_id {
                Some(team_id) => self
                    .fetch_team_recent_fixtures(team_id, matches_count)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(team_id, error = %e, "Failed to fetch recent fixtures for team");
                        Vec::new()
                    }),
                None => Vec::new(),
            };
            if let Value::Object(fields) = &mut team {
                fields.insert("recent_fixtures".to_string(), Value::Array(fixtures));
            }
            team
        });
        join_all(enriched).await
    }

    /// Account status and request quota; never cached
    pub async fn get_api_status(&self) -> Result<ApiStatus, ApiError> {
        let request = ResourceRequest::status();
        let envelope = self.execute(&request).await?;
        serde_json::from_value(envelope.response).map_err(|source| ApiError::Decode {
            endpoint: request.path().to_string(),
            status: 200,
            source: Arc::new(source),
        })
    }

    /// Removes every cached response of this client
    ///
    /// # Returns
    /// Number of entries removed
    pub async fn clear_cache(&self) -> usize {
        let removed = self
            .cache
            .delete_by_prefix(&format!("{}:", self.namespace))
            .await;
        info!(namespace = %self.namespace, removed, "Cleared Football API cache");
        removed
    }

    /// Removes cached responses of one resource family
    pub async fn clear_resource_cache(&self, resource: Resource) -> usize {
        let prefix = format!("{}:{}", self.namespace, resource.key_prefix());
        let removed = self.cache.delete_by_prefix(&prefix).await;
        info!(%resource, removed, "Cleared Football API resource cache");
        removed
    }

    /// Forces one TTL for every resource and toggles caching
    pub fn update_cache_config(&self, ttl_seconds: Option<u64>, enabled: bool) {
        let mut settings = self.settings.write();
        settings.ttl_override = ttl_seconds;
        settings.enabled = enabled;
        info!(ttl_seconds, enabled, "Updated Football API cache configuration");
    }

    /// Current cache behaviour
    pub fn cache_settings(&self) -> CacheSettings {
        *self.settings.read()
    }

    /// Full cache key of a request, namespace included
    pub fn cache_key_for(&self, request: &ResourceRequest) -> String {
        format!("{}:{}", self.namespace, request.cache_key())
    }

    async fn fetch_items(&self, request: ResourceRequest) -> Result<Vec<Value>, ApiError> {
        Ok(self.fetch(&request).await?.into_items())
    }

    /// Cache read-through around [`Self::execute`]
    async fn fetch(&self, request: &ResourceRequest) -> Result<Envelope, ApiError> {
        let settings = self.cache_settings();
        if !settings.enabled || !request.resource.is_cacheable() {
            return self.execute(request).await;
        }

        let key = self.cache_key_for(request);
        if let Some(envelope) = self.cache.get::<Envelope>(&key).await {
            debug!(%key, "Football API cache hit");
            return Ok(envelope);
        }

        match self.join_inflight(&key) {
            Role::Leader(tx, guard) => {
                let outcome = self.fetch_uncached(request, &key, settings).await;
                tx.send_replace(Some(outcome.clone()));
                drop(guard);
                outcome
            }
            Role::Follower(mut rx) => {
                let shared = match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => (*outcome).clone(),
                    Err(_) => None,
                };
                match shared {
                    Some(outcome) => {
                        debug!(%key, ok = outcome.is_ok(), "Shared in-flight Football API outcome");
                        outcome
                    }
                    None => {
                        debug!(%key, "In-flight Football API request was abandoned");
                        self.fetch_uncached(request, &key, settings).await
                    }
                }
            }
        }
    }

    /// Registers as leader of `key`, or returns the leader's slot
    fn join_inflight(&self, key: &str) -> Role<'_> {
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx);
                Role::Leader(
                    tx,
                    InflightGuard {
                        inflight: &self.inflight,
                        key: key.to_string(),
                    },
                )
            }
        }
    }

    async fn fetch_uncached(
        &self,
        request: &ResourceRequest,
        key: &str,
        settings: CacheSettings,
    ) -> Outcome {
        if let Some(envelope) = self.cache.get::<Envelope>(key).await {
            debug!(%key, "Football API cache hit after in-flight request");
            return Ok(envelope);
        }

        let envelope = self.execute(request).await?;
        if envelope.results > 0 {
            self.cache
                .set(key, &envelope, settings.ttl_for(request.resource))
                .await;
        } else {
            debug!(%key, "Football API returned no results; not caching");
        }

        Ok(envelope)
    }

    /// One logical upstream request under the retry policy
    async fn execute(&self, request: &ResourceRequest) -> Result<Envelope, ApiError> {
        let endpoint = request.path();

        with_retry(endpoint, &self.retry, |attempt| async move {
            let response = self
                .transport
                .get(endpoint, &request.query)
                .await
                .map_err(|source| ApiError::Transport {
                    endpoint: endpoint.to_string(),
                    attempts: attempt,
                    source: Arc::new(source),
                })?;
            classify(endpoint, response, attempt)
        })
        .await
    }
}

/// Turns one HTTP response into an envelope or a classified error
fn classify(endpoint: &str, response: RawResponse, attempt: u32) -> Result<Envelope, ApiError> {
    let status = response.status;

    if status == 429 {
        warn!(endpoint, "Football API rate limit hit");
        return Err(ApiError::RateLimited {
            endpoint: endpoint.to_string(),
            status,
        });
    }

    if status >= 500 {
        return Err(ApiError::Server {
            endpoint: endpoint.to_string(),
            status,
            attempts: attempt,
            message: body_message(&response.body),
        });
    }

    if !response.is_success() {
        return Err(ApiError::Upstream {
            endpoint: endpoint.to_string(),
            status,
            message: body_message(&response.body),
        });
    }

    let envelope: Envelope =
        serde_json::from_str(&response.body).map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            status,
            source: Arc::new(source),
        })?;

    if !envelope.errors.is_empty() {
        warn!(endpoint, errors = ?envelope.errors, "Football API reported errors");
        return Err(ApiError::Data {
            endpoint: endpoint.to_string(),
            status,
            errors: envelope.errors,
        });
    }

    Ok(envelope)
}

/// `league.id` and `league.name` of one `/leagues` entry
fn league_id_and_name(entry: &Value) -> Option<(u32, &str)> {
    let league = entry.get("league")?;
    let id = u32::try_from(league.get("id")?.as_u64()?).ok()?;
    Some((id, league.get("name")?.as_str()?))
}

/// `message` field of a JSON error body, if present
fn body_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses and records every request
    struct ScriptedTransport {
        responses: Mutex<VecDeque<RawResponse>>,
        fallback: RawResponse,
        calls: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<RawResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fallback: RawResponse::new(500, "{}"),
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        fn always(response: RawResponse) -> Self {
            Self {
                fallback: response,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, path: &str, _query: &[(&str, String)]) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push(path.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.responses.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| self.fallback.clone()))
        }
    }

    fn ok_body(results: u64, response: Value) -> RawResponse {
        RawResponse::new(
            200,
            json!({
                "get": "standings",
                "parameters": {"league": "39", "season": "2025"},
                "errors": [],
                "results": results,
                "paging": {"current": 1, "total": 1},
                "response": response
            })
            .to_string(),
        )
    }

    fn client(transport: Arc<ScriptedTransport>) -> (FootballClient, CacheManager) {
        let cache = CacheManager::new(Arc::new(MemoryStore::new()));
        let config = ClientConfig::default().with_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        });
        let client = FootballClient::with_transport(config, transport, cache.clone());
        (client, cache)
    }

    #[tokio::test]
    async fn test_recovers_from_server_errors_and_caches() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            RawResponse::new(500, "{}"),
            RawResponse::new(500, "{}"),
            ok_body(1, json!([{"league": {"id": 39}}])),
        ]));
        let (client, cache) = client(transport.clone());

        let standings = client.fetch_standings(39, 2025).await.expect("third attempt succeeds");
        assert_eq!(standings, vec![json!({"league": {"id": 39}})]);
        assert_eq!(transport.calls(), 3);

        let cached: Option<Envelope> = cache.get("football-api:standings_39_2025").await;
        assert_eq!(cached.expect("response should be cached").results, 1);

        client.fetch_standings(39, 2025).await.unwrap();
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_persistent_server_error_exhausts_attempts() {
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(
            503,
            r#"{"message": "maintenance"}"#,
        )));
        let (client, _) = client(transport.clone());

        let err = client.fetch_teams(39, 2025).await.unwrap_err();
        match err {
            ApiError::Server {
                status,
                attempts,
                message,
                ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(attempts, 4);
                assert_eq!(message.as_deref(), Some("maintenance"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(429, "")));
        let (client, _) = client(transport.clone());

        let err = client.fetch_leagues().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { status: 429, .. }));
        assert_eq!(err.endpoint(), "/leagues");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(404, "not found")));
        let (client, _) = client(transport.clone());

        let err = client.fetch_league(1).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream { status: 404, message: None, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_envelope_errors_are_not_cached() {
        let body = json!({
            "get": "teams",
            "errors": {"season": "The Season field must be a valid year."},
            "results": 0,
            "response": []
        });
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(200, body.to_string())));
        let (client, cache) = client(transport.clone());

        let err = client.fetch_teams(39, 1800).await.unwrap_err();
        match err {
            ApiError::Data { errors, .. } => {
                assert_eq!(errors, vec!["season: The Season field must be a valid year."]);
            }
            other => panic!("expected data error, got {other:?}"),
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(cache.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(200, "<html>")));
        let (client, _) = client(transport);

        let err = client.fetch_standings(39, 2025).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let transport = Arc::new(ScriptedTransport::always(ok_body(0, json!([]))));
        let (client, _) = client(transport.clone());

        assert!(client.fetch_fixtures(39, 2025, None, None).await.unwrap().is_empty());
        assert!(client.fetch_fixtures(39, 2025, None, None).await.unwrap().is_empty());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_hits_network() {
        let transport = Arc::new(ScriptedTransport::always(ok_body(1, json!([{"id": 1}]))));
        let (client, cache) = client(transport.clone());
        client.update_cache_config(None, false);

        client.fetch_leagues().await.unwrap();
        client.fetch_leagues().await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(cache.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_ttl_override_applies_to_every_resource() {
        let transport = Arc::new(ScriptedTransport::always(ok_body(1, json!({"form": "WWL"}))));
        let (client, cache) = client(transport);
        client.update_cache_config(Some(120), true);
        assert_eq!(client.cache_settings().ttl_for(Resource::Leagues), 120);

        let stats = client.fetch_team_statistics(39, 33, 2025).await.unwrap();
        assert_eq!(stats, Some(json!({"form": "WWL"})));

        let cached = cache
            .read::<Envelope>("football-api:team_stats_33_39_2025")
            .await
            .expect("statistics should be cached");
        assert_eq!((cached.expires_at - cached.cached_at).num_seconds(), 120);
    }

    #[tokio::test]
    async fn test_clear_cache_scopes() {
        let transport = Arc::new(ScriptedTransport::always(ok_body(1, json!([{"id": 1}]))));
        let (client, cache) = client(transport);

        client.fetch_standings(39, 2025).await.unwrap();
        client.fetch_standings(140, 2025).await.unwrap();
        client.fetch_teams(39, 2025).await.unwrap();
        cache.set("other:standings_39_2025", &1, 60).await;

        assert_eq!(client.clear_resource_cache(Resource::Standings).await, 2);
        assert_eq!(client.clear_cache().await, 1);
        assert_eq!(cache.get::<i32>("other:standings_39_2025").await, Some(1));
    }

    #[tokio::test]
    async fn test_status_is_never_cached() {
        let body = json!({
            "get": "status",
            "errors": [],
            "results": 1,
            "response": {
                "account": {"firstname": "Ada"},
                "subscription": {"plan": "Free", "active": true},
                "requests": {"current": 12, "limit_day": 100}
            }
        });
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(200, body.to_string())));
        let (client, cache) = client(transport.clone());

        let status = client.get_api_status().await.unwrap();
        assert_eq!(status.requests.current, 12);
        assert_eq!(status.requests.limit_day, 100);

        client.get_api_status().await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(cache.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_upstream_call() {
        let mut transport = ScriptedTransport::always(ok_body(1, json!([{"id": 1}])));
        transport.delay = Duration::from_millis(20);
        let transport = Arc::new(transport);
        let (client, _) = client(transport.clone());
        let client = Arc::new(client);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.fetch_standings(39, 2025).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap().len(), 1);
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_leader_outcome_is_shared_with_waiters() {
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(500, "{}")));
        let config = ClientConfig::default().with_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(20),
        });
        let cache = CacheManager::new(Arc::new(MemoryStore::new()));
        let client = Arc::new(FootballClient::with_transport(config, transport.clone(), cache));

        let started = tokio::time::Instant::now();
        assert!(client.fetch_standings(39, 2025).await.is_err());
        let single = started.elapsed();
        assert_eq!(transport.calls(), 4);

        let started = tokio::time::Instant::now();
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.fetch_standings(39, 2025).await })
            })
            .collect();
        let results = futures::future::join_all(tasks).await;
        let concurrent = started.elapsed();

        for result in results {
            match result.unwrap() {
                Err(ApiError::Server { attempts, .. }) => assert_eq!(attempts, 4),
                other => panic!("expected server error, got {other:?}"),
            }
        }
        assert_eq!(transport.calls(), 8, "waiters must not repeat the failed request");
        assert!(
            concurrent < single * 2,
            "waiters queued behind the leader: single {single:?}, concurrent {concurrent:?}"
        );
        assert!(client.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_is_shared_but_not_cached() {
        let mut transport = ScriptedTransport::always(ok_body(0, json!([])));
        transport.delay = Duration::from_millis(20);
        let transport = Arc::new(transport);
        let (client, cache) = client(transport.clone());
        let client = Arc::new(client);

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.fetch_teams(39, 2025).await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().unwrap().is_empty());
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(cache.stats().await.total, 0);

        client.fetch_teams(39, 2025).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    /// Answers by path and query parameters
    struct RoutedTransport {
        routes: fn(&str, &[(&str, String)]) -> RawResponse,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for RoutedTransport {
        async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<RawResponse, TransportError> {
            let rendered: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}?{}", path, rendered.join("&")));
            Ok((self.routes)(path, query))
        }
    }

    fn param<'a>(query: &'a [(&str, String)], name: &str) -> Option<&'a str> {
        query.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
    }

    fn football_routes(path: &str, query: &[(&str, String)]) -> RawResponse {
        match (path, param(query, "league"), param(query, "team")) {
            ("/leagues", _, _) => ok_body(
                3,
                json!([
                    {"league": {"id": 39, "name": "Premier League"}},
                    {"league": {"id": 140, "name": "La Liga"}},
                    {"league": {"id": 135, "name": "Serie A"}}
                ]),
            ),
            ("/teams", Some("39"), _) => ok_body(
                2,
                json!([
                    {"team": {"id": 33, "name": "Manchester United"}},
                    {"team": {"id": 34, "name": "Newcastle"}}
                ]),
            ),
            ("/fixtures", _, Some("33")) => ok_body(2, json!([{"fixture": {"id": 1}}, {"fixture": {"id": 2}}])),
            ("/fixtures", _, Some("34")) => RawResponse::new(404, "{}"),
            _ => RawResponse::new(500, "{}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_all_teams_tolerates_team_and_league_failures() {
        let transport = Arc::new(RoutedTransport {
            routes: football_routes,
            calls: Mutex::new(Vec::new()),
        });
        let cache = CacheManager::new(Arc::new(MemoryStore::new()));
        let config = ClientConfig::default().with_retry(RetryPolicy::none());
        let client = FootballClient::with_transport(config, transport.clone(), cache);

        let all = client
            .fetch_all_teams(&["premier league", "LA LIGA", "Eredivisie"], 2025, 2)
            .await
            .unwrap();

        assert_eq!(all.len(), 2);
        assert!(!all.contains_key("Eredivisie"));
        assert!(all["La Liga"].is_empty());

        let premier = &all["Premier League"];
        assert_eq!(premier.len(), 2);
        assert_eq!(premier[0]["team"]["name"], "Manchester United");
        assert_eq!(premier[0]["recent_fixtures"].as_array().unwrap().len(), 2);
        assert_eq!(premier[1]["team"]["id"], 34);
        assert_eq!(premier[1]["recent_fixtures"], json!([]));

        let calls = transport.calls.lock().unwrap().clone();
        assert!(calls.contains(&"/fixtures?team=33&last=2".to_string()));
        assert!(!calls.iter().any(|call| call.contains("league=135")));
    }

    #[tokio::test]
    async fn test_fetch_all_teams_limits_teams_per_league() {
        fn routes(path: &str, _query: &[(&str, String)]) -> RawResponse {
            match path {
                "/leagues" => ok_body(1, json!([{"league": {"id": 39, "name": "Premier League"}}])),
                "/teams" => {
                    let teams: Vec<Value> = (1..=14).map(|id| json!({"team": {"id": id}})).collect();
                    ok_body(14, json!(teams))
                }
                _ => ok_body(1, json!([{"fixture": {"id": 9}}])),
            }
        }
        let transport = Arc::new(RoutedTransport {
            routes,
            calls: Mutex::new(Vec::new()),
        });
        let cache = CacheManager::new(Arc::new(MemoryStore::new()));
        let client = FootballClient::with_transport(ClientConfig::default(), transport.clone(), cache);

        let all = client.fetch_all_teams(&["Premier League"], 2025, 5).await.unwrap();
        assert_eq!(all["Premier League"].len(), TEAMS_PER_LEAGUE);
        assert_eq!(transport.calls.lock().unwrap().len(), 2 + TEAMS_PER_LEAGUE);
    }

    #[tokio::test]
    async fn test_fetch_all_teams_fails_without_league_list() {
        let transport = Arc::new(ScriptedTransport::always(RawResponse::new(429, "")));
        let (client, _) = client(transport);

        let err = client.fetch_all_teams(&["Premier League"], 2025, 5).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));
    }
}
