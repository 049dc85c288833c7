//! Upstream resources, request descriptions and the response envelope

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Response wrapper shared by every upstream endpoint
///
/// `errors` arrives either as an array or as an object keyed by field; both
/// normalize to a list of messages. An empty list means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Endpoint name echoed by the API
    #[serde(default)]
    pub get: String,
    /// Query parameters echoed by the API
    #[serde(default)]
    pub parameters: Value,
    /// Error messages; non-empty means the request failed
    #[serde(default, deserialize_with = "deserialize_errors")]
    pub errors: Vec<String>,
    /// Number of items in `response`
    #[serde(default)]
    pub results: u64,
    /// Page information for paginated endpoints
    #[serde(default)]
    pub paging: Option<Paging>,
    /// The payload
    #[serde(default)]
    pub response: Value,
}

impl Envelope {
    /// Payload as a list of records
    ///
    /// A null payload is an empty list; a single object is a one-item list.
    pub fn into_items(self) -> Vec<Value> {
        match self.response {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Payload as a single record, if there is one
    pub fn into_single(self) -> Option<Value> {
        match self.response {
            Value::Array(items) => items.into_iter().next(),
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(other),
        }
    }
}

/// Page information of a paginated response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub current: u32,
    pub total: u32,
}

fn deserialize_errors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn message(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(message).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(field, value)| format!("{}: {}", field, message(value)))
            .collect(),
        other => vec![message(&other)],
    })
}

/// Quota and account information reported by `/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    /// Account details, passed through untouched
    #[serde(default)]
    pub account: Value,
    /// Subscription plan details, passed through untouched
    #[serde(default)]
    pub subscription: Value,
    /// Request usage for the current day
    #[serde(default)]
    pub requests: RequestQuota,
}

/// Daily request usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuota {
    /// Requests made today
    #[serde(default)]
    pub current: u64,
    /// Requests allowed per day
    #[serde(default)]
    pub limit_day: u64,
}

/// An upstream resource family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Standings,
    Fixtures,
    NextFixtures,
    TeamRecentFixtures,
    Teams,
    TeamStatistics,
    Leagues,
    League,
    Status,
}

impl Resource {
    /// Every resource, in a stable order
    pub const ALL: [Resource; 9] = [
        Resource::Standings,
        Resource::Fixtures,
        Resource::NextFixtures,
        Resource::TeamRecentFixtures,
        Resource::Teams,
        Resource::TeamStatistics,
        Resource::Leagues,
        Resource::League,
        Resource::Status,
    ];

    /// Upstream path
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Standings => "/standings",
            Resource::Fixtures | Resource::NextFixtures | Resource::TeamRecentFixtures => {
                "/fixtures"
            }
            Resource::Teams => "/teams",
            Resource::TeamStatistics => "/teams/statistics",
            Resource::Leagues | Resource::League => "/leagues",
            Resource::Status => "/status",
        }
    }

    /// Start of every cache key of this resource; no key prefix is a prefix of another
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Resource::Standings => "standings_",
            Resource::Fixtures => "fixtures_",
            Resource::NextFixtures => "next_fixtures_",
            Resource::TeamRecentFixtures => "team_recent_",
            Resource::Teams => "teams_",
            Resource::TeamStatistics => "team_stats_",
            Resource::Leagues => "all_leagues",
            Resource::League => "league_",
            Resource::Status => "status",
        }
    }

    /// Default cache lifetime in seconds
    ///
    /// Fixtures change during match days; league metadata barely changes.
    pub fn default_ttl_secs(&self) -> u64 {
        match self {
            Resource::Fixtures | Resource::NextFixtures | Resource::TeamRecentFixtures => 15 * 60,
            Resource::Standings => 60 * 60,
            Resource::TeamStatistics => 6 * 60 * 60,
            Resource::Teams | Resource::Leagues | Resource::League => 24 * 60 * 60,
            Resource::Status => 0,
        }
    }

    /// Whether responses of this resource are ever cached
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Resource::Status)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Standings => "standings",
            Resource::Fixtures => "fixtures",
            Resource::NextFixtures => "next_fixtures",
            Resource::TeamRecentFixtures => "team_recent_fixtures",
            Resource::Teams => "teams",
            Resource::TeamStatistics => "team_statistics",
            Resource::Leagues => "leagues",
            Resource::League => "league",
            Resource::Status => "status",
        };
        write!(f, "{}", name)
    }
}

/// One call against the upstream API: where to go, with what, and under which cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// Resource family
    pub resource: Resource,
    /// Query parameters, in a fixed order
    pub query: Vec<(&'static str, String)>,
    cache_key: String,
}

impl ResourceRequest {
    fn new(resource: Resource, query: Vec<(&'static str, String)>, key_suffix: &str) -> Self {
        Self {
            resource,
            query,
            cache_key: format!("{}{}", resource.key_prefix(), key_suffix),
        }
    }

    /// Standings of a league season
    pub fn standings(league_id: u32, season: u16) -> Self {
        Self::new(
            Resource::Standings,
            vec![("league", league_id.to_string()), ("season", season.to_string())],
            &format!("{}_{}", league_id, season),
        )
    }

    /// Fixtures of a league season, optionally within a date range
    pub fn fixtures(
        league_id: u32,
        season: u16,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Self {
        let from = from.map(format_date);
        let to = to.map(format_date);

        let mut query = vec![("league", league_id.to_string()), ("season", season.to_string())];
        if let Some(from) = &from {
            query.push(("from", from.clone()));
        }
        if let Some(to) = &to {
            query.push(("to", to.clone()));
        }

        Self::new(
            Resource::Fixtures,
            query,
            &format!(
                "{}_{}_{}_{}",
                league_id,
                season,
                from.unwrap_or_default(),
                to.unwrap_or_default()
            ),
        )
    }

    /// The next `next` fixtures of a league season
    pub fn next_fixtures(league_id: u32, season: u16, next: u32) -> Self {
        Self::new(
            Resource::NextFixtures,
            vec![
                ("league", league_id.to_string()),
                ("season", season.to_string()),
                ("next", next.to_string()),
            ],
            &format!("{}_{}_{}", league_id, season, next),
        )
    }

    /// The last `last` fixtures played by a team
    pub fn team_recent_fixtures(team_id: u32, last: u32) -> Self {
        Self::new(
            Resource::TeamRecentFixtures,
            vec![("team", team_id.to_string()), ("last", last.to_string())],
            &format!("{}_{}", team_id, last),
        )
    }

    /// Teams of a league season
    pub fn teams(league_id: u32, season: u16) -> Self {
        Self::new(
            Resource::Teams,
            vec![("league", league_id.to_string()), ("season", season.to_string())],
            &format!("{}_{}", league_id, season),
        )
    }

    /// Statistics of one team in a league season
    pub fn team_statistics(league_id: u32, team_id: u32, season: u16) -> Self {
        Self::new(
            Resource::TeamStatistics,
            vec![
                ("league", league_id.to_string()),
                ("team", team_id.to_string()),
                ("season", season.to_string()),
            ],
            &format!("{}_{}_{}", team_id, league_id, season),
        )
    }

    /// Every league
    pub fn leagues() -> Self {
        Self::new(Resource::Leagues, Vec::new(), "")
    }

    /// One league by id
    pub fn league(league_id: u32) -> Self {
        Self::new(
            Resource::League,
            vec![("id", league_id.to_string())],
            &league_id.to_string(),
        )
    }

    /// Account status and quota
    pub fn status() -> Self {
        Self::new(Resource::Status, Vec::new(), "")
    }

    /// Upstream path of the request
    pub fn path(&self) -> &'static str {
        self.resource.path()
    }

    /// Cache key without namespace, e.g. `standings_39_2025`
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
