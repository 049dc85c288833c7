//! Command-line interface parsing for matchday
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the client configuration and store choice used at startup.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use thiserror::Error;

use crate::api::{ClientConfig, ConfigError, Resource, API_KEY_ENV, BASE_URL_ENV};
use crate::cache::DEFAULT_SWEEP_BATCH;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// A date argument is not `YYYY-MM-DD`
    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    /// The date range ends before it starts
    #[error("Invalid date range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    /// A cache TTL of zero was requested
    #[error("Cache TTL must be at least one second")]
    InvalidTtl,

    /// A network command was given without an API key
    #[error("Missing API key. Pass --api-key or set FOOTBALL_API_KEY")]
    MissingApiKey,

    /// The environment holds unusable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// matchday - Cached, rate-limited access to football data
#[derive(Parser, Debug)]
#[command(name = "matchday")]
#[command(about = "Fetch football standings, fixtures and teams with caching and retries")]
#[command(version)]
pub struct Cli {
    /// API key for the football data API
    #[arg(long, global = true, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the football data API
    #[arg(long, global = true, env = BASE_URL_ENV, value_name = "URL")]
    pub base_url: Option<String>,

    /// Directory of the on-disk store (defaults to the platform cache directory)
    #[arg(long, global = true, value_name = "DIR", conflicts_with = "memory")]
    pub cache_dir: Option<PathBuf>,

    /// Keep cache and rate windows in memory for this run only
    #[arg(long, global = true)]
    pub memory: bool,

    /// Bypass the response cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Cache TTL in seconds applied to every resource
    #[arg(long, global = true, value_name = "SECS")]
    pub cache_ttl: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// League table for a season
    Standings {
        #[arg(long)]
        league: u32,
        #[arg(long)]
        season: u16,
    },
    /// Fixtures of a league season
    Fixtures {
        #[arg(long)]
        league: u32,
        #[arg(long)]
        season: u16,
        /// First day, YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },
    /// Upcoming fixtures of a league season
    NextFixtures {
        #[arg(long)]
        league: u32,
        #[arg(long)]
        season: u16,
        /// How many fixtures
        #[arg(long, default_value_t = 10)]
        count: u32,
    },
    /// Most recent fixtures of a team
    RecentFixtures {
        #[arg(long)]
        team: u32,
        /// How many fixtures
        #[arg(long, default_value_t = 5)]
        last: u32,
    },
    /// Teams of a league season
    Teams {
        #[arg(long)]
        league: u32,
        #[arg(long)]
        season: u16,
    },
    /// Teams of several leagues, each with its recent fixtures
    AllTeams {
        /// League name, matched case-insensitively; repeat for more leagues
        #[arg(long = "league-name", required = true)]
        league_names: Vec<String>,
        #[arg(long)]
        season: u16,
        /// Recent fixtures per team
        #[arg(long, default_value_t = 5)]
        matches: u32,
    },
    /// Season statistics of a team
    TeamStats {
        #[arg(long)]
        league: u32,
        #[arg(long)]
        team: u32,
        #[arg(long)]
        season: u16,
    },
    /// Every league
    Leagues,
    /// One league by id
    League {
        #[arg(long)]
        id: u32,
    },
    /// Account status and daily quota
    Status,
    /// Delete expired cache entries and rate windows
    Sweep {
        /// Deletions per store round trip
        #[arg(long, default_value_t = DEFAULT_SWEEP_BATCH)]
        batch_size: usize,
    },
    /// Cache and rate limiter statistics
    CacheStats,
    /// Delete cached responses
    ClearCache {
        /// Only this resource family
        #[arg(long, value_enum)]
        resource: Option<ResourceArg>,
    },
}

impl Command {
    /// Whether the command calls the upstream API
    pub fn needs_network(&self) -> bool {
        !matches!(
            self,
            Command::Sweep { .. } | Command::CacheStats | Command::ClearCache { .. }
        )
    }

    /// Name used as the rate-limit endpoint
    pub fn name(&self) -> &'static str {
        match self {
            Command::Standings { .. } => "standings",
            Command::Fixtures { .. } => "fixtures",
            Command::NextFixtures { .. } => "next-fixtures",
            Command::RecentFixtures { .. } => "recent-fixtures",
            Command::Teams { .. } => "teams",
            Command::AllTeams { .. } => "all-teams",
            Command::TeamStats { .. } => "team-stats",
            Command::Leagues => "leagues",
            Command::League { .. } => "league",
            Command::Status => "status",
            Command::Sweep { .. } => "sweep",
            Command::CacheStats => "cache-stats",
            Command::ClearCache { .. } => "clear-cache",
        }
    }
}

/// Resource families selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceArg {
    Standings,
    Fixtures,
    NextFixtures,
    RecentFixtures,
    Teams,
    TeamStats,
    Leagues,
    League,
}

impl From<ResourceArg> for Resource {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Standings => Resource::Standings,
            ResourceArg::Fixtures => Resource::Fixtures,
            ResourceArg::NextFixtures => Resource::NextFixtures,
            ResourceArg::RecentFixtures => Resource::TeamRecentFixtures,
            ResourceArg::Teams => Resource::Teams,
            ResourceArg::TeamStats => Resource::TeamStatistics,
            ResourceArg::Leagues => Resource::Leagues,
            ResourceArg::League => Resource::League,
        }
    }
}

/// Where records are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChoice {
    /// In memory, lost on exit
    Memory,
    /// On disk; `None` means the platform cache directory
    Disk(Option<PathBuf>),
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    /// Settings for the football API client
    pub client: ClientConfig,
    /// Where the cache and rate windows live
    pub store: StoreChoice,
}

/// Parses a `YYYY-MM-DD` date argument.
///
/// # Arguments
/// * `s` - The date string from CLI
///
/// # Returns
/// * `Ok(NaiveDate)` if the string is a valid calendar date
/// * `Err(CliError::InvalidDate)` otherwise
pub fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| CliError::InvalidDate(s.to_string()))
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// Starts from the environment (`FOOTBALL_API_TIMEOUT_SECS` and friends)
    /// and lets flags override it.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with appropriate settings
    /// * `Err(CliError)` if arguments are inconsistent or the API key is missing
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.cache_ttl == Some(0) {
            return Err(CliError::InvalidTtl);
        }

        if let Command::Fixtures {
            from: Some(from),
            to: Some(to),
            ..
        } = &cli.command
        {
            if from > to {
                return Err(CliError::InvalidRange {
                    from: *from,
                    to: *to,
                });
            }
        }

        let mut client = ClientConfig::from_env()?.with_cache(!cli.no_cache, cli.cache_ttl);
        if let Some(key) = cli.api_key.as_deref().map(str::trim) {
            client.api_key = key.to_string();
        }
        if let Some(url) = &cli.base_url {
            client.base_url = url.clone();
        }

        if cli.command.needs_network() && client.api_key.is_empty() {
            return Err(CliError::MissingApiKey);
        }

        let store = if cli.memory {
            StoreChoice::Memory
        } else {
            StoreChoice::Disk(cli.cache_dir.clone())
        };

        Ok(Self { client, store })
    }
}
