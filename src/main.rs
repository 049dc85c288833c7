//! matchday - Football data from the command line
//!
//! Fetches standings, fixtures, teams and leagues through the cached,
//! rate-limited football API client and prints them as JSON.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use matchday::api::FootballClient;
use matchday::cache::CacheManager;
use matchday::cli::{Cli, Command, StartupConfig, StoreChoice};
use matchday::janitor::Janitor;
use matchday::rate_limit::{Identity, RateLimitConfig, RateLimiter};
use matchday::store::{FileStore, MemoryStore, RecordStore};

/// Sets up logging to stderr, filtered by `RUST_LOG`
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matchday=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Picks the record store for this run
fn open_store(choice: &StoreChoice) -> Arc<dyn RecordStore> {
    match choice {
        StoreChoice::Memory => Arc::new(MemoryStore::new()),
        StoreChoice::Disk(Some(dir)) => Arc::new(FileStore::with_dir(dir.clone())),
        StoreChoice::Disk(None) => match FileStore::new() {
            Some(store) => {
                debug!(root = %store.root().display(), "Using on-disk store");
                Arc::new(store)
            }
            None => {
                warn!("No cache directory available, falling back to memory");
                Arc::new(MemoryStore::new())
            }
        },
    }
}

/// Identity of the local user for rate limiting
fn local_identity() -> Identity {
    Identity::from_parts(std::env::var("USER").ok(), None)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let startup = StartupConfig::from_cli(&cli)?;
    let store = open_store(&startup.store);

    let cache = CacheManager::new(store.clone());
    let limiter = RateLimiter::new(store);

    if cli.command.needs_network() {
        limiter
            .enforce(cli.command.name(), &RateLimitConfig::API_GENERAL, &local_identity())
            .await?;
    }

    let client = FootballClient::new(startup.client, cache.clone())?;

    match cli.command {
        Command::Standings { league, season } => {
            print_json(&client.fetch_standings(league, season).await?)?
        }
        Command::Fixtures {
            league,
            season,
            from,
            to,
        } => print_json(&client.fetch_fixtures(league, season, from, to).await?)?,
        Command::NextFixtures {
            league,
            season,
            count,
        } => print_json(&client.fetch_next_fixtures(league, season, count).await?)?,
        Command::RecentFixtures { team, last } => {
            print_json(&client.fetch_team_recent_fixtures(team, last).await?)?
        }
        Command::Teams { league, season } => {
            print_json(&client.fetch_teams(league, season).await?)?
        }
        Command::AllTeams {
            league_names,
            season,
            matches,
        } => print_json(&client.fetch_all_teams(&league_names, season, matches).await?)?,
        Command::TeamStats {
            league,
            team,
            season,
        } => print_json(&client.fetch_team_statistics(league, team, season).await?)?,
        Command::Leagues => print_json(&client.fetch_leagues().await?)?,
        Command::League { id } => print_json(&client.fetch_league(id).await?)?,
        Command::Status => print_json(&client.get_api_status().await?)?,
        Command::Sweep { batch_size } => {
            let report = Janitor::new(cache, limiter, batch_size).sweep_once().await;
            println!("Sweep {}", report);
        }
        Command::CacheStats => {
            let cache_stats = cache.stats().await;
            let rate_stats = limiter.stats().await;
            print_json(&serde_json::json!({
                "cache": cache_stats,
                "rate_limits": rate_stats,
            }))?
        }
        Command::ClearCache { resource } => {
            let removed = match resource {
                Some(resource) => client.clear_resource_cache(resource.into()).await,
                None => client.clear_cache().await,
            };
            println!("Removed {} cached responses", removed);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
