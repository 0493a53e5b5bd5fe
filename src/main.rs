use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tvrecon::AppConfig;
use tvrecon::finder::{CandidateFinder, IndexerClient};
use tvrecon::library::{PreviouslySeenEpisodes, ProcessedEpisode, ShowItem};
use tvrecon::logging;
use tvrecon::source::{
    Episode, MetadataCache, MetadataSource, Provider, SeriesIdentity, SeriesInfo, TvMazeClient,
};

#[derive(Debug, Parser)]
#[command(name = "tvrecon", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a show on TVmaze and print a summary
    Show {
        #[arg(long)]
        tvdb: Option<u64>,
        #[arg(long)]
        imdb: Option<String>,
        #[arg(long)]
        tvmaze: Option<u64>,
    },
    /// Print how many TVmaze shows changed recently
    Updates {
        /// Only count changes after this unix timestamp
        #[arg(long)]
        since: Option<i64>,
    },
    /// Run one indexer query and print the matching releases
    Search {
        show: String,
        season: i32,
        episode: i32,
        #[arg(long)]
        tvdb: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = logging::init(&config.logging)?;

    match cli.command {
        Command::Show { tvdb, imdb, tvmaze } => {
            let mut identity = SeriesIdentity::new();
            if let Some(id) = tvdb {
                identity = identity.with_tvdb(id);
            }
            if let Some(id) = tvmaze {
                identity = identity.with_tvmaze(id);
            }
            if let Some(id) = imdb {
                identity = identity.with_imdb(id);
            }
            anyhow::ensure!(identity.has_any(), "Pass at least one of --tvdb, --imdb or --tvmaze");

            let series = tvmaze_client(&config)?.fetch_series(&identity).await?;
            print_series(&series);
        }
        Command::Updates { since } => {
            let since = since.and_then(|ts| chrono::DateTime::from_timestamp(ts, 0));
            let updates = tvmaze_client(&config)?.fetch_updates(since).await?;
            println!("{} show(s) updated", updates.len());
        }
        Command::Search {
            show,
            season,
            episode,
            tvdb,
        } => {
            let client = IndexerClient::new(config.indexer.clone())?;
            client.validate()?;

            let mut identity = SeriesIdentity::new();
            if let Some(id) = tvdb {
                identity = identity.with_tvdb(id);
            }
            let item = Arc::new(ShowItem::new(identity, &show, PathBuf::new()));
            let series = Arc::new(SeriesInfo::new(Provider::TvMaze, 0, &show));
            let target =
                ProcessedEpisode::new(item, series, Episode::new(0, 0, season, episode, ""));

            println!("{}", client.dashboard_search_url(&target));
            let finder = CandidateFinder::new(client, Arc::new(PreviouslySeenEpisodes::new()));
            let candidates = finder.candidates_for(&target).await?;
            info!("{} candidate(s) for {}", candidates.len(), target);
            for candidate in candidates {
                println!("{}\t{}", candidate.item.title, candidate.item.url);
            }
        }
        Command::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

fn tvmaze_client(config: &AppConfig) -> anyhow::Result<TvMazeClient> {
    let cache = MetadataCache::new(config.cache.capacity, config.cache.ttl());
    Ok(TvMazeClient::new(
        config.providers.tvmaze_base_url.clone(),
        config.providers.timeout(),
        cache,
    )?)
}

fn print_series(series: &SeriesInfo) {
    println!("{} [{} {}]", series.name, series.provider, series.id);
    println!("  status:   {}", series.status);
    if let Some(ref network) = series.network {
        println!("  network:  {network}");
    }
    if !series.genres.is_empty() {
        println!("  genres:   {}", series.genres.join(", "));
    }
    if let Some(ref imdb) = series.external_ids.imdb {
        println!("  imdb:     {imdb}");
    }
    println!(
        "  seasons:  {}, episodes: {}",
        series.seasons.len(),
        series.episodes.len()
    );
}
