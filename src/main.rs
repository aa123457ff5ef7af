mod config;
mod library;
mod logging;
mod ports;
mod records;
mod services;
mod session;
mod spotify_rs;
mod tidal_rs;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::{Config, Provider},
    logging::setup_logging,
    ports::{catalog::CatalogClient, session::SessionRefresher},
    records::RecordStore,
    services::pipeline::{Pipeline, Stage, scan},
    session::SessionStore,
    spotify_rs::{auth::SpotifyAuth, client::SpotifyClient},
    tidal_rs::{auth::TidalAuth, client::TidalClient},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "CATALOG_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// The streaming provider to reconcile against
    #[arg(short, long, value_enum, default_value = "spotify", global = true)]
    provider: Provider,

    /// Compute and log diffs without following, favoriting or editing playlists
    #[arg(long, global = true)]
    dry_run: bool,

    /// Console log level (default: info)
    #[arg(long, default_value = "info", global = true, env = "CATALOG_SYNC_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "CATALOG_SYNC_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the library folder into albums.csv
    Scan,
    /// Search the provider for every local artist and write the artist match table
    ResolveArtists,
    /// Follow every reviewed artist that is not followed yet
    FollowArtists,
    /// Download the album listing of every resolved artist
    FetchAlbums,
    /// Match local albums against the fetched listings
    MatchAlbums,
    /// Favorite every matched album that is not favorited yet
    FavoriteAlbums,
    /// Refill the configured playlist with every favorited album's tracks
    RebuildPlaylist,
    /// Run a contiguous range of stages
    Run {
        /// First stage to run
        #[arg(long, value_enum, default_value = "scan")]
        from: Stage,

        /// Last stage to run
        #[arg(long, value_enum, default_value = "favorite-albums")]
        to: Stage,
    },
    /// Look up an artist by name while reviewing the artist match table
    SearchArtist {
        /// The artist name to search for
        name: String,

        /// Number of candidates to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn provider_clients(
    config: &Config,
    provider: Provider,
) -> Result<(Box<dyn CatalogClient>, Box<dyn SessionRefresher>)> {
    let table = config.provider(provider)?;
    let settings = config.provider_settings(provider);
    let client_secret = table.client_secret.clone().unwrap_or_default();

    Ok(match provider {
        Provider::Spotify => (
            Box::new(SpotifyClient::new(settings.album_types)),
            Box::new(SpotifyAuth::new(table.client_id.clone(), client_secret)),
        ),
        Provider::Tidal => (
            Box::new(TidalClient::new(settings.country_code)),
            Box::new(TidalAuth::new(table.client_id.clone(), client_secret)),
        ),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    log::debug!("catalog-sync starting");

    let stages = match &args.command {
        Commands::Config(config_commands) => {
            match config_commands {
                ConfigCommands::CreateDefault => {
                    log::debug!("Creating default config");
                    let path = Config::create_default()?;
                    log::info!("Default config at {}", path.display());
                }
                ConfigCommands::Path => match Config::config_path() {
                    Some(path) => println!("{}", path.display()),
                    None => println!("No default config path found"),
                },
            }
            return Ok(());
        }
        Commands::Scan => vec![Stage::Scan],
        Commands::ResolveArtists => vec![Stage::ResolveArtists],
        Commands::FollowArtists => vec![Stage::FollowArtists],
        Commands::FetchAlbums => vec![Stage::FetchAlbums],
        Commands::MatchAlbums => vec![Stage::MatchAlbums],
        Commands::FavoriteAlbums => vec![Stage::FavoriteAlbums],
        Commands::RebuildPlaylist => vec![Stage::RebuildPlaylist],
        Commands::Run { from, to } => Stage::range(*from, *to)?,
        Commands::SearchArtist { .. } => Vec::new(),
    };

    log::debug!("Loading configuration");
    let config = {
        if let Some(config) = &args.config {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load catalog-sync config")?;

    let records = RecordStore::new(config.data_path(), args.provider);

    // The library scan is the one stage that never needs a provider session.
    if !matches!(args.command, Commands::SearchArtist { .. })
        && !stages.iter().any(Stage::needs_session)
    {
        scan(&config.library_path(), &records)?;
        return Ok(());
    }

    let (client, refresher) = provider_clients(&config, args.provider)?;
    let session_store = SessionStore::new(config.session_path(args.provider));
    let mut session = session_store
        .ensure_fresh(args.provider, refresher.as_ref())
        .await?;
    if args.provider == Provider::Tidal && session.user_id.is_none() {
        log::info!("Looking up TIDAL user for the stored session");
        session = refresher.refresh(&session).await?;
        session_store.save(&session)?;
    }

    let records_dir = records.reports_dir();
    let pipeline = Pipeline::new(
        client.as_ref(),
        &session,
        config.provider_settings(args.provider),
        records,
        config.library_path(),
    )?
    .dry_run(args.dry_run);

    if let Commands::SearchArtist { name, limit } = &args.command {
        let candidates = pipeline.search_artist(name, *limit).await?;
        if candidates.is_empty() {
            println!("No artists found for '{}'", name);
        }
        for candidate in candidates {
            println!("{}\t{}", candidate.id, candidate.name);
        }
        return Ok(());
    }

    // Stage lists are always contiguous, so the first and last bound the run.
    if let (Some(first), Some(last)) = (stages.first(), stages.last()) {
        log::info!("Running {} to {} against {}", first, last, args.provider);
        let with_failures = pipeline.run(*first, *last).await?;
        if !with_failures.is_empty() {
            let stages: Vec<&str> = with_failures.iter().map(Stage::as_str).collect();
            log::warn!(
                "Some batches failed in {}; see the run reports under {}",
                stages.join(", "),
                records_dir.display()
            );
        }
    }
    log::info!("Done");

    Ok(())
}
