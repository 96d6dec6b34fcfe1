use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use now_playing_core::{
    config::{credential_from_env, SPOTIFY_TOKEN_ENV, X_TOKEN_ENV},
    AppConfig, AssetFetcher, CardRenderer, DryRunPublisher, FileAssetFetcher, HttpAssetFetcher,
    NowPlayingError, PlaybackSnapshot, PollScheduler, Publisher, RateGovernor, RenderOutcome,
    SpotifyPlaybackSource, XPublisher,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() -> now_playing_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, dry_run } => {
            let config = load_config(config.as_ref())?;
            run_publisher(config, dry_run)
        }
        Commands::Render(args) => {
            let config = load_config(args.config.as_ref())?;
            run_render(config, args)
        }
        Commands::PrintConfig { config } => {
            let config = load_config(config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> now_playing_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::from_file(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn run_publisher(config: AppConfig, dry_run: Option<PathBuf>) -> now_playing_core::Result<()> {
    let spotify_token = credential_from_env(SPOTIFY_TOKEN_ENV)?;
    let source = SpotifyPlaybackSource::new(&config.spotify, spotify_token);
    let publisher: Arc<dyn Publisher> = match dry_run {
        Some(dir) => {
            tracing::info!(?dir, "dry run: cards are written locally, nothing is posted");
            Arc::new(DryRunPublisher::new(dir))
        }
        None => Arc::new(XPublisher::new(
            &config.publisher,
            credential_from_env(X_TOKEN_ENV)?,
        )),
    };

    let mut scheduler = PollScheduler::new(
        Arc::new(source),
        publisher,
        Arc::new(HttpAssetFetcher::default()),
        Arc::new(CardRenderer::new(config.card.clone())),
        RateGovernor::new(&config.governor),
    )
    .with_poll_config(config.poll.clone())
    .with_hashtag(config.publisher.hashtag.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                on_signal.cancel();
            }
        });
        scheduler.run(cancel).await;
    });
    Ok(())
}

fn run_render(mut config: AppConfig, args: RenderArgs) -> now_playing_core::Result<()> {
    if args.seed.is_some() {
        config.card.overlay_seed = args.seed;
    }
    tracing::info!(art = %args.art, output = ?args.output, "rendering card");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let art = runtime.block_on(async {
        if args.art.starts_with("http://") || args.art.starts_with("https://") {
            HttpAssetFetcher::default().fetch_bytes(&args.art).await
        } else {
            FileAssetFetcher.fetch_bytes(&args.art).await
        }
    })?;

    let snapshot = PlaybackSnapshot {
        track_id: "local".to_string(),
        title: args.title,
        artist: args.artist,
        album: args.album,
        duration_ms: Some(args.duration_ms),
        progress_ms: Some(0),
        art_url: Some(args.art),
    };

    match CardRenderer::new(config.card).render(&snapshot, &art) {
        RenderOutcome::Rendered(card) => {
            std::fs::write(&args.output, card.bytes())?;
            tracing::info!(output = ?args.output, bytes = card.bytes().len(), "card written");
            Ok(())
        }
        RenderOutcome::RenderFailed(reason) => Err(NowPlayingError::render(reason)),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Publishes now-playing cards for your current track",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the playback service and publish a card for every new track.
    Run {
        /// JSON configuration file; built-in defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write cards to this directory instead of posting them.
        #[arg(long, value_name = "DIR")]
        dry_run: Option<PathBuf>,
    },
    /// Render a single card from local inputs.
    Render(RenderArgs),
    /// Print the effective configuration as JSON.
    PrintConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Album art path or URL.
    #[arg(long)]
    art: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    artist: String,
    #[arg(long)]
    album: String,
    #[arg(long, default_value_t = 0)]
    duration_ms: u64,
    /// Output PNG path.
    #[arg(short, long)]
    output: PathBuf,
    /// Fixes the decorative overlay layout.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(short, long)]
    config: Option<PathBuf>,
}
