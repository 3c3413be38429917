use clap::{Parser, Subcommand};
use notebridge_automation::{AutomationSurface, CdpContext, SurfaceContext};
use notebridge_channels::{HttpQueueSource, SlackWebhook};
use notebridge_core::{Config, PollConfig};
use notebridge_session::{AuthManager, QueryExecutor, Session, SessionReaper, SessionRegistry};
use notebridge_storage::FsBlobStore;
use notebridge_worker::Dispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "notebridge", about = "Drives a conversational web app from a message queue")]
struct Cli {
    /// Config file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue-driven worker
    Run,
    /// Execute a single query against a fresh session and print the answer
    Query {
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = Config::load_with_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => run_worker(config).await,
        Commands::Query { message } => run_query(config, &message).await,
    }
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    config.validate_worker()?;

    let context = CdpContext::launch(config.browser.clone()).await?;
    let blob = Arc::new(FsBlobStore::new(&config.blob_root));
    let notifier = Arc::new(SlackWebhook::new(&config.webhook_url)?);
    let queue = Arc::new(HttpQueueSource::new(&config.queue_url)?);

    let auth = Arc::new(AuthManager::new(
        context.clone(),
        blob.clone(),
        notifier.clone(),
        &config,
    ));
    // Fatal when the login flow cannot complete; operator restarts.
    auth.ensure_authenticated().await?;

    let registry = Arc::new(SessionRegistry::new(
        context,
        auth,
        &config.app_url,
        config.session.idle_basis,
    ));

    let reaper = Arc::new(SessionReaper::new(
        registry.clone(),
        config.session_ttl_ms(),
        Duration::from_secs(config.session.sweep_interval_secs),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        QueryExecutor::new(config.selectors.clone(), config.poll.clone()),
        notifier,
        queue,
        blob,
        &config,
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let reaper_handle = tokio::spawn(reaper.run_loop(shutdown_tx.subscribe()));
    let dispatcher_handle = tokio::spawn(dispatcher.run_loop(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(reaper_handle, dispatcher_handle);
    Ok(())
}

async fn run_query(config: Config, message: &str) -> anyhow::Result<()> {
    if config.app_url.is_empty() {
        anyhow::bail!("appUrl is not set");
    }

    let context = CdpContext::launch(config.browser.clone()).await?;
    let blob = Arc::new(FsBlobStore::new(&config.blob_root));
    let notifier = Arc::new(SlackWebhook::new(&config.webhook_url)?);

    let auth = Arc::new(AuthManager::new(context.clone(), blob, notifier, &config));
    auth.ensure_authenticated().await?;

    let surface = context.new_surface().await?;
    surface.goto(&config.app_url).await?;
    surface.wait_settled().await?;
    let session = Session::new(
        "standalone",
        surface,
        chrono::Utc::now().timestamp_millis(),
    );

    let executor = QueryExecutor::new(config.selectors.clone(), PollConfig::standalone());
    let answer = executor.run(&session, message).await?;
    println!("{answer}");

    session.surface().close().await?;
    Ok(())
}
