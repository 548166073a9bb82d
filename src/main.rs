use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use courtfeed::bverfg::{fetch_upcoming_decisions, DecisionFeedTranslator};
use courtfeed::config::Config;
use courtfeed::feed::{Feed, HttpSource};
use courtfeed::notify::{
    run_daily_outlook, run_decision_notifier, LogNotifier, Messages, Notifier, OutlookSettings,
};

#[derive(Parser, Debug)]
#[command(
    name = "courtfeed",
    about = "Watches the Federal Constitutional Court's decision feed"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "courtfeed.toml")]
    config: PathBuf,

    /// Log at debug level regardless of RUST_LOG
    #[arg(long)]
    debug: bool,

    /// Print all announced senate decisions and exit
    #[arg(long)]
    once_upcoming: bool,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on the first SIGINT or SIGTERM.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("courtfeed/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let messages = Arc::new(Messages::default());
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    if args.once_upcoming {
        let today = Local::now().date_naive();
        let decisions = fetch_upcoming_decisions(&client, &config.announcements_url)
            .await
            .context("Failed to fetch announced decisions")?;
        if decisions.is_empty() {
            println!("No announced decisions.");
        }
        for decision in &decisions {
            let marker = if decision.is_due_on(today) { " (today)" } else { "" };
            println!(
                "{}{}  {}  {}",
                decision.publish_date.format("%d.%m.%Y"),
                marker,
                decision.reference,
                decision.description
            );
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();

    let source = HttpSource::new(client.clone()).with_translator(Arc::new(DecisionFeedTranslator));
    let feed = Feed::new(
        &cancel,
        config.decision_feed_url.clone(),
        Arc::new(source),
        config.feed_options(),
    );
    let rx = feed.subscribe().context("Failed to subscribe to decision feed")?;
    tracing::info!(url = %feed.url(), interval = ?feed.refresh_interval(), "Watching decision feed");

    let decisions = tokio::spawn(run_decision_notifier(
        rx,
        Arc::clone(&messages),
        Arc::clone(&notifier),
    ));

    let outlook = config.outlook_hour.map(|hour| {
        tokio::spawn(run_daily_outlook(
            client,
            OutlookSettings {
                url: config.announcements_url.clone(),
                hour,
            },
            Arc::clone(&messages),
            Arc::clone(&notifier),
            cancel.clone(),
        ))
    });

    wait_for_signal().await.context("Failed to install signal handlers")?;
    cancel.cancel();
    feed.close();

    let sent = decisions.await.context("Decision notifier panicked")?;
    if let Some(outlook) = outlook {
        outlook.await.context("Daily outlook panicked")?;
    }

    tracing::info!(sent, "Shut down");
    Ok(())
}
