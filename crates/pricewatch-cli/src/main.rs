use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pricewatch_storage::HistoryStore;
use pricewatch_sync::{latest_report, run_loop, CollectionPipeline, PipelineSettings};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pricewatch-cli")]
#[command(about = "Store price watcher: collect prices, keep history, raise alerts")]
struct Cli {
    /// Product catalog (YAML).
    #[arg(long, global = true, env = "PRICEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Price history CSV.
    #[arg(long, global = true, env = "PRICEWATCH_HISTORY")]
    history: Option<PathBuf>,

    /// Minutes between collection cycles in watch mode; fractions allowed, raised to 1 minute.
    #[arg(long, global = true, default_value_t = 60.0)]
    interval: f64,

    /// Only collect these product ids. Repeatable.
    #[arg(long = "product", global = true)]
    products: Vec<String>,

    /// Accept invalid TLS certificates.
    #[arg(long, global = true)]
    disable_ssl_verify: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single collection pass and print its summary.
    Collect,
    /// Collect repeatedly until interrupted.
    Watch,
    /// Print the latest price per product and store.
    Latest,
}

impl Cli {
    fn settings(&self) -> PipelineSettings {
        let mut settings = PipelineSettings::from_env();
        if let Some(config) = &self.config {
            settings.products_path = config.clone();
        }
        if let Some(history) = &self.history {
            settings.history_path = history.clone();
        }
        if self.disable_ssl_verify {
            tracing::warn!("TLS certificate verification disabled");
            settings.http.accept_invalid_certs = true;
        }
        settings
    }

    /// Negative or non-finite values collapse to zero; the run loop applies the minimum.
    fn interval_duration(&self) -> Duration {
        let seconds = self.interval.max(0.0) * 60.0;
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pricewatch_storage=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut cli = Cli::parse();
    let settings = cli.settings();

    match cli.command.take().unwrap_or(Commands::Watch) {
        Commands::Collect => {
            let pipeline = CollectionPipeline::from_settings(settings).await?;
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_shutdown(cancel.clone()));
            let summary = pipeline.run_once(&cli.products, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Watch => {
            let pipeline = CollectionPipeline::from_settings(settings).await?;
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_shutdown(cancel.clone()));
            let interval = cli.interval_duration();
            let cycles = run_loop(&pipeline, interval, &cli.products, cancel).await;
            tracing::info!(cycles, "shutdown complete");
        }
        Commands::Latest => {
            let history = HistoryStore::new(settings.history_path);
            println!("{}", latest_report(&history).await?);
        }
    }

    Ok(())
}

/// Cancel `token` on SIGINT (Ctrl-C) or SIGTERM.
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl-C, finishing the current item"),
        () = terminate => tracing::info!("received SIGTERM, finishing the current item"),
    }
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_watch_with_hourly_interval() {
        let cli = Cli::parse_from(["pricewatch-cli"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.interval, 60.0);
        assert_eq!(cli.interval_duration(), Duration::from_secs(3600));
        assert!(!cli.disable_ssl_verify);
    }

    #[test]
    fn fractional_interval_is_accepted() {
        let cli = Cli::parse_from(["pricewatch-cli", "--interval", "0.5", "watch"]);
        assert_eq!(cli.interval_duration(), Duration::from_secs(30));

        let cli = Cli::parse_from(["pricewatch-cli", "--interval=-5"]);
        assert_eq!(cli.interval_duration(), Duration::ZERO);
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "pricewatch-cli",
            "--config",
            "custom/products.yaml",
            "--history",
            "custom/history.csv",
            "--product",
            "gpu",
            "--product",
            "ssd",
            "--disable-ssl-verify",
            "collect",
        ]);
        assert!(matches!(cli.command, Some(Commands::Collect)));
        assert_eq!(cli.products, vec!["gpu".to_string(), "ssd".to_string()]);

        let settings = cli.settings();
        assert_eq!(settings.products_path, PathBuf::from("custom/products.yaml"));
        assert_eq!(settings.history_path, PathBuf::from("custom/history.csv"));
        assert!(settings.http.accept_invalid_certs);
    }
}
