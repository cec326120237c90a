use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use collector::{Collector, CollectorConfig};
use fetch::HttpFetcher;
use log::{debug, error, info};
use reqwest::Url;
use store::{HttpRecordStore, JsonLinesStore, RecordStore};

mod collector;
mod cookies;
mod fetch;
mod record;
mod scan;
mod store;

// Define the command-line arguments structure
#[derive(Parser, Debug)]
#[clap(
    name = "cookie-collector",
    about = "Politely collects 2K session cookies and the state/client_id pair of the sign-in link."
)]
struct Cli {
    /// Extra collection iterations after the first one
    #[clap(long, default_value_t = 10)]
    count: u32,

    /// Seconds to sleep after every iteration
    #[clap(long, default_value_t = 2)]
    sleep: u64,

    /// Page to collect from
    #[clap(long, default_value = "http://2k.com")]
    url: Url,

    /// Request timeout in seconds, for both the page and the store
    #[clap(long, default_value_t = 30)]
    timeout: u64,

    /// Endpoint that accepts put-item JSON documents; records go to stdout when unset
    #[clap(long, env = "COOKIE_STORE_URL")]
    store_url: Option<Url>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    debug!("parsed cli: {cli:?}");

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(cli.timeout);
    let config = CollectorConfig {
        count: cli.count,
        sleep: Duration::from_secs(cli.sleep),
    };

    let store: Box<dyn RecordStore> = match cli.store_url {
        Some(endpoint) => {
            Box::new(HttpRecordStore::new(endpoint, timeout).context("build store client")?)
        }
        None => Box::new(JsonLinesStore::new(io::stdout())),
    };

    info!("Collecting from {} for {} iterations", cli.url, u64::from(config.count) + 1);
    let collector = Collector::new(HttpFetcher::new(cli.url, timeout), store, config);
    let summary = collector.run().await;
    info!(
        "Done: {} stored, {} fetch failures, {} skipped, {} storage failures out of {} attempts",
        summary.stored,
        summary.fetch_failures,
        summary.skipped,
        summary.storage_failures,
        summary.attempts
    );

    Ok(())
}
