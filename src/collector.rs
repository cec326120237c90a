use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;
use tokio::time;

use crate::cookies::CookieJar;
use crate::fetch::{FetchError, Fetcher, TimestampError};
use crate::record::{NoSessionCookie, Record, RecordBuilder, TABLE_NAME};
use crate::scan::{scan_page, ScrapeError};
use crate::store::{RecordStore, StoreError};

/// A progress notice is logged every this many iterations.
pub(crate) const PROGRESS_EVERY: u32 = 5;

/// Why an iteration produced no stored record. None of these stop the loop.
#[derive(Debug, Error)]
pub(crate) enum IterationError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    #[error("scrape incomplete: {0}")]
    ScrapeIncomplete(#[from] ScrapeError),
    #[error(transparent)]
    NoSessionCookie(#[from] NoSessionCookie),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CollectorConfig {
    /// Extra iterations after the first one.
    pub(crate) count: u32,
    /// Pause after every iteration, including the last.
    pub(crate) sleep: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) attempts: u32,
    pub(crate) stored: u32,
    pub(crate) fetch_failures: u32,
    pub(crate) skipped: u32,
    pub(crate) storage_failures: u32,
}

impl RunSummary {
    fn record_failure(&mut self, err: &IterationError) {
        match err {
            IterationError::Fetch(_) => self.fetch_failures += 1,
            IterationError::Storage(_) => self.storage_failures += 1,
            IterationError::Timestamp(_)
            | IterationError::ScrapeIncomplete(_)
            | IterationError::NoSessionCookie(_) => self.skipped += 1,
        }
    }
}

pub(crate) fn is_progress_tick(iteration: u32) -> bool {
    iteration != 0 && iteration % PROGRESS_EVERY == 0
}

pub(crate) struct Collector<F, S> {
    fetcher: F,
    store: S,
    table: String,
    config: CollectorConfig,
}

impl<F: Fetcher, S: RecordStore> Collector<F, S> {
    pub(crate) fn new(fetcher: F, store: S, config: CollectorConfig) -> Self {
        Self {
            fetcher,
            store,
            table: TABLE_NAME.to_string(),
            config,
        }
    }

    /// Runs `count + 1` iterations, one at a time, sleeping after each.
    pub(crate) async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        for iteration in 0..=self.config.count {
            summary.attempts += 1;
            match self.collect_once().await {
                Ok(record) => {
                    summary.stored += 1;
                    info!("Stored {} cookie taken at {}", record.cookie_name, record.timestamp);
                }
                Err(err) => {
                    summary.record_failure(&err);
                    match err {
                        IterationError::Fetch(err) => warn!(
                            "Failed to get a response body, will retry after {:?}: {err}",
                            self.config.sleep
                        ),
                        IterationError::Storage(err) => {
                            error!("Iteration {iteration}: {err}")
                        }
                        err => warn!("Iteration {iteration} skipped: {err}"),
                    }
                }
            }

            if is_progress_tick(iteration) {
                info!("Got {} cookies after {iteration} iterations.", summary.stored);
            }

            time::sleep(self.config.sleep).await;
        }

        summary
    }

    /// Fetch, scan, build and persist with a jar nobody else has seen.
    pub(crate) async fn collect_once(&self) -> Result<Record, IterationError> {
        let jar = Arc::new(CookieJar::new());
        let page = self.fetcher.fetch(Arc::clone(&jar)).await?;

        let timestamp = page.timestamp()?;
        let scrape = scan_page(&page.body, &page.url)?;
        let builder = RecordBuilder {
            table: &self.table,
            primary_host: self.fetcher.target().host_str(),
        };
        let record = builder.build(&jar, scrape, timestamp)?;

        self.store.put_record(&record).await?;
        Ok(record)
    }
}
