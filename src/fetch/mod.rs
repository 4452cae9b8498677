//! Accumulates search results page by page until enough records were
//! collected or the upstream runs dry.

mod backoff;
mod pool;

pub use backoff::{Backoff, INITIAL_BACKOFF, MAX_BACKOFF};
pub use pool::SessionPool;

use crate::model::Record;
use crate::query::SearchQuery;
use crate::twitter::{Authentication, ClientFactory, FetchError, PageCursor};
use anyhow::Context;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

pub const MINIMUM_TWEETS: usize = 50;

/// Delay before retrying a failure that is not a rate limit
pub const ERROR_DELAY: Duration = Duration::from_secs(5);

/// Limits on how long a session keeps retrying failed fetches. Unset limits
/// mean retry forever.
#[derive(Debug, Clone, Default)]
pub struct RetryBudget {
    /// Consecutive failures allowed, reset by any successful page
    pub max_attempts: Option<u32>,
    /// Measured from the start of the session
    pub max_elapsed: Option<Duration>,
}

impl RetryBudget {
    /// `resume_at` is the session time at which the next retry would start
    fn is_spent(&self, attempts: u32, resume_at: Duration) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
            || self.max_elapsed.map_or(false, |max| resume_at > max)
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub target: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub error_delay: Duration,
    pub retry: RetryBudget,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            target: MINIMUM_TWEETS,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            error_delay: ERROR_DELAY,
            retry: RetryBudget::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Gave up after {attempts} failed attempts in {elapsed:?}: {last}")]
    RetriesExhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        last: FetchError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The target number of records was reached
    Done,
    /// The upstream had no further pages
    Exhausted,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<Record>,
    pub completion: Completion,
}

/// Drives the cursor until `settings.target` records are collected or the
/// upstream is exhausted. Failed fetches are retried with the same cursor
/// state: rate limits back off exponentially, anything else waits
/// `settings.error_delay`.
pub async fn accumulate(
    cursor: &mut dyn PageCursor,
    settings: &FetchSettings,
) -> Result<FetchOutcome, SessionError> {
    let started_at = Instant::now();
    let mut backoff = Backoff::new(settings.initial_backoff, settings.max_backoff);
    let mut records = Vec::with_capacity(settings.target);
    let mut started = false;
    let mut failures = 0;

    loop {
        let result = if !started {
            log::info!("Fetching first page");
            cursor.fetch_first().await
        } else if cursor.is_exhausted() {
            log::info!("No more pages available, returning {}", records.len());
            return Ok(FetchOutcome {
                records,
                completion: Completion::Exhausted,
            });
        } else {
            log::debug!("Fetching next page");
            cursor.fetch_next().await
        };

        let error = match result {
            Ok(page) => {
                started = true;
                failures = 0;
                if page.items.is_empty() {
                    log::info!("No more tweets found, returning {}", records.len());
                    return Ok(FetchOutcome {
                        records,
                        completion: Completion::Exhausted,
                    });
                }
                for item in page.items {
                    if records.len() >= settings.target {
                        break;
                    }
                    records.push(Record::from(item));
                }
                log::info!("Collected {}/{} tweets", records.len(), settings.target);
                if records.len() >= settings.target {
                    return Ok(FetchOutcome {
                        records,
                        completion: Completion::Done,
                    });
                }
                continue;
            }
            Err(e) => e,
        };

        failures += 1;
        let delay = match &error {
            FetchError::RateLimited => {
                let delay = backoff.next_delay();
                log::warn!(
                    "Rate limit exceeded, delay {:?} (next {:?})",
                    delay,
                    backoff.current()
                );
                delay
            }
            FetchError::Other(e) => {
                log::warn!("An error occurred: {}, delay {:?}", e, settings.error_delay);
                settings.error_delay
            }
        };
        let elapsed = started_at.elapsed();
        if settings.retry.is_spent(failures, elapsed + delay) {
            log::warn!("Giving up after {} failed attempts: {}", failures, error);
            return Err(SessionError::RetriesExhausted {
                attempts: failures,
                elapsed,
                last: error,
            });
        }
        sleep(delay).await;
    }
}

/// One complete session: waits for a pool slot, creates and logs in a fresh
/// client, then accumulates results for `raw_query`.
pub async fn fetch_tweets(
    clients: &dyn ClientFactory,
    auth: &Authentication,
    pool: &SessionPool,
    settings: &FetchSettings,
    raw_query: &str,
) -> anyhow::Result<Vec<Record>> {
    let _permit = pool.acquire().await?;
    let client = clients.create().context("Unable to create client")?;
    log::info!("Logging in as {}", auth.username);
    client.login(auth).await.context("Unable to log in")?;
    let query = SearchQuery::latest(raw_query);
    log::info!("Searching for: {}", query.text);
    let mut cursor = client.search(query);
    let outcome = accumulate(cursor.as_mut(), settings).await?;
    match outcome.completion {
        Completion::Done => log::info!("Collected {} tweets", outcome.records.len()),
        Completion::Exhausted => log::info!(
            "Search exhausted with {}/{} tweets",
            outcome.records.len(),
            settings.target
        ),
    }
    Ok(outcome.records)
}
