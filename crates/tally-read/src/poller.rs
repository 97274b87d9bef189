//! Bounded polling for operations of asynchronously processed transactions
//!
//! With asynchronous processing enabled a transaction becomes readable
//! before its operations are written. The poller re-issues the operations
//! fetch until it returns something, the deadline passes, or the caller
//! cancels:
//!
//! ```text
//! fetch ──non-empty──▶ Found
//!   │ empty, sync mode ──▶ Settled
//!   ▼
//! cancelled? ──yes──▶ Canceled
//!   │ no
//! deadline passed? ──yes──▶ TimedOut
//!   │ no
//! sleep(backoff) ──cancel──▶ Canceled
//!   └──▶ fetch
//! ```
//!
//! Fetch errors end the poll immediately.

use crate::stats::ReadStats;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tally_common::CursorPage;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Total time a poll may spend, measured from the first attempt
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed pause between attempts
pub const POLL_BACKOFF: Duration = Duration::from_millis(120);

/// How a poll ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// A fetch returned at least one record
    Found,
    /// Synchronous mode: the single empty fetch is final
    Settled,
    /// The caller cancelled before a non-empty fetch
    Canceled,
    /// The deadline passed before a non-empty fetch
    TimedOut,
}

impl PollOutcome {
    /// Whether processing may still be writing the records that were not seen
    pub const fn may_be_in_flight(self) -> bool {
        matches!(self, Self::Canceled | Self::TimedOut)
    }
}

/// Last fetched page and how polling ended
#[derive(Debug)]
pub struct Polled<T> {
    pub page: CursorPage<T>,
    pub outcome: PollOutcome,
    pub attempts: u32,
}

/// Retries an empty operations fetch while asynchronous processing catches up
#[derive(Clone, Debug)]
pub struct OperationPoller {
    async_processing: bool,
    timeout: Duration,
    backoff: Duration,
    stats: Option<Arc<ReadStats>>,
}

impl OperationPoller {
    pub const fn new(async_processing: bool) -> Self {
        Self {
            async_processing,
            timeout: POLL_TIMEOUT,
            backoff: POLL_BACKOFF,
            stats: None,
        }
    }

    #[must_use]
    pub fn with_stats(mut self, stats: Arc<ReadStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Fetch until a non-empty page, the deadline, or cancellation.
    ///
    /// Timing out and cancellation are not errors; both return the last
    /// (empty) page with the matching [`PollOutcome`].
    pub async fn poll<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut fetch: F,
    ) -> Result<Polled<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CursorPage<T>, E>>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempts = 1;

        self.record_attempt();
        let mut page = fetch().await?;
        if !page.is_empty() {
            return Ok(Polled { page, outcome: PollOutcome::Found, attempts });
        }
        if !self.async_processing {
            return Ok(Polled { page, outcome: PollOutcome::Settled, attempts });
        }

        loop {
            if cancel.is_cancelled() {
                debug!(attempts, "Operation poll cancelled");
                return Ok(Polled { page, outcome: PollOutcome::Canceled, attempts });
            }

            if Instant::now() >= deadline {
                warn!(
                    attempts,
                    elapsed = ?started.elapsed(),
                    "Operation poll timed out, processing may still be in flight"
                );
                if let Some(stats) = &self.stats {
                    ReadStats::add(&stats.poll_timeouts, 1);
                }
                return Ok(Polled { page, outcome: PollOutcome::TimedOut, attempts });
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(attempts, "Operation poll cancelled during backoff");
                    return Ok(Polled { page, outcome: PollOutcome::Canceled, attempts });
                }
                () = tokio::time::sleep(self.backoff) => {}
            }

            attempts += 1;
            self.record_attempt();
            page = fetch().await?;
            if !page.is_empty() {
                debug!(attempts, "Operations appeared while polling");
                return Ok(Polled { page, outcome: PollOutcome::Found, attempts });
            }
        }
    }

    fn record_attempt(&self) {
        if let Some(stats) = &self.stats {
            ReadStats::add(&stats.poll_attempts, 1);
        }
    }
}
