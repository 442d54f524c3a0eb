//! Periodic expiry sweep.
//!
//! Responsibilities:
//! - Load every active trade on a fixed cadence.
//! - Expire trades whose maturity day is strictly before today.
//!
//! Each record is expired independently: one failing write is logged and
//! counted, and the pass continues. Coordination with the write path happens
//! only through the repository.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, instrument};

use crate::clock::Clock;
use crate::date;
use crate::logger::{TraceId, root_span, warn_if_slow};
use crate::metrics::counters::Counters;
use crate::trade::repository::TradeRepository;

/// What one sweep pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    /// Records changed by a writer after the pass read them.
    pub skipped: usize,
    pub failed: usize,
}

pub struct ExpiryScanner {
    repo: Arc<dyn TradeRepository>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl ExpiryScanner {
    pub fn new(repo: Arc<dyn TradeRepository>, clock: Arc<dyn Clock>, counters: Counters) -> Self {
        Self {
            repo,
            clock,
            counters,
        }
    }

    /// Runs one pass over all active trades.
    ///
    /// Fails only when the active set cannot be loaded.
    #[instrument(skip(self), target = "expiry")]
    pub async fn sweep(&self) -> anyhow::Result<SweepReport> {
        Counters::bump(&self.counters.sweeps);
        let now = self.clock.now();

        let active = warn_if_slow("db_find_all_active", Duration::from_millis(200), async {
            self.repo.find_all_active().await
        })
        .await
        .context("failed to load active trades")?;

        info!(active = active.len(), "starting expiry sweep");

        let mut report = SweepReport {
            scanned: active.len(),
            ..SweepReport::default()
        };

        for t in &active {
            if !date::is_before_today(now, t.maturity_date) {
                continue;
            }

            match self.repo.expire(t.identifier, t.version, t.revision).await {
                Ok(true) => {
                    report.expired += 1;
                    Counters::bump(&self.counters.sweep_expired);
                    info!(
                        identifier = t.identifier,
                        version = t.version,
                        maturity = %t.maturity_date.date(),
                        "trade expired"
                    );
                }
                Ok(false) => {
                    report.skipped += 1;
                    debug!(
                        identifier = t.identifier,
                        version = t.version,
                        revision = t.revision,
                        "trade changed since the sweep read it; left for the next pass"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    Counters::bump(&self.counters.sweep_expire_failures);
                    error!(
                        error = ?e,
                        identifier = t.identifier,
                        version = t.version,
                        "failed to expire trade; continuing sweep"
                    );
                }
            }
        }

        info!(
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            "expiry sweep complete"
        );
        Ok(report)
    }

    /// Sweeps every `interval` after waiting `initial_delay`.
    ///
    /// A slow pass delays the next tick rather than causing a burst.
    pub async fn run(self: Arc<Self>, interval: Duration, initial_delay: Duration) {
        debug!(?interval, ?initial_delay, "expiry loop waiting for initial delay");
        tokio::time::sleep(initial_delay).await;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let trace_id = TraceId::random();
            if let Err(e) = self
                .sweep()
                .instrument(root_span("expiry_sweep", &trace_id))
                .await
            {
                error!(error = ?e, trace_id = %trace_id.as_str(), "expiry sweep failed");
            }
        }
    }

    pub fn spawn(self: Arc<Self>, interval: Duration, initial_delay: Duration) -> JoinHandle<()> {
        tokio::spawn(self.run(interval, initial_delay))
    }
}
