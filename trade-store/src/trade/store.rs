use anyhow::{Context, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::date;
use crate::error::{RevisionConflict, TradeError};
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::trade::model::{TradeRecord, UpsertOutcome, UpsertSummary};
use crate::trade::repository::TradeRepository;

/// Write path for trade records: decides insert / reject / correct for every
/// incoming revision against what the repository currently holds.
///
/// Nothing is cached between calls; every decision is made on a fresh read.
pub struct TradeStore {
    repo: Arc<dyn TradeRepository>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl TradeStore {
    pub fn new(repo: Arc<dyn TradeRepository>, clock: Arc<dyn Clock>, counters: Counters) -> Self {
        Self {
            repo,
            clock,
            counters,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Accepts or rejects one incoming revision.
    ///
    /// Flow:
    /// 1) Reject a maturity day before today (no repository access).
    /// 2) Load every stored version of the identifier.
    /// 3) Reject when any stored version is higher.
    /// 4) Same version stored: correct it in place and bump its revision.
    /// 5) Otherwise insert a new record.
    ///
    /// Exactly one write happens per accepted call. A conditional write that
    /// loses a race against a concurrent writer is reported as `StaleVersion`.
    #[instrument(
        skip(self, incoming),
        target = "store",
        fields(identifier = incoming.identifier, version = incoming.version)
    )]
    pub async fn upsert(&self, incoming: TradeRecord) -> Result<UpsertSummary, TradeError> {
        let now = self.clock.now();

        if date::is_before_today(now, incoming.maturity_date) {
            Counters::bump(&self.counters.rejected_past_maturity);
            let maturity = incoming.maturity_date.date();
            info!(%maturity, "rejected trade: maturity date is before today");
            return Err(TradeError::PastMaturityDate { maturity });
        }

        let existing = warn_if_slow("db_find_by_identifier", Duration::from_millis(100), async {
            self.repo.find_by_identifier(incoming.identifier).await
        })
        .await
        .context("failed to load existing trades")?;

        let newest = existing.iter().map(|t| t.version).max();
        if let Some(latest) = newest.filter(|v| *v > incoming.version) {
            Counters::bump(&self.counters.rejected_stale);
            info!(latest, "rejected trade: a newer version already exists");
            return Err(TradeError::StaleVersion {
                identifier: incoming.identifier,
                version: incoming.version,
            });
        }

        let outcome = match existing.into_iter().find(|t| t.version == incoming.version) {
            Some(mut current) => {
                current.apply_correction(&incoming);
                let saved = self.persist(&current).await?;

                Counters::bump(&self.counters.trades_corrected);
                info!(revision = saved.revision, "corrected trade in place");
                UpsertOutcome::Corrected {
                    revision: saved.revision,
                }
            }
            None => {
                let mut fresh = incoming.clone();
                fresh.storage_key = None;
                fresh.revision = 0;
                let saved = self.persist(&fresh).await?;
                let storage_key = saved
                    .storage_key
                    .ok_or_else(|| anyhow!("repository returned no storage key"))?;

                Counters::bump(&self.counters.trades_inserted);
                info!(storage_key, "inserted trade");
                UpsertOutcome::Inserted { storage_key }
            }
        };

        Ok(UpsertSummary {
            identifier: incoming.identifier,
            version: incoming.version,
            outcome,
        })
    }

    #[instrument(skip(self), target = "store")]
    pub async fn lookup(
        &self,
        identifier: i64,
        version: i64,
    ) -> Result<Option<TradeRecord>, TradeError> {
        debug!("fetching trade by identifier and version");

        let found = warn_if_slow(
            "db_find_by_identifier_and_version",
            Duration::from_millis(100),
            async {
                self.repo
                    .find_by_identifier_and_version(identifier, version)
                    .await
            },
        )
        .await
        .context("repository lookup failed")?;

        if found.is_none() {
            info!("trade lookup returned no results");
        }
        Ok(found)
    }

    /// Like [`TradeStore::lookup`], with absence reported as `NotFound`.
    pub async fn fetch(&self, identifier: i64, version: i64) -> Result<TradeRecord, TradeError> {
        self.lookup(identifier, version)
            .await?
            .ok_or(TradeError::NotFound {
                identifier,
                version,
            })
    }

    async fn persist(&self, record: &TradeRecord) -> Result<TradeRecord, TradeError> {
        let res = warn_if_slow("db_save", Duration::from_millis(100), async {
            self.repo.save(record).await
        })
        .await;

        match res {
            Ok(saved) => Ok(saved),
            Err(e) if e.downcast_ref::<RevisionConflict>().is_some() => {
                Counters::bump(&self.counters.rejected_stale);
                warn!(error = %e, "concurrent write won the race; rejecting as stale");
                Err(TradeError::StaleVersion {
                    identifier: record.identifier,
                    version: record.version,
                })
            }
            Err(e) => Err(TradeError::Repository(e.context("failed to persist trade"))),
        }
    }
}
