use anyhow::Result;
use async_trait::async_trait;

use crate::trade::model::TradeRecord;

/// Durable keyed storage for trade records.
///
/// Conditional writes that lose a race must fail with
/// [`crate::error::RevisionConflict`] so the store can tell them apart from
/// storage faults.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Every stored version of `identifier`, in ascending version order.
    async fn find_by_identifier(&self, identifier: i64) -> Result<Vec<TradeRecord>>;

    async fn find_by_identifier_and_version(
        &self,
        identifier: i64,
        version: i64,
    ) -> Result<Option<TradeRecord>>;

    async fn find_all_active(&self) -> Result<Vec<TradeRecord>>;

    /// Inserts when `record.storage_key` is `None`; the insert is refused if
    /// the identifier already holds this or a higher version.
    ///
    /// Otherwise updates the stored row, which is accepted only while its
    /// revision is exactly `record.revision - 1` and no higher version exists.
    ///
    /// Returns the persisted form.
    async fn save(&self, record: &TradeRecord) -> Result<TradeRecord>;

    /// Clears `active` on the matching record, but only while it is still
    /// active at `revision`.
    ///
    /// Returns `false` when nothing matched, e.g. a correction landed after
    /// the caller read the record.
    async fn expire(&self, identifier: i64, version: i64, revision: i64) -> Result<bool>;
}
