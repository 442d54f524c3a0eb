use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use sqlx::{AnyPool, Row};
use tracing::debug;

use crate::error::RevisionConflict;
use crate::trade::model::TradeRecord;
use crate::trade::repository::TradeRepository;

/// SQLx-backed implementation of TradeRepository.
/// Responsible only for persistence and row mapping.
pub struct SqlxTradeRepository {
    pool: AnyPool,
}

impl SqlxTradeRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, record: &TradeRecord) -> anyhow::Result<TradeRecord> {
        let inserted = sqlx::query(
            r#"
INSERT INTO trades (
  identifier, version, counterparty, book,
  created_at_ms, maturity_ms, active, revision
)
SELECT ?, ?, ?, ?, ?, ?, ?, ?
WHERE NOT EXISTS (
  SELECT 1 FROM trades WHERE identifier = ? AND version >= ?
)
RETURNING storage_key;
"#,
        )
        .bind(record.identifier)
        .bind(record.version)
        .bind(record.counterparty.as_str())
        .bind(record.book.as_str())
        .bind(to_ms(record.created_at))
        .bind(to_ms(record.maturity_date))
        .bind(bool_to_i64(record.active))
        .bind(record.revision)
        .bind(record.identifier)
        .bind(record.version)
        .fetch_optional(&self.pool)
        .await;

        let row = match inserted {
            Ok(Some(row)) => row,
            Ok(None) => return Err(conflict(record)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(conflict(record));
            }
            Err(e) => return Err(e.into()),
        };

        let mut persisted = record.clone();
        persisted.storage_key = Some(row.try_get::<i64, _>("storage_key")?);
        Ok(persisted)
    }

    async fn update(&self, storage_key: i64, record: &TradeRecord) -> anyhow::Result<TradeRecord> {
        let expected_revision = record.revision - 1;

        let row = sqlx::query(
            r#"
UPDATE trades
SET counterparty = ?,
    book = ?,
    created_at_ms = ?,
    maturity_ms = ?,
    active = CASE WHEN active = 1 AND ? = 1 THEN 1 ELSE 0 END,
    revision = ?
WHERE storage_key = ?
  AND revision = ?
  AND NOT EXISTS (
    SELECT 1 FROM trades AS newer
    WHERE newer.identifier = ? AND newer.version > ?
  )
RETURNING
  storage_key, identifier, version, counterparty, book,
  created_at_ms, maturity_ms, active, revision;
"#,
        )
        .bind(record.counterparty.as_str())
        .bind(record.book.as_str())
        .bind(to_ms(record.created_at))
        .bind(to_ms(record.maturity_date))
        .bind(bool_to_i64(record.active))
        .bind(record.revision)
        .bind(storage_key)
        .bind(expected_revision)
        .bind(record.identifier)
        .bind(record.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => row_to_trade(&r),
            None => Err(conflict(record)),
        }
    }
}

#[async_trait]
impl TradeRepository for SqlxTradeRepository {
    async fn find_by_identifier(&self, identifier: i64) -> anyhow::Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
SELECT
  storage_key, identifier, version, counterparty, book,
  created_at_ms, maturity_ms, active, revision
FROM trades
WHERE identifier = ?
ORDER BY version;
"#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;

        // A malformed row here would hide a version from the guard, so fail loudly.
        rows.iter()
            .map(row_to_trade)
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| format!("malformed trade row for identifier={identifier}"))
    }

    async fn find_by_identifier_and_version(
        &self,
        identifier: i64,
        version: i64,
    ) -> anyhow::Result<Option<TradeRecord>> {
        let row = sqlx::query(
            r#"
SELECT
  storage_key, identifier, version, counterparty, book,
  created_at_ms, maturity_ms, active, revision
FROM trades
WHERE identifier = ? AND version = ?;
"#,
        )
        .bind(identifier)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_trade(&r)?)),
            None => Ok(None),
        }
    }

    async fn find_all_active(&self) -> anyhow::Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
SELECT
  storage_key, identifier, version, counterparty, book,
  created_at_ms, maturity_ms, active, revision
FROM trades
WHERE active = 1;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_trade(&r) {
                Ok(t) => out.push(t),
                Err(e) => {
                    // poison-row resilience: the sweep still covers the rest
                    tracing::warn!(error = %e, "skipping malformed trade row");
                }
            }
        }

        Ok(out)
    }

    async fn save(&self, record: &TradeRecord) -> anyhow::Result<TradeRecord> {
        match record.storage_key {
            None => self.insert(record).await,
            Some(key) => self.update(key, record).await,
        }
    }

    async fn expire(&self, identifier: i64, version: i64, revision: i64) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
UPDATE trades
SET active = 0
WHERE identifier = ? AND version = ? AND revision = ? AND active = 1;
"#,
        )
        .bind(identifier)
        .bind(version)
        .bind(revision)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            debug!(
                identifier,
                version,
                revision,
                "expire matched no active trade at revision"
            );
            return Ok(false);
        }

        Ok(true)
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_trade(r: &sqlx::any::AnyRow) -> anyhow::Result<TradeRecord> {
    let active_i64: i64 = r.try_get("active")?;

    Ok(TradeRecord {
        storage_key: Some(r.try_get::<i64, _>("storage_key")?),
        identifier: r.try_get::<i64, _>("identifier")?,
        version: r.try_get::<i64, _>("version")?,
        counterparty: r.try_get::<String, _>("counterparty")?,
        book: r.try_get::<String, _>("book")?,
        created_at: from_ms(r.try_get("created_at_ms")?)?,
        maturity_date: from_ms(r.try_get("maturity_ms")?)?,
        active: i64_to_bool(active_i64)?,
        revision: r.try_get::<i64, _>("revision")?,
    })
}

fn conflict(record: &TradeRecord) -> anyhow::Error {
    anyhow::Error::new(RevisionConflict {
        identifier: record.identifier,
        version: record.version,
    })
}

/* =========================
Timestamp + flag helpers
========================= */

fn to_ms(t: NaiveDateTime) -> i64 {
    t.and_utc().timestamp_millis()
}

fn from_ms(ms: i64) -> anyhow::Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}

fn i64_to_bool(v: i64) -> anyhow::Result<bool> {
    match v {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(anyhow!("invalid boolean flag: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn millis_round_trip_keeps_sub_second_precision() {
        let t = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_milli_opt(23, 59, 59, 250)
            .unwrap();
        assert_eq!(from_ms(to_ms(t)).unwrap(), t);
    }

    #[test]
    fn flags_reject_out_of_range_values() {
        assert!(i64_to_bool(1).unwrap());
        assert!(!i64_to_bool(0).unwrap());
        assert!(i64_to_bool(2).is_err());
    }

    #[test]
    fn conflict_is_downcastable() {
        let r = TradeRecord::new(
            4,
            2,
            "C",
            "B",
            NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let err = conflict(&r);
        assert_eq!(
            err.downcast_ref::<RevisionConflict>(),
            Some(&RevisionConflict {
                identifier: 4,
                version: 2
            })
        );
    }
}
