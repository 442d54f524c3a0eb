//! In-memory repository and fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

use crate::error::RevisionConflict;
use crate::trade::model::TradeRecord;
use crate::trade::repository::TradeRepository;

pub fn today() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn mk_trade(identifier: i64, version: i64, cpty: &str, maturity: NaiveDateTime) -> TradeRecord {
    TradeRecord::new(
        identifier,
        version,
        cpty,
        format!("BOOK-{version}"),
        today(),
        maturity,
    )
}

/// Keeps rows keyed by (identifier, version) and honours the same
/// conditional-write contract as the SQL repository.
#[derive(Default)]
pub struct MockTradeRepository {
    pub rows: Mutex<BTreeMap<(i64, i64), TradeRecord>>,
    pub next_key: Mutex<i64>,
    pub save_calls: Mutex<usize>,
    pub find_calls: Mutex<usize>,
    pub expire_calls: Mutex<Vec<(i64, i64)>>,
    /// `(identifier, version)` pairs whose expire call fails.
    pub fail_expire: Mutex<HashSet<(i64, i64)>>,
    pub fail_find_active: Mutex<bool>,
}

impl MockTradeRepository {
    pub fn seed(&self, mut record: TradeRecord) {
        let key = {
            let mut next = self.next_key.lock();
            *next += 1;
            *next
        };
        record.storage_key = Some(key);
        self.rows
            .lock()
            .insert((record.identifier, record.version), record);
    }

    pub fn count_for(&self, identifier: i64) -> usize {
        self.rows
            .lock()
            .keys()
            .filter(|(id, _)| *id == identifier)
            .count()
    }

    pub fn get(&self, identifier: i64, version: i64) -> Option<TradeRecord> {
        self.rows.lock().get(&(identifier, version)).cloned()
    }
}

#[async_trait]
impl TradeRepository for MockTradeRepository {
    async fn find_by_identifier(&self, identifier: i64) -> anyhow::Result<Vec<TradeRecord>> {
        *self.find_calls.lock() += 1;
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|t| t.identifier == identifier)
            .cloned()
            .collect())
    }

    async fn find_by_identifier_and_version(
        &self,
        identifier: i64,
        version: i64,
    ) -> anyhow::Result<Option<TradeRecord>> {
        Ok(self.get(identifier, version))
    }

    async fn find_all_active(&self) -> anyhow::Result<Vec<TradeRecord>> {
        if *self.fail_find_active.lock() {
            return Err(anyhow::anyhow!("Database Offline"));
        }
        Ok(self.rows.lock().values().filter(|t| t.active).cloned().collect())
    }

    async fn save(&self, record: &TradeRecord) -> anyhow::Result<TradeRecord> {
        *self.save_calls.lock() += 1;
        let mut rows = self.rows.lock();
        let conflict = || {
            anyhow::Error::new(RevisionConflict {
                identifier: record.identifier,
                version: record.version,
            })
        };

        match record.storage_key {
            None => {
                let blocked = rows
                    .keys()
                    .any(|(id, v)| *id == record.identifier && *v >= record.version);
                if blocked {
                    return Err(conflict());
                }
                let mut key = self.next_key.lock();
                *key += 1;
                let mut stored = record.clone();
                stored.storage_key = Some(*key);
                rows.insert((record.identifier, record.version), stored.clone());
                Ok(stored)
            }
            Some(_) => {
                let newer = rows
                    .keys()
                    .any(|(id, v)| *id == record.identifier && *v > record.version);
                let current = rows
                    .get_mut(&(record.identifier, record.version))
                    .ok_or_else(conflict)?;
                if newer || current.revision != record.revision - 1 {
                    return Err(conflict());
                }
                let active = current.active && record.active;
                *current = record.clone();
                current.active = active;
                Ok(current.clone())
            }
        }
    }

    async fn expire(&self, identifier: i64, version: i64, revision: i64) -> anyhow::Result<bool> {
        self.expire_calls.lock().push((identifier, version));
        if self.fail_expire.lock().contains(&(identifier, version)) {
            return Err(anyhow::anyhow!("lock timeout expiring {identifier}/{version}"));
        }
        match self.rows.lock().get_mut(&(identifier, version)) {
            Some(t) if t.active && t.revision == revision => {
                t.active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
