use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::TradeError;

/// One stored revision of a trade.
///
/// `(identifier, version)` is unique. `revision` is the internal
/// optimistic-concurrency counter and is unrelated to the business `version`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Surrogate key assigned by the repository on first persistence.
    pub storage_key: Option<i64>,
    pub identifier: i64,
    pub version: i64,
    pub counterparty: String,
    pub book: String,
    pub created_at: NaiveDateTime,
    pub maturity_date: NaiveDateTime,
    /// Cleared exactly once by the expiry sweep; never set back.
    pub active: bool,
    pub revision: i64,
}

impl TradeRecord {
    /// A not-yet-persisted, active record.
    pub fn new(
        identifier: i64,
        version: i64,
        counterparty: impl Into<String>,
        book: impl Into<String>,
        created_at: NaiveDateTime,
        maturity_date: NaiveDateTime,
    ) -> Self {
        Self {
            storage_key: None,
            identifier,
            version,
            counterparty: counterparty.into(),
            book: book.into(),
            created_at,
            maturity_date,
            active: true,
            revision: 0,
        }
    }

    /// Overwrites the mutable fields with those of `incoming` and bumps
    /// `revision`. An expired record stays expired.
    pub fn apply_correction(&mut self, incoming: &TradeRecord) {
        self.counterparty = incoming.counterparty.clone();
        self.book = incoming.book.clone();
        self.created_at = incoming.created_at;
        self.maturity_date = incoming.maturity_date;
        self.active = self.active && incoming.active;
        self.revision += 1;
    }
}

/// Inbound wire form of a trade.
///
/// Key fields are optional here so that their absence is reported as
/// [`TradeError::MissingField`] rather than a decoding failure.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TradeSubmission {
    pub identifier: Option<i64>,
    pub version: Option<i64>,
    #[serde(default)]
    pub counterparty: String,
    #[serde(default)]
    pub book: String,
    pub created_at: Option<NaiveDateTime>,
    pub maturity_date: Option<NaiveDateTime>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TradeSubmission {
    /// Validates required fields; `created_at` defaults to `now`.
    pub fn into_record(self, now: NaiveDateTime) -> Result<TradeRecord, TradeError> {
        let identifier = self.identifier.ok_or(TradeError::MissingField("identifier"))?;
        let version = self.version.ok_or(TradeError::MissingField("version"))?;
        let maturity_date = self
            .maturity_date
            .ok_or(TradeError::MissingField("maturity_date"))?;

        let mut record = TradeRecord::new(
            identifier,
            version,
            self.counterparty,
            self.book,
            self.created_at.unwrap_or(now),
            maturity_date,
        );
        record.active = self.active;
        Ok(record)
    }
}

/// What an accepted upsert did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted { storage_key: i64 },
    Corrected { revision: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub identifier: i64,
    pub version: i64,
    pub outcome: UpsertOutcome,
}

impl fmt::Display for UpsertSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stored trade identifier={} version={}",
            self.identifier, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn mk_record(active: bool) -> TradeRecord {
        let mut r = TradeRecord::new(1, 1, "CPTY-1", "BOOK-1", now(), now() + Duration::days(5));
        r.storage_key = Some(11);
        r.active = active;
        r
    }

    #[test]
    fn correction_overwrites_fields_and_bumps_revision() {
        let mut existing = mk_record(true);
        let mut incoming = TradeRecord::new(
            1,
            1,
            "CPTY-2",
            "BOOK-2",
            now() + Duration::hours(1),
            now() + Duration::days(9),
        );
        incoming.active = true;

        existing.apply_correction(&incoming);

        assert_eq!(existing.counterparty, "CPTY-2");
        assert_eq!(existing.book, "BOOK-2");
        assert_eq!(existing.maturity_date, incoming.maturity_date);
        assert_eq!(existing.created_at, incoming.created_at);
        assert_eq!(existing.revision, 1);
        assert_eq!(existing.storage_key, Some(11));
    }

    #[test]
    fn correction_never_reactivates() {
        let mut existing = mk_record(false);
        let incoming = TradeRecord::new(1, 1, "CPTY-2", "BOOK-2", now(), now());
        existing.apply_correction(&incoming);
        assert!(!existing.active);
    }

    #[test]
    fn correction_may_deactivate() {
        let mut existing = mk_record(true);
        let mut incoming = TradeRecord::new(1, 1, "CPTY-2", "BOOK-2", now(), now());
        incoming.active = false;
        existing.apply_correction(&incoming);
        assert!(!existing.active);
    }

    #[test]
    fn submission_requires_key_fields() {
        let missing_identifier = TradeSubmission {
            version: Some(1),
            maturity_date: Some(now()),
            ..Default::default()
        };
        assert!(matches!(
            missing_identifier.into_record(now()),
            Err(TradeError::MissingField("identifier"))
        ));

        let missing_version = TradeSubmission {
            identifier: Some(1),
            maturity_date: Some(now()),
            ..Default::default()
        };
        assert!(matches!(
            missing_version.into_record(now()),
            Err(TradeError::MissingField("version"))
        ));

        let missing_maturity = TradeSubmission {
            identifier: Some(1),
            version: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            missing_maturity.into_record(now()),
            Err(TradeError::MissingField("maturity_date"))
        ));
    }

    #[test]
    fn submission_defaults_from_json() {
        let sub: TradeSubmission = serde_json::from_str(
            r#"{"identifier": 5, "version": 2, "maturity_date": "2026-12-01T00:00:00"}"#,
        )
        .unwrap();
        let record = sub.into_record(now()).unwrap();

        assert!(record.active);
        assert_eq!(record.created_at, now());
        assert_eq!(record.counterparty, "");
        assert_eq!(record.revision, 0);
        assert_eq!(record.storage_key, None);
    }

    #[test]
    fn summary_message_names_identifier_and_version() {
        let s = UpsertSummary {
            identifier: 100,
            version: 1,
            outcome: UpsertOutcome::Inserted { storage_key: 1 },
        };
        assert_eq!(s.to_string(), "stored trade identifier=100 version=1");
    }
}
