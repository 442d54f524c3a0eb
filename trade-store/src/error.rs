use chrono::NaiveDate;
use thiserror::Error;

/// Typed outcome of a refused or failed trade-store operation.
///
/// Guard violations (`PastMaturityDate`, `StaleVersion`, `MissingField`) are
/// decided before any write and are never retried. `Repository` carries an
/// unexpected storage fault unchanged.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("trade maturity date={maturity} is before today")]
    PastMaturityDate { maturity: NaiveDate },

    #[error(
        "rejected trade identifier/version={identifier}/{version}: a newer version already exists"
    )]
    StaleVersion { identifier: i64, version: i64 },

    #[error("trade does not exist for identifier/version={identifier}/{version}")]
    NotFound { identifier: i64, version: i64 },

    #[error("trade submission is missing required field `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

impl TradeError {
    /// True for rejections decided by the store's own rules, as opposed to
    /// storage faults.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, TradeError::Repository(_))
    }
}

/// Raised by a repository when a conditional write lost a race: the stored
/// revision moved, or a higher-or-equal version appeared between the read
/// and the write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("revision conflict on trade identifier/version={identifier}/{version}")]
pub struct RevisionConflict {
    pub identifier: i64,
    pub version: i64,
}
