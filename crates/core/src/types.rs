use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invoice payment status persisted in the `invoices.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    /// Parses the exact lowercase form; no trimming or case folding.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown invoice status '{0}'")]
pub struct UnknownStatus(pub String);

/// Monetary amount in minor currency units (cents).
///
/// Never negative. Values produced by form validation are also never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Cents {
    type Error = NegativeAmount;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            Err(NegativeAmount(value))
        } else {
            Ok(Self(value))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount cannot be negative (got {0})")]
pub struct NegativeAmount(pub i64);

/// Invoice row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    pub amount: Cents,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
}

/// Customer reference used to populate invoice forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
}

/// Normalized payload for inserting a new invoice. The id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub customer_id: String,
    pub amount: Cents,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
}

/// Columns replaced by an update. The issue date is not among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceChanges {
    pub customer_id: String,
    pub amount: Cents,
    pub status: InvoiceStatus,
}

/// A single write statement accepted by the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceWrite {
    Insert(NewInvoice),
    Update { id: String, changes: InvoiceChanges },
    Delete { id: String },
}

impl InvoiceWrite {
    /// Returns the statement kind used in logs and metrics labels.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// Returns the invoice id targeted by the write, if it is already known.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Insert(_) => None,
            Self::Update { id, .. } | Self::Delete { id } => Some(id),
        }
    }
}
