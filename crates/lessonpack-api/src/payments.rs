//! Offline payments recorded against package instances

use chrono::{DateTime, Utc};
use lessonpack_util::{AdminId, InstanceId, PaymentId, StudentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an offline payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Cash,
    Check,
    CardOffline,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::BankTransfer,
        PaymentMethod::Cash,
        PaymentMethod::Check,
        PaymentMethod::CardOffline,
        PaymentMethod::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Check => "check",
            PaymentMethod::CardOffline => "card_offline",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| format!("Unknown payment method: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Recorded, waiting for an admin to confirm receipt
    Pending,
    Completed,
}

/// An offline payment and its confirmation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub instance_id: InstanceId,
    pub student_id: Option<StudentId>,
    pub amount_cents: u64,
    pub method: PaymentMethod,
    /// Bank or receipt reference; at most one completed payment per reference
    pub reference: Option<String>,
    pub status: PaymentStatus,
    pub recorded_by: AdminId,
    pub recorded_at: DateTime<Utc>,
    pub confirmed_by: Option<AdminId>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Whether this is a completed payment carrying `reference`
    pub fn settles_reference(&self, reference: &str) -> bool {
        self.is_completed() && self.reference.as_deref() == Some(reference)
    }
}
