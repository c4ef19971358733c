//! Shared types for the lessonpack API

use chrono::{DateTime, Utc};
use lessonpack_util::{AdminId, InstanceId, StudentId, TemplateId, TutorId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{HourAllotment, Hours};

/// Lifecycle status of a package instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// Created, waiting for student and tutor to be bound
    Pending,
    /// Lessons may be recorded against it
    Active,
    /// Paused by an admin or tutor (e.g. non-payment)
    Suspended,
    /// All hours consumed, or closed by an admin
    Completed,
    /// Expiry date passed with hours left
    Expired,
}

impl PackageStatus {
    pub const ALL: [PackageStatus; 5] = [
        PackageStatus::Pending,
        PackageStatus::Active,
        PackageStatus::Suspended,
        PackageStatus::Completed,
        PackageStatus::Expired,
    ];

    /// No transition and no ledger mutation leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageStatus::Completed | PackageStatus::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::Active => "active",
            PackageStatus::Suspended => "suspended",
            PackageStatus::Completed => "completed",
            PackageStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown package status: {}", s))
    }
}

/// A sellable tutoring bundle
///
/// Only `is_active` may change once an instance references the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub total_hours: HourAllotment,
    pub price_cents: u64,
    /// Days an instance stays valid after creation. None uses the engine default.
    pub validity_days: Option<u32>,
    /// Tutor who offers this package, if it is tied to one
    pub tutor_id: Option<TutorId>,
    pub is_active: bool,
}

/// Persisted representation of a package instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: InstanceId,
    pub template_id: TemplateId,
    /// Subjects copied from the template at creation
    #[serde(default)]
    pub subjects: Vec<String>,
    pub student_id: Option<StudentId>,
    pub tutor_id: Option<TutorId>,
    pub total_hours: Hours,
    pub used_hours: Hours,
    pub status: PackageStatus,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Audit entry written whenever someone binds parties to a package instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub instance_id: InstanceId,
    pub template_id: TemplateId,
    pub student_id: StudentId,
    pub tutor_id: Option<TutorId>,
    pub assigned_by: AdminId,
    pub assigned_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Warning severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Warn,
    Critical,
}

/// Configured point before expiry at which dashboards start warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryThreshold {
    /// Days before expiry at which this warning applies
    pub days_before: u32,
    pub severity: WarningSeverity,
    pub message_template: Option<String>,
}

/// Warning attached to a dashboard view of a package nearing expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryWarning {
    pub days_before: u32,
    pub days_left: i64,
    pub severity: WarningSeverity,
    pub message: Option<String>,
}

impl ExpiryWarning {
    /// Pick the tightest threshold that `days_left` falls within.
    pub fn select(thresholds: &[ExpiryThreshold], days_left: i64) -> Option<ExpiryWarning> {
        if days_left < 0 {
            return None;
        }
        thresholds
            .iter()
            .filter(|t| days_left <= t.days_before as i64)
            .min_by_key(|t| t.days_before)
            .map(|t| ExpiryWarning {
                days_before: t.days_before,
                days_left,
                severity: t.severity,
                message: t
                    .message_template
                    .as_ref()
                    .map(|m| m.replace("{days}", &days_left.to_string())),
            })
    }
}

/// Read model consumed by dashboard widgets (progress bars, expiry banners)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageView {
    pub instance_id: InstanceId,
    pub template_id: TemplateId,
    pub template_name: String,
    pub subjects: Vec<String>,
    pub student_id: Option<StudentId>,
    pub tutor_id: Option<TutorId>,
    pub status: PackageStatus,
    pub total_hours: Hours,
    pub used_hours: Hours,
    pub remaining_hours: Hours,
    pub percent_used: f64,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expiry_date: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub expiry_warning: Option<ExpiryWarning>,
    pub notes: Option<String>,
}
