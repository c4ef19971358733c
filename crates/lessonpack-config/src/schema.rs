//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Engine-wide settings
    #[serde(default)]
    pub engine: RawEngineConfig,

    /// Cancellation refund tiers
    #[serde(default)]
    pub refund: Option<RawRefundPolicy>,

    /// Package catalog
    #[serde(default)]
    pub templates: Vec<RawTemplate>,

    /// Known students
    #[serde(default)]
    pub students: Vec<RawUser>,

    /// Known tutors
    #[serde(default)]
    pub tutors: Vec<RawUser>,
}

/// Engine-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEngineConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Days a package stays valid when its template sets no validity (default: 31)
    pub default_validity_days: Option<u32>,

    /// Allow a student to hold several open packages for the same subject
    pub allow_concurrent_per_subject: Option<bool>,

    /// Resume a suspended package once an offline payment is confirmed (default: true)
    pub resume_on_payment: Option<bool>,

    /// Expiry warning thresholds shown on dashboards
    pub expiry_warnings: Option<Vec<RawExpiryWarning>>,
}

/// Expiry warning threshold
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawExpiryWarning {
    /// Days before expiry
    pub days_before: u32,

    /// Severity: "info", "warn", "critical"
    #[serde(default = "default_severity")]
    pub severity: String,

    /// Message template; `{days}` is replaced by the days left
    pub message: Option<String>,
}

fn default_severity() -> String {
    "warn".to_string()
}

/// Refund policy
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRefundPolicy {
    #[serde(default)]
    pub tiers: Vec<RawRefundTier>,
}

/// One refund tier: cancelling with more than `min_notice_hours` of notice
/// returns `percent`% of the lesson's hours
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRefundTier {
    pub min_notice_hours: u32,
    pub percent: u32,
}

/// Raw package template
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTemplate {
    /// Unique stable ID
    pub id: String,

    /// Display name
    pub name: String,

    pub description: Option<String>,

    /// Single subject shorthand
    pub subject: Option<String>,

    /// Subjects covered
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Hours per instance; omit for packages sized at assignment time
    pub total_hours: Option<f64>,

    #[serde(default)]
    pub price_cents: u64,

    /// Validity after creation, in days
    pub validity_days: Option<u32>,

    /// Tutor offering this package
    pub tutor: Option<String>,

    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Raw student or tutor entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawUser {
    pub id: String,
    pub name: Option<String>,
}
