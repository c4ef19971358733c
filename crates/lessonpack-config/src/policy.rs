//! Validated policy structures

use crate::schema::{RawConfig, RawEngineConfig, RawExpiryWarning, RawRefundPolicy, RawTemplate};
use crate::validation::parse_severity;
use chrono::{DateTime, Utc};
use lessonpack_api::{
    ExpiryThreshold, HourAllotment, Hours, PackageTemplate, WarningSeverity,
};
use lessonpack_util::{StudentId, TemplateId, TutorId};
use std::path::PathBuf;

/// Days a package stays valid when nothing else says otherwise
pub const DEFAULT_VALIDITY_DAYS: u32 = 31;

/// Longest validity a template or the engine default may grant
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

/// Validated policy ready for use by the registry
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub engine: EngineSettings,
    pub refund: RefundPolicy,
    pub templates: Vec<PackageTemplate>,
    pub students: Vec<Student>,
    pub tutors: Vec<Tutor>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            engine: EngineSettings::from_raw(raw.engine),
            refund: raw.refund.map(RefundPolicy::from_raw).unwrap_or_default(),
            templates: raw.templates.into_iter().map(convert_template).collect(),
            students: raw
                .students
                .into_iter()
                .map(|u| Student {
                    id: StudentId::new(u.id),
                    name: u.name,
                })
                .collect(),
            tutors: raw
                .tutors
                .into_iter()
                .map(|u| Tutor {
                    id: TutorId::new(u.id),
                    name: u.name,
                })
                .collect(),
        }
    }
}

/// Engine-wide settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub data_dir: PathBuf,
    pub default_validity_days: u32,
    pub allow_concurrent_per_subject: bool,
    pub resume_on_payment: bool,
    pub expiry_warnings: Vec<ExpiryThreshold>,
}

impl EngineSettings {
    fn from_raw(raw: RawEngineConfig) -> Self {
        Self {
            data_dir: raw
                .data_dir
                .unwrap_or_else(lessonpack_util::default_data_dir),
            default_validity_days: raw
                .default_validity_days
                .unwrap_or(DEFAULT_VALIDITY_DAYS),
            allow_concurrent_per_subject: raw.allow_concurrent_per_subject.unwrap_or(false),
            resume_on_payment: raw.resume_on_payment.unwrap_or(true),
            expiry_warnings: raw
                .expiry_warnings
                .map(|w| w.into_iter().map(convert_warning).collect())
                .unwrap_or_else(default_expiry_warnings),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: lessonpack_util::default_data_dir(),
            default_validity_days: DEFAULT_VALIDITY_DAYS,
            allow_concurrent_per_subject: false,
            resume_on_payment: true,
            expiry_warnings: default_expiry_warnings(),
        }
    }
}

/// Known student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: StudentId,
    pub name: Option<String>,
}

/// Known tutor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tutor {
    pub id: TutorId,
    pub name: Option<String>,
}

/// Share of a cancelled lesson's hours returned for a given notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundTier {
    /// Notice strictly greater than this many hours qualifies
    pub min_notice_hours: u32,
    pub percent: u8,
}

/// Notice-based refund tiers for cancelled lessons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPolicy {
    /// Sorted by `min_notice_hours`, longest notice first
    tiers: Vec<RefundTier>,
}

impl RefundPolicy {
    pub fn new(mut tiers: Vec<RefundTier>) -> Self {
        tiers.sort_by(|a, b| b.min_notice_hours.cmp(&a.min_notice_hours));
        Self { tiers }
    }

    fn from_raw(raw: RawRefundPolicy) -> Self {
        Self::new(
            raw.tiers
                .into_iter()
                .map(|t| RefundTier {
                    min_notice_hours: t.min_notice_hours,
                    percent: t.percent.min(100) as u8,
                })
                .collect(),
        )
    }

    pub fn tiers(&self) -> &[RefundTier] {
        &self.tiers
    }

    /// Percentage refunded when cancelling `lesson_start` at `now`
    pub fn refund_percent(&self, lesson_start: DateTime<Utc>, now: DateTime<Utc>) -> u8 {
        let notice = lesson_start.signed_duration_since(now);
        self.tiers
            .iter()
            .find(|t| notice > chrono::Duration::hours(t.min_notice_hours as i64))
            .map(|t| t.percent)
            .unwrap_or(0)
    }

    /// Hours to give back for a cancelled lesson of `lesson_hours`
    pub fn refundable(
        &self,
        lesson_hours: Hours,
        lesson_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Hours {
        lesson_hours.scaled_percent(self.refund_percent(lesson_start, now))
    }
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self::new(vec![
            RefundTier {
                min_notice_hours: 24,
                percent: 100,
            },
            RefundTier {
                min_notice_hours: 2,
                percent: 50,
            },
        ])
    }
}

// Conversion helpers

fn convert_template(raw: RawTemplate) -> PackageTemplate {
    let mut subjects = raw.subjects;
    if let Some(subject) = raw.subject
        && !subjects.iter().any(|s| s.eq_ignore_ascii_case(&subject))
    {
        subjects.insert(0, subject);
    }

    PackageTemplate {
        id: TemplateId::new(raw.id),
        name: raw.name,
        description: raw.description,
        subjects,
        total_hours: HourAllotment::from(raw.total_hours.and_then(Hours::from_hours_f64)),
        price_cents: raw.price_cents,
        validity_days: raw.validity_days,
        tutor_id: raw.tutor.map(TutorId::new),
        is_active: raw.active,
    }
}

fn convert_warning(raw: RawExpiryWarning) -> ExpiryThreshold {
    ExpiryThreshold {
        days_before: raw.days_before,
        severity: parse_severity(&raw.severity).unwrap_or(WarningSeverity::Warn),
        message_template: raw.message,
    }
}

fn default_expiry_warnings() -> Vec<ExpiryThreshold> {
    vec![
        ExpiryThreshold {
            days_before: 7,
            severity: WarningSeverity::Info,
            message_template: Some("Package expires in {days} days".into()),
        },
        ExpiryThreshold {
            days_before: 3,
            severity: WarningSeverity::Warn,
            message_template: Some("Package expires in {days} days".into()),
        },
        ExpiryThreshold {
            days_before: 1,
            severity: WarningSeverity::Critical,
            message_template: Some("Package expires within a day".into()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_default_refund_tiers() {
        let policy = RefundPolicy::default();
        let now = at(8);

        // more than a day ahead
        let start = now + chrono::Duration::hours(30);
        assert_eq!(policy.refund_percent(start, now), 100);

        // between 2 and 24 hours
        let start = now + chrono::Duration::hours(5);
        assert_eq!(policy.refund_percent(start, now), 50);

        // exactly 24 hours is not "more than" 24
        let start = now + chrono::Duration::hours(24);
        assert_eq!(policy.refund_percent(start, now), 50);

        // under 2 hours
        let start = now + chrono::Duration::minutes(90);
        assert_eq!(policy.refund_percent(start, now), 0);
    }

    #[test]
    fn test_refundable_hours() {
        let policy = RefundPolicy::default();
        let now = at(8);
        let start = now + chrono::Duration::hours(5);

        assert_eq!(policy.refundable(Hours::whole(2), start, now), Hours::whole(1));
    }

    #[test]
    fn test_tiers_sorted_longest_notice_first() {
        let policy = RefundPolicy::new(vec![
            RefundTier { min_notice_hours: 2, percent: 50 },
            RefundTier { min_notice_hours: 48, percent: 100 },
            RefundTier { min_notice_hours: 24, percent: 75 },
        ]);
        let notice: Vec<u32> = policy.tiers().iter().map(|t| t.min_notice_hours).collect();
        assert_eq!(notice, vec![48, 24, 2]);
    }

    #[test]
    fn test_subject_shorthand_merges() {
        let template = convert_template(RawTemplate {
            id: "combo".into(),
            name: "Combo".into(),
            description: None,
            subject: Some("math".into()),
            subjects: vec!["physics".into()],
            total_hours: None,
            price_cents: 0,
            validity_days: None,
            tutor: None,
            active: true,
        });

        assert_eq!(template.subjects, vec!["math".to_string(), "physics".to_string()]);
        assert_eq!(template.total_hours, HourAllotment::Unspecified);
    }
}
