//! Configuration validation

use crate::policy::MAX_VALIDITY_DAYS;
use crate::schema::{RawConfig, RawExpiryWarning, RawTemplate, RawUser};
use lessonpack_api::{Hours, WarningSeverity};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Template '{template_id}': {message}")]
    TemplateError { template_id: String, message: String },

    #[error("Duplicate template ID: {0}")]
    DuplicateTemplateId(String),

    #[error("Duplicate {role} ID: {id}")]
    DuplicateUserId { role: &'static str, id: String },

    #[error("Invalid severity '{0}' (expected info, warn or critical)")]
    InvalidSeverity(String),

    #[error("Refund tier {index}: {message}")]
    InvalidRefundTier { index: usize, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen_templates = HashSet::new();
    for template in &config.templates {
        if !seen_templates.insert(&template.id) {
            errors.push(ValidationError::DuplicateTemplateId(template.id.clone()));
        }
    }

    errors.extend(validate_users(&config.students, "student"));
    errors.extend(validate_users(&config.tutors, "tutor"));

    let tutor_ids: HashSet<&str> = config.tutors.iter().map(|t| t.id.as_str()).collect();
    for template in &config.templates {
        errors.extend(validate_template(template, &tutor_ids));
    }

    if let Some(days) = config.engine.default_validity_days
        && let Err(message) = check_validity_days("default_validity_days", days)
    {
        errors.push(ValidationError::GlobalError(message));
    }

    if let Some(warnings) = &config.engine.expiry_warnings {
        for warning in warnings {
            errors.extend(validate_expiry_warning(warning));
        }
    }

    if let Some(refund) = &config.refund {
        let mut seen_notice = HashSet::new();
        for (index, tier) in refund.tiers.iter().enumerate() {
            if tier.percent > 100 {
                errors.push(ValidationError::InvalidRefundTier {
                    index,
                    message: format!("percent {} exceeds 100", tier.percent),
                });
            }
            if !seen_notice.insert(tier.min_notice_hours) {
                errors.push(ValidationError::InvalidRefundTier {
                    index,
                    message: format!(
                        "duplicate min_notice_hours {}",
                        tier.min_notice_hours
                    ),
                });
            }
        }
    }

    errors
}

fn validate_users(users: &[RawUser], role: &'static str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for user in users {
        if user.id.trim().is_empty() {
            errors.push(ValidationError::GlobalError(format!("{} with empty id", role)));
        } else if !seen.insert(&user.id) {
            errors.push(ValidationError::DuplicateUserId {
                role,
                id: user.id.clone(),
            });
        }
    }

    errors
}

fn validate_template(template: &RawTemplate, tutor_ids: &HashSet<&str>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut fail = |message: String| {
        errors.push(ValidationError::TemplateError {
            template_id: template.id.clone(),
            message,
        })
    };

    if template.id.trim().is_empty() {
        fail("id cannot be empty".into());
    }

    if template.subject.is_none() && template.subjects.is_empty() {
        fail("at least one subject is required".into());
    }

    if let Some(hours) = template.total_hours {
        match Hours::from_hours_f64(hours) {
            Some(h) if !h.is_zero() => {}
            _ => fail(format!("total_hours must be positive, got {}", hours)),
        }
    }

    if let Some(days) = template.validity_days
        && let Err(message) = check_validity_days("validity_days", days)
    {
        fail(message);
    }

    if let Some(tutor) = &template.tutor
        && !tutor_ids.contains(tutor.as_str())
    {
        fail(format!("unknown tutor '{}'", tutor));
    }

    errors
}

fn check_validity_days(field: &str, days: u32) -> Result<(), String> {
    if days == 0 {
        return Err(format!("{} must be at least 1", field));
    }
    if days > MAX_VALIDITY_DAYS {
        return Err(format!(
            "{} must be at most {}, got {}",
            field, MAX_VALIDITY_DAYS, days
        ));
    }
    Ok(())
}

fn validate_expiry_warning(warning: &RawExpiryWarning) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if parse_severity(&warning.severity).is_err() {
        errors.push(ValidationError::InvalidSeverity(warning.severity.clone()));
    }
    errors
}

/// Parse a severity name
pub fn parse_severity(s: &str) -> Result<WarningSeverity, String> {
    match s.to_lowercase().as_str() {
        "info" => Ok(WarningSeverity::Info),
        "warn" | "warning" => Ok(WarningSeverity::Warn),
        "critical" => Ok(WarningSeverity::Critical),
        other => Err(format!("Unknown severity: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str) -> RawTemplate {
        RawTemplate {
            id: id.into(),
            name: "Template".into(),
            description: None,
            subject: Some("math".into()),
            subjects: vec![],
            total_hours: Some(10.0),
            price_cents: 0,
            validity_days: None,
            tutor: None,
            active: true,
        }
    }

    fn config_with(templates: Vec<RawTemplate>) -> RawConfig {
        RawConfig {
            config_version: 1,
            engine: Default::default(),
            refund: None,
            templates,
            students: vec![],
            tutors: vec![],
        }
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity("info").unwrap(), WarningSeverity::Info);
        assert_eq!(parse_severity("WARN").unwrap(), WarningSeverity::Warn);
        assert_eq!(parse_severity("critical").unwrap(), WarningSeverity::Critical);
        assert!(parse_severity("loud").is_err());
    }

    #[test]
    fn test_duplicate_template_detection() {
        let config = config_with(vec![template("pkg"), template("pkg")]);
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateTemplateId(_))));
    }

    #[test]
    fn test_zero_hours_rejected() {
        let mut t = template("empty");
        t.total_hours = Some(0.0);
        let errors = validate_config(&config_with(vec![t]));
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ValidationError::TemplateError { template_id, .. } if template_id == "empty"));
    }

    #[test]
    fn test_unspecified_hours_allowed() {
        let mut t = template("on-request");
        t.total_hours = None;
        assert!(validate_config(&config_with(vec![t])).is_empty());
    }

    #[test]
    fn test_missing_subject_and_unknown_tutor() {
        let mut t = template("orphan");
        t.subject = None;
        t.tutor = Some("nobody".into());
        let errors = validate_config(&config_with(vec![t]));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validity_days_bounds() {
        let mut zero = template("zero");
        zero.validity_days = Some(0);
        let mut forever = template("forever");
        forever.validity_days = Some(100_000_000);
        let mut decade = template("decade");
        decade.validity_days = Some(3_650);

        let mut config = config_with(vec![zero, forever, decade]);
        config.engine.default_validity_days = Some(MAX_VALIDITY_DAYS + 1);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(matches!(&errors[0], ValidationError::TemplateError { template_id, .. } if template_id == "zero"));
        assert!(matches!(&errors[1], ValidationError::TemplateError { template_id, .. } if template_id == "forever"));
        assert!(matches!(&errors[2], ValidationError::GlobalError(_)));
    }

    #[test]
    fn test_duplicate_students() {
        let mut config = config_with(vec![]);
        config.students = vec![
            RawUser { id: "s1".into(), name: None },
            RawUser { id: "s1".into(), name: Some("Again".into()) },
        ];
        let errors = validate_config(&config);
        assert!(matches!(
            &errors[0],
            ValidationError::DuplicateUserId { role: "student", .. }
        ));
    }

    #[test]
    fn test_refund_percent_over_100() {
        let mut config = config_with(vec![]);
        config.refund = Some(crate::schema::RawRefundPolicy {
            tiers: vec![crate::schema::RawRefundTier {
                min_notice_hours: 24,
                percent: 120,
            }],
        });
        let errors = validate_config(&config);
        assert!(matches!(errors[0], ValidationError::InvalidRefundTier { index: 0, .. }));
    }
}
