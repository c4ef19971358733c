//! Configuration parsing and validation for lessonpack
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Package template catalog
//! - Student and tutor roster
//! - Engine settings (validity, expiry warnings, concurrency)
//! - Refund tiers for cancelled lessons
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let policy = parse_config(&content)?;

    tracing::debug!(
        path = %path.display(),
        templates = policy.templates.len(),
        students = policy.students.len(),
        tutors = policy.tutors.len(),
        "Config parsed"
    );

    Ok(policy)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use lessonpack_api::{HourAllotment, Hours};
    use std::io::Write;

    const SAMPLE: &str = r#"
        config_version = 1

        [engine]
        default_validity_days = 45

        [[templates]]
        id = "math-10h"
        name = "Matematica 10 ore"
        subject = "math"
        total_hours = 10
        price_cents = 25000
        tutor = "t-rossi"

        [[templates]]
        id = "custom"
        name = "Su misura"
        subjects = ["physics", "chemistry"]

        [[students]]
        id = "s-bianchi"

        [[tutors]]
        id = "t-rossi"
        name = "Mario Rossi"
    "#;

    #[test]
    fn parse_sample_config() {
        let policy = parse_config(SAMPLE).unwrap();
        assert_eq!(policy.templates.len(), 2);
        assert_eq!(policy.engine.default_validity_days, 45);
        assert!(!policy.engine.allow_concurrent_per_subject);
        assert_eq!(policy.engine.expiry_warnings.len(), 3);
        assert_eq!(policy.refund, RefundPolicy::default());

        let math = &policy.templates[0];
        assert_eq!(math.total_hours, HourAllotment::Specified(Hours::whole(10)));
        assert_eq!(math.tutor_id.as_ref().unwrap().as_str(), "t-rossi");
        assert!(math.is_active);

        assert_eq!(policy.templates[1].total_hours, HourAllotment::Unspecified);
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_template() {
        let config = r#"
            config_version = 1

            [[templates]]
            id = "broken"
            name = "Broken"
            subject = "math"
            total_hours = -3
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn reject_unbounded_validity() {
        let config = r#"
            config_version = 1

            [[templates]]
            id = "forever"
            name = "Forever"
            subject = "math"
            total_hours = 10
            validity_days = 100000000
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.students.len(), 1);
        assert_eq!(policy.tutors[0].name.as_deref(), Some("Mario Rossi"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
