//! Config validation CLI tool
//!
//! Validates a lessonpack configuration file and reports any errors.

use lessonpack_api::HourAllotment;
use lessonpack_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a lessonpack configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match lessonpack_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", lessonpack_config::CURRENT_CONFIG_VERSION);
            println!("  Templates: {}", policy.templates.len());
            println!("  Students: {}", policy.students.len());
            println!("  Tutors: {}", policy.tutors.len());
            println!(
                "  Default validity: {} days",
                policy.engine.default_validity_days
            );

            if !policy.templates.is_empty() {
                println!();
                println!("Templates:");
                for template in &policy.templates {
                    let hours = match template.total_hours {
                        HourAllotment::Specified(h) => h.to_string(),
                        HourAllotment::Unspecified => "set at assignment".to_string(),
                    };
                    let state = if template.is_active { "" } else { " (inactive)" };
                    println!(
                        "  - {} [{}; {}]: {}{}",
                        template.id,
                        template.subjects.join(", "),
                        hours,
                        template.name,
                        state
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                lessonpack_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                lessonpack_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                lessonpack_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                lessonpack_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        lessonpack_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
