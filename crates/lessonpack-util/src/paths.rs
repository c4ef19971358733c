//! Default paths for lessonpack components
//!
//! Paths are user-writable by default:
//! - Config: `$XDG_CONFIG_HOME/lessonpack/config.toml` or `~/.config/lessonpack/config.toml`
//! - Data: `$XDG_DATA_HOME/lessonpack` or `~/.local/share/lessonpack`

use std::path::PathBuf;

/// Application subdirectory name
const APP_DIR: &str = "lessonpack";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "lessonpack.db";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/lessonpack/config.toml` (if XDG_CONFIG_HOME is set)
/// 2. `~/.config/lessonpack/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$XDG_DATA_HOME/lessonpack` (if XDG_DATA_HOME is set)
/// 2. `~/.local/share/lessonpack` (fallback)
///
/// The `LESSONPACK_DATA_DIR` override is applied by the CLI.
pub fn default_data_dir() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_points_at_toml() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("lessonpack"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn data_dir_contains_lessonpack() {
        let path = default_data_dir();
        assert!(path.to_string_lossy().contains("lessonpack"));
    }
}
