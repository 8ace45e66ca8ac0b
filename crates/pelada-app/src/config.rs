// Configuration loading and parsing (club.toml).

use chrono::TimeDelta;
use pelada_core::draw::DrawSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// club.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire club.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ClubFile {
    club: ClubSection,
    draw: DrawConfig,
    database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ClubSection {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrawConfig {
    /// Roster size for games that do not set their own.
    pub default_max_players: usize,
    pub trading_window_minutes: i64,
    /// Fixed RNG seed. Leave unset outside of tests and demos.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub club_name: String,
    pub draw: DrawConfig,
    pub db_path: String,
}

impl Config {
    pub fn draw_settings(&self) -> DrawSettings {
        DrawSettings {
            default_capacity: self.draw.default_max_players,
            trading_window: TimeDelta::minutes(self.draw.trading_window_minutes),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/club.toml` relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let club_path = base_dir.join("config").join("club.toml");
    let text = read_file(&club_path)?;
    let file: ClubFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: club_path.clone(),
        source: e,
    })?;

    let config = Config {
        club_name: file.club.name,
        draw: file.draw,
        db_path: file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy any file in `defaults/` that is missing from `config/`.
/// Returns the files that were copied. `.example` files are skipped.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ConfigError::DefaultsCopyError {
                message: format!("failed to read defaults entry: {e}"),
            })?
            .path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.club_name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "club.name".into(),
            message: "must not be empty".into(),
        });
    }

    if config.draw.default_max_players == 0 {
        return Err(ConfigError::ValidationError {
            field: "draw.default_max_players".into(),
            message: "must be greater than 0".into(),
        });
    }

    let window = config.draw.trading_window_minutes;
    if !(1..=1440).contains(&window) {
        return Err(ConfigError::ValidationError {
            field: "draw.trading_window_minutes".into(),
            message: format!("must be between 1 and 1440 inclusive, got {window}"),
        });
    }

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
