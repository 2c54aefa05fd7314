//! Layered configuration for Canvas credentials and course selection
//!
//! Values are resolved in priority order:
//! 1. Command-line arguments
//! 2. Environment variables (`CANVAS_URL`, `CANVAS_TOKEN`, `COURSE_ID`, `CONFIG_FILE`)
//! 3. A `[default]` table in the config file
//! 4. Built-in defaults
//!
//! A missing config file is not an error; a present but malformed one is.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Config file looked up in the working directory when none is specified
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Subdirectory of the user config dir searched as a fallback
const CONFIG_DIR_NAME: &str = "canvas-nbgrader";

/// Errors raised while assembling or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("canvas_url not defined")]
    MissingUrl,
    #[error("canvas_token not defined")]
    MissingToken,
    #[error("invalid course id '{0}'")]
    InvalidCourseId(String),
    #[error("failed to read config file {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings taken from the command line, overriding every other source
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub canvas_url: Option<String>,
    pub canvas_token: Option<String>,
    pub course_id: Option<u64>,
    pub config_file: Option<PathBuf>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub canvas_url: Option<String>,
    pub canvas_token: Option<String>,
    pub course_id: Option<u64>,
}

/// On-disk config file structure
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    default: FileSection,
}

#[derive(Debug, Default, Deserialize)]
struct FileSection {
    canvas_url: Option<String>,
    canvas_token: Option<String>,
    course_id: Option<u64>,
}

/// Settings read from the process environment
#[derive(Debug, Default)]
struct EnvSection {
    canvas_url: Option<String>,
    canvas_token: Option<String>,
    course_id: Option<u64>,
    config_file: Option<PathBuf>,
}

impl EnvSection {
    /// Collects the recognized keys from an environment snapshot.
    /// Key matching is case-insensitive, so both `CANVAS_URL` and
    /// `canvas_url` work.
    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let mut section = Self::default();
        for (key, value) in vars {
            match key.to_lowercase().as_str() {
                "canvas_url" => section.canvas_url = Some(value),
                "canvas_token" => section.canvas_token = Some(value),
                "course_id" => {
                    let id = value
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidCourseId(value))?;
                    section.course_id = Some(id);
                }
                "config_file" => section.config_file = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(section)
    }
}

impl Config {
    /// Resolves configuration from the process environment and the config file.
    pub fn resolve(overrides: Overrides) -> Result<Self, ConfigError> {
        Self::resolve_with_env(overrides, std::env::vars())
    }

    /// Resolves configuration against an explicit environment snapshot.
    pub fn resolve_with_env(
        overrides: Overrides,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let env = EnvSection::from_vars(vars)?;

        let explicit_file = overrides.config_file.clone().or(env.config_file.clone());
        let file = match locate_config_file(explicit_file.as_deref()) {
            Some(path) => load_config_file(&path)?,
            None => FileSection::default(),
        };

        Ok(Config {
            canvas_url: overrides.canvas_url.or(env.canvas_url).or(file.canvas_url),
            canvas_token: overrides
                .canvas_token
                .or(env.canvas_token)
                .or(file.canvas_token),
            course_id: overrides.course_id.or(env.course_id).or(file.course_id),
        })
    }

    /// Returns the URL and token required to open a connection, or the
    /// specific error for whichever is missing.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let url = self.canvas_url.as_deref().ok_or(ConfigError::MissingUrl)?;
        let token = self
            .canvas_token
            .as_deref()
            .ok_or(ConfigError::MissingToken)?;
        Ok((url, token))
    }
}

/// Picks the config file to read: an explicit path, then `./config.toml`,
/// then the user config directory.
fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    let fallback = dirs::config_dir()?.join(CONFIG_DIR_NAME).join(DEFAULT_CONFIG_FILE);
    fallback.exists().then_some(fallback)
}

/// Reads and parses a config file. A file that does not exist yields the
/// empty section; any other failure is reported.
fn load_config_file(path: &Path) -> Result<FileSection, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(FileSection::default());
        }
        Err(e) => {
            return Err(ConfigError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let parsed: ConfigFile = toml::from_str(&content).map_err(|e| ConfigError::Malformed {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parsed.default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn env_vars_fill_in_connection_values() {
        let config = Config::resolve_with_env(
            Overrides::default(),
            env(&[("CANVAS_URL", "foo"), ("CANVAS_TOKEN", "bar")]),
        )
        .unwrap();

        assert_eq!(config.canvas_url.as_deref(), Some("foo"));
        assert_eq!(config.canvas_token.as_deref(), Some("bar"));
        assert_eq!(config.course_id, None);
    }

    #[test]
    fn config_file_fills_in_connection_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[default]\ncanvas_url = \"foo\"\ncanvas_token = \"bar\"\ncourse_id = 123\n",
        );

        let overrides = Overrides {
            config_file: Some(path),
            ..Overrides::default()
        };
        let config = Config::resolve_with_env(overrides, env(&[])).unwrap();

        assert_eq!(config.canvas_url.as_deref(), Some("foo"));
        assert_eq!(config.canvas_token.as_deref(), Some("bar"));
        assert_eq!(config.course_id, Some(123));
    }

    #[test]
    fn environment_beats_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[default]\ncanvas_url = \"from-file\"\n");

        let overrides = Overrides {
            config_file: Some(path),
            ..Overrides::default()
        };
        let config =
            Config::resolve_with_env(overrides, env(&[("CANVAS_URL", "from-env")])).unwrap();

        assert_eq!(config.canvas_url.as_deref(), Some("from-env"));
    }

    #[test]
    fn arguments_beat_environment() {
        let overrides = Overrides {
            course_id: Some(329),
            ..Overrides::default()
        };
        let config = Config::resolve_with_env(overrides, env(&[("COURSE_ID", "999")])).unwrap();

        assert_eq!(config.course_id, Some(329));
    }

    #[test]
    fn config_file_location_can_come_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[default]\ncanvas_token = \"bar\"\n");

        let config = Config::resolve_with_env(
            Overrides::default(),
            env(&[("CONFIG_FILE", path.to_str().unwrap())]),
        )
        .unwrap();

        assert_eq!(config.canvas_token.as_deref(), Some("bar"));
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let overrides = Overrides {
            config_file: Some(PathBuf::from("/nonexistent/config.toml")),
            ..Overrides::default()
        };
        let config = Config::resolve_with_env(overrides, env(&[])).unwrap();

        assert_eq!(config.canvas_url, None);
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[default\nnot toml");

        let overrides = Overrides {
            config_file: Some(path),
            ..Overrides::default()
        };
        let err = Config::resolve_with_env(overrides, env(&[])).unwrap_err();

        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn unparsable_course_id_is_an_error() {
        let err =
            Config::resolve_with_env(Overrides::default(), env(&[("COURSE_ID", "abc")]))
                .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidCourseId(_)));
    }

    #[test]
    fn credentials_report_which_value_is_missing() {
        let config = Config::default();
        assert!(matches!(config.credentials(), Err(ConfigError::MissingUrl)));

        let config = Config {
            canvas_url: Some("foo".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            config.credentials(),
            Err(ConfigError::MissingToken)
        ));

        let config = Config {
            canvas_url: Some("foo".to_string()),
            canvas_token: Some("bar".to_string()),
            ..Config::default()
        };
        assert_eq!(config.credentials().unwrap(), ("foo", "bar"));
    }
}
