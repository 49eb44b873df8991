use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Upper bound on whole-command retries after an optimistic-concurrency
    /// conflict before `ConcurrencyConflict` is surfaced.
    pub max_conflict_retries: u32,
    pub request_number_prefix: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://procura.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                max_conflict_retries: 5,
                request_number_prefix: "PR".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    max_conflict_retries: Option<u32>,
    request_number_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("procura.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(max_conflict_retries) = workflow.max_conflict_retries {
                self.workflow.max_conflict_retries = max_conflict_retries;
            }
            if let Some(request_number_prefix) = workflow.request_number_prefix {
                self.workflow.request_number_prefix = request_number_prefix;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PROCURA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PROCURA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PROCURA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PROCURA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PROCURA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROCURA_WORKFLOW_MAX_CONFLICT_RETRIES") {
            self.workflow.max_conflict_retries =
                parse_u32("PROCURA_WORKFLOW_MAX_CONFLICT_RETRIES", &value)?;
        }
        if let Some(value) = read_env("PROCURA_WORKFLOW_REQUEST_NUMBER_PREFIX") {
            self.workflow.request_number_prefix = value;
        }

        let log_level =
            read_env("PROCURA_LOGGING_LEVEL").or_else(|| read_env("PROCURA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROCURA_LOGGING_FORMAT").or_else(|| read_env("PROCURA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.workflow.max_conflict_retries == 0 {
            return Err(ConfigError::Validation(
                "workflow.max_conflict_retries must be at least 1".to_string(),
            ));
        }
        if self.workflow.request_number_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(
                "workflow.request_number_prefix must not be empty".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("logging.level must not be empty".to_string()));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("procura.toml"), PathBuf::from("config/procura.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{interpolate_env_vars, AppConfig, ConfigError, LogFormat};

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::default();
        config.validate().expect("default config must be valid");
        assert_eq!(config.workflow.max_conflict_retries, 5);
        assert_eq!(config.workflow.request_number_prefix, "PR");
    }

    #[test]
    fn toml_patch_overrides_selected_fields_only() {
        let patch = toml::from_str(
            r#"
            [database]
            url = "sqlite://custom.db"

            [workflow]
            max_conflict_retries = 8
            "#,
        )
        .expect("parse patch");

        let mut config = AppConfig::default();
        config.apply_patch(patch);

        assert_eq!(config.database.url, "sqlite://custom.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.workflow.max_conflict_retries, 8);
        assert_eq!(config.workflow.request_number_prefix, "PR");
    }

    #[test]
    fn zero_conflict_retries_fail_validation() {
        let mut config = AppConfig::default();
        config.workflow.max_conflict_retries = 0;

        let error = config.validate().expect_err("zero retries must be rejected");
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn log_format_parses_known_values() {
        assert_eq!("compact".parse::<LogFormat>().ok(), Some(LogFormat::Compact));
        assert_eq!(" Pretty ".parse::<LogFormat>().ok(), Some(LogFormat::Pretty));
        assert!("json".parse::<LogFormat>().is_err());
    }

    #[test]
    fn interpolation_rejects_unterminated_expressions() {
        let error = interpolate_env_vars("url = \"${PROCURA_UNTERMINATED")
            .expect_err("unterminated interpolation");
        assert!(matches!(error, ConfigError::UnterminatedInterpolation));
    }

    #[test]
    fn interpolation_leaves_plain_text_untouched() {
        let output = interpolate_env_vars("plain = \"value\"").expect("no interpolation");
        assert_eq!(output, "plain = \"value\"");
    }
}
