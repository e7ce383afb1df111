use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the project-level override file looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".devplat";

/// Status of config file loading
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    Error(String),
}

/// Platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            token_env: "DEVPLAT_API_TOKEN".to_string(),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Attempts at getting parseable JSON out of the model before giving up.
    pub max_json_attempts: u32,
    pub temperature: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_json_attempts: 5,
            temperature: 0.0,
        }
    }
}

/// Status polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    /// Interval used when the platform sends no `Retry-After`.
    pub default_interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            default_interval_secs: 5,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Prefix for links to repositories created by a fulfillment.
    pub repo_url_base: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            repo_url_base: "https://github.com".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialApiConfig {
    pub base_url: Option<String>,
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialAgentConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub max_json_attempts: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialPollingConfig {
    pub max_attempts: Option<u32>,
    pub default_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialNotificationsConfig {
    pub repo_url_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialLoggingConfig {
    pub level: Option<String>,
}

/// Project-specific configuration where every field is optional.
/// Parsed from `.devplat` files. Fields that are `None` inherit from the global config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialConfig {
    pub api: PartialApiConfig,
    pub agent: PartialAgentConfig,
    pub polling: PartialPollingConfig,
    pub notifications: PartialNotificationsConfig,
    pub logging: PartialLoggingConfig,
}

/// Merge a global config with a project-level partial config.
/// Project values override global values where present.
pub fn merge_config(global: &Config, project: &PartialConfig) -> Config {
    let pick = |value: &Option<String>, fallback: &String| {
        value.clone().unwrap_or_else(|| fallback.clone())
    };
    Config {
        api: ApiConfig {
            base_url: pick(&project.api.base_url, &global.api.base_url),
            token_env: pick(&project.api.token_env, &global.api.token_env),
        },
        agent: AgentConfig {
            base_url: pick(&project.agent.base_url, &global.agent.base_url),
            model: pick(&project.agent.model, &global.agent.model),
            api_key_env: pick(&project.agent.api_key_env, &global.agent.api_key_env),
            max_json_attempts: project
                .agent
                .max_json_attempts
                .unwrap_or(global.agent.max_json_attempts),
            temperature: project
                .agent
                .temperature
                .unwrap_or(global.agent.temperature),
        },
        polling: PollingConfig {
            max_attempts: project
                .polling
                .max_attempts
                .unwrap_or(global.polling.max_attempts),
            default_interval_secs: project
                .polling
                .default_interval_secs
                .unwrap_or(global.polling.default_interval_secs),
        },
        notifications: NotificationsConfig {
            repo_url_base: pick(
                &project.notifications.repo_url_base,
                &global.notifications.repo_url_base,
            ),
        },
        logging: LoggingConfig {
            level: pick(&project.logging.level, &global.logging.level),
        },
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    pub status: ConfigLoadStatus,
}

/// Get the platform-appropriate config directory
fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "devplat", "devplat-chat")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.devplat in current working directory).
pub fn get_project_config_path() -> Option<PathBuf> {
    let path = env::current_dir().ok()?.join(PROJECT_CONFIG_FILE);
    if path.exists() { Some(path) } else { None }
}

/// Why a config file could not be used. Loading carries on with defaults.
#[derive(Debug, Error)]
enum ConfigFileError {
    #[error("permission denied reading {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("could not read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("malformed TOML in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("could not write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("could not encode the default config: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Read and parse a TOML file. A missing file is `Ok(None)`.
fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigFileError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(ConfigFileError::PermissionDenied(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigFileError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Load configuration from file, environment, and defaults.
///
/// `config_override` replaces the platform config path (`--config`).
pub fn load_config(config_override: Option<&Path>) -> LoadedConfig {
    let config_path = match config_override
        .map(Path::to_path_buf)
        .or_else(get_config_path)
    {
        Some(path) => path,
        None => {
            warn!("Could not determine config directory, using defaults");
            return LoadedConfig {
                config: apply_env_overrides(Config::default()),
                config_path: PathBuf::from("config.toml"),
                project_config_path: None,
                status: ConfigLoadStatus::Error("Could not determine config directory".to_string()),
            };
        }
    };

    debug!("Config path: {:?}", config_path);

    let (mut config, status) = load_or_create_config(&config_path);

    let project_config_path = get_project_config_path();
    if let Some(project_path) = &project_config_path {
        match read_toml::<PartialConfig>(project_path) {
            Ok(Some(partial)) => {
                config = merge_config(&config, &partial);
                info!(path = ?project_path, "project_config_loaded");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "project_config_ignored"),
        }
    }

    let config = apply_env_overrides(config);

    LoadedConfig {
        config,
        config_path,
        project_config_path,
        status,
    }
}

/// Read the global config, writing the defaults on first run.
fn load_or_create_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let result = match read_toml::<Config>(config_path) {
        Ok(Some(config)) => Ok((config, ConfigLoadStatus::Loaded)),
        Ok(None) => write_default_config(config_path).map(|c| (c, ConfigLoadStatus::Created)),
        Err(e) => Err(e),
    };
    match result {
        Ok((config, status)) => {
            info!(path = ?config_path, status = ?status, "global_config_ready");
            (config, status)
        }
        Err(e) => {
            warn!(error = %e, "global_config_unusable_using_defaults");
            (Config::default(), ConfigLoadStatus::Error(e.to_string()))
        }
    }
}

fn write_default_config(config_path: &Path) -> Result<Config, ConfigFileError> {
    let config = Config::default();
    let contents = toml::to_string_pretty(&config)?;
    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ConfigFileError::Write { path, source }
    };
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(write_error(parent))?;
    }
    fs::write(config_path, contents).map_err(write_error(config_path))?;
    Ok(config)
}

/// Apply environment variable overrides to config
fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |key| env::var(key).ok())
}

fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(url) = lookup("DEVPLAT_API_BASE_URL") {
        debug!("Overriding api.base_url from DEVPLAT_API_BASE_URL");
        config.api.base_url = url;
    }

    if let Some(url) = lookup("DEVPLAT_AGENT_BASE_URL") {
        debug!("Overriding agent.base_url from DEVPLAT_AGENT_BASE_URL");
        config.agent.base_url = url;
    }

    if let Some(model) = lookup("DEVPLAT_AGENT_MODEL") {
        debug!("Overriding agent.model from DEVPLAT_AGENT_MODEL");
        config.agent.model = model;
    }

    if let Some(level) = lookup("DEVPLAT_LOG") {
        debug!("Overriding logging.level from DEVPLAT_LOG");
        config.logging.level = level;
    }

    config
}
