//! Retry configuration and layered resolution.
//!
//! Settings are resolved with this precedence, highest first:
//!
//! 1. per-call override
//! 2. client configuration
//! 3. environment (`AWS_RETRY_MODE`, `AWS_MAX_ATTEMPTS`)
//! 4. config file keys (`retry_mode`, `max_attempts`) in the selected profile
//! 5. built-in defaults (`legacy`, with that mode's default attempts)
//!
//! The config file is the shared AWS config file named by `AWS_CONFIG_FILE`
//! (INI, `[default]` and `[profile name]` sections), or a TOML file named by
//! `TIDELINE_CONFIG_FILE`, which takes its place when set.
//!
//! # Examples
//!
//! ```rust
//! use tideline::config::{ConfigResolver, EnvSource, RetrySettings};
//! use tideline::RetryMode;
//!
//! let env = EnvSource::from_pairs([("AWS_RETRY_MODE", "standard"), ("AWS_MAX_ATTEMPTS", "7")]);
//! let config = ConfigResolver::new()
//!     .with_env(env)
//!     .with_client(RetrySettings::new().with_max_attempts(4))
//!     .resolve()
//!     .unwrap();
//!
//! assert_eq!(config.mode(), RetryMode::Standard);
//! assert_eq!(config.max_attempts(), 4);
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{JitterStrategy, QuotaConfig, RetryMode};

/// Environment variable selecting the retry mode.
pub const ENV_RETRY_MODE: &str = "AWS_RETRY_MODE";
/// Environment variable setting max attempts.
pub const ENV_MAX_ATTEMPTS: &str = "AWS_MAX_ATTEMPTS";
/// Environment variable pointing at the shared AWS config file (INI).
pub const ENV_CONFIG_FILE: &str = "AWS_CONFIG_FILE";
/// Environment variable pointing at a TOML retry config file. Takes the
/// place of `AWS_CONFIG_FILE` when set.
pub const ENV_TOML_CONFIG_FILE: &str = "TIDELINE_CONFIG_FILE";
/// Environment variable selecting the config file profile.
pub const ENV_PROFILE: &str = "AWS_PROFILE";

const DEFAULT_PROFILE: &str = "default";

/// Invalid retry configuration. Raised when a client is built, never
/// during a call.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The retry mode string is not one of the known modes.
    #[error("unknown retry mode `{0}`, expected one of: legacy, standard, adaptive")]
    UnknownRetryMode(String),
    /// `max_attempts` is not an integer of at least 1.
    #[error("invalid max_attempts `{0}`, expected an integer >= 1")]
    InvalidMaxAttempts(String),
    /// The config file could not be read.
    #[error("failed to read config file {}", .path.display())]
    ConfigFile {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML config file is malformed.
    #[error("failed to parse config file {}", .path.display())]
    ConfigParse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// The INI config file is malformed.
    #[error("failed to parse config file {}", .path.display())]
    IniParse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: ini::ParseError,
    },
}

/// A fully resolved retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    mode: RetryMode,
    max_attempts: u32,
    jitter: JitterStrategy,
    quota: QuotaConfig,
}

impl RetryConfig {
    /// Configuration for `mode` with the mode's default max attempts.
    pub fn for_mode(mode: RetryMode) -> Self {
        Self {
            mode,
            max_attempts: mode.profile().default_max_attempts,
            jitter: JitterStrategy::default(),
            quota: QuotaConfig::default(),
        }
    }

    /// Configuration with an explicit attempt ceiling.
    ///
    /// `max_attempts` counts the initial attempt and must be at least 1.
    pub fn new(mode: RetryMode, max_attempts: u32) -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: validate_max_attempts(max_attempts)?,
            ..Self::for_mode(mode)
        })
    }

    /// Replace the jitter strategy.
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retry quota cost table.
    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    /// Selected mode.
    pub fn mode(&self) -> RetryMode {
        self.mode
    }

    /// Attempt ceiling, initial attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Jitter strategy.
    pub fn jitter(&self) -> JitterStrategy {
        self.jitter
    }

    /// Retry quota cost table.
    pub fn quota(&self) -> &QuotaConfig {
        &self.quota
    }

    /// Apply a per-call override on top of this configuration.
    ///
    /// Overriding only the mode keeps this configuration's max attempts.
    pub fn overridden_by(&self, settings: &RetrySettings) -> Result<Self, ConfigError> {
        let mut config = self.clone();
        if let Some(mode) = settings.mode {
            config.mode = mode;
        }
        if let Some(n) = settings.max_attempts {
            config.max_attempts = validate_max_attempts(n)?;
        }
        Ok(config)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_mode(RetryMode::default())
    }
}

/// Partially specified settings for one configuration layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retry mode, if this layer sets it.
    pub mode: Option<RetryMode>,
    /// Max attempts, if this layer sets it.
    pub max_attempts: Option<u32>,
}

impl RetrySettings {
    /// Settings that set nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mode.
    pub fn with_mode(mut self, mode: RetryMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set max attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Where environment variables come from.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The process environment.
    #[default]
    Process,
    /// A fixed map, for tests and embedding.
    Map(HashMap<String, String>),
}

impl EnvSource {
    /// A fixed environment built from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvSource::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a variable. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            EnvSource::Process => std::env::var(key).ok(),
            EnvSource::Map(map) => map.get(key).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Retry keys from one config file profile, unparsed.
///
/// Values are validated when a resolution reaches the file layer, so a bad
/// key is only an error if nothing above it sets the same setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileProfile {
    /// `retry_mode` key.
    pub retry_mode: Option<String>,
    /// `max_attempts` key.
    pub max_attempts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TomlProfile {
    retry_mode: Option<String>,
    max_attempts: Option<i64>,
}

/// A parsed config file: retry keys per profile.
///
/// The shared AWS config file is INI:
///
/// ```ini
/// [default]
/// region = us-east-1
/// retry_mode = standard
/// max_attempts = 4
///
/// [profile batch]
/// retry_mode = adaptive
/// ```
///
/// The TOML form has one table per profile:
///
/// ```toml
/// [default]
/// retry_mode = "standard"
/// max_attempts = 4
///
/// [batch]
/// retry_mode = "adaptive"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    profiles: HashMap<String, FileProfile>,
}

impl ConfigFile {
    /// Read and parse the INI config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        Self::from_ini_str(&read(path)?).map_err(|source| ConfigError::IniParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse the TOML config file at `path`.
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        Self::from_toml_str(&read(path)?).map_err(|source| ConfigError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse AWS config file content.
    ///
    /// `[default]` and `[profile name]` sections become profiles; other
    /// sections are ignored. `[profile default]` wins over `[default]`.
    pub fn from_ini_str(data: &str) -> Result<Self, ini::ParseError> {
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(data, options)?;

        let mut profiles: HashMap<String, FileProfile> = HashMap::new();
        let mut prefixed: HashSet<String> = HashSet::new();
        for (section, props) in ini.iter() {
            let Some((name, is_prefixed)) = section.and_then(ini_profile_name) else {
                continue;
            };
            if !is_prefixed && prefixed.contains(name) {
                continue;
            }
            if is_prefixed && prefixed.insert(name.to_string()) {
                profiles.remove(name);
            }

            let profile = profiles.entry(name.to_string()).or_default();
            if let Some(mode) = props.get("retry_mode") {
                profile.retry_mode = Some(mode.to_string());
            }
            if let Some(n) = props.get("max_attempts") {
                profile.max_attempts = Some(n.to_string());
            }
        }
        Ok(Self { profiles })
    }

    /// Parse TOML content.
    pub fn from_toml_str(data: &str) -> Result<Self, toml::de::Error> {
        let tables: HashMap<String, TomlProfile> = toml::from_str(data)?;
        let profiles = tables
            .into_iter()
            .map(|(name, table)| {
                let profile = FileProfile {
                    retry_mode: table.retry_mode,
                    max_attempts: table.max_attempts.map(|n| n.to_string()),
                };
                (name, profile)
            })
            .collect();
        Ok(Self { profiles })
    }

    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Option<&FileProfile> {
        self.profiles.get(name)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Profile name for an INI section header, and whether it used the
/// `profile ` prefix.
fn ini_profile_name(section: &str) -> Option<(&str, bool)> {
    let section = section.trim();
    if section == DEFAULT_PROFILE {
        return Some((DEFAULT_PROFILE, false));
    }
    let (kind, name) = section.split_once(char::is_whitespace)?;
    let name = name.trim();
    (kind == "profile" && !name.is_empty()).then_some((name, true))
}

/// Resolves a [`RetryConfig`] from layered sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    client: RetrySettings,
    env: EnvSource,
    file: Option<ConfigFile>,
    profile: Option<String>,
}

impl ConfigResolver {
    /// Resolver reading the process environment, with no client settings
    /// and no config file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client configuration layer.
    pub fn with_client(mut self, settings: RetrySettings) -> Self {
        self.client = settings;
        self
    }

    /// Set the environment layer.
    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    /// Set the config file layer.
    pub fn with_config_file(mut self, file: ConfigFile) -> Self {
        self.file = Some(file);
        self
    }

    /// Select a config file profile, overriding `AWS_PROFILE`.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Load the config file named by `TIDELINE_CONFIG_FILE` (TOML) or,
    /// failing that, `AWS_CONFIG_FILE` (INI). Neither set means no file.
    pub fn load_config_file(mut self) -> Result<Self, ConfigError> {
        if let Some(path) = self.env.get(ENV_TOML_CONFIG_FILE) {
            tracing::debug!(path = %path, "loading TOML retry config file");
            self.file = Some(ConfigFile::load_toml(path)?);
        } else if let Some(path) = self.env.get(ENV_CONFIG_FILE) {
            tracing::debug!(path = %path, "loading AWS config file");
            self.file = Some(ConfigFile::load(path)?);
        }
        Ok(self)
    }

    /// Resolve client-level configuration.
    pub fn resolve(&self) -> Result<RetryConfig, ConfigError> {
        self.resolve_with(&RetrySettings::default())
    }

    /// Resolve with a per-call override on top.
    pub fn resolve_with(&self, call: &RetrySettings) -> Result<RetryConfig, ConfigError> {
        let profile = self.file_profile();

        let mode = match call.mode.or(self.client.mode) {
            Some(mode) => mode,
            None => match self.env.get(ENV_RETRY_MODE) {
                Some(raw) => raw.parse()?,
                None => match profile.and_then(|p| p.retry_mode.as_deref()) {
                    Some(raw) => raw.parse()?,
                    None => RetryMode::default(),
                },
            },
        };

        let max_attempts = match call.max_attempts.or(self.client.max_attempts) {
            Some(n) => validate_max_attempts(n)?,
            None => match self.env.get(ENV_MAX_ATTEMPTS) {
                Some(raw) => parse_max_attempts(&raw)?,
                None => match profile.and_then(|p| p.max_attempts.as_deref()) {
                    Some(raw) => parse_max_attempts(raw)?,
                    None => mode.profile().default_max_attempts,
                },
            },
        };

        tracing::debug!(%mode, max_attempts, "resolved retry configuration");
        RetryConfig::new(mode, max_attempts)
    }

    fn file_profile(&self) -> Option<&FileProfile> {
        let file = self.file.as_ref()?;
        let name = self
            .profile
            .clone()
            .or_else(|| self.env.get(ENV_PROFILE))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        file.profile(&name)
    }
}

fn validate_max_attempts(n: u32) -> Result<u32, ConfigError> {
    if n == 0 {
        Err(ConfigError::InvalidMaxAttempts(n.to_string()))
    } else {
        Ok(n)
    }
}

fn parse_max_attempts(raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidMaxAttempts(raw.to_string()))
        .and_then(validate_max_attempts)
}
