// Moderation configuration snapshot.
//
// Built once from environment variables (or any key lookup in tests) and
// never mutated afterwards. A config change means building a new snapshot
// and a new processor, see `supervisor.rs`.

use super::moderation_models::RemedialAction;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Hard cap on a single message's classification, retries included.
pub const MODERATION_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_BOT_USERNAME: &str = "content-moderator";
const DEFAULT_WARNING_MESSAGE: &str =
    "⚠️ This message was flagged by automated content moderation.";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid moderation threshold {0:?}: expected a number between 0 and 1")]
    InvalidThreshold(String),

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Unknown moderator type: {0}")]
    UnknownBackend(String),

    #[error("Backend configuration error: {0}")]
    Backend(String),

    #[error("Could not initialize bot user: {0}")]
    BotProvisioning(String),

    #[error("Failed to start post processor: {0}")]
    Startup(String),
}

// ============================================================================
// THRESHOLD
// ============================================================================

/// Normalized risk score in `[0.0, 1.0]` at or above which we act.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidThreshold(value.to_string()))
        }
    }

    /// Parse a threshold from configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let value: f64 = text
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidThreshold(text.to_string()))?;
        Self::new(value).map_err(|_| ConfigError::InvalidThreshold(text.to_string()))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ============================================================================
// BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Azure AI Content Safety
    Azure,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" => Ok(BackendKind::Azure),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Azure => write!(f, "azure"),
        }
    }
}

/// Settings handed through, untouched, to the chosen moderator.
#[derive(Clone, PartialEq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub endpoint: String,
    pub api_key: String,
}

// Keep the key out of logs.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl FromStr for RemedialAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delete" | "remove" => Ok(RemedialAction::Delete),
            "warn" => Ok(RemedialAction::Warn),
            "flag" => Ok(RemedialAction::Flag),
            _ => Err(ConfigError::InvalidValue {
                key: "MODERATION_ACTION",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationConfig {
    pub enabled: bool,
    pub bot_username: String,
    pub moderate_all_users: bool,
    pub target_users: HashSet<u64>,
    pub threshold: Threshold,
    pub backend: BackendConfig,
    pub action: RemedialAction,
    pub warning_message: String,
}

impl ModerationConfig {
    /// Load the config from `.env` and the process environment.
    ///
    /// Values in `.env` win, so editing the file and reloading picks up the
    /// change without restarting the process.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file: HashMap<String, String> = match dotenv::dotenv_iter() {
            Ok(iter) => iter.filter_map(Result::ok).collect(),
            Err(_) => HashMap::new(),
        };

        Self::from_lookup(|key| file.get(key).cloned().or_else(|| std::env::var(key).ok()))
    }

    /// Load the config from an arbitrary key lookup.
    ///
    /// A disabled config does not need a threshold or backend settings; in
    /// that case they fall back to placeholders that are never used.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let enabled = parse_bool("MODERATION_ENABLED", get("MODERATION_ENABLED"))?;
        let moderate_all_users = parse_bool("MODERATION_ALL_USERS", get("MODERATION_ALL_USERS"))?;
        let target_users = parse_targets(get("MODERATION_TARGET_USERS").as_deref())?;

        let threshold = match get("MODERATION_THRESHOLD") {
            Some(text) => Threshold::parse(&text)?,
            None if enabled => return Err(ConfigError::Missing("MODERATION_THRESHOLD")),
            None => Threshold(1.0),
        };

        let kind = match get("MODERATION_BACKEND") {
            Some(text) => text.parse()?,
            None => BackendKind::Azure,
        };

        let action = match get("MODERATION_ACTION") {
            Some(text) => text.parse()?,
            None => RemedialAction::default(),
        };

        Ok(Self {
            enabled,
            bot_username: get("MODERATION_BOT_USERNAME")
                .unwrap_or_else(|| DEFAULT_BOT_USERNAME.to_string()),
            moderate_all_users,
            target_users,
            threshold,
            backend: BackendConfig {
                kind,
                endpoint: get("MODERATION_ENDPOINT").unwrap_or_default(),
                api_key: get("MODERATION_API_KEY").unwrap_or_default(),
            },
            action,
            warning_message: get("MODERATION_WARNING_MESSAGE")
                .unwrap_or_else(|| DEFAULT_WARNING_MESSAGE.to_string()),
        })
    }

    /// No author can ever be in scope. Valid, just does nothing.
    pub fn is_inert(&self) -> bool {
        !self.moderate_all_users && self.target_users.is_empty()
    }
}

fn parse_bool(key: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(false);
    };

    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value: raw }),
    }
}

fn parse_targets(value: Option<&str>) -> Result<HashSet<u64>, ConfigError> {
    let Some(value) = value else {
        return Ok(HashSet::new());
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "MODERATION_TARGET_USERS",
                value: id.to_string(),
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn threshold_accepts_bounds_and_rejects_outside() {
        assert_eq!(Threshold::parse("0").unwrap().value(), 0.0);
        assert_eq!(Threshold::parse(" 1.0 ").unwrap().value(), 1.0);
        assert_eq!(Threshold::parse("0.8").unwrap().value(), 0.8);

        assert!(Threshold::parse("1.01").is_err());
        assert!(Threshold::parse("-0.1").is_err());
        assert!(Threshold::parse("NaN").is_err());
        assert!(Threshold::parse("high").is_err());
        assert!(Threshold::parse("").is_err());
    }

    #[test]
    fn disabled_config_needs_nothing() {
        let config = ModerationConfig::from_lookup(lookup(&[])).unwrap();

        assert!(!config.enabled);
        assert!(config.is_inert());
        assert_eq!(config.bot_username, DEFAULT_BOT_USERNAME);
        assert_eq!(config.action, RemedialAction::Delete);
    }

    #[test]
    fn enabled_config_requires_threshold() {
        let result = ModerationConfig::from_lookup(lookup(&[("MODERATION_ENABLED", "true")]));
        assert_eq!(result, Err(ConfigError::Missing("MODERATION_THRESHOLD")));
    }

    #[test]
    fn full_config_is_parsed() {
        let config = ModerationConfig::from_lookup(lookup(&[
            ("MODERATION_ENABLED", "true"),
            ("MODERATION_BOT_USERNAME", "guardian"),
            ("MODERATION_TARGET_USERS", "123, 456,,789 "),
            ("MODERATION_THRESHOLD", "0.5"),
            ("MODERATION_BACKEND", "Azure"),
            ("MODERATION_ENDPOINT", "https://example.cognitiveservices.azure.com"),
            ("MODERATION_API_KEY", "secret"),
            ("MODERATION_ACTION", "flag"),
        ]))
        .unwrap();

        assert!(config.enabled);
        assert!(!config.moderate_all_users);
        assert_eq!(config.bot_username, "guardian");
        assert_eq!(config.target_users, HashSet::from([123, 456, 789]));
        assert_eq!(config.threshold.value(), 0.5);
        assert_eq!(config.backend.kind, BackendKind::Azure);
        assert_eq!(config.backend.api_key, "secret");
        assert_eq!(config.action, RemedialAction::Flag);
        assert!(!config.is_inert());
    }

    #[test]
    fn invalid_values_are_startup_errors() {
        let bad_backend = ModerationConfig::from_lookup(lookup(&[("MODERATION_BACKEND", "openai")]));
        assert_eq!(
            bad_backend,
            Err(ConfigError::UnknownBackend("openai".to_string()))
        );

        let bad_target =
            ModerationConfig::from_lookup(lookup(&[("MODERATION_TARGET_USERS", "12,bob")]));
        assert!(matches!(
            bad_target,
            Err(ConfigError::InvalidValue {
                key: "MODERATION_TARGET_USERS",
                ..
            })
        ));

        let bad_bool = ModerationConfig::from_lookup(lookup(&[("MODERATION_ALL_USERS", "maybe")]));
        assert!(bad_bool.is_err());

        let bad_threshold = ModerationConfig::from_lookup(lookup(&[
            ("MODERATION_ENABLED", "true"),
            ("MODERATION_THRESHOLD", "2"),
        ]));
        assert!(matches!(bad_threshold, Err(ConfigError::InvalidThreshold(_))));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = ModerationConfig::from_lookup(lookup(&[("MODERATION_API_KEY", "hunter2")]))
            .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
    }
}
