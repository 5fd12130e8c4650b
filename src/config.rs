//! Process configuration
//!
//! Resolved once at startup from three layers, later ones winning:
//!
//! 1. TOML file (`--config <PATH>` or `<config_dir>/http2mqtt/config.toml`)
//! 2. Environment variables (`MQTT_HOST`, `MQTT_USER`, `VALID_TOPICS`, ...)
//! 3. The `--log` command line flag
//!
//! The resulting [`RelayConfig`] is validated and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, Level};

use crate::mqtt::MqttConfig;
use crate::relay::RelayPolicy;
use crate::validation::{MessagePolicy, TopicPolicy};

const CONFIG_DIR: &str = "http2mqtt";
const CONFIG_FILE: &str = "config.toml";

pub const ENV_MQTT_HOST: &str = "MQTT_HOST";
pub const ENV_MQTT_PORT: &str = "MQTT_PORT";
pub const ENV_MQTT_USER: &str = "MQTT_USER";
pub const ENV_MQTT_PASS: &str = "MQTT_PASS";
pub const ENV_MQTT_CLIENTID: &str = "MQTT_CLIENTID";
pub const ENV_HTTP_HOST: &str = "HTTP_HOST";
pub const ENV_HTTP_PORT: &str = "HTTP_PORT";
pub const ENV_VALID_TOPICS: &str = "VALID_TOPICS";
pub const ENV_TOPIC_PREFIX: &str = "TOPIC_PREFIX";
pub const ENV_MAX_MESSAGE_LEN: &str = "MAX_MESSAGE_LEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid log level {0:?}; expected ERROR, WARN, INFO, DEBUG or TRACE")]
    InvalidLogLevel(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP listener address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Interface to bind; `0.0.0.0` for all interfaces
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8234,
        }
    }
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete, immutable configuration of the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub log_level: String,
    pub http: HttpConfig,
    pub mqtt: MqttConfig,
    pub topics: TopicPolicy,
    pub messages: MessagePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: "error".to_string(),
            http: HttpConfig::default(),
            mqtt: MqttConfig::default(),
            topics: TopicPolicy::default(),
            messages: MessagePolicy::default(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Accepts the level names of the `--log` flag, case-insensitive
pub fn parse_level(level: &str) -> Result<Level, ConfigError> {
    match level.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" | "warning" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn env_parse<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env_var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var: name, value }),
        None => Ok(None),
    }
}

impl RelayConfig {
    /// Loads file, environment and CLI override, then validates the result
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>, log_level: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env()?;
        if let Some(level) = log_level {
            config.log_level = level.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `MQTT_*`, `HTTP_*`, `VALID_TOPICS`, `TOPIC_PREFIX` and `MAX_MESSAGE_LEN`
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(host) = env_var(ENV_MQTT_HOST) {
            self.mqtt.host = host;
        }
        if let Some(port) = env_parse(ENV_MQTT_PORT)? {
            self.mqtt.port = port;
        }
        // Empty credentials count as unset
        if let Some(user) = env_var(ENV_MQTT_USER).filter(|u| !u.is_empty()) {
            self.mqtt.username = Some(user);
        }
        if let Some(pass) = env_var(ENV_MQTT_PASS).filter(|p| !p.is_empty()) {
            self.mqtt.password = Some(pass);
        }
        if let Some(client_id) = env_var(ENV_MQTT_CLIENTID) {
            self.mqtt.client_id = client_id;
        }
        if let Some(host) = env_var(ENV_HTTP_HOST) {
            self.http.host = host;
        }
        if let Some(port) = env_parse(ENV_HTTP_PORT)? {
            self.http.port = port;
        }
        if let Some(topics) = env_var(ENV_VALID_TOPICS) {
            self.topics.whitelist = topics
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(prefix) = env_var(ENV_TOPIC_PREFIX) {
            self.topics.prefix = prefix;
        }
        if let Some(max_length) = env_parse(ENV_MAX_MESSAGE_LEN)? {
            self.messages.max_length = max_length;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_level(&self.log_level)?;

        if self.http.port == 0 {
            return Err(ConfigError::Invalid("http.port must not be 0".to_string()));
        }
        if self.mqtt.port == 0 {
            return Err(ConfigError::Invalid("mqtt.port must not be 0".to_string()));
        }
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.host must not be empty".to_string()));
        }
        if self.mqtt.client_id.is_empty() || self.mqtt.client_id.starts_with(' ') {
            return Err(ConfigError::Invalid(format!(
                "mqtt.client_id {:?} must be non-empty and not start with a space",
                self.mqtt.client_id
            )));
        }
        if self.mqtt.qos().is_none() {
            return Err(ConfigError::Invalid(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                self.mqtt.qos
            )));
        }
        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::Invalid(
                "mqtt.keep_alive_secs must be at least 5".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_ms == 0
            || self.mqtt.publish_timeout_ms == 0
            || self.mqtt.reconnect_delay_ms == 0
        {
            return Err(ConfigError::Invalid(
                "mqtt timeouts and reconnect delay must be greater than 0".to_string(),
            ));
        }
        if self.messages.max_length == 0 {
            return Err(ConfigError::Invalid(
                "messages.max_length must be greater than 0".to_string(),
            ));
        }
        if let Some(c) = self
            .messages
            .extra_chars
            .chars()
            .find(|c| !c.is_ascii_graphic())
        {
            return Err(ConfigError::Invalid(format!(
                "messages.extra_chars may only contain printable ASCII, found {:?}",
                c
            )));
        }
        if self.topics.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "topics.prefix must not contain whitespace".to_string(),
            ));
        }
        if let Some(topic) = self
            .topics
            .whitelist
            .iter()
            .find(|t| t.is_empty() || t.chars().any(char::is_whitespace))
        {
            return Err(ConfigError::Invalid(format!(
                "topics.whitelist entry {:?} is empty or contains whitespace",
                topic
            )));
        }
        Ok(())
    }

    /// Log level; falls back to ERROR if the string was never validated
    pub fn level(&self) -> Level {
        parse_level(&self.log_level).unwrap_or(Level::ERROR)
    }

    pub fn policy(&self) -> RelayPolicy {
        RelayPolicy {
            topics: self.topics.clone(),
            messages: self.messages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ALL_VARS: [&str; 10] = [
        ENV_MQTT_HOST,
        ENV_MQTT_PORT,
        ENV_MQTT_USER,
        ENV_MQTT_PASS,
        ENV_MQTT_CLIENTID,
        ENV_HTTP_HOST,
        ENV_HTTP_PORT,
        ENV_VALID_TOPICS,
        ENV_TOPIC_PREFIX,
        ENV_MAX_MESSAGE_LEN,
    ];

    /// Runs `f` with exactly the given relay variables set, all others unset
    fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let kvs: Vec<(&str, Option<&str>)> = ALL_VARS
            .iter()
            .map(|name| {
                let value = vars.iter().find(|(k, _)| k == name).map(|(_, v)| *v);
                (*name, value)
            })
            .collect();
        temp_env::with_vars(kvs, f)
    }

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("create tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, content).expect("write config file");
        (dir, path)
    }

    #[test]
    fn defaults_bind_all_interfaces_and_local_broker() {
        let config = RelayConfig::default();
        assert_eq!(config.http.bind_addr(), "0.0.0.0:8234");
        assert_eq!(config.mqtt.broker_addr(), "127.0.0.1:1883");
        assert_eq!(config.mqtt.qos, 0);
        assert!(config.mqtt.retain);
        assert!(config.topics.whitelist.is_empty());
        assert_eq!(config.topics.prefix, "");
        assert_eq!(config.messages.max_length, 100);
        assert_eq!(config.level(), Level::ERROR);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn file_values_are_loaded() {
        let (_dir, path) = write_config(
            r#"
            log_level = "info"

            [http]
            port = 9000

            [mqtt]
            host = "broker.lan"
            client_id = "router"
            qos = 1

            [topics]
            whitelist = ["vpn", "alerts"]
            prefix = "home/"

            [messages]
            max_length = 10
            extra_chars = ":!"
            allow_empty = false
            "#,
        );

        let config = with_env(&[], || RelayConfig::load(Some(&path), None)).unwrap();
        assert_eq!(config.level(), Level::INFO);
        assert_eq!(config.http.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.mqtt.broker_addr(), "broker.lan:1883");
        assert_eq!(config.mqtt.client_id, "router");
        assert_eq!(config.mqtt.qos, 1);
        assert_eq!(config.topics.whitelist, vec!["vpn", "alerts"]);

        let policy = config.policy();
        assert_eq!(policy.topics.prefix, "home/");
        assert_eq!(policy.messages.max_length, 10);
        assert_eq!(policy.messages.extra_chars, ":!");
        assert!(!policy.messages.allow_empty);
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let (_dir, path) = write_config(
            r#"
            [mqtt]
            host = "from-file"
            port = 1999
            "#,
        );

        let config = with_env(
            &[
                (ENV_MQTT_HOST, "from-env"),
                (ENV_MQTT_PORT, "1884"),
                (ENV_MQTT_USER, "user"),
                (ENV_MQTT_PASS, "secret"),
                (ENV_VALID_TOPICS, "vpn, alerts ,,test/topic"),
                (ENV_TOPIC_PREFIX, "home/relay/"),
                (ENV_MAX_MESSAGE_LEN, "50"),
            ],
            || RelayConfig::load(Some(&path), None),
        )
        .unwrap();

        assert_eq!(config.mqtt.broker_addr(), "from-env:1884");
        assert_eq!(config.mqtt.credentials(), Some(("user", "secret")));
        assert_eq!(config.topics.whitelist, vec!["vpn", "alerts", "test/topic"]);
        assert_eq!(config.topics.prefix, "home/relay/");
        assert_eq!(config.messages.max_length, 50);
    }

    #[test]
    #[serial]
    fn empty_credentials_are_ignored() {
        let (_dir, path) = write_config("");
        let config = with_env(&[(ENV_MQTT_USER, ""), (ENV_MQTT_PASS, "")], || {
            RelayConfig::load(Some(&path), None)
        })
        .unwrap();
        assert_eq!(config.mqtt.credentials(), None);
    }

    #[test]
    #[serial]
    fn invalid_env_number_is_fatal() {
        let (_dir, path) = write_config("");
        let result = with_env(&[(ENV_HTTP_PORT, "eighty")], || {
            RelayConfig::load(Some(&path), None)
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { var: ENV_HTTP_PORT, .. })
        ));
    }

    #[test]
    #[serial]
    fn cli_log_level_wins() {
        let (_dir, path) = write_config(r#"log_level = "info""#);
        let config =
            with_env(&[], || RelayConfig::load(Some(&path), Some("DEBUG"))).unwrap();
        assert_eq!(config.level(), Level::DEBUG);

        let result = with_env(&[], || RelayConfig::load(Some(&path), Some("LOUD")));
        assert!(matches!(result, Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let result = with_env(&[], || RelayConfig::load(Some(&path), None));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    #[serial]
    fn malformed_file_is_an_error() {
        let (_dir, path) = write_config("[mqtt\nport = ");
        let result = with_env(&[], || RelayConfig::load(Some(&path), None));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let cases: [fn(&mut RelayConfig); 10] = [
            |c| c.http.port = 0,
            |c| c.mqtt.client_id = String::new(),
            |c| c.mqtt.client_id = " leading".to_string(),
            |c| c.mqtt.qos = 3,
            |c| c.mqtt.keep_alive_secs = 1,
            |c| c.mqtt.publish_timeout_ms = 0,
            |c| c.messages.max_length = 0,
            |c| c.messages.extra_chars = "é".to_string(),
            |c| c.topics.prefix = "home /".to_string(),
            |c| c.topics.whitelist = vec!["my topic".to_string()],
        ];

        for mutate in cases {
            let mut config = RelayConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{:?}",
                config
            );
        }
    }

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("ERROR").unwrap(), Level::ERROR);
        assert_eq!(parse_level("Warning").unwrap(), Level::WARN);
        assert_eq!(parse_level("info").unwrap(), Level::INFO);
        assert!(parse_level("verbose").is_err());
    }
}
