//! Service configuration
//!
//! Loaded from a TOML file. Only `[service]` is mandatory; every other
//! section falls back to defaults. Secrets (MQTT credentials) are never
//! stored in the file, only the names of the environment variables that
//! hold them.

use crate::dna::{ClassifierPolicy, REQUIRED_RUN_COUNT, SEQUENCE_LENGTH};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    pub service: ServiceSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    pub mqtt: Option<MqttSection>,
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// Service identifier (must match [a-zA-Z0-9._-]+); also used in bus topics
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSection {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl HttpSection {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierSection {
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
    #[serde(default = "default_required_runs")]
    pub required_runs: usize,
}

fn default_sequence_length() -> usize {
    SEQUENCE_LENGTH
}

fn default_required_runs() -> usize {
    REQUIRED_RUN_COUNT
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            sequence_length: default_sequence_length(),
            required_runs: default_required_runs(),
        }
    }
}

impl ClassifierSection {
    pub fn policy(&self) -> Result<ClassifierPolicy, ConfigError> {
        ClassifierPolicy::new(self.sequence_length, self.required_runs)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }
}

/// Where a classified record goes after the HTTP response is decided
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Persist in-process
    #[default]
    Direct,
    /// Publish to the message bus for a `persist` worker
    Mqtt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchSection {
    #[serde(default)]
    pub mode: DispatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database file, required for the sqlite backend
    pub path: Option<PathBuf>,
}

impl MqttSection {
    /// Username read from the variable named by `username_env`
    pub fn username(&self) -> Option<String> {
        env_var_optional(self.username_env.as_deref())
    }

    /// Password read from the variable named by `password_env`
    pub fn password(&self) -> Option<String> {
        env_var_optional(self.password_env.as_deref())
    }
}

fn env_var_optional(env_var_name: Option<&str>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid service ID format: {0}")]
    InvalidServiceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DetectorConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_service_id(&self.service.id)?;
        self.classifier.policy()?;

        if self.dispatch.mode == DispatchMode::Mqtt && self.mqtt.is_none() {
            return Err(ConfigError::InvalidConfig(
                "dispatch mode \"mqtt\" requires an [mqtt] section".to_string(),
            ));
        }

        // Publisher and worker run as separate processes and must share a store
        if self.dispatch.mode == DispatchMode::Mqtt && self.storage.backend == StorageBackend::Memory
        {
            return Err(ConfigError::InvalidConfig(
                "dispatch mode \"mqtt\" requires storage backend \"sqlite\"".to_string(),
            ));
        }

        if let Some(mqtt) = &self.mqtt {
            validate_broker_url(&mqtt.broker_url)?;
        }

        if self.storage.backend == StorageBackend::Sqlite && self.storage.path.is_none() {
            return Err(ConfigError::InvalidConfig(
                "storage backend \"sqlite\" requires storage.path".to_string(),
            ));
        }

        Ok(())
    }

    /// Classifier policy described by `[classifier]`
    pub fn policy(&self) -> Result<ClassifierPolicy, ConfigError> {
        self.classifier.policy()
    }

    /// The `[mqtt]` section, or an error naming what needed it
    pub fn require_mqtt(&self, purpose: &str) -> Result<&MqttSection, ConfigError> {
        self.mqtt.as_ref().ok_or_else(|| {
            ConfigError::InvalidConfig(format!("{purpose} requires an [mqtt] section"))
        })
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[service]
id = "test-detector"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate service ID format: [a-zA-Z0-9._-]+
fn validate_service_id(service_id: &str) -> Result<(), ConfigError> {
    let valid_chars = service_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if service_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidServiceId(format!(
            "Service ID '{service_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

fn validate_broker_url(broker_url: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(broker_url)
        .map_err(|e| ConfigError::InvalidConfig(format!("Invalid broker URL '{broker_url}': {e}")))?;
    match url.scheme() {
        "mqtt" | "mqtts" | "tcp" | "ssl" => Ok(()),
        other => Err(ConfigError::InvalidConfig(format!(
            "Unsupported broker URL scheme '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[service]
id = "mutant-detector"

[http]
bind = "127.0.0.1"
port = 9000

[classifier]
sequence_length = 5
required_runs = 3

[dispatch]
mode = "mqtt"

[mqtt]
broker_url = "mqtt://localhost:1883"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"

[storage]
backend = "sqlite"
path = "mutants.db"
"#;

        let config = DetectorConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.service.id, "mutant-detector");
        assert_eq!(config.http.socket_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.dispatch.mode, DispatchMode::Mqtt);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, Some(PathBuf::from("mutants.db")));

        let policy = config.policy().unwrap();
        assert_eq!(policy.sequence_length(), 5);
        assert_eq!(policy.required_runs(), 3);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = DetectorConfig::from_toml_str("[service]\nid = \"minimal\"\n").unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.bind, default_bind());
        assert_eq!(config.classifier.sequence_length, SEQUENCE_LENGTH);
        assert_eq!(config.classifier.required_runs, REQUIRED_RUN_COUNT);
        assert_eq!(config.dispatch.mode, DispatchMode::Direct);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn test_invalid_service_id() {
        assert!(validate_service_id("invalid@service").is_err());
        assert!(validate_service_id("").is_err());
        assert!(validate_service_id("valid-service_123.test").is_ok());
    }

    #[test]
    fn test_zero_sequence_length_rejected() {
        let result = DetectorConfig::from_toml_str(
            "[service]\nid = \"x\"\n[classifier]\nsequence_length = 0\n",
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_mqtt_mode_requires_mqtt_section() {
        let result =
            DetectorConfig::from_toml_str("[service]\nid = \"x\"\n[dispatch]\nmode = \"mqtt\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_mqtt_mode_rejects_memory_backend() {
        let result = DetectorConfig::from_toml_str(
            "[service]\nid = \"x\"\n[dispatch]\nmode = \"mqtt\"\n[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\n",
        );
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
        assert!(err.to_string().contains("sqlite"));
    }

    #[test]
    fn test_sqlite_requires_path() {
        let result = DetectorConfig::from_toml_str(
            "[service]\nid = \"x\"\n[storage]\nbackend = \"sqlite\"\n",
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_broker_scheme_rejected() {
        let result = DetectorConfig::from_toml_str(
            "[service]\nid = \"x\"\n[mqtt]\nbroker_url = \"http://localhost:1883\"\n",
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_dispatch_mode_is_parse_error() {
        let result = DetectorConfig::from_toml_str(
            "[service]\nid = \"x\"\n[dispatch]\nmode = \"carrier-pigeon\"\n",
        );
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_mqtt_credentials_from_env() {
        let mut config = DetectorConfig::test_config();
        if let Some(mqtt) = config.mqtt.as_mut() {
            mqtt.username_env = Some("MUTANT_TEST_MQTT_USER".to_string());
            mqtt.password_env = Some("MUTANT_TEST_MQTT_PASS_UNSET".to_string());
        }
        std::env::set_var("MUTANT_TEST_MQTT_USER", "detector");

        let mqtt = config.require_mqtt("credentials").unwrap();
        assert_eq!(mqtt.username(), Some("detector".to_string()));
        assert_eq!(mqtt.password(), None);

        std::env::remove_var("MUTANT_TEST_MQTT_USER");
    }

    #[test]
    fn test_require_mqtt() {
        let config = DetectorConfig::test_config();
        assert!(config.require_mqtt("persist").is_ok());

        let config = DetectorConfig::from_toml_str("[service]\nid = \"x\"\n").unwrap();
        let err = config.require_mqtt("persist").unwrap_err();
        assert!(err.to_string().contains("persist"));
    }
}
