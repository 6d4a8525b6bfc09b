use crate::notify::queue::QueueSettings;
use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for Lendflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LendflowConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Notification fan-out settings
    pub notifications: NotificationConfig,
    /// Case number issuance
    pub sequence: SequenceConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Jobs buffered before enqueue has to wait
    pub queue_capacity: usize,
    /// Jobs dispatched concurrently by the worker
    pub max_in_flight: usize,
    /// How long enqueue waits on a full queue before dropping the job
    pub enqueue_timeout_ms: u64,
    /// Upper bound for a single push delivery
    pub push_timeout_ms: u64,
    /// Time allowed for the queue to drain on shutdown
    pub drain_timeout_ms: u64,
    pub push: PushConfig,
}

impl NotificationConfig {
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            capacity: self.queue_capacity,
            max_in_flight: self.max_in_flight,
            enqueue_timeout: Duration::from_millis(self.enqueue_timeout_ms),
        }
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 64,
            enqueue_timeout_ms: 2_000,
            push_timeout_ms: 5_000,
            drain_timeout_ms: 10_000,
            push: PushConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PushConfig {
    /// HTTP endpoint accepting push messages; push is disabled without one
    pub endpoint: Option<String>,
    /// Bearer credential for the endpoint (can be set via env var)
    pub server_key: Option<String>,
    pub requests_per_second: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            server_key: None,
            requests_per_second: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Counter name under which case numbers are issued
    pub name: String,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            name: crate::sequence::DEFAULT_SEQUENCE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite connection string
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://lendflow.db".to_string(),
            max_connections: 10,
            auto_migrate: true,
        }
    }
}

impl LendflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (lendflow.toml, .lendflow-rc)
    /// 3. Environment variables (prefixed with LENDFLOW__)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("lendflow.toml").exists() {
            builder = builder.add_source(File::with_name("lendflow"));
        }

        if Path::new(".lendflow-rc").exists() {
            builder = builder.add_source(
                File::with_name(".lendflow-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("LENDFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut lendflow_config: LendflowConfig = builder.build()?.try_deserialize()?;

        if lendflow_config.notifications.push.server_key.is_none() {
            if let Ok(key) = std::env::var("PUSH_SERVER_KEY") {
                lendflow_config.notifications.push.server_key = Some(key);
            }
        }

        if lendflow_config.database.is_none() {
            lendflow_config.database = Some(DatabaseConfig::default());
        }

        Ok(lendflow_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<LendflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = LendflowConfig::load_env_file();
        LendflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static LendflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LendflowConfig::default();
        assert_eq!(config.sequence.name, "caseId");
        assert_eq!(config.notifications.queue_capacity, 1024);
        assert_eq!(config.notifications.queue_settings(), QueueSettings::default());
        assert_eq!(config.notifications.push_timeout(), Duration::from_secs(5));
        assert!(config.notifications.push.endpoint.is_none());
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
            [notifications]
            push_timeout_ms = 250

            [notifications.push]
            endpoint = "https://push.example.test/send"

            [database]
            url = "sqlite::memory:"
            max_connections = 1
            auto_migrate = true
        "#;
        let config: LendflowConfig = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.notifications.push_timeout_ms, 250);
        assert_eq!(config.notifications.queue_capacity, 1024);
        assert_eq!(
            config.notifications.push.endpoint.as_deref(),
            Some("https://push.example.test/send")
        );
        assert_eq!(config.notifications.push.requests_per_second, 50);
        assert_eq!(config.database.unwrap().url, "sqlite::memory:");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = LendflowConfig {
            database: Some(DatabaseConfig::default()),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: LendflowConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sequence.name, config.sequence.name);
        assert_eq!(parsed.database.unwrap().max_connections, 10);
    }
}
