use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default location of the YAML config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Env var that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "NEWSWIRE_CONFIG";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    /// The log bus. Named `kafka` for deployment compatibility; `bus` is accepted too.
    #[serde(default, alias = "bus")]
    pub kafka: BusConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load `.env`, read the YAML file, apply env overrides and validate.
    ///
    /// Path resolution: explicit `path`, then `$NEWSWIRE_CONFIG`, then
    /// `config/config.yaml`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_dotenv();
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env_opt(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(env_opt);
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a YAML string without touching the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    ///
    /// Convention: `SECTION_KEY` overrides `section.key`, e.g. `KAFKA_TOPIC`
    /// or `POSTGRES_HOST`. `KAFKA_BROKERS` is comma separated.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("REDDIT_CLIENT_ID") {
            self.reddit.client_id = v;
        }
        if let Some(v) = lookup("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = v;
        }
        if let Some(v) = lookup("REDDIT_USERNAME") {
            self.reddit.username = v;
        }
        if let Some(v) = lookup("REDDIT_PASSWORD") {
            self.reddit.password = v;
        }

        if let Some(v) = lookup("KAFKA_BROKERS") {
            self.kafka.brokers = v
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
        }
        if let Some(v) = lookup("KAFKA_TOPIC") {
            self.kafka.topic = v;
        }
        if let Some(v) = lookup("KAFKA_GROUP_ID") {
            self.kafka.group_id = v;
        }
        if let Some(v) = lookup("KAFKA_PARTITIONS").and_then(|v| v.parse().ok()) {
            self.kafka.partitions = v;
        }
        if let Some(v) = lookup("KAFKA_RESET_ON_START") {
            self.kafka.reset_on_start = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("KAFKA_CONSUMER_NAME") {
            self.kafka.consumer_name = Some(v);
        }
        if let Some(v) = lookup("KAFKA_BACKEND") {
            match v.to_lowercase().as_str() {
                "redis" => self.kafka.backend = BusBackend::Redis,
                "memory" => self.kafka.backend = BusBackend::Memory,
                other => tracing::warn!(backend = other, "ignoring unknown KAFKA_BACKEND"),
            }
        }

        if let Some(v) = lookup("POSTGRES_HOST") {
            self.postgres.host = v;
        }
        if let Some(v) = lookup("POSTGRES_PORT").and_then(|v| v.parse().ok()) {
            self.postgres.port = v;
        }
        if let Some(v) = lookup("POSTGRES_USER") {
            self.postgres.user = v;
        }
        if let Some(v) = lookup("POSTGRES_PASSWORD") {
            self.postgres.password = v;
        }
        if let Some(v) = lookup("POSTGRES_DBNAME") {
            self.postgres.dbname = v;
        }
        if let Some(v) = lookup("POSTGRES_SSLMODE") {
            self.postgres.sslmode = v;
        }

        if let Some(v) = lookup("API_PORT").and_then(|v| v.parse().ok()) {
            self.api.port = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.brokers.is_empty() && self.kafka.backend == BusBackend::Redis {
            return Err(ConfigError::Invalid("kafka.brokers must not be empty".into()));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("kafka.topic must not be empty".into()));
        }
        if self.kafka.group_id.trim().is_empty() {
            return Err(ConfigError::Invalid("kafka.group_id must not be empty".into()));
        }
        if self.kafka.partitions == 0 {
            return Err(ConfigError::Invalid("kafka.partitions must be at least 1".into()));
        }
        if self.api.port == 0 {
            return Err(ConfigError::Invalid("api.port must be non-zero".into()));
        }
        if self.api.replay_capacity == 0 {
            return Err(ConfigError::Invalid("api.replay_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  reddit:   user={}, client_id_set={}",
            self.reddit.username,
            !self.reddit.client_id.is_empty()
        );
        tracing::info!(
            "  bus:      backend={:?}, brokers={:?}, topic={}, group={}, partitions={}",
            self.kafka.backend,
            self.kafka.brokers,
            self.kafka.topic,
            self.kafka.group_id,
            self.kafka.partitions
        );
        tracing::info!(
            "  postgres: host={}:{}, db={}, sslmode={}",
            self.postgres.host,
            self.postgres.port,
            self.postgres.dbname,
            self.postgres.sslmode
        );
        tracing::info!("  api:      {}:{}", self.api.host, self.api.port);
    }
}

// ── Reddit ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub page_size: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            user_agent: format!("newswire/{}", env!("CARGO_PKG_VERSION")),
            poll_interval_secs: 2,
            error_backoff_secs: 5,
            page_size: 100,
        }
    }
}

// ── Bus ───────────────────────────────────────────────────────

/// Which append-log implementation backs the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Redis Streams reachable at `brokers[0]`.
    #[default]
    Redis,
    /// In-process log; only meaningful when producer and consumer share a process.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Redis `host:port` (or `redis://` URL) entries; only the first is dialled.
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub partitions: u32,
    /// Delete and recreate the topic when the producer starts.
    pub reset_on_start: bool,
    pub backend: BusBackend,
    /// Stable consumer name within a group. Defaults to `<group>-<hostname>`.
    pub consumer_name: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:6379".to_string()],
            topic: "reddit-posts".to_string(),
            group_id: "reddit-consumer".to_string(),
            partitions: 1,
            reset_on_start: false,
            backend: BusBackend::Redis,
            consumer_name: None,
        }
    }
}

impl BusConfig {
    /// Consumer group name for a process, e.g. `<base>-api` for the serving process.
    pub fn group_with_suffix(&self, suffix: Option<&str>) -> String {
        match suffix {
            Some(s) if !s.is_empty() => format!("{}-{}", self.group_id, s),
            _ => self.group_id.clone(),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "reddit".to_string(),
            sslmode: "disable".to_string(),
            max_connections: 10,
        }
    }
}

// ── API ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub replay_capacity: usize,
    pub replay_pacing_ms: u64,
    pub write_timeout_secs: u64,
    /// Outbound frames queued per client before it counts as too slow.
    pub client_buffer: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("frontend/dist"),
            replay_capacity: 100,
            replay_pacing_ms: 50,
            write_timeout_secs: 5,
            client_buffer: 256,
        }
    }
}
