//! bookshelf-config - 配置加载库

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 复制存储（Cassandra / ScyllaDB）配置
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// 联系节点；环境变量写作 `[a,b]`，单个元素内也可用逗号分隔
    pub hosts: Vec<String>,
    #[serde(default = "default_store_port")]
    pub port: u16,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_local_datacenter")]
    pub local_datacenter: String,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 读操作依次尝试的一致性级别
    #[serde(default = "default_tiers")]
    pub read_tiers: Vec<String>,
    /// 写操作依次尝试的一致性级别
    #[serde(default = "default_tiers")]
    pub write_tiers: Vec<String>,
}

fn default_store_port() -> u16 {
    9042
}

fn default_keyspace() -> String {
    "bookshelf".to_string()
}

fn default_local_datacenter() -> String {
    "datacenter1".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_tiers() -> Vec<String> {
    vec![
        "strong".to_string(),
        "regional_quorum".to_string(),
        "minimal".to_string(),
    ]
}

impl StoreConfig {
    /// `host:port` 形式的联系节点
    pub fn contact_points(&self) -> Vec<String> {
        self.hosts
            .iter()
            .flat_map(|h| h.split(','))
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| {
                if h.contains(':') {
                    h.to_string()
                } else {
                    format!("{}:{}", h, self.port)
                }
            })
            .collect()
    }

    /// 建键空间时使用的复制因子，最多 3
    pub fn replication_factor(&self) -> usize {
        self.contact_points().len().clamp(1, 3)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 分布式缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub url: Secret<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    pub key_prefix: Option<String>,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 优先级：`{dir}/default.toml` < `{dir}/{APP_ENV}.toml` < `BOOKSHELF_*` 环境变量
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("BOOKSHELF_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.contact_points().is_empty() {
            return Err(ConfigError::Invalid("store.hosts must not be empty".into()));
        }
        if self.store.read_tiers.is_empty() || self.store.write_tiers.is_empty() {
            return Err(ConfigError::Invalid(
                "store.read_tiers and store.write_tiers must list at least one tier".into(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be positive".into()));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
