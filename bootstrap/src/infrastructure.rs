//! 基础设施资源管理
//!
//! 存储会话与缓存连接在启动时建立一次，之后由所有请求共享

use std::sync::Arc;

use bookshelf_adapter_redis::{RedisCache, create_connection_manager};
use bookshelf_adapter_scylla::{ScyllaConfig, ScyllaStore, SchemaBootstrapper, create_session};
use bookshelf_common::{RetryConfig, with_conditional_retry};
use bookshelf_config::AppConfig;
use bookshelf_errors::{AppError, AppResult};
use bookshelf_ports::{CachePort, ReplicatedStore};
use metrics_exporter_prometheus::PrometheusHandle;
use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use tracing::info;

/// 基础设施资源容器
pub struct Infrastructure {
    /// 应用配置
    config: AppConfig,
    /// 复制存储客户端
    store: Arc<ScyllaStore>,
    /// Redis 连接管理器
    redis_conn: ConnectionManager,
    /// Prometheus 渲染句柄
    metrics: Option<PrometheusHandle>,
}

/// 配置错误重试也不会好转
fn is_transient(error: &AppError) -> bool {
    !matches!(error, AppError::Validation(_))
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    ///
    /// 顺序：存储会话 → 键空间和表 → Redis。结构初始化完成前不返回，
    /// 因此 HTTP 监听器启动时表已存在。
    pub async fn from_config(
        config: AppConfig,
        metrics: Option<PrometheusHandle>,
    ) -> AppResult<Self> {
        let retry_config = RetryConfig::default();

        // 1. 存储会话（必需，带重试）
        let store_config = &config.store;
        let scylla_config = ScyllaConfig::new(store_config.contact_points())
            .with_local_datacenter(store_config.local_datacenter.clone())
            .with_credentials(
                store_config.username.clone(),
                store_config
                    .password
                    .as_ref()
                    .map(|p| p.expose_secret().clone()),
            )
            .with_connect_timeout(store_config.connect_timeout())
            .with_request_timeout(store_config.request_timeout());

        let session = with_conditional_retry(
            &retry_config,
            "Store connection",
            || create_session(&scylla_config),
            is_transient,
        )
        .await?;

        // 2. 键空间和表
        let bootstrapper = SchemaBootstrapper::new(
            store_config.keyspace.clone(),
            store_config.replication_factor(),
        )?;
        with_conditional_retry(
            &retry_config,
            "Schema bootstrap",
            || bootstrapper.ensure(&session),
            is_transient,
        )
        .await?;
        let store = Arc::new(ScyllaStore::new(Arc::new(session)));

        // 3. Redis 连接（必需，带重试）
        let redis_url = config.cache.url.clone();
        let redis_conn = with_conditional_retry(
            &retry_config,
            "Redis connection",
            || {
                let url = redis_url.expose_secret().clone();
                async move { create_connection_manager(&url).await }
            },
            is_transient,
        )
        .await?;
        info!("Redis connection created");

        Ok(Self {
            config,
            store,
            redis_conn,
            metrics,
        })
    }

    /// 获取应用配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取复制存储客户端
    pub fn store(&self) -> Arc<dyn ReplicatedStore> {
        self.store.clone()
    }

    /// 获取 Redis 缓存（实现 CachePort trait）
    pub fn cache(&self) -> Arc<dyn CachePort> {
        let cache = RedisCache::new(self.redis_conn.clone());
        match &self.config.cache.key_prefix {
            Some(prefix) => Arc::new(cache.with_key_prefix(prefix.clone())),
            None => Arc::new(cache),
        }
    }

    /// 获取 Prometheus 渲染句柄
    pub fn metrics_handle(&self) -> Option<PrometheusHandle> {
        self.metrics.clone()
    }
}
