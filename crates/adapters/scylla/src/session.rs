//! 存储会话管理

use std::time::Duration;

use bookshelf_errors::{AppError, AppResult};
use scylla::load_balancing::DefaultPolicy;
use scylla::statement::Consistency;
use scylla::{ExecutionProfile, Session, SessionBuilder};
use tracing::info;

/// 存储连接配置
#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    /// `host:port` 形式的联系节点
    pub contact_points: Vec<String>,
    /// 本地数据中心，负载均衡优先选择
    pub local_datacenter: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ScyllaConfig {
    pub fn new(contact_points: Vec<String>) -> Self {
        Self {
            contact_points,
            local_datacenter: "datacenter1".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_local_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.local_datacenter = datacenter.into();
        self
    }

    /// 用户名和密码都非空时才启用认证
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// 建立存储会话
///
/// 会话在进程生命周期内只建立一次，由所有请求共享。
pub async fn create_session(config: &ScyllaConfig) -> AppResult<Session> {
    info!(
        hosts = ?config.contact_points,
        datacenter = %config.local_datacenter,
        "Connecting to replicated store"
    );

    let policy = DefaultPolicy::builder()
        .prefer_datacenter(config.local_datacenter.clone())
        .token_aware(true)
        .build();

    // 语句会显式指定一致性级别，这里的默认值只在未指定时生效
    let profile = ExecutionProfile::builder()
        .load_balancing_policy(policy)
        .request_timeout(Some(config.request_timeout))
        .consistency(Consistency::One)
        .build();

    let mut builder = SessionBuilder::new()
        .known_nodes(&config.contact_points)
        .connection_timeout(config.connect_timeout)
        .default_execution_profile_handle(profile.into_handle());

    match (&config.username, &config.password) {
        (Some(username), Some(password)) => {
            info!(user = %username, "Using store authentication");
            builder = builder.user(username, password);
        }
        _ => info!("No store credentials provided"),
    }

    let session = builder
        .build()
        .await
        .map_err(|e| AppError::store_fault(format!("Failed to connect to store: {}", e)))?;

    info!("Connected to replicated store");
    Ok(session)
}
