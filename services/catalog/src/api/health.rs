//! 健康检查、连通性诊断与指标端点
//!
//! `/health` 总是返回 200：存储或缓存暂时不可用不代表进程不健康，
//! 探测结果只体现在响应体里。`/connectivity/store` 逐个探测存储节点的
//! TCP 端口，不经过驱动。

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bookshelf_ports::{ConsistencyTier, Statement};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::AppState;

const STORE_PROBE: &str = "SELECT now() FROM system.local";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
    pub store: String,
    pub cache: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn connectivity(ok: bool) -> String {
    if ok { "connected" } else { "disconnected" }.to_string()
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // 只探测最弱级别，单个存活副本即视为已连接
    let store_ok = match state
        .store
        .execute(&Statement::new(STORE_PROBE), ConsistencyTier::Minimal)
        .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Health check: store unreachable");
            false
        }
    };

    let cache_ok = match state.cache.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Health check: cache unreachable");
            false
        }
    };

    debug!(store_ok, cache_ok, "Health check");

    let warning = match (store_ok, cache_ok) {
        (true, true) => None,
        (false, _) => Some("Database temporarily unavailable".to_string()),
        (true, false) => Some("Cache temporarily unavailable".to_string()),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        service: env!("CARGO_PKG_NAME").to_string(),
        store: connectivity(store_ok),
        cache: connectivity(cache_ok),
        warning,
    })
}

/// 连通性诊断的目标节点
#[derive(Debug, Clone)]
pub struct ConnectivityTargets {
    /// `host:port`
    pub contact_points: Vec<String>,
    /// 单个节点的连接超时
    pub timeout: Duration,
}

impl ConnectivityTargets {
    pub fn new(contact_points: Vec<String>, timeout: Duration) -> Self {
        Self {
            contact_points,
            timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    /// 对端拒绝连接
    Failed,
    Timeout,
    /// 地址解析失败、网络不可达等
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeReport {
    pub node: String,
    pub status: NodeStatus,
    pub message: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectivityResponse {
    pub tested_at: String,
    pub total_nodes: usize,
    pub results: Vec<NodeReport>,
}

async fn check_node(node: String, timeout: Duration) -> NodeReport {
    let started = Instant::now();
    let connect = TcpStream::connect(node.as_str());
    let (status, message) = match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(_stream)) => (NodeStatus::Success, "Connected successfully".to_string()),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            (NodeStatus::Failed, format!("Could not connect: {}", e))
        }
        Ok(Err(e)) => (NodeStatus::Error, format!("Socket error: {}", e)),
        Err(_) => (
            NodeStatus::Timeout,
            format!("Connection timed out after {} ms", timeout.as_millis()),
        ),
    };

    NodeReport {
        node,
        status,
        message,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// 并发探测所有联系节点，结果按配置顺序返回
pub async fn store_connectivity(State(state): State<AppState>) -> Json<ConnectivityResponse> {
    let targets = &state.connectivity;
    let mut checks = JoinSet::new();
    for (index, node) in targets.contact_points.iter().cloned().enumerate() {
        let timeout = targets.timeout;
        checks.spawn(async move { (index, check_node(node, timeout).await) });
    }

    let mut results = Vec::with_capacity(targets.contact_points.len());
    while let Some(joined) = checks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "Connectivity check task failed"),
        }
    }
    results.sort_by_key(|(index, _)| *index);
    let results: Vec<NodeReport> = results.into_iter().map(|(_, report)| report).collect();

    let reachable = results
        .iter()
        .filter(|report| report.status == NodeStatus::Success)
        .count();
    info!(total = results.len(), reachable, "Store connectivity checked");

    Json(ConnectivityResponse {
        tested_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        total_nodes: targets.contact_points.len(),
        results,
    })
}

pub async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
