use std::sync::Arc;

use bookshelf_ports::{CachePort, ReplicatedStore};
use metrics_exporter_prometheus::PrometheusHandle;

use super::ConnectivityTargets;
use crate::domain::BookRepository;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn BookRepository>,
    /// 健康检查直接探测存储和缓存
    pub store: Arc<dyn ReplicatedStore>,
    pub cache: Arc<dyn CachePort>,
    pub connectivity: ConnectivityTargets,
    pub metrics: Option<PrometheusHandle>,
}
