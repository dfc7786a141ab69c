//! telemetry - 日志与指标

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 每次一致性级别尝试，标签 `tier`、`outcome`
pub const STORE_TIER_ATTEMPTS: &str = "store_tier_attempts_total";
/// 单次尝试耗时，标签 `tier`
pub const STORE_TIER_ATTEMPT_DURATION: &str = "store_tier_attempt_duration_seconds";
/// 旁路缓存查找，标签 `result` = hit | miss | error
pub const CACHE_LOOKUPS: &str = "cache_lookups_total";

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 人类可读，开发环境
    Pretty,
    /// 每行一个 JSON 对象，生产环境
    Json,
}

/// 安装全局 tracing subscriber
///
/// `RUST_LOG` 优先于配置里的 `log_level`。
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
    }
}

/// 安装全局 Prometheus recorder，返回用于渲染 `/metrics` 的句柄
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        STORE_TIER_ATTEMPTS,
        "Statement attempts per consistency tier and outcome"
    );
    metrics::describe_histogram!(
        STORE_TIER_ATTEMPT_DURATION,
        metrics::Unit::Seconds,
        "Latency of a single consistency-tier attempt"
    );
    metrics::describe_counter!(CACHE_LOOKUPS, "Cache-aside lookups by result");

    Ok(handle)
}
