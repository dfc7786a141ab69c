//! 启动期重试
//!
//! 存储会话、键空间初始化、缓存连接这类一次性操作在依赖尚未就绪时
//! 按指数退避重试。请求路径上不做重试：一致性降级由执行器负责。

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 退避策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最大尝试次数（含第一次），0 按 1 处理
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// 单次等待上限
    pub max_delay: Duration,
    #[serde(default = "default_factor")]
    pub multiplier: f64,
}

fn default_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    /// 五次尝试，四次退避合计约 7.5 秒
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: default_factor(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier: default_factor(),
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// 第 `failures` 次失败后的等待时间（从 0 计），封顶 `max_delay`
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let scaled_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        if !scaled_ms.is_finite() || scaled_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(scaled_ms.max(0.0) as u64)
    }

    /// 每次失败后依次等待的时长，长度为 `max_attempts - 1`
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts() - 1).map(|n| self.delay_for_attempt(n))
    }
}

/// 所有错误都重试
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, name: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_conditional_retry(config, name, operation, |_| true).await
}

/// 只重试 `is_transient` 认可的错误，其余错误立即返回
pub async fn with_conditional_retry<F, Fut, T, E, P>(
    config: &RetryConfig,
    name: &str,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let total = config.attempts();
    let mut delays = config.delays();
    let mut attempt: u32 = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = name, attempt, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_transient(&error) {
            warn!(operation = name, attempt, error = %error, "Permanent failure, not retrying");
            return Err(error);
        }

        let Some(delay) = delays.next() else {
            warn!(operation = name, attempt, total, error = %error, "Giving up");
            return Err(error);
        };

        warn!(
            operation = name,
            attempt,
            total,
            error = %error,
            backoff_ms = delay.as_millis() as u64,
            "Transient failure, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryConfig {
        RetryConfig::new(3, Duration::from_millis(5), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_store_comes_up_on_third_attempt() {
        let calls = AtomicU32::new(0);

        let result: Result<&str, String> = with_retry(&quick(), "store connect", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("connection refused ({})", n))
                } else {
                    Ok("session")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "session");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = with_retry(&quick(), "cache connect", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("refused #{}", n)) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "refused #2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = with_conditional_retry(
            &quick(),
            "schema bootstrap",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("invalid keyspace name") }
            },
            |e| e.contains("refused"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let config = RetryConfig {
            max_attempts: 0,
            ..quick()
        };
        let calls = AtomicU32::new(0);

        let _: Result<(), &str> = with_retry(&config, "noop", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(config.delays().count(), 0);
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let config = RetryConfig::new(5, Duration::from_millis(100), Duration::from_millis(300));

        let schedule: Vec<_> = config.delays().collect();
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_millis(300));
    }
}
