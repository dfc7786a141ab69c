//! 一致性降级执行器
//!
//! 按从强到弱的顺序尝试一致性级别：只有副本不足才降级重试，
//! 其他故障立即返回。级别严格串行尝试，不并发竞速。

use std::sync::Arc;
use std::time::{Duration, Instant};

use bookshelf_errors::{AppError, AppResult};
use bookshelf_ports::{ConsistencyTier, ReplicatedStore, Row, Statement, StoreError};
use bookshelf_telemetry::{STORE_TIER_ATTEMPTS, STORE_TIER_ATTEMPT_DURATION};
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 一条已排序、去重、非空的一致性降级链
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierChain(Vec<ConsistencyTier>);

impl TierChain {
    /// 按强到弱排序并去重；空列表是配置错误
    pub fn new(tiers: impl IntoIterator<Item = ConsistencyTier>) -> AppResult<Self> {
        let mut tiers: Vec<ConsistencyTier> = tiers.into_iter().collect();
        tiers.sort();
        tiers.dedup();

        if tiers.is_empty() {
            return Err(AppError::validation(
                "consistency tier list must contain at least one tier",
            ));
        }
        Ok(Self(tiers))
    }

    /// 完整降级链 Strong → RegionalQuorum → Minimal
    pub fn full() -> Self {
        Self(ConsistencyTier::ALL.to_vec())
    }

    /// 只包含单个级别
    pub fn single(tier: ConsistencyTier) -> Self {
        Self(vec![tier])
    }

    /// 从配置里的级别名解析
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> AppResult<Self> {
        let tiers = names
            .iter()
            .map(|name| name.as_ref().parse::<ConsistencyTier>())
            .collect::<AppResult<Vec<_>>>()?;
        Self::new(tiers)
    }

    pub fn tiers(&self) -> &[ConsistencyTier] {
        &self.0
    }
}

/// 读写各自使用的降级链
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyPolicy {
    pub reads: TierChain,
    pub writes: TierChain,
}

impl ConsistencyPolicy {
    pub fn new(reads: TierChain, writes: TierChain) -> Self {
        Self { reads, writes }
    }

    pub fn from_names<S: AsRef<str>>(reads: &[S], writes: &[S]) -> AppResult<Self> {
        Ok(Self {
            reads: TierChain::from_names(reads)?,
            writes: TierChain::from_names(writes)?,
        })
    }
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self {
            reads: TierChain::full(),
            writes: TierChain::full(),
        }
    }
}

/// 单次尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    InsufficientReplicas,
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::InsufficientReplicas => "insufficient_replicas",
            Self::Failed => "failed",
        }
    }
}

/// 单次尝试记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAttempt {
    pub tier: ConsistencyTier,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// 执行成功的结果，附带最终生效的级别和完整尝试链
#[derive(Debug, Clone)]
pub struct Executed {
    pub rows: Vec<Row>,
    pub tier: ConsistencyTier,
    pub attempts: Vec<TierAttempt>,
}

/// 一致性降级执行器
#[derive(Clone)]
pub struct TieredExecutor {
    store: Arc<dyn ReplicatedStore>,
}

impl TieredExecutor {
    pub fn new(store: Arc<dyn ReplicatedStore>) -> Self {
        Self { store }
    }

    /// 依次在降级链的每个级别上执行同一条语句
    ///
    /// - 副本不足：换下一个级别
    /// - 其他故障：立即返回 `StoreFault`
    /// - 全部级别副本不足：返回 `StoreUnavailable`
    /// - 取消：返回 `Cancelled`，写语句的结果未知
    pub async fn execute(
        &self,
        statement: &Statement,
        tiers: &TierChain,
        cancel: &CancellationToken,
    ) -> AppResult<Executed> {
        let mut attempts = Vec::with_capacity(tiers.tiers().len());
        let mut last_shortfall: Option<StoreError> = None;

        for &tier in tiers.tiers() {
            if cancel.is_cancelled() {
                return Err(cancelled(tier));
            }

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(cql = statement.cql(), tier = %tier, "Statement cancelled in flight, outcome unknown");
                    return Err(cancelled(tier));
                }
                result = self.store.execute(statement, tier) => result,
            };
            let elapsed = started.elapsed();

            match result {
                Ok(rows) => {
                    record(&mut attempts, tier, AttemptOutcome::Succeeded, elapsed);
                    if attempts.len() > 1 {
                        info!(
                            cql = statement.cql(),
                            tier = %tier,
                            attempts = attempts.len(),
                            "Statement succeeded at degraded consistency"
                        );
                    } else {
                        debug!(cql = statement.cql(), tier = %tier, "Statement succeeded");
                    }
                    return Ok(Executed {
                        rows,
                        tier,
                        attempts,
                    });
                }
                Err(e) if e.is_insufficient_replicas() => {
                    record(&mut attempts, tier, AttemptOutcome::InsufficientReplicas, elapsed);
                    warn!(
                        cql = statement.cql(),
                        tier = %tier,
                        error = %e,
                        "Insufficient replicas, falling back to weaker consistency"
                    );
                    last_shortfall = Some(e);
                }
                Err(e) => {
                    record(&mut attempts, tier, AttemptOutcome::Failed, elapsed);
                    error!(cql = statement.cql(), tier = %tier, error = %e, "Statement failed");
                    return Err(AppError::store_fault(e.to_string()));
                }
            }
        }

        let chain = attempts
            .iter()
            .map(|a| a.tier.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        let last = last_shortfall.map(|e| e.to_string()).unwrap_or_default();
        error!(cql = statement.cql(), chain = %chain, "All consistency tiers exhausted");

        Err(AppError::store_unavailable(format!(
            "all consistency tiers exhausted ({}): {}",
            chain, last
        )))
    }
}

fn cancelled(tier: ConsistencyTier) -> AppError {
    AppError::cancelled(format!("statement cancelled at tier {}", tier))
}

fn record(
    attempts: &mut Vec<TierAttempt>,
    tier: ConsistencyTier,
    outcome: AttemptOutcome,
    elapsed: Duration,
) {
    counter!(
        STORE_TIER_ATTEMPTS,
        "tier" => tier.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(STORE_TIER_ATTEMPT_DURATION, "tier" => tier.as_str())
        .record(elapsed.as_secs_f64());

    attempts.push(TierAttempt {
        tier,
        outcome,
        elapsed,
    });
}
