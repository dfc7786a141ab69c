//! 复制存储 trait 定义
//!
//! 存储客户端只负责在指定一致性级别上执行一条语句，
//! 并把"副本不足"与其他故障区分开，降级策略由调用方决定。

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bookshelf_errors::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 一致性级别，按从强到弱排序
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyTier {
    /// 全部副本的多数确认
    Strong,
    /// 本地数据中心内的多数确认
    RegionalQuorum,
    /// 单副本确认
    Minimal,
}

impl ConsistencyTier {
    /// 完整的降级链
    pub const ALL: [ConsistencyTier; 3] = [
        ConsistencyTier::Strong,
        ConsistencyTier::RegionalQuorum,
        ConsistencyTier::Minimal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::RegionalQuorum => "regional_quorum",
            Self::Minimal => "minimal",
        }
    }
}

impl fmt::Display for ConsistencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strong" | "quorum" => Ok(Self::Strong),
            "regional_quorum" | "local_quorum" => Ok(Self::RegionalQuorum),
            "minimal" | "one" => Ok(Self::Minimal),
            other => Err(AppError::validation(format!(
                "unknown consistency tier: {}",
                other
            ))),
        }
    }
}

/// 语句参数与结果列的值
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Uuid(Uuid),
    Text(String),
    Int(i32),
    BigInt(i64),
    Null,
}

impl From<Uuid> for StoreValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i32> for StoreValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        Self::BigInt(value)
    }
}

/// 参数化语句
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    cql: String,
    values: Vec<StoreValue>,
    /// 写时间戳（微秒），存储以此做最后写入胜出
    timestamp: Option<i64>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            values: Vec::new(),
            timestamp: None,
        }
    }

    /// 追加一个位置参数
    pub fn bind(mut self, value: impl Into<StoreValue>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp_micros: i64) -> Self {
        self.timestamp = Some(timestamp_micros);
        self
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    pub fn values(&self) -> &[StoreValue] {
        &self.values
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

/// 结果行，列顺序与 SELECT 列表一致
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<StoreValue>,
}

impl Row {
    pub fn new(columns: Vec<StoreValue>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn column(&self, index: usize) -> Result<&StoreValue, StoreError> {
        self.columns
            .get(index)
            .ok_or_else(|| StoreError::Decode(format!("missing column {}", index)))
    }

    pub fn uuid(&self, index: usize) -> Result<Uuid, StoreError> {
        match self.column(index)? {
            StoreValue::Uuid(v) => Ok(*v),
            other => Err(mismatch(index, "uuid", other)),
        }
    }

    /// 文本列，NULL 返回 None
    pub fn opt_text(&self, index: usize) -> Result<Option<String>, StoreError> {
        match self.column(index)? {
            StoreValue::Text(v) => Ok(Some(v.clone())),
            StoreValue::Null => Ok(None),
            other => Err(mismatch(index, "text", other)),
        }
    }

    /// int 列，NULL 返回 None
    pub fn opt_int(&self, index: usize) -> Result<Option<i32>, StoreError> {
        match self.column(index)? {
            StoreValue::Int(v) => Ok(Some(*v)),
            StoreValue::Null => Ok(None),
            other => Err(mismatch(index, "int", other)),
        }
    }

    /// bigint 列，NULL 返回 None
    pub fn opt_bigint(&self, index: usize) -> Result<Option<i64>, StoreError> {
        match self.column(index)? {
            StoreValue::BigInt(v) => Ok(Some(*v)),
            StoreValue::Null => Ok(None),
            other => Err(mismatch(index, "bigint", other)),
        }
    }
}

fn mismatch(index: usize, expected: &str, actual: &StoreValue) -> StoreError {
    StoreError::Decode(format!(
        "column {} expected {}, got {:?}",
        index, expected, actual
    ))
}

/// 存储错误
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// 该一致性级别要求的副本数无法满足，可在更弱的级别重试
    #[error("insufficient replicas at {tier}: {message}")]
    InsufficientReplicas {
        tier: ConsistencyTier,
        required: Option<i32>,
        alive: Option<i32>,
        message: String,
    },

    /// 其他故障，降低一致性无济于事
    #[error("{0}")]
    Fault(String),

    /// 结果行与预期列类型不符
    #[error("row decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn insufficient_replicas(tier: ConsistencyTier, message: impl Into<String>) -> Self {
        Self::InsufficientReplicas {
            tier,
            required: None,
            alive: None,
            message: message.into(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    pub fn is_insufficient_replicas(&self) -> bool {
        matches!(self, Self::InsufficientReplicas { .. })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientReplicas { .. } => AppError::store_unavailable(err.to_string()),
            StoreError::Fault(_) | StoreError::Decode(_) => AppError::store_fault(err.to_string()),
        }
    }
}

/// 复制存储客户端
///
/// 实现必须可被多个请求并发共享。
#[async_trait]
pub trait ReplicatedStore: Send + Sync {
    /// 在指定一致性级别执行一条语句
    async fn execute(
        &self,
        statement: &Statement,
        tier: ConsistencyTier,
    ) -> Result<Vec<Row>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_order_strongest_first() {
        let mut tiers = vec![
            ConsistencyTier::Minimal,
            ConsistencyTier::Strong,
            ConsistencyTier::RegionalQuorum,
        ];
        tiers.sort();
        assert_eq!(tiers, ConsistencyTier::ALL.to_vec());
    }

    #[test]
    fn test_tier_parsing_accepts_cql_names() {
        assert_eq!("Strong".parse::<ConsistencyTier>().unwrap(), ConsistencyTier::Strong);
        assert_eq!(
            "LOCAL_QUORUM".parse::<ConsistencyTier>().unwrap(),
            ConsistencyTier::RegionalQuorum
        );
        assert_eq!(
            "regional-quorum".parse::<ConsistencyTier>().unwrap(),
            ConsistencyTier::RegionalQuorum
        );
        assert_eq!("one".parse::<ConsistencyTier>().unwrap(), ConsistencyTier::Minimal);
        assert!("all".parse::<ConsistencyTier>().is_err());
    }

    #[test]
    fn test_row_accessors() {
        let id = Uuid::new_v4();
        let row = Row::new(vec![
            StoreValue::Uuid(id),
            StoreValue::Text("Dune".into()),
            StoreValue::Null,
            StoreValue::Int(1965),
        ]);

        assert_eq!(row.uuid(0).unwrap(), id);
        assert_eq!(row.opt_text(1).unwrap().as_deref(), Some("Dune"));
        assert_eq!(row.opt_text(2).unwrap(), None);
        assert_eq!(row.opt_int(3).unwrap(), Some(1965));
        assert!(matches!(row.opt_int(1), Err(StoreError::Decode(_))));
        assert!(matches!(row.uuid(9), Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_statement_builder() {
        let id = Uuid::new_v4();
        let stmt = Statement::new("DELETE FROM books WHERE id = ?")
            .bind(id)
            .with_timestamp(42);

        assert_eq!(stmt.values(), &[StoreValue::Uuid(id)]);
        assert_eq!(stmt.timestamp(), Some(42));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: AppError =
            StoreError::insufficient_replicas(ConsistencyTier::Minimal, "1 required, 0 alive")
                .into();
        assert!(matches!(err, AppError::StoreUnavailable(_)));

        let err: AppError = StoreError::fault("syntax error").into();
        assert!(matches!(err, AppError::StoreFault(_)));
    }
}
