//! ReplicatedStore 的 ScyllaDB / Cassandra 实现

use std::sync::Arc;

use async_trait::async_trait;
use bookshelf_ports::{ConsistencyTier, ReplicatedStore, Row, Statement, StoreError, StoreValue};
use scylla::Session;
use scylla::frame::response::result::CqlValue;
use scylla::query::Query;
use scylla::statement::Consistency;
use scylla::transport::errors::{DbError, QueryError};
use tracing::debug;

/// 一致性级别到 CQL consistency 的映射
pub fn tier_consistency(tier: ConsistencyTier) -> Consistency {
    match tier {
        ConsistencyTier::Strong => Consistency::Quorum,
        ConsistencyTier::RegionalQuorum => Consistency::LocalQuorum,
        ConsistencyTier::Minimal => Consistency::One,
    }
}

/// 基于共享会话的复制存储客户端
#[derive(Clone)]
pub struct ScyllaStore {
    session: Arc<Session>,
}

impl ScyllaStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ReplicatedStore for ScyllaStore {
    async fn execute(
        &self,
        statement: &Statement,
        tier: ConsistencyTier,
    ) -> Result<Vec<Row>, StoreError> {
        let mut query = Query::new(statement.cql());
        query.set_consistency(tier_consistency(tier));
        query.set_timestamp(statement.timestamp());

        let values: Vec<Option<CqlValue>> = statement.values().iter().map(to_cql).collect();

        debug!(cql = statement.cql(), tier = %tier, "Executing statement");

        let result = self
            .session
            .query_unpaged(query, values)
            .await
            .map_err(|e| classify_error(tier, e))?;

        Ok(result
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| Row::new(row.columns.into_iter().map(from_cql).collect()))
            .collect())
    }
}

/// 只有协调节点报告的 Unavailable 属于副本不足；
/// 超时、语法错误、连接失败都不会因降低一致性而好转
fn classify_error(tier: ConsistencyTier, error: QueryError) -> StoreError {
    match error {
        QueryError::DbError(DbError::Unavailable { required, alive, .. }, message) => {
            StoreError::InsufficientReplicas {
                tier,
                required: Some(required),
                alive: Some(alive),
                message,
            }
        }
        other => StoreError::Fault(other.to_string()),
    }
}

fn to_cql(value: &StoreValue) -> Option<CqlValue> {
    match value {
        StoreValue::Uuid(v) => Some(CqlValue::Uuid(*v)),
        StoreValue::Text(v) => Some(CqlValue::Text(v.clone())),
        StoreValue::Int(v) => Some(CqlValue::Int(*v)),
        StoreValue::BigInt(v) => Some(CqlValue::BigInt(*v)),
        StoreValue::Null => None,
    }
}

fn from_cql(value: Option<CqlValue>) -> StoreValue {
    match value {
        None => StoreValue::Null,
        Some(CqlValue::Uuid(v)) => StoreValue::Uuid(v),
        Some(CqlValue::Text(v)) | Some(CqlValue::Ascii(v)) => StoreValue::Text(v),
        Some(CqlValue::Int(v)) => StoreValue::Int(v),
        Some(CqlValue::BigInt(v)) => StoreValue::BigInt(v),
        // 表结构之外的类型（如 system.local 的 timeuuid）只用于探测
        Some(other) => StoreValue::Text(format!("{:?}", other)),
    }
}
