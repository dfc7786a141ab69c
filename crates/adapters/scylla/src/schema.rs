//! 键空间与表结构初始化
//!
//! 启动时执行一次，所有语句都是幂等的。

use bookshelf_errors::{AppError, AppResult};
use scylla::Session;
use tracing::info;

const CREATE_BOOKS_TABLE: &str = "CREATE TABLE IF NOT EXISTS books (
    id uuid PRIMARY KEY,
    title text,
    author text,
    year int
)";

/// 结构初始化器
#[derive(Debug, Clone)]
pub struct SchemaBootstrapper {
    keyspace: String,
    replication_factor: usize,
}

impl SchemaBootstrapper {
    /// 键空间名只允许字母、数字和下划线，且以字母开头
    pub fn new(keyspace: impl Into<String>, replication_factor: usize) -> AppResult<Self> {
        let keyspace = keyspace.into();
        let valid = keyspace
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && keyspace.len() <= 48
            && keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid {
            return Err(AppError::validation(format!(
                "invalid keyspace name: {:?}",
                keyspace
            )));
        }

        Ok(Self {
            keyspace,
            replication_factor: replication_factor.max(1),
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn create_keyspace_cql(&self) -> String {
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': {}}} AND durable_writes = true",
            self.keyspace, self.replication_factor
        )
    }

    pub fn create_table_cql(&self) -> &'static str {
        CREATE_BOOKS_TABLE
    }

    /// 创建键空间和表，然后把会话切换到该键空间
    pub async fn ensure(&self, session: &Session) -> AppResult<()> {
        info!(
            keyspace = %self.keyspace,
            replication_factor = self.replication_factor,
            "Creating/verifying keyspace"
        );
        session
            .query_unpaged(self.create_keyspace_cql(), ())
            .await
            .map_err(|e| AppError::store_fault(format!("Failed to create keyspace: {}", e)))?;

        session
            .use_keyspace(self.keyspace.as_str(), false)
            .await
            .map_err(|e| AppError::store_fault(format!("Failed to use keyspace: {}", e)))?;

        session
            .query_unpaged(CREATE_BOOKS_TABLE, ())
            .await
            .map_err(|e| AppError::store_fault(format!("Failed to create books table: {}", e)))?;

        info!(keyspace = %self.keyspace, "Schema ready");
        Ok(())
    }
}
