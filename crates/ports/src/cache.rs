//! Cache trait 定义

use async_trait::async_trait;
use bookshelf_errors::AppResult;
use std::time::Duration;

/// 缓存 trait
///
/// 所有写入都必须带 TTL，没有永不过期的条目。
#[async_trait]
pub trait CachePort: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 设置缓存值
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// 带版本的条件写入
    ///
    /// `value` 是顶层带 `version` 字段的 JSON 对象。只有当现有条目不存在、
    /// 不带版本或版本小于 `version` 时才写入；返回是否写入。
    async fn set_if_newer(
        &self,
        key: &str,
        value: &str,
        version: i64,
        ttl: Duration,
    ) -> AppResult<bool>;

    /// 删除缓存
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 检查是否存在
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// 连通性探测
    async fn ping(&self) -> AppResult<()>;
}
