//! Redis Cache 实现

use async_trait::async_trait;
use bookshelf_errors::{AppError, AppResult};
use bookshelf_ports::CachePort;

use crate::connection::check_connection;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use std::time::Duration;

/// 条件写入脚本：现有条目版本不小于新版本时放弃写入
///
/// 非 JSON 或不带数字 `version` 的旧条目直接覆盖。
const SET_IF_NEWER_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if current then
    local ok, decoded = pcall(cjson.decode, current)
    if ok and type(decoded) == 'table' then
        local existing = tonumber(decoded['version'])
        if existing and existing >= tonumber(ARGV[2]) then
            return 0
        end
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
return 1
";

/// Redis Cache
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: Option<String>,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: None,
        }
    }

    /// 多个服务共用一个 Redis 时用前缀隔离键空间
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// 获取带前缀的键
    pub fn prefixed_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

fn failed(op: &'static str) -> impl FnOnce(RedisError) -> AppError {
    move |e| AppError::internal(format!("Redis {} failed: {}", op, e))
}

/// Redis 的 EX 参数至少为 1 秒
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.prefixed_key(key))
            .await
            .map_err(failed("get"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex(self.prefixed_key(key), value, ttl_secs(ttl))
            .await
            .map_err(failed("set"))
    }

    async fn set_if_newer(
        &self,
        key: &str,
        value: &str,
        version: i64,
        ttl: Duration,
    ) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let written: i64 = Script::new(SET_IF_NEWER_SCRIPT)
            .key(self.prefixed_key(key))
            .arg(value)
            .arg(version)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(failed("set_if_newer"))?;

        Ok(written == 1)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del(self.prefixed_key(key))
            .await
            .map_err(failed("delete"))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(self.prefixed_key(key))
            .await
            .map_err(failed("exists"))
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        check_connection(&mut conn).await
    }
}
