//! Cache-aside 存储
//!
//! 缓存只是性能层：任何缓存错误都按未命中处理，写入失败只记录日志。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bookshelf_errors::AppResult;
use bookshelf_ports::CachePort;
use bookshelf_telemetry::CACHE_LOOKUPS;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 缓存条目的 JSON 形态
///
/// `version` 是写入时间戳（微秒），只有单本图书的条目携带。
/// `value` 为 `null` 的带版本条目是删除留下的缺失标记，读取时按未命中处理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub value: T,
}

/// Cache-aside 存储
#[derive(Clone)]
pub struct CacheAsideStore {
    cache: Arc<dyn CachePort>,
}

impl CacheAsideStore {
    pub fn new(cache: Arc<dyn CachePort>) -> Self {
        Self { cache }
    }

    /// 读取缓存，错误和解码失败都当作未命中
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                lookup("miss");
                return None;
            }
            Err(e) => {
                lookup("error");
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry<Option<T>>>(&raw) {
            Ok(CacheEntry { value: Some(value), .. }) => {
                lookup("hit");
                debug!(key = %key, "Cache hit");
                Some(value)
            }
            Ok(CacheEntry { value: None, version }) => {
                lookup("miss");
                debug!(key = %key, ?version, "Absence marker, treating as miss");
                None
            }
            Err(e) => {
                lookup("error");
                warn!(key = %key, error = %e, "Cached value is undecodable, treating as miss");
                None
            }
        }
    }

    /// 无条件写入
    pub async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(payload) = encode(key, value, None) else {
            return;
        };
        if let Err(e) = self.cache.set(key, &payload, ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    /// 带版本写入：已有相同或更新版本的条目时不覆盖
    pub async fn set_versioned<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        version: i64,
        ttl: Duration,
    ) {
        let Some(payload) = encode(key, value, Some(version)) else {
            return;
        };
        match self.cache.set_if_newer(key, &payload, version, ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(key = %key, version, "Cache already holds a newer value, skipped");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Versioned cache write failed");
            }
        }
    }

    /// 写入带版本的缺失标记，挡住删除前读到旧行的慢读者回填
    ///
    /// 标记写入失败时退回直接删除。
    pub async fn mark_absent(&self, key: &str, version: i64, ttl: Duration) {
        let Some(payload) = encode(key, &None::<()>, Some(version)) else {
            self.remove(key).await;
            return;
        };
        match self.cache.set_if_newer(key, &payload, version, ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(key = %key, version, "Cache already holds a newer value, marker skipped");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Absence marker write failed, removing entry");
                self.remove(key).await;
            }
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!(key = %key, error = %e, "Cache delete failed");
        }
    }

    /// 命中直接返回；未命中调用 loader 并回填。loader 失败时不缓存任何内容。
    ///
    /// 同一 key 的并发未命中可能都会调用 loader。
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = loader().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// 同 [`get_or_compute`](Self::get_or_compute)，loader 额外返回版本号；
    /// 有版本时按版本条件回填，避免慢读者覆盖更新的写入
    pub async fn get_or_compute_versioned<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<(T, Option<i64>)>> + Send,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let (value, version) = loader().await?;
        match version {
            Some(version) => self.set_versioned(key, &value, version, ttl).await,
            None => self.set(key, &value, ttl).await,
        }
        Ok(value)
    }
}

fn encode<T: Serialize>(key: &str, value: &T, version: Option<i64>) -> Option<String> {
    match serde_json::to_string(&CacheEntry { version, value }) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to encode cache entry");
            None
        }
    }
}

fn lookup(result: &'static str) {
    counter!(CACHE_LOOKUPS, "result" => result).increment(1);
}
