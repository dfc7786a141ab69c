//! 集成测试共用的内存存储与缓存

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bookshelf_errors::{AppError, AppResult};
use bookshelf_ports::{
    CachePort, ConsistencyTier, ReplicatedStore, Row, Statement, StoreError, StoreValue,
};
use catalog::domain::{BookFields, BookId};
use catalog::infrastructure::persistence::{CachedBookRepository, ConsistencyPolicy};
use tokio::sync::Notify;
use uuid::Uuid;

pub const TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct StoredRow {
    title: String,
    author: String,
    year: i32,
    written_at: i64,
}

/// 读取暂停点：读到快照后通知 `reached`，等待 `release` 再返回
pub struct ReadGate {
    pub reached: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// 按时间戳最后写入胜出的内存 books 表
///
/// 识别仓储发出的 CQL 语句，可按级别模拟副本不足。
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<Uuid, StoredRow>>,
    tombstones: Mutex<HashMap<Uuid, i64>>,
    unavailable: Mutex<HashSet<ConsistencyTier>>,
    faulty: AtomicBool,
    hang_mutations: AtomicBool,
    read_gate: Mutex<Option<ReadGate>>,
    calls: Mutex<Vec<(String, ConsistencyTier)>>,
    mutations: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 这些级别返回副本不足
    pub fn set_unavailable(&self, tiers: &[ConsistencyTier]) {
        *self.unavailable.lock().unwrap() = tiers.iter().copied().collect();
    }

    /// 所有语句返回非副本类故障
    pub fn set_faulty(&self, faulty: bool) {
        self.faulty.store(faulty, Ordering::SeqCst);
    }

    /// 写语句永不返回，用于模拟进行中的写入被取消
    pub fn hang_mutations(&self, hang: bool) {
        self.hang_mutations.store(hang, Ordering::SeqCst);
    }

    /// 下一次按 ID 读取在返回前暂停
    pub fn gate_next_read(&self) -> (Arc<Notify>, Arc<Notify>) {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.read_gate.lock().unwrap() = Some(ReadGate {
            reached: reached.clone(),
            release: release.clone(),
        });
        (reached, release)
    }

    /// 已应用的写语句数
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// 执行过的语句中以 `prefix` 开头的条数
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(cql, _)| cql.starts_with(prefix))
            .count()
    }

    pub fn tiers_used(&self) -> Vec<ConsistencyTier> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    /// 绕过仓储直接写入一行
    pub fn seed(&self, id: BookId, fields: &BookFields, written_at: i64) {
        self.rows.lock().unwrap().insert(
            id.as_uuid(),
            StoredRow {
                title: fields.title.clone(),
                author: fields.author.clone(),
                year: fields.year,
                written_at,
            },
        );
    }

    /// 绕过仓储直接删除一行
    pub fn remove_directly(&self, id: BookId) {
        self.rows.lock().unwrap().remove(&id.as_uuid());
    }

    pub fn title_of(&self, id: BookId) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .get(&id.as_uuid())
            .map(|row| row.title.clone())
    }

    fn upsert(&self, id: Uuid, title: String, author: String, year: i32, ts: i64) {
        if self
            .tombstones
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|deleted_at| *deleted_at >= ts)
        {
            return;
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.get(&id).is_some_and(|row| row.written_at > ts) {
            return;
        }
        rows.insert(
            id,
            StoredRow {
                title,
                author,
                year,
                written_at: ts,
            },
        );
    }

    fn apply_mutation(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let cql = statement.cql();
        let values = statement.values();
        let ts = statement
            .timestamp()
            .ok_or_else(|| StoreError::fault("mutation without write timestamp"))?;

        if cql.starts_with("INSERT INTO books") {
            self.upsert(
                uuid_at(values, 0)?,
                text_at(values, 1)?,
                text_at(values, 2)?,
                int_at(values, 3)?,
                ts,
            );
        } else if cql.starts_with("UPDATE books") {
            self.upsert(
                uuid_at(values, 3)?,
                text_at(values, 0)?,
                text_at(values, 1)?,
                int_at(values, 2)?,
                ts,
            );
        } else if cql.starts_with("DELETE FROM books") {
            let id = uuid_at(values, 0)?;
            let mut rows = self.rows.lock().unwrap();
            if rows.get(&id).is_none_or(|row| row.written_at <= ts) {
                rows.remove(&id);
            }
            self.tombstones.lock().unwrap().insert(id, ts);
        } else {
            return Err(StoreError::fault(format!("unsupported statement: {}", cql)));
        }

        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn query(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let cql = statement.cql();
        let values = statement.values();
        let rows = self.rows.lock().unwrap();

        if cql.starts_with("SELECT now() FROM system.local") {
            return Ok(vec![Row::new(vec![StoreValue::Text("now".into())])]);
        }
        if cql.starts_with("SELECT id FROM books WHERE id") {
            let id = uuid_at(values, 0)?;
            return Ok(rows
                .get(&id)
                .map(|_| Row::new(vec![StoreValue::Uuid(id)]))
                .into_iter()
                .collect());
        }
        if cql.starts_with("SELECT id, title, author, year, WRITETIME(title) FROM books WHERE id") {
            let id = uuid_at(values, 0)?;
            return Ok(rows
                .get(&id)
                .map(|row| {
                    let mut columns = book_columns(id, row);
                    columns.push(StoreValue::BigInt(row.written_at));
                    Row::new(columns)
                })
                .into_iter()
                .collect());
        }
        if cql == "SELECT id, title, author, year FROM books" {
            return Ok(rows
                .iter()
                .map(|(id, row)| Row::new(book_columns(*id, row)))
                .collect());
        }
        Err(StoreError::fault(format!("unsupported statement: {}", cql)))
    }
}

fn book_columns(id: Uuid, row: &StoredRow) -> Vec<StoreValue> {
    vec![
        StoreValue::Uuid(id),
        StoreValue::Text(row.title.clone()),
        StoreValue::Text(row.author.clone()),
        StoreValue::Int(row.year),
    ]
}

fn uuid_at(values: &[StoreValue], index: usize) -> Result<Uuid, StoreError> {
    match values.get(index) {
        Some(StoreValue::Uuid(v)) => Ok(*v),
        other => Err(StoreError::fault(format!("expected uuid, got {:?}", other))),
    }
}

fn text_at(values: &[StoreValue], index: usize) -> Result<String, StoreError> {
    match values.get(index) {
        Some(StoreValue::Text(v)) => Ok(v.clone()),
        other => Err(StoreError::fault(format!("expected text, got {:?}", other))),
    }
}

fn int_at(values: &[StoreValue], index: usize) -> Result<i32, StoreError> {
    match values.get(index) {
        Some(StoreValue::Int(v)) => Ok(*v),
        other => Err(StoreError::fault(format!("expected int, got {:?}", other))),
    }
}

fn is_mutation(cql: &str) -> bool {
    ["INSERT", "UPDATE", "DELETE"]
        .iter()
        .any(|verb| cql.starts_with(verb))
}

#[async_trait]
impl ReplicatedStore for InMemoryStore {
    async fn execute(
        &self,
        statement: &Statement,
        tier: ConsistencyTier,
    ) -> Result<Vec<Row>, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((statement.cql().to_string(), tier));

        if self.faulty.load(Ordering::SeqCst) {
            return Err(StoreError::fault("connection reset by peer"));
        }
        if self.unavailable.lock().unwrap().contains(&tier) {
            return Err(StoreError::insufficient_replicas(
                tier,
                "Cannot achieve consistency level",
            ));
        }

        if is_mutation(statement.cql()) {
            if self.hang_mutations.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            return self.apply_mutation(statement);
        }

        let rows = self.query(statement)?;

        let gate = if statement.cql().contains("WRITETIME") {
            self.read_gate.lock().unwrap().take()
        } else {
            None
        };
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        Ok(rows)
    }
}

/// 带 TTL 与版本条件写入的内存缓存
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    broken: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 模拟缓存整体不可用
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone())
    }

    /// 缓存里的 `value` 字段
    pub fn cached_value(&self, key: &str) -> Option<serde_json::Value> {
        self.raw(key)
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .map(|entry| entry["value"].clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// 绕过仓储直接写入
    pub fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + TTL));
    }

    fn check(&self) -> AppResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(AppError::internal("Redis connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CachePort for InMemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check()?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_newer(
        &self,
        key: &str,
        value: &str,
        version: i64,
        ttl: Duration,
    ) -> AppResult<bool> {
        self.check()?;
        let current = self
            .raw(key)
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|entry| entry["version"].as_i64());
        if current.is_some_and(|current| current >= version) {
            return Ok(false);
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.check()?;
        Ok(self.contains(key))
    }

    async fn ping(&self) -> AppResult<()> {
        self.check()
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<InMemoryCache>,
    pub repository: Arc<CachedBookRepository>,
}

pub fn fixture() -> Fixture {
    fixture_with_policy(ConsistencyPolicy::default())
}

pub fn fixture_with_policy(policy: ConsistencyPolicy) -> Fixture {
    let store = InMemoryStore::new();
    let cache = InMemoryCache::new();
    let repository = Arc::new(CachedBookRepository::new(
        store.clone(),
        cache.clone(),
        policy,
        TTL,
    ));
    Fixture {
        store,
        cache,
        repository,
    }
}
