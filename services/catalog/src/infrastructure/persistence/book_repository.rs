//! 带缓存的图书仓储
//!
//! 写路径先完成存储写入，再维护缓存；被取消的写入结果未知，不触碰缓存。
//! 每次写入携带客户端时间戳，存储按时间戳最后写入胜出，单本图书的缓存条目
//! 也按同一时间戳做版本条件写入，因此并发写入后缓存只会是最新值或缺失。
//! 删除写入同样带版本的缺失标记，删除前读到旧行的读者无法回填。

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bookshelf_errors::{AppError, AppResult};
use bookshelf_ports::{CachePort, ReplicatedStore};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::statements::{
    book_from_row, delete_book, insert_book, select_all_books, select_book, select_book_id,
    update_book,
};
use super::tiered_executor::{ConsistencyPolicy, TieredExecutor};
use crate::domain::{Book, BookFields, BookId, BookRepository};
use crate::infrastructure::cache::{BOOKS_ALL_KEY, CacheAsideStore, book_key};

/// 图书仓储：一致性降级执行器 + cache-aside 缓存
#[derive(Clone)]
pub struct CachedBookRepository {
    executor: TieredExecutor,
    cache: CacheAsideStore,
    policy: ConsistencyPolicy,
    ttl: Duration,
    clock: Arc<WriteClock>,
}

impl CachedBookRepository {
    pub fn new(
        store: Arc<dyn ReplicatedStore>,
        cache: Arc<dyn CachePort>,
        policy: ConsistencyPolicy,
        ttl: Duration,
    ) -> Self {
        Self {
            executor: TieredExecutor::new(store),
            cache: CacheAsideStore::new(cache),
            policy,
            ttl,
            clock: Arc::new(WriteClock::default()),
        }
    }

    /// 绕过缓存，按写入的降级链确认图书存在
    async fn ensure_exists(&self, id: BookId, cancel: &CancellationToken) -> AppResult<()> {
        let executed = self
            .executor
            .execute(&select_book_id(id), &self.policy.writes, cancel)
            .await?;

        if executed.rows.is_empty() {
            return Err(AppError::not_found(format!("book {}", id)));
        }
        Ok(())
    }
}

/// 单调递增的写时间戳（微秒）
///
/// 同一微秒内的多次写入依次加一，本进程的写入不会出现相同时间戳。
#[derive(Debug, Default)]
struct WriteClock {
    last: AtomicI64,
}

impl WriteClock {
    fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

#[async_trait]
impl BookRepository for CachedBookRepository {
    #[instrument(skip(self, fields, cancel))]
    async fn create(&self, fields: BookFields, cancel: &CancellationToken) -> AppResult<Book> {
        let book = Book::new(BookId::new(), fields);
        let timestamp = self.clock.next();

        let executed = self
            .executor
            .execute(&insert_book(&book, timestamp), &self.policy.writes, cancel)
            .await?;

        self.cache
            .set_versioned(&book_key(book.id), &book, timestamp, self.ttl)
            .await;
        self.cache.remove(BOOKS_ALL_KEY).await;

        info!(book_id = %book.id, tier = %executed.tier, "Book created");
        Ok(book)
    }

    #[instrument(skip(self, cancel))]
    async fn read_one(&self, id: BookId, cancel: &CancellationToken) -> AppResult<Book> {
        self.cache
            .get_or_compute_versioned(&book_key(id), self.ttl, move || async move {
                let executed = self
                    .executor
                    .execute(&select_book(id), &self.policy.reads, cancel)
                    .await?;

                let row = executed
                    .rows
                    .first()
                    .ok_or_else(|| AppError::not_found(format!("book {}", id)))?;
                let stored = book_from_row(row)?;

                debug!(book_id = %id, tier = %executed.tier, "Book loaded from store");
                Ok((stored.book, stored.written_at))
            })
            .await
    }

    #[instrument(skip(self, cancel))]
    async fn read_all(&self, cancel: &CancellationToken) -> AppResult<Vec<Book>> {
        self.cache
            .get_or_compute(BOOKS_ALL_KEY, self.ttl, move || async move {
                let executed = self
                    .executor
                    .execute(&select_all_books(), &self.policy.reads, cancel)
                    .await?;

                let books = executed
                    .rows
                    .iter()
                    .map(|row| book_from_row(row).map(|stored| stored.book))
                    .collect::<AppResult<Vec<_>>>()?;

                debug!(count = books.len(), tier = %executed.tier, "Books loaded from store");
                Ok(books)
            })
            .await
    }

    #[instrument(skip(self, fields, cancel))]
    async fn update(
        &self,
        id: BookId,
        fields: BookFields,
        cancel: &CancellationToken,
    ) -> AppResult<Book> {
        self.ensure_exists(id, cancel).await?;

        let timestamp = self.clock.next();
        let executed = self
            .executor
            .execute(&update_book(id, &fields, timestamp), &self.policy.writes, cancel)
            .await?;

        let book = Book::new(id, fields);
        self.cache
            .set_versioned(&book_key(id), &book, timestamp, self.ttl)
            .await;
        self.cache.remove(BOOKS_ALL_KEY).await;

        info!(book_id = %id, tier = %executed.tier, "Book updated");
        Ok(book)
    }

    #[instrument(skip(self, cancel))]
    async fn delete(&self, id: BookId, cancel: &CancellationToken) -> AppResult<()> {
        self.ensure_exists(id, cancel).await?;

        let timestamp = self.clock.next();
        let executed = self
            .executor
            .execute(&delete_book(id, timestamp), &self.policy.writes, cancel)
            .await?;

        self.cache
            .mark_absent(&book_key(id), timestamp, self.ttl)
            .await;
        self.cache.remove(BOOKS_ALL_KEY).await;

        info!(book_id = %id, tier = %executed.tier, "Book deleted");
        Ok(())
    }
}
