//! 图书仓储接口

use async_trait::async_trait;
use bookshelf_errors::AppResult;
use tokio_util::sync::CancellationToken;

use super::{Book, BookFields, BookId};

/// 图书仓储接口
///
/// 每个操作都接收调用方的取消令牌。写操作被取消时结果未知，返回 `Cancelled`。
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// 新建图书，返回带新 ID 的实体
    async fn create(&self, fields: BookFields, cancel: &CancellationToken) -> AppResult<Book>;

    /// 按 ID 读取，不存在时返回 `NotFound`
    async fn read_one(&self, id: BookId, cancel: &CancellationToken) -> AppResult<Book>;

    /// 读取全部图书
    async fn read_all(&self, cancel: &CancellationToken) -> AppResult<Vec<Book>>;

    /// 更新图书，不存在时返回 `NotFound` 且不做任何写入
    async fn update(
        &self,
        id: BookId,
        fields: BookFields,
        cancel: &CancellationToken,
    ) -> AppResult<Book>;

    /// 删除图书，不存在时返回 `NotFound`
    async fn delete(&self, id: BookId, cancel: &CancellationToken) -> AppResult<()>;
}
