//! 缓存键

use crate::domain::BookId;

/// 全部图书的集合视图
pub const BOOKS_ALL_KEY: &str = "books:all";

/// 单本图书
pub fn book_key(id: BookId) -> String {
    format!("book:{}", id)
}
