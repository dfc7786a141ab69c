//! books 表的 CQL 语句与行映射

use bookshelf_errors::{AppError, AppResult};
use bookshelf_ports::{Row, Statement};

use crate::domain::{Book, BookFields, BookId};

const INSERT_BOOK: &str = "INSERT INTO books (id, title, author, year) VALUES (?, ?, ?, ?)";
const SELECT_BOOK: &str =
    "SELECT id, title, author, year, WRITETIME(title) FROM books WHERE id = ?";
const SELECT_BOOK_ID: &str = "SELECT id FROM books WHERE id = ?";
const SELECT_ALL_BOOKS: &str = "SELECT id, title, author, year FROM books";
const UPDATE_BOOK: &str = "UPDATE books SET title = ?, author = ?, year = ? WHERE id = ?";
const DELETE_BOOK: &str = "DELETE FROM books WHERE id = ?";

/// 存储中的图书行，`written_at` 为 title 列的写时间戳（微秒）
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBook {
    pub book: Book,
    pub written_at: Option<i64>,
}

pub fn insert_book(book: &Book, timestamp: i64) -> Statement {
    Statement::new(INSERT_BOOK)
        .bind(book.id.as_uuid())
        .bind(book.title.as_str())
        .bind(book.author.as_str())
        .bind(book.year)
        .with_timestamp(timestamp)
}

pub fn select_book(id: BookId) -> Statement {
    Statement::new(SELECT_BOOK).bind(id.as_uuid())
}

pub fn select_book_id(id: BookId) -> Statement {
    Statement::new(SELECT_BOOK_ID).bind(id.as_uuid())
}

pub fn select_all_books() -> Statement {
    Statement::new(SELECT_ALL_BOOKS)
}

pub fn update_book(id: BookId, fields: &BookFields, timestamp: i64) -> Statement {
    Statement::new(UPDATE_BOOK)
        .bind(fields.title.as_str())
        .bind(fields.author.as_str())
        .bind(fields.year)
        .bind(id.as_uuid())
        .with_timestamp(timestamp)
}

pub fn delete_book(id: BookId, timestamp: i64) -> Statement {
    Statement::new(DELETE_BOOK)
        .bind(id.as_uuid())
        .with_timestamp(timestamp)
}

/// 把 `id, title, author, year[, writetime]` 行映射为图书
pub fn book_from_row(row: &Row) -> AppResult<StoredBook> {
    let id = BookId::from_uuid(row.uuid(0).map_err(AppError::from)?);
    let title = row.opt_text(1).map_err(AppError::from)?.unwrap_or_default();
    let author = row.opt_text(2).map_err(AppError::from)?.unwrap_or_default();
    let year = row.opt_int(3).map_err(AppError::from)?.unwrap_or_default();
    let written_at = if row.len() > 4 {
        row.opt_bigint(4).map_err(AppError::from)?
    } else {
        None
    };

    Ok(StoredBook {
        book: Book {
            id,
            title,
            author,
            year,
        },
        written_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_ports::StoreValue;

    #[test]
    fn test_update_binds_id_last() {
        let id = BookId::new();
        let statement = update_book(id, &BookFields::new("T2", "A", 2021), 42);

        assert_eq!(statement.values().last(), Some(&StoreValue::Uuid(id.as_uuid())));
        assert_eq!(statement.values().len(), 4);
        assert_eq!(statement.timestamp(), Some(42));
    }

    #[test]
    fn test_reads_carry_no_timestamp() {
        assert_eq!(select_book(BookId::new()).timestamp(), None);
        assert_eq!(select_all_books().values().len(), 0);
    }

    #[test]
    fn test_book_from_row_with_writetime() {
        let id = BookId::new();
        let row = Row::new(vec![
            StoreValue::Uuid(id.as_uuid()),
            StoreValue::Text("T".into()),
            StoreValue::Text("A".into()),
            StoreValue::Int(2020),
            StoreValue::BigInt(1_700_000_000_000_000),
        ]);

        let stored = book_from_row(&row).unwrap();
        assert_eq!(stored.book, Book::new(id, BookFields::new("T", "A", 2020)));
        assert_eq!(stored.written_at, Some(1_700_000_000_000_000));
    }

    #[test]
    fn test_book_from_row_tolerates_null_columns() {
        let id = BookId::new();
        let row = Row::new(vec![
            StoreValue::Uuid(id.as_uuid()),
            StoreValue::Null,
            StoreValue::Text("A".into()),
            StoreValue::Null,
        ]);

        let stored = book_from_row(&row).unwrap();
        assert_eq!(stored.book.title, "");
        assert_eq!(stored.book.year, 0);
        assert_eq!(stored.written_at, None);
    }

    #[test]
    fn test_book_from_row_rejects_wrong_types() {
        let row = Row::new(vec![StoreValue::Text("not a uuid".into())]);
        assert!(matches!(book_from_row(&row), Err(AppError::StoreFault(_))));
    }
}
