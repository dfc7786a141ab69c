//! 图书 CRUD 处理器
//!
//! 每个请求一个取消令牌。仓储调用在独立任务中运行：请求 future 被丢弃
//! （客户端断开或超时）时令牌被取消，未确认的写入不会再维护缓存，
//! 已确认的写入则让缓存维护跑完。

use std::future::Future;

use axum::Json;
use axum::extract::{Path, State};
use bookshelf_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ApiError, AppState};
use crate::domain::{Book, BookFields, BookId};

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub title: String,
    pub author: String,
    pub year: i32,
}

impl BookRequest {
    fn into_fields(self) -> AppResult<BookFields> {
        BookFields::new(self.title, self.author, self.year).validated()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: BookId,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// 在独立任务中运行仓储调用，返回前一直持有令牌的 drop guard
async fn cancellable<T, F, Fut>(operation: F) -> AppResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    tokio::spawn(operation(cancel))
        .await
        .map_err(|e| AppError::internal(format!("request task failed: {}", e)))?
}

fn parse_id(raw: &str) -> Result<BookId, ApiError> {
    Ok(raw.parse::<BookId>()?)
}

pub async fn create_book(
    State(state): State<AppState>,
    Json(request): Json<BookRequest>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let fields = request.into_fields()?;
    let repository = state.repository.clone();

    let book = cancellable(move |cancel| async move {
        repository.create(fields, &cancel).await
    })
    .await?;

    Ok(Json(CreatedResponse {
        id: book.id,
        message: "Book created".to_string(),
    }))
}

pub async fn list_books(State(state): State<AppState>) -> Result<Json<Vec<Book>>, ApiError> {
    let repository = state.repository.clone();

    let books = cancellable(move |cancel| async move { repository.read_all(&cancel).await }).await?;
    Ok(Json(books))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Book>, ApiError> {
    let id = parse_id(&id)?;
    let repository = state.repository.clone();

    let book =
        cancellable(move |cancel| async move { repository.read_one(id, &cancel).await }).await?;
    Ok(Json(book))
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BookRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    let fields = request.into_fields()?;
    let repository = state.repository.clone();

    cancellable(move |cancel| async move { repository.update(id, fields, &cancel).await })
        .await?;
    Ok(Json(MessageResponse::new("Book updated")))
}

pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    let repository = state.repository.clone();

    cancellable(move |cancel| async move { repository.delete(id, &cancel).await }).await?;
    Ok(Json(MessageResponse::new("Book deleted")))
}
