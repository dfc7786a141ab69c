//! Redis 连接

use bookshelf_errors::{AppError, AppResult};
use redis::Client;
use redis::aio::ConnectionManager;

/// 建立共享连接
///
/// URL 解析失败属于配置错误（`Validation`），启动重试不会再试；
/// 连接失败则是暂时性的。`ConnectionManager` 断线后自动重连。
pub async fn create_connection_manager(url: &str) -> AppResult<ConnectionManager> {
    let client =
        Client::open(url).map_err(|e| AppError::validation(format!("Invalid cache URL: {}", e)))?;

    ConnectionManager::new(client)
        .await
        .map_err(|e| AppError::internal(format!("Cache unreachable: {}", e)))
}

/// PING，应答必须是 PONG
pub async fn check_connection(conn: &mut ConnectionManager) -> AppResult<()> {
    let reply: String = redis::cmd("PING")
        .query_async(conn)
        .await
        .map_err(|e| AppError::internal(format!("Cache ping failed: {}", e)))?;

    if reply != "PONG" {
        return Err(AppError::internal(format!(
            "Unexpected cache ping reply: {}",
            reply
        )));
    }
    Ok(())
}
