//! 持久化：一致性降级执行器与图书仓储

mod book_repository;
mod statements;
mod tiered_executor;

pub use book_repository::*;
pub use statements::*;
pub use tiered_executor::*;
