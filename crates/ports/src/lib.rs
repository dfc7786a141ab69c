//! ports - 抽象 trait 层
//!
//! 定义复制存储与分布式缓存的抽象接口

mod cache;
mod store;

pub use cache::*;
pub use store::*;
