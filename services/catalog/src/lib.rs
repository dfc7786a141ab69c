//! catalog - 图书目录服务
//!
//! 复制存储 + 分布式缓存之上的 Book CRUD。

pub mod api;
pub mod domain;
pub mod infrastructure;
