//! bookshelf-adapter-redis - Redis 缓存适配器

mod cache;
mod connection;

pub use cache::*;
pub use connection::*;
