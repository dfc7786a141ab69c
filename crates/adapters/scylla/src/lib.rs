//! bookshelf-adapter-scylla - Cassandra / ScyllaDB 复制存储适配器

mod schema;
mod session;
mod store;

pub use schema::*;
pub use session::*;
pub use store::*;
