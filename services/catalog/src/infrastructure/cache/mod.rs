//! Cache-aside 缓存层

mod cache_aside;
mod keys;

pub use cache_aside::*;
pub use keys::*;
