//! bookshelf-bootstrap - 统一服务启动骨架
//!
//! 配置加载、日志与指标初始化、存储和缓存连接、结构初始化、HTTP 服务与优雅关闭

mod infrastructure;
mod runtime;
mod starter;

pub use infrastructure::*;
pub use runtime::*;
pub use starter::*;
