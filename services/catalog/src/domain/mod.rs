//! 领域层

mod book;
mod repository;

pub use book::*;
pub use repository::*;
