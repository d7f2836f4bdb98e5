//! 数据库智能体公共模块
//!
//! 配置、错误类型、共享模型、统一响应格式与中间件。

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;

pub use errors::{AppError, AppResult};
