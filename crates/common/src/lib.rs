//! # Alpha Arena Common
//!
//! 公共类型、工具函数和常量定义

pub mod errors;
pub mod types;
pub mod utils;

pub use errors::{AppError, AppResult};
pub use types::*;
