//! # 测试框架模块
//!
//! 测试辅助函数

pub mod helpers;

pub use helpers::*;
