//! # 批量处理模块
//!
//! 提供统一的文件收集能力。
//!
//! ## 功能
//! - 自动检测输入类型（文件/目录）
//! - 收集匹配文件列表
//!
//! ## 依赖关系
//! - 被 `commands/scan.rs` 使用
//! - 使用 `walkdir`, `glob`

pub mod collector;

pub use collector::FileCollector;
