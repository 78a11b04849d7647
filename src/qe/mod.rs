//! # Quantum ESPRESSO 输入模块
//!
//! ## 依赖关系
//! - 被 `commands/input.rs` 使用
//! - 子模块: input

pub mod input;

pub use input::{pseudo_dir_layout, render_input};
