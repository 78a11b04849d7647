//! # 赝势模块
//!
//! 为结构中的元素查找赝势文件，并按需复制到 `pseudo_dir`。
//!
//! ## 依赖关系
//! - 被 `commands/input.rs` 使用
//! - 子模块: resolver, copy

pub mod copy;
pub mod resolver;

pub use copy::{copy_pseudos, CopyAction};
pub use resolver::{resolve_pseudos, PseudoMap};
