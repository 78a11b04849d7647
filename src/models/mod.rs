//! # 数据模型模块
//!
//! 定义结构、会话和 pw.x 计算结果的数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `slab/`, `qe/`, `commands/` 使用
//! - 子模块: structure, elements, calculation, session

pub mod calculation;
pub mod elements;
pub mod session;
pub mod structure;

pub use calculation::{QeOutput, SurfaceEnergy};
pub use session::{Session, Target};
pub use structure::{Lattice, Structure};
