//! # 结构相关子命令 CLI 定义
//!
//! `load-bulk`, `build-slab`, `export-slab`
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/slab.rs`

use super::SessionArgs;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// load-bulk 子命令参数
#[derive(Args, Debug)]
pub struct LoadBulkArgs {
    /// Structure file (.cif, .cell, .vasp, POSCAR*, CONTCAR*)
    pub structure: PathBuf,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// build-slab 子命令参数
#[derive(Args, Debug)]
pub struct BuildSlabArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Miller index of the surface (stored in the session)
    #[arg(long, num_args = 3, value_names = ["H", "K", "L"], allow_negative_numbers = true)]
    pub miller: Option<Vec<i32>>,

    /// Number of layers (stored in the session)
    #[arg(long)]
    pub layers: Option<usize>,

    /// Vacuum thickness on each side in Å (stored in the session)
    #[arg(long)]
    pub vacuum: Option<f64>,
}

/// 导出格式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ExportFormat {
    /// P1 CIF
    Cif,
    /// Extended-free XYZ (Cartesian Å)
    Xyz,
    /// VASP 5 POSCAR
    Poscar,
    /// CASTEP .cell
    Cell,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Cif => write!(f, "cif"),
            ExportFormat::Xyz => write!(f, "xyz"),
            ExportFormat::Poscar => write!(f, "poscar"),
            ExportFormat::Cell => write!(f, "cell"),
        }
    }
}

/// export-slab 子命令参数
#[derive(Args, Debug)]
pub struct ExportSlabArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format (default: from the output file extension, else cif)
    #[arg(short, long, value_enum)]
    pub format: Option<ExportFormat>,

    /// Supercell repeats (default: the session supercell)
    #[arg(long, num_args = 3, value_names = ["A", "B", "C"])]
    pub supercell: Option<Vec<usize>>,
}
