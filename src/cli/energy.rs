//! # 能量相关子命令 CLI 定义
//!
//! `parse-output`, `load-output`, `surface-energy`, `scan`
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/energy.rs`, `commands/scan.rs`

use super::SessionArgs;
use crate::models::session::Target;
use clap::Args;
use std::path::PathBuf;

/// parse-output 子命令参数
#[derive(Args, Debug)]
pub struct ParseOutputArgs {
    /// pw.x output file
    pub file: PathBuf,

    /// Fall back to the last number in the final 200 lines when no '!' energy line exists
    #[arg(long, default_value_t = false)]
    pub allow_fallback: bool,
}

/// load-output 子命令参数
#[derive(Args, Debug)]
pub struct LoadOutputArgs {
    /// pw.x output file
    pub file: PathBuf,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Record the output as the bulk or slab result
    #[arg(short, long, value_enum)]
    pub target: Target,

    /// Fall back to the last number in the final 200 lines when no '!' energy line exists
    #[arg(long, default_value_t = false)]
    pub allow_fallback: bool,
}

/// surface-energy 子命令参数
#[derive(Args, Debug)]
pub struct SurfaceEnergyArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

/// scan 子命令参数
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory (or single file) to scan
    pub input: PathBuf,

    /// Filename patterns, comma separated
    #[arg(short, long, default_value = "*.out")]
    pub pattern: String,

    /// Search subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Fall back to the last number in the final 200 lines when no '!' energy line exists
    #[arg(long, default_value_t = false)]
    pub allow_fallback: bool,

    /// Save the table as CSV
    #[arg(long)]
    pub output_csv: Option<PathBuf>,
}
