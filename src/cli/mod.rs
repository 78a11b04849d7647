//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - 结构: `load-bulk`, `build-slab`, `export-slab`
//! - 会话: `configure`, `show`
//! - 输入: `generate`
//! - 能量: `parse-output`, `load-output`, `surface-energy`, `scan`
//!
//! 除 `parse-output` 与 `scan` 外，所有命令都读写同一个会话文件 (`-s`)。
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: slab, session, input, energy

pub mod energy;
pub mod input;
pub mod session;
pub mod slab;

use crate::error::{Result, SlabQeError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// slabqe - Quantum ESPRESSO 表面模型与表面能工具
#[derive(Parser)]
#[command(name = "slabqe")]
#[command(version)]
#[command(
    about = "Build slab models, write Quantum ESPRESSO inputs and compute surface energies",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Load a bulk structure (.cif, .cell, POSCAR) into the session
    LoadBulk(slab::LoadBulkArgs),

    /// Cut a slab from the bulk structure along a Miller index
    BuildSlab(slab::BuildSlabArgs),

    /// Write the slab structure to a file, optionally as a supercell
    ExportSlab(slab::ExportSlabArgs),

    /// Change slab and pw.x parameters stored in the session
    Configure(session::ConfigureArgs),

    /// Show the session contents
    Show(session::ShowArgs),

    /// Generate a pw.x input file for the bulk or slab structure
    Generate(input::GenerateArgs),

    /// Parse a pw.x output file and print energy and atom count
    ParseOutput(energy::ParseOutputArgs),

    /// Record a pw.x output as the bulk or slab result
    LoadOutput(energy::LoadOutputArgs),

    /// Compute the surface energy from the recorded results
    SurfaceEnergy(energy::SurfaceEnergyArgs),

    /// Parse every pw.x output under a directory
    Scan(energy::ScanArgs),
}

/// 会话文件参数
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session file (JSON)
    #[arg(short = 's', long = "session", default_value = "session.json")]
    pub path: PathBuf,
}

/// 将 clap 收集的定长参数转换为数组
pub fn triple<T: Copy>(values: &[T], what: &str) -> Result<[T; 3]> {
    match values {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(SlabQeError::InvalidArgument(format!(
            "{} needs exactly 3 values, got {}",
            what,
            values.len()
        ))),
    }
}
