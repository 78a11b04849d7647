//! # 会话子命令 CLI 定义
//!
//! `configure` 修改会话中的切面与 pw.x 参数；`show` 显示会话内容。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/session.rs`

use super::SessionArgs;
use crate::models::session::{Calculation, Occupations, Smearing};
use clap::{ArgAction, Args};

/// configure 子命令参数
#[derive(Args, Debug)]
pub struct ConfigureArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    // ── 表面模型 ──
    /// Miller index of the surface
    #[arg(long, num_args = 3, value_names = ["H", "K", "L"], allow_negative_numbers = true)]
    pub miller: Option<Vec<i32>>,

    /// Number of layers
    #[arg(long)]
    pub layers: Option<usize>,

    /// Vacuum thickness on each side (Å)
    #[arg(long)]
    pub vacuum: Option<f64>,

    /// Supercell for export only; never applied to pw.x inputs
    #[arg(long, num_args = 3, value_names = ["A", "B", "C"])]
    pub supercell: Option<Vec<usize>>,

    // ── pw.x ──
    #[arg(long, value_enum)]
    pub calculation: Option<Calculation>,

    /// Wavefunction cutoff (Ry)
    #[arg(long)]
    pub ecutwfc: Option<u32>,

    /// Charge-density cutoff (Ry)
    #[arg(long)]
    pub ecutrho: Option<u32>,

    /// Monkhorst-Pack mesh
    #[arg(long, num_args = 3, value_names = ["K1", "K2", "K3"])]
    pub kpoints: Option<Vec<u32>>,

    /// Use the k-point mesh for the slab too (otherwise 1 1 1)
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub override_kpoints: Option<bool>,

    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long)]
    pub outdir: Option<String>,

    /// Directory searched for pseudopotential files
    #[arg(long)]
    pub pp_search_folder: Option<String>,

    /// pseudo_dir written to the input (and copy destination)
    #[arg(long)]
    pub pp_input_folder: Option<String>,

    /// Copy pseudopotentials into pseudo_dir when generating
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub copy_pseudos: Option<bool>,

    #[arg(long)]
    pub conv_thr: Option<f64>,

    #[arg(long, value_enum)]
    pub occupations: Option<Occupations>,

    #[arg(long, value_enum)]
    pub smearing: Option<Smearing>,

    #[arg(long)]
    pub degauss: Option<f64>,

    /// 1 or 2
    #[arg(long)]
    pub nspin: Option<u32>,

    /// Number of bands (0 = let pw.x decide)
    #[arg(long)]
    pub nbnd: Option<u32>,

    /// starting_magnetization for the first species (up to 3)
    #[arg(long, num_args = 1..=3, value_names = ["M1", "M2", "M3"], allow_negative_numbers = true)]
    pub starting_mags: Option<Vec<f64>>,
}

/// show 子命令参数
#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Print the raw session JSON instead of tables
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
