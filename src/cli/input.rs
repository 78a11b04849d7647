//! # generate 子命令 CLI 定义
//!
//! 生成 pw.x 输入文件
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/input.rs`

use super::SessionArgs;
use crate::models::session::Target;
use clap::Args;
use std::path::PathBuf;

/// generate 子命令参数
#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Which structure to write
    #[arg(short, long, value_enum)]
    pub target: Target,

    /// Output file (default: <prefix>_<target>.in)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory searched for pseudopotentials (overrides the session)
    #[arg(long)]
    pub pseudo_search: Option<PathBuf>,

    /// Explicit pseudopotential for an element, e.g. --pseudo Fe=/pp/Fe.UPF
    #[arg(long = "pseudo", value_name = "EL=PATH", value_parser = parse_assignment)]
    pub pseudos: Vec<(String, PathBuf)>,

    /// Copy pseudopotentials into pseudo_dir
    #[arg(long, overrides_with = "no_copy_pseudos")]
    pub copy_pseudos: bool,

    /// Do not copy pseudopotentials
    #[arg(long, overrides_with = "copy_pseudos")]
    pub no_copy_pseudos: bool,

    /// pseudo_dir written to the input (overrides the session)
    #[arg(long)]
    pub pseudo_dir: Option<String>,

    /// Prompt for pseudopotentials that could not be found
    #[arg(short, long, default_value_t = false)]
    pub interactive: bool,
}

impl GenerateArgs {
    /// 命令行显式指定时覆盖会话中的 copy_pseudos
    pub fn copy_override(&self) -> Option<bool> {
        match (self.copy_pseudos, self.no_copy_pseudos) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// 解析 `EL=PATH`
fn parse_assignment(s: &str) -> std::result::Result<(String, PathBuf), String> {
    let (el, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected EL=PATH, got '{}'", s))?;
    let el = el.trim();
    if el.is_empty() || path.trim().is_empty() {
        return Err(format!("expected EL=PATH, got '{}'", s));
    }
    Ok((el.to_string(), PathBuf::from(path.trim())))
}
