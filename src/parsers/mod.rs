//! # 解析器模块
//!
//! 提供结构文件 (CIF, .cell, POSCAR) 和 pw.x 输出的解析器。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: cif, cell, poscar, qe_out

pub mod cell;
pub mod cif;
pub mod poscar;
pub mod qe_out;

use crate::error::{Result, SlabQeError};
use crate::models::Structure;
use std::path::Path;

/// 从文件路径推断格式并解析
pub fn parse_structure_file(path: &Path) -> Result<Structure> {
    if !path.is_file() {
        return Err(SlabQeError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "cif" => cif::parse_cif_file(path),
        "cell" => cell::parse_cell_file(path),
        "vasp" | "poscar" => poscar::parse_poscar_file(path),
        _ => {
            // 可能是 POSCAR/CONTCAR (无扩展名)
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("POSCAR") || name.starts_with("CONTCAR") {
                    return poscar::parse_poscar_file(path);
                }
            }
            Err(SlabQeError::UnsupportedFormat(format!(
                "Cannot determine format for: {}",
                path.display()
            )))
        }
    }
}
