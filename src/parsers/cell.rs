//! # CASTEP .cell 格式解析器
//!
//! 读取 CASTEP .cell 中的晶格与原子位置，用作体相输入；也用于导出表面模型。
//!
//! ## .cell 格式说明
//! ```text
//! %BLOCK LATTICE_CART
//! ang
//! a1 a2 a3
//! b1 b2 b3
//! c1 c2 c3
//! %ENDBLOCK LATTICE_CART
//!
//! %BLOCK POSITIONS_FRAC
//! Element x y z
//! ...
//! %ENDBLOCK POSITIONS_FRAC
//! ```
//! 晶格可为 `LATTICE_CART` 或 `LATTICE_ABC`，位置可为 `POSITIONS_FRAC` 或 `POSITIONS_ABS`；
//! 单位行支持 `ang`、`bohr`、`nm`。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `commands/slab.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{Result, SlabQeError};
use crate::models::elements::element_from_label;
use crate::models::{Lattice, Structure};
use std::fs;
use std::path::Path;

const BOHR_TO_ANG: f64 = 0.529177210903;

/// 解析 .cell 文件
pub fn parse_cell_file(path: &Path) -> Result<Structure> {
    let content = fs::read_to_string(path).map_err(|e| SlabQeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_cell_content(&content).map_err(|reason| SlabQeError::ParseError {
        format: "cell".to_string(),
        path: path.display().to_string(),
        reason,
    })
}

/// 从字符串内容解析 .cell 格式
pub fn parse_cell_content(content: &str) -> std::result::Result<Structure, String> {
    let lines: Vec<&str> = content.lines().collect();

    let lattice = if let Some(body) = block_lines(&lines, "LATTICE_CART") {
        parse_lattice_cart(&body)?
    } else if let Some(body) = block_lines(&lines, "LATTICE_ABC") {
        parse_lattice_abc(&body)?
    } else {
        return Err("Missing LATTICE_CART or LATTICE_ABC block".to_string());
    };

    if let Some(body) = block_lines(&lines, "POSITIONS_FRAC") {
        let atoms = parse_positions(&body)?.0;
        Structure::from_fractional(lattice, atoms).map_err(|e| e.to_string())
    } else if let Some(body) = block_lines(&lines, "POSITIONS_ABS") {
        let (atoms, scale) = parse_positions(&body)?;
        let (symbols, positions) = atoms
            .into_iter()
            .map(|(el, p)| (el, [p[0] * scale, p[1] * scale, p[2] * scale]))
            .unzip();
        Structure::new(symbols, positions, lattice, [true; 3]).map_err(|e| e.to_string())
    } else {
        Err("Missing POSITIONS_FRAC or POSITIONS_ABS block".to_string())
    }
}

/// `%BLOCK NAME` 与 `%ENDBLOCK NAME` 之间的非注释行
fn block_lines<'a>(lines: &[&'a str], block_name: &str) -> Option<Vec<&'a str>> {
    let start = lines.iter().position(|l| {
        let mut words = l.split_whitespace();
        matches!(words.next(), Some(w) if w.eq_ignore_ascii_case("%BLOCK"))
            && matches!(words.next(), Some(w) if w.eq_ignore_ascii_case(block_name))
    })?;

    Some(
        lines[start + 1..]
            .iter()
            .copied()
            .map(str::trim)
            .take_while(|l| !l.to_uppercase().starts_with("%ENDBLOCK"))
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
            .collect(),
    )
}

/// 单位行换算为 Å 的系数；不是单位行时返回 `None`
fn unit_scale(line: &str) -> Option<f64> {
    match line.to_ascii_lowercase().as_str() {
        "ang" | "angstrom" => Some(1.0),
        "bohr" | "a0" => Some(BOHR_TO_ANG),
        "nm" => Some(10.0),
        _ => None,
    }
}

/// 去掉单位行，返回 (剩余行, 系数)
fn split_unit<'a>(body: &[&'a str]) -> (Vec<&'a str>, f64) {
    match body.first().and_then(|l| unit_scale(l)) {
        Some(scale) => (body[1..].to_vec(), scale),
        None => (body.to_vec(), 1.0),
    }
}

fn numbers(line: &str) -> Vec<f64> {
    line.split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// 解析 LATTICE_CART 块
fn parse_lattice_cart(body: &[&str]) -> std::result::Result<Lattice, String> {
    let (rows, scale) = split_unit(body);
    let mut matrix = [[0.0; 3]; 3];
    let mut row_idx = 0;

    for line in rows {
        let parts = numbers(line);
        if parts.len() >= 3 && row_idx < 3 {
            matrix[row_idx] = [parts[0] * scale, parts[1] * scale, parts[2] * scale];
            row_idx += 1;
        }
    }

    if row_idx < 3 {
        return Err("Incomplete LATTICE_CART block".to_string());
    }
    Ok(Lattice::from_vectors(matrix))
}

/// 解析 LATTICE_ABC 块
fn parse_lattice_abc(body: &[&str]) -> std::result::Result<Lattice, String> {
    let (rows, scale) = split_unit(body);
    let params: Vec<f64> = rows.iter().flat_map(|l| numbers(l)).collect();

    if params.len() < 6 {
        return Err("Incomplete LATTICE_ABC block (need a b c alpha beta gamma)".to_string());
    }

    Ok(Lattice::from_parameters(
        params[0] * scale,
        params[1] * scale,
        params[2] * scale,
        params[3],
        params[4],
        params[5],
    ))
}

/// 解析原子位置块，返回 (原子, 长度单位系数)
fn parse_positions(body: &[&str]) -> std::result::Result<(Vec<(String, [f64; 3])>, f64), String> {
    let (rows, scale) = split_unit(body);
    let mut atoms = Vec::with_capacity(rows.len());

    for line in rows {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        // "Fe:1" 之类的自定义标签
        let element = element_from_label(parts[0])
            .ok_or_else(|| format!("Unknown species '{}'", parts[0]))?;
        let coords: Vec<f64> = parts[1..4].iter().filter_map(|s| s.parse().ok()).collect();
        if coords.len() == 3 {
            atoms.push((element, [coords[0], coords[1], coords[2]]));
        }
    }

    if atoms.is_empty() {
        return Err("Position block contains no atoms".to_string());
    }
    Ok((atoms, scale))
}

/// 将结构转换为 .cell 格式字符串
pub fn to_cell_string(structure: &Structure) -> Result<String> {
    let m = structure.cell.matrix;
    let frac = structure.scaled_positions()?;

    let mut result = String::new();

    // LATTICE_CART 块
    result.push_str("%BLOCK LATTICE_CART\nang\n");
    for row in &m {
        result.push_str(&format!(
            "{:16.10} {:16.10} {:16.10}\n",
            row[0], row[1], row[2]
        ));
    }
    result.push_str("%ENDBLOCK LATTICE_CART\n\n");

    // POSITIONS_FRAC 块
    result.push_str("%BLOCK POSITIONS_FRAC\n");
    for (el, f) in structure.symbols.iter().zip(&frac) {
        result.push_str(&format!(
            "{:4} {:16.10} {:16.10} {:16.10}\n",
            el, f[0], f[1], f[2]
        ));
    }
    result.push_str("%ENDBLOCK POSITIONS_FRAC\n");

    Ok(result)
}
