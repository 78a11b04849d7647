//! # CIF 格式解析器
//!
//! 读取晶体学 CIF 文件（单个 data block），写出 P1 CIF。
//!
//! ## 支持内容
//! - `_cell_length_*` / `_cell_angle_*`，数值可带不确定度括号 `5.640(2)`
//! - `_atom_site_fract_x/y/z` 循环；元素取自 `_atom_site_type_symbol`，
//!   缺失时从 `_atom_site_label` 推断
//! - `_symmetry_equiv_pos_as_xyz` 或 `_space_group_symop_operation_xyz` 对称操作展开，
//!   分数坐标在 1e-4 容差内去重
//! - 单/双引号字符串、`;` 多行文本、`#` 注释
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `commands/slab.rs` 使用
//! - 使用 `models/structure.rs`, `models/elements.rs`

use crate::error::{Result, SlabQeError};
use crate::models::elements::element_from_label;
use crate::models::{Lattice, Structure};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 对称展开后判定重复原子的分数坐标容差
const DUP_TOL: f64 = 1e-4;

const SYMOP_TAGS: &[&str] = &[
    "_symmetry_equiv_pos_as_xyz",
    "_space_group_symop_operation_xyz",
];

/// 解析 CIF 文件
pub fn parse_cif_file(path: &Path) -> Result<Structure> {
    let content = fs::read_to_string(path).map_err(|e| SlabQeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_cif_content(&content).map_err(|reason| SlabQeError::ParseError {
        format: "cif".to_string(),
        path: path.display().to_string(),
        reason,
    })
}

// ─────────────────────────────────────────────────────────────
// 词法分析
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    /// 引号或文本块中的值，不会被当作标签或关键字
    quoted: bool,
}

impl Token {
    fn is_tag(&self) -> bool {
        !self.quoted && self.text.starts_with('_')
    }

    fn is_keyword(&self) -> bool {
        if self.quoted {
            return false;
        }
        let lower = self.text.to_ascii_lowercase();
        lower == "loop_" || lower.starts_with("data_") || lower.starts_with("save_")
    }
}

fn tokenize(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        // 多行文本块
        if let Some(first) = line.strip_prefix(';') {
            let mut text = first.to_string();
            for next in lines.by_ref() {
                if next.starts_with(';') {
                    break;
                }
                text.push('\n');
                text.push_str(next);
            }
            tokens.push(Token {
                text: text.trim().to_string(),
                quoted: true,
            });
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
            } else if c == '#' {
                break;
            } else if c == '\'' || c == '"' {
                // 引号只在其后为空白或行尾时闭合
                let mut j = i + 1;
                while j < chars.len()
                    && !(chars[j] == c && chars.get(j + 1).map_or(true, |n| n.is_whitespace()))
                {
                    j += 1;
                }
                tokens.push(Token {
                    text: chars[i + 1..j.min(chars.len())].iter().collect(),
                    quoted: true,
                });
                i = j + 1;
            } else {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                tokens.push(Token {
                    text: chars[start..i].iter().collect(),
                    quoted: false,
                });
            }
        }
    }

    tokens
}

// ─────────────────────────────────────────────────────────────
// 数据块
// ─────────────────────────────────────────────────────────────

/// 单值标签与循环表
#[derive(Debug, Default)]
struct CifBlock {
    items: HashMap<String, String>,
    loops: Vec<CifLoop>,
}

#[derive(Debug)]
struct CifLoop {
    tags: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CifLoop {
    fn column(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }
}

impl CifBlock {
    fn parse(tokens: &[Token]) -> std::result::Result<Self, String> {
        let mut block = CifBlock::default();
        let mut i = 0;
        let mut seen_data = false;

        while i < tokens.len() {
            let tok = &tokens[i];
            let lower = tok.text.to_ascii_lowercase();

            if !tok.quoted && lower.starts_with("data_") {
                // 只读取第一个 data block
                if seen_data {
                    break;
                }
                seen_data = true;
                i += 1;
            } else if !tok.quoted && lower == "loop_" {
                i += 1;
                let mut tags = Vec::new();
                while i < tokens.len() && tokens[i].is_tag() {
                    tags.push(tokens[i].text.to_ascii_lowercase());
                    i += 1;
                }
                let mut values = Vec::new();
                while i < tokens.len() && !tokens[i].is_tag() && !tokens[i].is_keyword() {
                    values.push(tokens[i].text.clone());
                    i += 1;
                }
                if tags.is_empty() {
                    continue;
                }
                if values.len() % tags.len() != 0 {
                    return Err(format!(
                        "loop with {} tags has {} values",
                        tags.len(),
                        values.len()
                    ));
                }
                let rows = values.chunks(tags.len()).map(|c| c.to_vec()).collect();
                block.loops.push(CifLoop { tags, rows });
            } else if tok.is_tag() {
                match tokens.get(i + 1) {
                    Some(value) if !value.is_tag() && !value.is_keyword() => {
                        block.items.insert(lower, value.text.clone());
                        i += 2;
                    }
                    _ => return Err(format!("tag {} has no value", tok.text)),
                }
            } else {
                i += 1;
            }
        }

        Ok(block)
    }

    fn find_loop(&self, tag: &str) -> Option<&CifLoop> {
        self.loops.iter().find(|l| l.column(tag).is_some())
    }

    fn number(&self, tag: &str) -> std::result::Result<f64, String> {
        let raw = self
            .items
            .get(tag)
            .ok_or_else(|| format!("missing tag {}", tag))?;
        parse_cif_float(raw).ok_or_else(|| format!("invalid number for {}: {}", tag, raw))
    }
}

/// 去掉不确定度括号："1.234(5)" → 1.234
fn parse_cif_float(s: &str) -> Option<f64> {
    s.split('(').next().unwrap_or(s).trim().parse().ok()
}

// ─────────────────────────────────────────────────────────────
// 对称操作
// ─────────────────────────────────────────────────────────────

/// 仿射操作 f' = R·f + t
#[derive(Debug, Clone, PartialEq)]
pub struct SymOp {
    pub rot: [[f64; 3]; 3],
    pub trans: [f64; 3],
}

impl SymOp {
    pub fn identity() -> Self {
        SymOp {
            rot: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            trans: [0.0; 3],
        }
    }

    /// 解析 `x,y+1/2,-z` 形式的操作
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let term_re = Regex::new(r"[+-]?[^+-]+").map_err(|e| e.to_string())?;
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '"')
            .collect::<String>()
            .to_ascii_lowercase();

        let parts: Vec<&str> = cleaned.split(',').collect();
        if parts.len() != 3 {
            return Err(format!("symmetry operation '{}' must have 3 components", text));
        }

        let mut op = SymOp {
            rot: [[0.0; 3]; 3],
            trans: [0.0; 3],
        };
        for (row, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(format!("empty component in symmetry operation '{}'", text));
            }
            for term in term_re.find_iter(part).map(|m| m.as_str()) {
                let axis = match term.chars().last() {
                    Some('x') => Some(0),
                    Some('y') => Some(1),
                    Some('z') => Some(2),
                    _ => None,
                };
                match axis {
                    Some(col) => {
                        let coef = term[..term.len() - 1].trim_end_matches('*');
                        op.rot[row][col] += parse_coefficient(coef)
                            .ok_or_else(|| format!("bad term '{}' in '{}'", term, text))?;
                    }
                    None => {
                        op.trans[row] += parse_fraction(term)
                            .ok_or_else(|| format!("bad term '{}' in '{}'", term, text))?;
                    }
                }
            }
        }
        Ok(op)
    }

    pub fn apply(&self, f: [f64; 3]) -> [f64; 3] {
        let mut out = self.trans;
        for (i, o) in out.iter_mut().enumerate() {
            *o += self.rot[i][0] * f[0] + self.rot[i][1] * f[1] + self.rot[i][2] * f[2];
        }
        out
    }
}

fn parse_coefficient(s: &str) -> Option<f64> {
    match s {
        "" | "+" => Some(1.0),
        "-" => Some(-1.0),
        _ => parse_fraction(s),
    }
}

/// "1/2"、"-0.25"、"+3/4"
fn parse_fraction(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num.parse::<f64>().ok()? / den)
        }
        None => s.parse().ok(),
    }
}

// ─────────────────────────────────────────────────────────────
// 结构组装
// ─────────────────────────────────────────────────────────────

/// 从字符串内容解析 CIF；错误原因以字符串返回，由调用方补充路径
pub fn parse_cif_content(content: &str) -> std::result::Result<Structure, String> {
    let block = CifBlock::parse(&tokenize(content))?;

    let lattice = Lattice::from_parameters(
        block.number("_cell_length_a")?,
        block.number("_cell_length_b")?,
        block.number("_cell_length_c")?,
        block.number("_cell_angle_alpha")?,
        block.number("_cell_angle_beta")?,
        block.number("_cell_angle_gamma")?,
    );
    if lattice.volume().abs() < 1e-8 {
        return Err("cell volume is zero".to_string());
    }

    let sites = block
        .find_loop("_atom_site_fract_x")
        .ok_or("no _atom_site_fract_x loop found")?;
    let col = |tag: &str| {
        sites
            .column(tag)
            .ok_or_else(|| format!("atom site loop lacks {}", tag))
    };
    let (ix, iy, iz) = (
        col("_atom_site_fract_x")?,
        col("_atom_site_fract_y")?,
        col("_atom_site_fract_z")?,
    );
    let i_type = sites.column("_atom_site_type_symbol");
    let i_label = sites.column("_atom_site_label");

    let mut asym: Vec<(String, [f64; 3])> = Vec::with_capacity(sites.rows.len());
    for row in &sites.rows {
        let raw = i_type
            .or(i_label)
            .map(|i| row[i].as_str())
            .ok_or("atom site loop has neither type symbol nor label")?;
        let element = element_from_label(raw)
            .ok_or_else(|| format!("cannot determine element from '{}'", raw))?;

        let coord = |i: usize| {
            parse_cif_float(&row[i]).ok_or_else(|| format!("invalid coordinate '{}'", row[i]))
        };
        asym.push((element, [coord(ix)?, coord(iy)?, coord(iz)?]));
    }
    if asym.is_empty() {
        return Err("no atoms found".to_string());
    }

    let ops = symmetry_operations(&block)?;
    Structure::from_fractional(lattice, expand_symmetry(&asym, &ops)).map_err(|e| e.to_string())
}

fn symmetry_operations(block: &CifBlock) -> std::result::Result<Vec<SymOp>, String> {
    for tag in SYMOP_TAGS {
        if let Some(lp) = block.find_loop(tag) {
            let idx = lp.column(tag).ok_or("symmetry loop lost its column")?;
            return lp.rows.iter().map(|r| SymOp::parse(&r[idx])).collect();
        }
        if let Some(text) = block.items.get(*tag) {
            return Ok(vec![SymOp::parse(text)?]);
        }
    }
    Ok(vec![SymOp::identity()])
}

/// 对每个不对称单元原子施加全部操作，折回 [0, 1) 并去重
fn expand_symmetry(asym: &[(String, [f64; 3])], ops: &[SymOp]) -> Vec<(String, [f64; 3])> {
    let mut atoms: Vec<(String, [f64; 3])> = Vec::new();

    for (element, f) in asym {
        for op in ops {
            let mut p = op.apply(*f);
            for x in p.iter_mut() {
                *x -= x.floor();
                if *x >= 1.0 - 1e-12 {
                    *x = 0.0;
                }
            }

            let duplicate = atoms.iter().any(|(_, q)| {
                (0..3).all(|k| {
                    let d = p[k] - q[k];
                    (d - d.round()).abs() < DUP_TOL
                })
            });
            if !duplicate {
                atoms.push((element.clone(), p));
            }
        }
    }

    atoms
}

// ─────────────────────────────────────────────────────────────
// 写出
// ─────────────────────────────────────────────────────────────

/// 转换为 P1 CIF 格式
pub fn to_cif_string(structure: &Structure, name: &str) -> Result<String> {
    let (a, b, c, alpha, beta, gamma) = structure.cell.parameters();
    let frac = structure.scaled_positions()?;

    let mut result = String::new();
    result.push_str(&format!("data_{}\n", name.replace(' ', "_")));
    result.push_str("_symmetry_space_group_name_H-M    'P 1'\n");
    result.push_str("_symmetry_Int_Tables_number       1\n\n");

    result.push_str(&format!("_cell_length_a    {:.6}\n", a));
    result.push_str(&format!("_cell_length_b    {:.6}\n", b));
    result.push_str(&format!("_cell_length_c    {:.6}\n", c));
    result.push_str(&format!("_cell_angle_alpha {:.4}\n", alpha));
    result.push_str(&format!("_cell_angle_beta  {:.4}\n", beta));
    result.push_str(&format!("_cell_angle_gamma {:.4}\n\n", gamma));

    result.push_str("loop_\n");
    result.push_str("_symmetry_equiv_pos_as_xyz\n");
    result.push_str("  'x, y, z'\n\n");

    result.push_str("loop_\n");
    result.push_str("_atom_site_label\n");
    result.push_str("_atom_site_type_symbol\n");
    result.push_str("_atom_site_fract_x\n");
    result.push_str("_atom_site_fract_y\n");
    result.push_str("_atom_site_fract_z\n");
    result.push_str("_atom_site_occupancy\n");

    for (i, (el, f)) in structure.symbols.iter().zip(&frac).enumerate() {
        result.push_str(&format!(
            "{}{} {} {:.10} {:.10} {:.10} 1.0\n",
            el,
            i + 1,
            el,
            f[0],
            f[1],
            f[2]
        ));
    }

    Ok(result)
}
