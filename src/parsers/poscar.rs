//! # VASP POSCAR 格式解析器
//!
//! 解析 VASP POSCAR/CONTCAR 文件格式，并可将结构写回 POSCAR。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//! 没有元素行的 VASP 4 文件无法确定元素，直接报错。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `commands/slab.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{Result, SlabQeError};
use crate::models::elements::element_from_label;
use crate::models::{Lattice, Structure};
use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<Structure> {
    let content = fs::read_to_string(path).map_err(|e| SlabQeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_poscar_content(&content).map_err(|reason| SlabQeError::ParseError {
        format: "poscar".to_string(),
        path: path.display().to_string(),
        reason,
    })
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(content: &str) -> std::result::Result<Structure, String> {
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 8 {
        return Err("File too short".to_string());
    }

    // Line 1: Scaling factor（负值表示目标体积）
    let scale_raw: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("Invalid scaling factor '{}'", lines[1].trim()))?;

    // Lines 2-4: Lattice vectors
    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in matrix.iter_mut().enumerate() {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(format!("Invalid lattice vector at line {}", 3 + i));
        }
        *row = [parts[0], parts[1], parts[2]];
    }

    let scale = if scale_raw < 0.0 {
        let volume = Lattice::from_vectors(matrix).volume().abs();
        if volume < 1e-12 {
            return Err("Lattice volume is zero".to_string());
        }
        (-scale_raw / volume).cbrt()
    } else {
        scale_raw
    };
    for row in matrix.iter_mut() {
        for x in row.iter_mut() {
            *x *= scale;
        }
    }
    let lattice = Lattice::from_vectors(matrix);

    // Line 5: Element symbols (VASP 5+)
    let line5_parts: Vec<&str> = lines[5].split_whitespace().collect();
    if line5_parts.is_empty() || line5_parts[0].parse::<usize>().is_ok() {
        return Err("Missing element symbol line (VASP 4 format is not supported)".to_string());
    }
    let elements: Vec<String> = line5_parts
        .iter()
        .map(|s| {
            // "Fe_pv" 或 "Fe/abc123" 形式的 POTCAR 标识
            element_from_label(s).ok_or_else(|| format!("Unknown element '{}'", s))
        })
        .collect::<std::result::Result<_, _>>()?;

    let counts: Vec<usize> = lines[6]
        .split_whitespace()
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| format!("Invalid atom counts '{}'", lines[6].trim()))?;
    if counts.len() != elements.len() {
        return Err(format!(
            "{} element symbols but {} counts",
            elements.len(),
            counts.len()
        ));
    }

    // Check for "Selective dynamics" line
    let mut coord_line = 7;
    if lines[coord_line]
        .trim()
        .to_lowercase()
        .starts_with('s')
    {
        coord_line += 1;
    }

    // Coordinate type line
    if lines.len() <= coord_line {
        return Err("Missing coordinate type line".to_string());
    }

    let coord_type = lines[coord_line].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');

    // Parse atom positions
    let total: usize = counts.iter().sum();
    let mut symbols = Vec::with_capacity(total);
    let mut positions = Vec::with_capacity(total);
    let mut rows = lines[coord_line + 1..].iter();

    for (elem, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            let line = rows
                .next()
                .ok_or_else(|| format!("Expected {} atoms, file ends early", total))?;
            let parts: Vec<f64> = line
                .split_whitespace()
                .take(3)
                .filter_map(|s| s.parse().ok())
                .collect();
            if parts.len() < 3 {
                return Err(format!("Invalid position line '{}'", line.trim()));
            }

            let p = [parts[0], parts[1], parts[2]];
            symbols.push(elem.clone());
            positions.push(if is_cartesian {
                [p[0] * scale, p[1] * scale, p[2] * scale]
            } else {
                lattice.frac_to_cart(p)
            });
        }
    }

    Structure::new(symbols, positions, lattice, [true; 3]).map_err(|e| e.to_string())
}

/// 将结构转换为 POSCAR 格式字符串（按元素分组，直接坐标）
pub fn to_poscar_string(structure: &Structure, name: &str) -> Result<String> {
    let frac = structure.scaled_positions()?;
    let elem_order = structure.unique_symbols();

    let mut result = String::new();

    // Line 0: Comment
    result.push_str(&format!("{}\n", name));

    // Line 1: Scale
    result.push_str("1.0\n");

    // Lines 2-4: Lattice
    for row in &structure.cell.matrix {
        result.push_str(&format!(
            "  {:16.10}  {:16.10}  {:16.10}\n",
            row[0], row[1], row[2]
        ));
    }

    // Line 5: Elements
    result.push_str(&format!("   {}\n", elem_order.join("   ")));

    // Line 6: Counts
    let counts: Vec<String> = elem_order
        .iter()
        .map(|e| structure.symbols.iter().filter(|s| *s == e).count().to_string())
        .collect();
    result.push_str(&format!("   {}\n", counts.join("   ")));

    // Coordinate type
    result.push_str("Direct\n");

    // Atom positions
    for elem in &elem_order {
        for (s, f) in structure.symbols.iter().zip(&frac) {
            if s == elem {
                result.push_str(&format!(
                    "  {:16.10}  {:16.10}  {:16.10}\n",
                    f[0], f[1], f[2]
                ));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poscar_vasp5() {
        let content = r#"NaCl
1.0
5.64 0.0 0.0
0.0 5.64 0.0
0.0 0.0 5.64
Na Cl
4 4
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.5
0.0 0.5 0.5
0.5 0.0 0.0
0.0 0.5 0.0
0.0 0.0 0.5
0.5 0.5 0.5
"#;
        let s = parse_poscar_content(content).unwrap();
        assert_eq!(s.natoms(), 8);
        assert_eq!(s.symbols.iter().filter(|e| *e == "Na").count(), 4);
        assert_eq!(s.symbols.iter().filter(|e| *e == "Cl").count(), 4);
        assert!((s.positions[7][2] - 2.82).abs() < 1e-12);
    }

    #[test]
    fn test_parse_poscar_with_scale() {
        let content = r#"Si
2.0
2.0 0.0 0.0
0.0 2.0 0.0
0.0 0.0 2.0
Si
2
Cartesian
0.0 0.0 0.0
1.0 1.0 1.0
"#;
        let s = parse_poscar_content(content).unwrap();
        let (a, _, _, _, _, _) = s.cell.parameters();

        // 2.0 * 2.0 = 4.0
        assert!((a - 4.0).abs() < 1e-12);
        assert!((s.positions[1][0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_scale_is_volume() {
        let content = "x\n-64.0\n1 0 0\n0 1 0\n0 0 1\nPo\n1\nDirect\n0 0 0\n";
        let s = parse_poscar_content(content).unwrap();
        assert!((s.cell.volume() - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_poscar_round_trip() {
        let lattice = Lattice::from_vectors([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]);
        let s = Structure::from_fractional(
            lattice,
            vec![
                ("O".to_string(), [0.5, 0.5, 0.0]),
                ("Ti".to_string(), [0.0, 0.0, 0.0]),
                ("O".to_string(), [0.5, 0.0, 0.5]),
            ],
        )
        .unwrap();

        let poscar_str = to_poscar_string(&s, "TiO2").unwrap();
        let parsed = parse_poscar_content(&poscar_str).unwrap();

        assert_eq!(parsed.natoms(), 3);
        assert_eq!(parsed.symbols, vec!["O", "O", "Ti"]);
    }

    #[test]
    fn test_parse_poscar_selective_dynamics() {
        let content = r#"Fe with selective
1.0
2.87 0.0 0.0
0.0 2.87 0.0
0.0 0.0 2.87
Fe
2
Selective dynamics
Direct
0.0 0.0 0.0 T T T
0.5 0.5 0.5 F F F
"#;
        let s = parse_poscar_content(content).unwrap();
        assert_eq!(s.natoms(), 2);
    }

    #[test]
    fn test_vasp4_rejected() {
        let content = "x\n1.0\n1 0 0\n0 1 0\n0 0 1\n1\nDirect\n0 0 0\n";
        assert!(parse_poscar_content(content).is_err());
    }
}
