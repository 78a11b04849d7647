//! # pw.x 输出解析器
//!
//! 从 Quantum ESPRESSO pw.x 输出中提取总能量 (Ry) 和原子数。
//!
//! ## 提取顺序
//! 1. `number of atoms/cell = N`（不区分大小写，取第一处）
//! 2. 第一条同时含 `!` 和 `total energy` 的行，取 `=` 后的数值；
//!    只看这一行，即使其中没有可解析的数值
//! 3. 原子数缺失时，对 `ATOMIC_POSITIONS` 块中 ≥4 列的行计数，
//!    遇到空行或 `NAME:` 形式的段标题结束；计数为 0 的块跳过
//! 4. 能量缺失且调用方允许时，倒序扫描末尾 200 行，取第一处含数字行的最后一个数字
//!    （低置信度，默认关闭）
//!
//! 文件中的非 UTF-8 字节按替换字符读入，不报错。
//!
//! ## 依赖关系
//! - 被 `commands/energy.rs`, `commands/scan.rs` 使用
//! - 使用 `models/calculation.rs`

use crate::error::{Result, SlabQeError};
use crate::models::calculation::{AtomCountSource, EnergySource, QeOutput};
use regex::Regex;
use std::fs;
use std::path::Path;

/// 启发式回退扫描的行数
const TAIL_LINES: usize = 200;

const NUMBER: &str = r"[+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?";

/// 编译后的匹配模式
struct Patterns {
    natoms: Regex,
    energy: Regex,
    section: Regex,
    number: Regex,
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Patterns {
            natoms: compile(r"(?i)number of atoms\s*/\s*cell\s*=\s*(\d+)")?,
            energy: compile(&format!(r"=\s*({})", NUMBER))?,
            section: compile(r"^[A-Z _0-9()-]+:$")?,
            number: compile(NUMBER)?,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SlabQeError::ParseError {
        format: "regex".to_string(),
        path: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// 解析 pw.x 输出文件
pub fn parse_qe_output(path: &Path, allow_fallback: bool) -> Result<QeOutput> {
    QeOutputParser::new()?.parse_file(path, allow_fallback)
}

/// 可复用的解析器；批量解析时只编译一次正则
pub struct QeOutputParser {
    patterns: Patterns,
}

impl QeOutputParser {
    pub fn new() -> Result<Self> {
        Ok(QeOutputParser {
            patterns: Patterns::new()?,
        })
    }

    pub fn parse_file(&self, path: &Path, allow_fallback: bool) -> Result<QeOutput> {
        let bytes = fs::read(path).map_err(|e| SlabQeError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;

        self.parse_content(&String::from_utf8_lossy(&bytes), allow_fallback)
    }

    pub fn parse_content(&self, content: &str, allow_fallback: bool) -> Result<QeOutput> {
        let patterns = &self.patterns;
        let lines: Vec<&str> = content.lines().collect();
        let mut output = QeOutput::default();

        // 1) number of atoms/cell
        if let Some(n) = lines.iter().find_map(|line| {
            patterns
                .natoms
                .captures(line)
                .and_then(|c| c[1].parse::<usize>().ok())
        }) {
            output.num_atoms = Some(n);
            output.atoms_source = Some(AtomCountSource::Declaration);
        }

        // 2) ! total energy
        // "!    total energy              =    -123.45678901 Ry"
        if let Some(line) = lines
            .iter()
            .find(|l| l.contains('!') && l.to_lowercase().contains("total energy"))
        {
            output.energy_ry = patterns
                .energy
                .captures(line)
                .and_then(|c| c[1].parse::<f64>().ok());
            if output.energy_ry.is_some() {
                output.energy_source = Some(EnergySource::Marker);
            }
        }

        // 3) ATOMIC_POSITIONS 计数
        if output.num_atoms.is_none() {
            if let Some(n) = count_positions_block(&lines, &patterns.section) {
                output.num_atoms = Some(n);
                output.atoms_source = Some(AtomCountSource::PositionsBlock);
            }
        }

        // 4) 末尾数字启发式
        if output.energy_ry.is_none() && allow_fallback {
            let start = lines.len().saturating_sub(TAIL_LINES);
            output.energy_ry = lines[start..].iter().rev().find_map(|line| {
                patterns
                    .number
                    .find_iter(line)
                    .last()
                    .and_then(|m| m.as_str().parse::<f64>().ok())
            });
            if output.energy_ry.is_some() {
                output.energy_source = Some(EnergySource::TailHeuristic);
            }
        }

        Ok(output)
    }
}

/// 第一个非空 ATOMIC_POSITIONS 块中的坐标行数
fn count_positions_block(lines: &[&str], section: &Regex) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.to_uppercase().contains("ATOMIC_POSITIONS"))
        .map(|(i, _)| {
            lines[i + 1..]
                .iter()
                .map(|l| l.trim())
                .take_while(|l| !l.is_empty() && !section.is_match(l))
                .filter(|l| l.split_whitespace().count() >= 4)
                .count()
        })
        .find(|&count| count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse_qe_output_content(content: &str, allow_fallback: bool) -> Result<QeOutput> {
        QeOutputParser::new()?.parse_content(content, allow_fallback)
    }

    const SCF_OUT: &str = "
     Program PWSCF v.7.2 starts on 19Oct2026 at 10:00:00

     bravais-lattice index     =            0
     number of atoms/cell      =           12
     number of atomic types    =            2

!    total energy              =    -123.456789 Ry
     estimated scf accuracy    <       0.00000041 Ry
";

    #[test]
    fn test_marker_and_declaration() {
        let out = parse_qe_output_content(SCF_OUT, false).unwrap();
        assert_eq!(out.energy_ry, Some(-123.456789));
        assert_eq!(out.num_atoms, Some(12));
        assert_eq!(out.energy_source, Some(EnergySource::Marker));
        assert_eq!(out.atoms_source, Some(AtomCountSource::Declaration));
    }

    #[test]
    fn test_declaration_whitespace_and_case() {
        let out = parse_qe_output_content("Number Of Atoms / Cell=3\n", false).unwrap();
        assert_eq!(out.num_atoms, Some(3));
    }

    #[test]
    fn test_first_marker_wins() {
        let content = "\
!    total energy              =     -10.5 Ry
!    total energy              =     -11.5 Ry
";
        let out = parse_qe_output_content(content, false).unwrap();
        assert_eq!(out.energy_ry, Some(-10.5));
    }

    #[test]
    fn test_exponent_energy() {
        let out = parse_qe_output_content("!  TOTAL ENERGY = -1.25E+02 Ry\n", false).unwrap();
        assert_eq!(out.energy_ry, Some(-125.0));
    }

    #[test]
    fn test_unparsable_marker_stops_search() {
        let content = "\
!    total energy              =    ********** Ry
!    total energy              =     -11.5 Ry
";
        let out = parse_qe_output_content(content, false).unwrap();
        assert_eq!(out.energy_ry, None);
        assert_eq!(out.energy_source, None);
    }

    const RELAX_TAIL: &str = "
ATOMIC_POSITIONS (angstrom)
Na            0.0000000000        0.0000000000        0.0000000000
Na            0.0000000000        2.8200000000        2.8200000000
Na            2.8200000000        0.0000000000        2.8200000000
Na            2.8200000000        2.8200000000        0.0000000000
Cl            2.8200000000        0.0000000000        0.0000000000
Cl            0.0000000000        2.8200000000        0.0000000000
Cl            0.0000000000        0.0000000000        2.8200000000
Cl            2.8200000000        2.8200000000        2.8200000000

     Writing output data file ./out/nacl.save/
     PWSCF        :      1.23s CPU      1.50s WALL
";

    #[test]
    fn test_positions_block_without_fallback() {
        let out = parse_qe_output_content(RELAX_TAIL, false).unwrap();
        assert_eq!(out.num_atoms, Some(8));
        assert_eq!(out.atoms_source, Some(AtomCountSource::PositionsBlock));
        assert_eq!(out.energy_ry, None);
    }

    #[test]
    fn test_tail_fallback_takes_last_number_of_last_numeric_line() {
        let out = parse_qe_output_content(RELAX_TAIL, true).unwrap();
        assert_eq!(out.energy_ry, Some(1.50));
        assert!(out.is_heuristic());
    }

    #[test]
    fn test_empty_block_is_skipped() {
        let content = "\
ATOMIC_POSITIONS crystal

ATOMIC_POSITIONS crystal
Fe 0.0 0.0 0.0
Fe 0.5 0.5 0.5
END OF BLOCK:
Fe 0.1 0.1 0.1
";
        let out = parse_qe_output_content(content, false).unwrap();
        assert_eq!(out.num_atoms, Some(2));
    }

    #[test]
    fn test_no_numbers_at_all() {
        let out = parse_qe_output_content("no energy here\njust words\n", true).unwrap();
        assert_eq!(out, QeOutput::default());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"caf\xe9 number of atoms/cell = 4\n").unwrap();
        file.write_all(b"!    total energy = -2.0 Ry\n").unwrap();

        let out = parse_qe_output(file.path(), false).unwrap();
        assert_eq!(out.num_atoms, Some(4));
        assert_eq!(out.energy_ry, Some(-2.0));
    }

    #[test]
    fn test_parser_reused_across_files() {
        let parser = QeOutputParser::new().unwrap();
        let first = parser.parse_content(SCF_OUT, false).unwrap();
        let second = parser.parse_content("number of atoms/cell = 2\n", false).unwrap();
        assert_eq!(first.num_atoms, Some(12));
        assert_eq!(second.num_atoms, Some(2));
        assert_eq!(second.energy_ry, None);
    }

    #[test]
    fn test_missing_file() {
        let result = parse_qe_output(Path::new("/no/such/pw.out"), false);
        assert!(matches!(result, Err(SlabQeError::FileReadError { .. })));
    }
}
