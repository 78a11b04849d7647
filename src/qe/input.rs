//! # pw.x 输入文件生成
//!
//! 按固定段落顺序生成 pw.x 输入：
//! `&CONTROL` → `&SYSTEM` → `&ELECTRONS` → `ATOMIC_SPECIES` → `CELL_PARAMETERS` →
//! `ATOMIC_POSITIONS` → `K_POINTS`。
//!
//! 结构按原样写出，从不应用超胞。实数写为最短往返形式且总带小数点或指数。
//!
//! ## 依赖关系
//! - 被 `commands/input.rs` 使用
//! - 使用 `models/session.rs`, `models/structure.rs`, `models/elements.rs`

use crate::error::{Result, SlabQeError};
use crate::models::elements::atomic_mass;
use crate::models::session::{Occupations, QeParams};
use crate::models::Structure;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// 视为零的初始磁矩阈值
const MAG_EPS: f64 = 1e-12;

const DEFAULT_PSEUDO_DIR: &str = "./pseudo";

// ─────────────────────────────────────────────────────────────
// pseudo_dir
// ─────────────────────────────────────────────────────────────

/// `pseudo_dir` 的写法与复制目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoDirLayout {
    /// 写入 `&CONTROL` 的字符串
    pub pseudo_dir: String,
    /// 复制目标目录；不复制时为 `None`
    pub dest_dir: Option<PathBuf>,
}

/// 由用户给定的目录和输入文件所在目录确定 `pseudo_dir`
///
/// `in_dir` 应为绝对路径。
pub fn pseudo_dir_layout(user_value: &str, in_dir: &Path, copy: bool) -> PseudoDirLayout {
    let user = match user_value.trim() {
        "" => DEFAULT_PSEUDO_DIR,
        u => u,
    };
    let user_path = Path::new(user);

    if user_path.is_absolute() {
        if !copy {
            return PseudoDirLayout {
                pseudo_dir: user.to_string(),
                dest_dir: None,
            };
        }
        // 位于输入文件目录之下时写相对路径
        let dest = normalize_lexically(user_path);
        let pseudo_dir = match dest.strip_prefix(normalize_lexically(in_dir)) {
            Ok(rel) => format!("./{}", rel.display()),
            Err(_) => user.to_string(),
        };
        return PseudoDirLayout {
            pseudo_dir,
            dest_dir: Some(dest),
        };
    }

    let pseudo_dir = if user.starts_with("./") || user.starts_with("../") {
        user.to_string()
    } else {
        format!("./{}", user)
    };
    PseudoDirLayout {
        pseudo_dir,
        dest_dir: copy.then(|| in_dir.join(user)),
    }
}

/// 去掉 `.` 并折叠 `..`，不访问文件系统（符号链接不解析）
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // 根目录之上仍是根目录
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            c => out.push(c),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────
// 数值格式
// ─────────────────────────────────────────────────────────────

/// 最短往返形式，保证含小数点或指数：0.5、1.0、1e-8
pub fn format_real(x: f64) -> String {
    if !x.is_finite() {
        return x.to_string();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        return format!("{:e}", x);
    }
    let s = x.to_string();
    if s.contains('.') || s.contains('e') {
        s
    } else {
        s + ".0"
    }
}

// ─────────────────────────────────────────────────────────────
// 输入文件
// ─────────────────────────────────────────────────────────────

/// 生成 pw.x 输入文本
///
/// `pseudo_files` 为 元素 → `pseudo_dir` 中的文件名。
pub fn render_input(
    structure: &Structure,
    params: &QeParams,
    kpoints: [u32; 3],
    pseudo_dir: &str,
    pseudo_files: &BTreeMap<String, String>,
) -> Result<String> {
    structure.validate()?;
    if structure.natoms() == 0 {
        return Err(SlabQeError::InvalidArgument(
            "structure has no atoms".to_string(),
        ));
    }

    let species = structure.unique_symbols();
    let mut species_lines = Vec::with_capacity(species.len());
    for el in &species {
        let mass = atomic_mass(el).ok_or_else(|| {
            SlabQeError::InvalidArgument(format!("unknown element '{}': no atomic mass", el))
        })?;
        let file = pseudo_files
            .get(el)
            .ok_or_else(|| SlabQeError::MissingPseudopotential {
                element: el.clone(),
            })?;
        species_lines.push(format!("{} {:.6} {}", el, mass, file));
    }

    let ntyp = species.len();
    let mut lines: Vec<String> = Vec::new();

    lines.push("&CONTROL".to_string());
    lines.push(format!("  calculation = '{}',", params.calculation));
    lines.push(format!("  prefix = '{}',", params.effective_prefix()));
    lines.push(format!("  outdir = '{}',", params.effective_outdir()));
    lines.push(format!("  pseudo_dir = '{}',", pseudo_dir));
    lines.push("/".to_string());

    lines.push("&SYSTEM".to_string());
    lines.push("  ibrav = 0,".to_string());
    lines.push(format!("  nat = {},", structure.natoms()));
    lines.push(format!("  ntyp = {},", ntyp));
    lines.push(format!("  ecutwfc = {},", params.ecutwfc));
    lines.push(format!("  ecutrho = {},", params.ecutrho));
    if params.nspin > 1 {
        lines.push(format!("  nspin = {},", params.nspin));
    }
    if params.nbnd > 0 {
        lines.push(format!("  nbnd = {},", params.nbnd));
    }
    lines.push(format!("  occupations = '{}',", params.occupations));
    if params.occupations == Occupations::Smearing {
        lines.push(format!("  smearing = '{}',", params.smearing));
        lines.push(format!("  degauss = {},", format_real(params.degauss)));
    }
    if params.nspin == 2 {
        for (i, &m) in params.starting_mags.iter().enumerate().take(ntyp) {
            if m.abs() > MAG_EPS {
                lines.push(format!(
                    "  starting_magnetization({}) = {},",
                    i + 1,
                    format_real(m)
                ));
            }
        }
    }
    lines.push("/".to_string());

    lines.push("&ELECTRONS".to_string());
    lines.push(format!("  conv_thr = {},", format_real(params.conv_thr)));
    lines.push("/\n".to_string());

    lines.push("ATOMIC_SPECIES".to_string());
    lines.extend(species_lines);

    lines.push("\nCELL_PARAMETERS angstrom".to_string());
    for row in &structure.cell.matrix {
        lines.push(format!("{:.8} {:.8} {:.8}", row[0], row[1], row[2]));
    }

    lines.push("\nATOMIC_POSITIONS angstrom".to_string());
    for (sym, p) in structure.symbols.iter().zip(&structure.positions) {
        lines.push(format!("{} {:.8} {:.8} {:.8}", sym, p[0], p[1], p[2]));
    }

    lines.push("\nK_POINTS automatic".to_string());
    lines.push(format!("{} {} {} 0 0 0", kpoints[0], kpoints[1], kpoints[2]));

    Ok(lines.join("\n") + "\n")
}
