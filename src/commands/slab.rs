//! # 结构命令实现
//!
//! - `load-bulk`: 读取体相结构，必要时新建会话；旧表面模型作废
//! - `build-slab`: 按 Miller 指数、层数、真空层构建表面模型
//! - `export-slab`: 以 CIF / XYZ / POSCAR / .cell 导出表面模型（可扩胞）
//!
//! ## 依赖关系
//! - 使用 `cli/slab.rs` 定义的参数
//! - 使用 `parsers/`, `models/session.rs`, `slab/`
//! - 使用 `utils/output.rs`

use super::open_session;
use crate::cli::slab::{BuildSlabArgs, ExportFormat, ExportSlabArgs, LoadBulkArgs};
use crate::cli::triple;
use crate::error::{Result, SlabQeError};
use crate::models::{Session, Structure, Target};
use crate::parsers::{self, cell::to_cell_string, cif::to_cif_string, poscar::to_poscar_string};
use crate::utils::output;

use std::fs;
use std::path::Path;

/// 执行 load-bulk
pub fn load_bulk(args: LoadBulkArgs) -> Result<()> {
    output::print_header("Loading bulk structure");

    let session = if args.session.path.exists() {
        Session::load(&args.session.path)?
    } else {
        output::print_info(&format!(
            "Creating new session file '{}'",
            args.session.path.display()
        ));
        Session::default()
    };

    let bulk = parsers::parse_structure_file(&args.structure)?;
    output::print_info(&format!(
        "Read {} ({} atoms) from {}",
        bulk.formula(),
        bulk.natoms(),
        args.structure.display()
    ));

    let had_slab = session.structures.slab.is_some();
    let session = session.with_bulk(bulk);
    session.save(&args.session.path)?;

    if had_slab {
        output::print_warning("Previous slab discarded; run build-slab again");
    }
    output::print_success(&format!(
        "Bulk structure stored in '{}'",
        args.session.path.display()
    ));
    Ok(())
}

/// 执行 build-slab
pub fn build_slab(args: BuildSlabArgs) -> Result<()> {
    output::print_header("Building slab");

    let mut session = open_session(&args.session)?;
    if let Some(miller) = &args.miller {
        session.miller_index = triple(miller, "--miller")?;
    }
    if let Some(layers) = args.layers {
        session.layers = layers;
    }
    if let Some(vacuum) = args.vacuum {
        session.vacuum = vacuum;
    }

    let [h, k, l] = session.miller_index;
    output::print_info(&format!(
        "Miller ({} {} {}), {} layers, {} Å vacuum",
        h, k, l, session.layers, session.vacuum
    ));

    let session = session.rebuild_slab()?;
    let slab = session.structure(Target::Slab)?;
    output::print_info(&format!(
        "Slab {}: {} atoms, surface area {:.4} Å², c = {:.4} Å",
        slab.formula(),
        slab.natoms(),
        slab.surface_area(),
        slab.cell.matrix[2][2]
    ));

    session.save(&args.session.path)?;
    output::print_success("Slab built/updated successfully");
    Ok(())
}

/// 执行 export-slab
pub fn export_slab(args: ExportSlabArgs) -> Result<()> {
    let session = open_session(&args.session)?;
    let slab = session.structure(Target::Slab)?;

    let reps = match &args.supercell {
        Some(sc) => triple(sc, "--supercell")?,
        None => session.supercell,
    };
    let structure = slab.repeat(reps)?;

    let format = args
        .format
        .or_else(|| format_from_path(&args.output))
        .unwrap_or(ExportFormat::Cif);
    let name = format!("{}_slab", structure.formula());

    let content = match format {
        ExportFormat::Cif => to_cif_string(&structure, &name)?,
        ExportFormat::Xyz => to_xyz_string(&structure, &name),
        ExportFormat::Poscar => to_poscar_string(&structure, &name)?,
        ExportFormat::Cell => to_cell_string(&structure)?,
    };

    fs::write(&args.output, content).map_err(|e| SlabQeError::FileWriteError {
        path: args.output.display().to_string(),
        source: e,
    })?;

    output::print_conversion(
        &format!("slab x {}x{}x{}", reps[0], reps[1], reps[2]),
        &args.output.display().to_string(),
    );
    output::print_done(&format!(
        "{} atoms written as {}",
        structure.natoms(),
        format
    ));
    Ok(())
}

/// 由扩展名推断导出格式
fn format_from_path(path: &Path) -> Option<ExportFormat> {
    let name = path.file_name()?.to_str()?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "cif" => Some(ExportFormat::Cif),
        "xyz" => Some(ExportFormat::Xyz),
        "vasp" | "poscar" => Some(ExportFormat::Poscar),
        "cell" => Some(ExportFormat::Cell),
        _ if name.starts_with("POSCAR") || name.starts_with("CONTCAR") => {
            Some(ExportFormat::Poscar)
        }
        _ => None,
    }
}

/// 转换为 XYZ 格式（笛卡尔坐标，注释行写晶格）
fn to_xyz_string(structure: &Structure, name: &str) -> String {
    let m = structure.cell.matrix;
    let mut result = String::new();
    result.push_str(&format!("{}\n", structure.natoms()));
    result.push_str(&format!(
        "{} Lattice=\"{} {} {} {} {} {} {} {} {}\" pbc=\"{} {} {}\"\n",
        name,
        m[0][0],
        m[0][1],
        m[0][2],
        m[1][0],
        m[1][1],
        m[1][2],
        m[2][0],
        m[2][1],
        m[2][2],
        pbc_flag(structure.pbc[0]),
        pbc_flag(structure.pbc[1]),
        pbc_flag(structure.pbc[2]),
    ));

    for (el, p) in structure.symbols.iter().zip(&structure.positions) {
        result.push_str(&format!(
            "{} {:16.10} {:16.10} {:16.10}\n",
            el, p[0], p[1], p[2]
        ));
    }

    result
}

fn pbc_flag(periodic: bool) -> &'static str {
    if periodic {
        "T"
    } else {
        "F"
    }
}
