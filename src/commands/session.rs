//! # 会话命令实现
//!
//! - `configure`: 逐项覆盖会话参数，校验通过后写回
//! - `show`: 以表格（或原始 JSON）显示结构、参数和能量结果
//!
//! ## 依赖关系
//! - 使用 `cli/session.rs` 定义的参数
//! - 使用 `models/session.rs`
//! - 使用 `tabled` 显示表格

use super::open_session;
use crate::cli::session::{ConfigureArgs, ShowArgs};
use crate::cli::triple;
use crate::error::{Result, SlabQeError};
use crate::models::calculation::EV_PER_A2_TO_J_PER_M2;
use crate::models::{Session, Structure};
use crate::utils::output;

use tabled::{Table, Tabled};

/// 执行 configure
pub fn configure(args: ConfigureArgs) -> Result<()> {
    let mut session = open_session(&args.session)?;
    let changed = apply_overrides(&mut session, &args)?;

    if changed.is_empty() {
        output::print_skip("No parameters given; session unchanged");
        return Ok(());
    }

    session.qe_input.validate()?;
    if session.layers == 0 {
        return Err(SlabQeError::InvalidArgument(
            "layers must be at least 1".to_string(),
        ));
    }
    if session.supercell.iter().any(|&n| n == 0) {
        return Err(SlabQeError::InvalidArgument(format!(
            "supercell must be positive, got {:?}",
            session.supercell
        )));
    }

    session.save(&args.session.path)?;
    output::print_success(&format!("Updated {}", changed.join(", ")));
    if changed.iter().any(|c| matches!(*c, "miller" | "layers" | "vacuum"))
        && session.structures.slab.is_some()
    {
        output::print_info("Slab parameters changed; run build-slab to rebuild the slab");
    }
    Ok(())
}

/// 应用命令行给出的参数，返回被修改的键名
fn apply_overrides(session: &mut Session, args: &ConfigureArgs) -> Result<Vec<&'static str>> {
    let mut changed = Vec::new();

    if let Some(v) = &args.miller {
        session.miller_index = triple(v, "--miller")?;
        changed.push("miller");
    }
    if let Some(v) = args.layers {
        session.layers = v;
        changed.push("layers");
    }
    if let Some(v) = args.vacuum {
        session.vacuum = v;
        changed.push("vacuum");
    }
    if let Some(v) = &args.supercell {
        session.supercell = triple(v, "--supercell")?;
        changed.push("supercell");
    }

    let qe = &mut session.qe_input;
    if let Some(v) = args.calculation {
        qe.calculation = v;
        changed.push("calculation");
    }
    if let Some(v) = args.ecutwfc {
        qe.ecutwfc = v;
        changed.push("ecutwfc");
    }
    if let Some(v) = args.ecutrho {
        qe.ecutrho = v;
        changed.push("ecutrho");
    }
    if let Some(v) = &args.kpoints {
        qe.kpoints = triple(v, "--kpoints")?;
        changed.push("kpoints");
    }
    if let Some(v) = args.override_kpoints {
        qe.override_kpoints = v;
        changed.push("override_kpoints");
    }
    if let Some(v) = &args.prefix {
        qe.prefix = v.clone();
        changed.push("prefix");
    }
    if let Some(v) = &args.outdir {
        qe.outdir = v.clone();
        changed.push("outdir");
    }
    if let Some(v) = &args.pp_search_folder {
        qe.pp_search_folder = v.clone();
        changed.push("pp_search_folder");
    }
    if let Some(v) = &args.pp_input_folder {
        qe.pp_input_folder = v.clone();
        changed.push("pp_input_folder");
    }
    if let Some(v) = args.copy_pseudos {
        qe.copy_pseudos = v;
        changed.push("copy_pseudos");
    }
    if let Some(v) = args.conv_thr {
        qe.conv_thr = v;
        changed.push("conv_thr");
    }
    if let Some(v) = args.occupations {
        qe.occupations = v;
        changed.push("occupations");
    }
    if let Some(v) = args.smearing {
        qe.smearing = v;
        changed.push("smearing");
    }
    if let Some(v) = args.degauss {
        qe.degauss = v;
        changed.push("degauss");
    }
    if let Some(v) = args.nbnd {
        qe.nbnd = v;
        changed.push("nbnd");
    }
    if let Some(v) = &args.starting_mags {
        let mut mags = [0.0; 3];
        for (slot, m) in mags.iter_mut().zip(v) {
            *slot = *m;
        }
        qe.starting_mags = mags;
        changed.push("starting_mags");
    }
    // nspin 最后设置：非自旋极化时会清零 starting_mags
    if let Some(v) = args.nspin {
        qe.set_nspin(v);
        changed.push("nspin");
    }

    Ok(changed)
}

// ─────────────────────────────────────────────────────────────
// show
// ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct StructureRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "Atoms")]
    natoms: usize,
    #[tabled(rename = "a, b, c (Å)")]
    lengths: String,
    #[tabled(rename = "α, β, γ (°)")]
    angles: String,
    #[tabled(rename = "Area ab (Å²)")]
    area: String,
}

#[derive(Tabled)]
struct KeyValueRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl KeyValueRow {
    fn new(key: &str, value: impl ToString) -> Self {
        KeyValueRow {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// 执行 show
pub fn show(args: ShowArgs) -> Result<()> {
    let session = open_session(&args.session)?;

    if args.json {
        let json = session
            .to_json()
            .map_err(|e| SlabQeError::SessionFormat {
                path: args.session.path.display().to_string(),
                source: e,
            })?;
        println!("{}", json);
        return Ok(());
    }

    output::print_header(&format!("Session '{}'", args.session.path.display()));

    let mut rows = Vec::new();
    if let Some(bulk) = &session.structures.bulk {
        rows.push(structure_row("bulk", bulk));
    }
    if let Some(slab) = &session.structures.slab {
        rows.push(structure_row("slab", slab));
    }
    if rows.is_empty() {
        output::print_warning("No structures loaded");
    } else {
        println!("{}", Table::new(&rows));
    }

    output::print_separator();
    println!("{}", Table::new(parameter_rows(&session)));

    output::print_separator();
    let results = result_rows(&session);
    if results.is_empty() {
        output::print_info("No energies recorded");
    } else {
        println!("{}", Table::new(&results));
    }

    Ok(())
}

fn structure_row(model: &str, s: &Structure) -> StructureRow {
    let (a, b, c, alpha, beta, gamma) = s.cell.parameters();
    StructureRow {
        model: model.to_string(),
        formula: s.formula(),
        natoms: s.natoms(),
        lengths: format!("{:.4}, {:.4}, {:.4}", a, b, c),
        angles: format!("{:.2}, {:.2}, {:.2}", alpha, beta, gamma),
        area: format!("{:.4}", s.surface_area()),
    }
}

fn parameter_rows(session: &Session) -> Vec<KeyValueRow> {
    let qe = &session.qe_input;
    let [h, k, l] = session.miller_index;
    let [k1, k2, k3] = qe.kpoints;
    let [s1, s2, s3] = session.supercell;

    let mut rows = vec![
        KeyValueRow::new("miller", format!("({} {} {})", h, k, l)),
        KeyValueRow::new("layers", session.layers),
        KeyValueRow::new("vacuum (Å)", session.vacuum),
        KeyValueRow::new("supercell", format!("{} {} {}", s1, s2, s3)),
        KeyValueRow::new("calculation", qe.calculation),
        KeyValueRow::new("ecutwfc / ecutrho (Ry)", format!("{} / {}", qe.ecutwfc, qe.ecutrho)),
        KeyValueRow::new("kpoints", format!("{} {} {}", k1, k2, k3)),
        KeyValueRow::new("override_kpoints", qe.override_kpoints),
        KeyValueRow::new("prefix", qe.effective_prefix()),
        KeyValueRow::new("outdir", qe.effective_outdir()),
        KeyValueRow::new("pp_search_folder", &qe.pp_search_folder),
        KeyValueRow::new("pp_input_folder", &qe.pp_input_folder),
        KeyValueRow::new("copy_pseudos", qe.copy_pseudos),
        KeyValueRow::new("conv_thr", qe.conv_thr),
        KeyValueRow::new("occupations", qe.occupations),
    ];
    if qe.occupations == crate::models::session::Occupations::Smearing {
        rows.push(KeyValueRow::new("smearing", qe.smearing));
        rows.push(KeyValueRow::new("degauss", qe.degauss));
    }
    rows.push(KeyValueRow::new("nspin", qe.nspin));
    if qe.nspin == 2 {
        let [m1, m2, m3] = qe.starting_mags;
        rows.push(KeyValueRow::new("starting_mags", format!("{} {} {}", m1, m2, m3)));
    }
    if qe.nbnd > 0 {
        rows.push(KeyValueRow::new("nbnd", qe.nbnd));
    }
    rows
}

fn result_rows(session: &Session) -> Vec<KeyValueRow> {
    let r = &session.results;
    let mut rows = Vec::new();

    if let (Some(ev), Some(ry)) = (r.bulk_energy_ev, r.bulk_energy_ry) {
        rows.push(KeyValueRow::new("bulk energy", format!("{:.6} eV ({:.8} Ry)", ev, ry)));
    }
    if let Some(n) = r.bulk_natoms {
        rows.push(KeyValueRow::new("bulk atoms (output)", n));
    }
    if let (Some(ev), Some(ry)) = (r.slab_energy_ev, r.slab_energy_ry) {
        rows.push(KeyValueRow::new("slab energy", format!("{:.6} eV ({:.8} Ry)", ev, ry)));
    }
    if let Some(n) = r.slab_natoms {
        rows.push(KeyValueRow::new("slab atoms (output)", n));
    }
    if let Some(se) = r.surface_energy_ev_per_a2 {
        rows.push(KeyValueRow::new(
            "surface energy",
            format!("{:.6} eV/Å² ({:.4} J/m²)", se, se * EV_PER_A2_TO_J_PER_M2),
        ));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn configure_args(extra: &[&str]) -> ConfigureArgs {
        let mut argv = vec!["slabqe", "configure"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Configure(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_apply_overrides() {
        let mut session = Session::default();
        let args = configure_args(&[
            "--miller", "1", "-1", "0", "--ecutwfc", "40", "--kpoints", "4", "4", "1",
            "--override-kpoints", "true",
        ]);
        let changed = apply_overrides(&mut session, &args).unwrap();

        assert_eq!(changed, vec!["miller", "ecutwfc", "kpoints", "override_kpoints"]);
        assert_eq!(session.miller_index, [1, -1, 0]);
        assert_eq!(session.qe_input.ecutwfc, 40);
        assert_eq!(session.qe_input.kpoints, [4, 4, 1]);
        assert!(session.qe_input.override_kpoints);
    }

    #[test]
    fn test_nspin_one_clears_mags() {
        let mut session = Session::default();
        let args = configure_args(&["--starting-mags", "0.5", "--nspin", "1"]);
        apply_overrides(&mut session, &args).unwrap();
        assert_eq!(session.qe_input.starting_mags, [0.0; 3]);

        let args = configure_args(&["--starting-mags", "0.5", "-0.2", "--nspin", "2"]);
        apply_overrides(&mut session, &args).unwrap();
        assert_eq!(session.qe_input.starting_mags, [0.5, -0.2, 0.0]);
    }

    #[test]
    fn test_no_overrides() {
        let mut session = Session::default();
        let changed = apply_overrides(&mut session, &configure_args(&[])).unwrap();
        assert!(changed.is_empty());
        assert_eq!(session, Session::default());
    }

    #[test]
    fn test_result_rows_sparse() {
        let mut session = Session::default();
        assert!(result_rows(&session).is_empty());
        session.results.bulk_energy_ev = Some(-10.0);
        session.results.bulk_energy_ry = Some(-10.0 / 13.605693009);
        assert_eq!(result_rows(&session).len(), 1);
    }
}
