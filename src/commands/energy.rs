//! # 能量命令实现
//!
//! - `parse-output`: 只读解析一个 pw.x 输出
//! - `load-output`: 把输出记录为体相或表面结果，两者都在时重算表面能
//! - `surface-energy`: 由已记录的结果计算表面能并存回会话
//!
//! ## 依赖关系
//! - 使用 `cli/energy.rs` 定义的参数
//! - 使用 `parsers/qe_out.rs`, `models/session.rs`, `models/calculation.rs`

use super::open_session;
use crate::cli::energy::{LoadOutputArgs, ParseOutputArgs, SurfaceEnergyArgs};
use crate::error::Result;
use crate::models::calculation::{AtomCountSource, EnergySource};
use crate::models::{QeOutput, SurfaceEnergy, Target};
use crate::parsers::qe_out::parse_qe_output;
use crate::utils::output;

use tabled::{Table, Tabled};

#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Quantity")]
    quantity: &'static str,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

/// 执行 parse-output
pub fn parse_output(args: ParseOutputArgs) -> Result<()> {
    let out = parse_qe_output(&args.file, args.allow_fallback)?;

    output::print_header(&format!("pw.x output '{}'", args.file.display()));
    println!("{}", Table::new(output_rows(&out)));
    warn_on_heuristic(&out);

    if out.energy_ry.is_none() {
        output::print_warning("No total energy found");
    }
    Ok(())
}

fn output_rows(out: &QeOutput) -> Vec<OutputRow> {
    let energy_source = match out.energy_source {
        Some(EnergySource::Marker) => "'!' total energy line",
        Some(EnergySource::TailHeuristic) => "last number in output tail",
        None => "-",
    };
    let atoms_source = match out.atoms_source {
        Some(AtomCountSource::Declaration) => "number of atoms/cell",
        Some(AtomCountSource::PositionsBlock) => "ATOMIC_POSITIONS block",
        None => "-",
    };

    vec![
        OutputRow {
            quantity: "Energy (Ry)",
            value: fmt_opt(out.energy_ry, 8),
            source: energy_source.to_string(),
        },
        OutputRow {
            quantity: "Energy (eV)",
            value: fmt_opt(out.energy_ev(), 6),
            source: energy_source.to_string(),
        },
        OutputRow {
            quantity: "Atoms",
            value: out
                .num_atoms
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            source: atoms_source.to_string(),
        },
        OutputRow {
            quantity: "Energy/atom (eV)",
            value: fmt_opt(out.energy_per_atom_ev(), 6),
            source: String::new(),
        },
    ]
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

fn warn_on_heuristic(out: &QeOutput) {
    if out.is_heuristic() {
        output::print_warning(
            "Energy taken from the last number in the output tail; verify it before use",
        );
    }
}

/// 执行 load-output
pub fn load_output(args: LoadOutputArgs) -> Result<()> {
    output::print_header(&format!("Loading {} output", args.target));

    let session = open_session(&args.session)?;
    let out = parse_qe_output(&args.file, args.allow_fallback)?;

    if out.energy_ry.is_none() {
        output::print_warning(&format!(
            "No total energy found in '{}'; session unchanged",
            args.file.display()
        ));
        return Ok(());
    }
    warn_on_heuristic(&out);

    let session = session.record_output(args.target, &out)?;
    output::print_energy(
        &format!("{} energy", args.target),
        out.energy_ev().unwrap_or_default(),
        out.energy_ry.unwrap_or_default(),
    );

    match out.num_atoms {
        Some(n) => output::print_info(&format!("{} atoms in output", n)),
        None => {
            let fallback = match args.target {
                Target::Bulk => session.bulk_natoms(),
                Target::Slab => session.slab_natoms(),
            };
            match fallback {
                Some(n) => output::print_warning(&format!(
                    "Atom count not found in output; using the stored {} structure ({} atoms)",
                    args.target, n
                )),
                None => output::print_warning(&format!(
                    "Atom count not found in output and no {} structure loaded",
                    args.target
                )),
            }
        }
    }

    let (session, refreshed) = session.refresh_surface_energy();
    match refreshed {
        Some(Ok(se)) => report_surface_energy(&se),
        Some(Err(e)) => output::print_warning(&format!("Surface energy not updated: {}", e)),
        None => {}
    }

    session.save(&args.session.path)?;
    output::print_done(&format!("Session '{}' updated", args.session.path.display()));
    Ok(())
}

/// 执行 surface-energy
pub fn surface_energy(args: SurfaceEnergyArgs) -> Result<()> {
    output::print_header("Surface energy");

    let mut session = open_session(&args.session)?;
    let se = session.surface_energy()?;
    session.results.surface_energy_ev_per_a2 = Some(se.ev_per_a2);

    report_surface_energy(&se);
    session.save(&args.session.path)?;
    Ok(())
}

fn report_surface_energy(se: &SurfaceEnergy) {
    output::print_info(&format!(
        "N_bulk = {}, N_slab = {}, A = {:.4} Å²",
        se.bulk_natoms, se.slab_natoms, se.area
    ));
    output::print_surface_energy(se.ev_per_a2, se.j_per_m2());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::models::{Lattice, Session, Structure};
    use clap::Parser;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn command(argv: &[&str]) -> Commands {
        let mut full = vec!["slabqe"];
        full.extend_from_slice(argv);
        Cli::parse_from(full).command
    }

    fn qe_out(energy: f64, natoms: usize) -> String {
        format!(
            "     number of atoms/cell      =            {}\n\
             !    total energy              =    {:.8} Ry\n",
            natoms, energy
        )
    }

    fn setup() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let bulk = Structure::from_fractional(
            Lattice::from_parameters(2.0, 2.0, 2.0, 90.0, 90.0, 90.0),
            vec![("Cu".to_string(), [0.0, 0.0, 0.0])],
        )
        .unwrap();
        let session = Session::default().with_bulk(bulk);
        let path = tmp.path().join("session.json");
        session.save(&path).unwrap();
        (tmp, path)
    }

    fn load(tmp: &TempDir, session: &PathBuf, name: &str, content: &str, target: &str) {
        let file = tmp.path().join(name);
        fs::write(&file, content).unwrap();
        match command(&[
            "load-output",
            file.to_str().unwrap(),
            "-s",
            session.to_str().unwrap(),
            "-t",
            target,
        ]) {
            Commands::LoadOutput(args) => load_output(args).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_load_output_records_bulk() {
        let (tmp, session_path) = setup();
        load(&tmp, &session_path, "bulk.out", &qe_out(-10.0, 1), "bulk");

        let session = Session::load(&session_path).unwrap();
        assert_eq!(session.results.bulk_energy_ry, Some(-10.0));
        assert_eq!(session.results.bulk_natoms, Some(1));
        assert!(session.results.surface_energy_ev_per_a2.is_none());
    }

    #[test]
    fn test_load_output_without_energy_leaves_session() {
        let (tmp, session_path) = setup();
        let before = fs::read_to_string(&session_path).unwrap();
        load(&tmp, &session_path, "broken.out", "nothing useful here\n", "bulk");
        assert_eq!(fs::read_to_string(&session_path).unwrap(), before);
    }

    #[test]
    fn test_surface_energy_after_both_outputs() {
        let (tmp, session_path) = setup();
        let session = Session::load(&session_path).unwrap();
        session.rebuild_slab().unwrap().save(&session_path).unwrap();

        load(&tmp, &session_path, "bulk.out", &qe_out(-10.0, 1), "bulk");
        let slab_atoms = Session::load(&session_path).unwrap().slab_natoms().unwrap();
        let slab_energy = -10.0 * slab_atoms as f64 + 0.1;
        load(&tmp, &session_path, "slab.out", &qe_out(slab_energy, slab_atoms), "slab");

        let session = Session::load(&session_path).unwrap();
        let stored = session.results.surface_energy_ev_per_a2.unwrap();
        let expected = session.surface_energy().unwrap().ev_per_a2;
        assert!((stored - expected).abs() < 1e-12);
        assert!(stored > 0.0);

        match command(&["surface-energy", "-s", session_path.to_str().unwrap()]) {
            Commands::SurfaceEnergy(args) => surface_energy(args).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_output_rows_sources() {
        let out = QeOutput {
            energy_ry: Some(-1.0),
            num_atoms: None,
            energy_source: Some(EnergySource::TailHeuristic),
            atoms_source: None,
        };
        let rows = output_rows(&out);
        assert_eq!(rows[0].source, "last number in output tail");
        assert_eq!(rows[2].value, "-");
        assert_eq!(rows[3].value, "-");
    }
}
