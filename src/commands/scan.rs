//! # scan 命令实现
//!
//! 批量解析目录下的 pw.x 输出，按文件列出能量与原子数，可另存为 CSV。
//! 单个文件解析失败只记入表格，不中断扫描。
//!
//! ## 依赖关系
//! - 使用 `cli/energy.rs` 定义的参数
//! - 使用 `batch/collector.rs`, `parsers/qe_out.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::batch::FileCollector;
use crate::cli::energy::ScanArgs;
use crate::error::{Result, SlabQeError};
use crate::models::QeOutput;
use crate::parsers::qe_out::QeOutputParser;
use crate::utils::{output, progress};

use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// 单个文件的扫描结果
struct ScanEntry {
    path: PathBuf,
    outcome: Result<QeOutput>,
}

#[derive(Tabled)]
struct ScanRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Energy (Ry)")]
    energy_ry: String,
    #[tabled(rename = "Energy (eV)")]
    energy_ev: String,
    #[tabled(rename = "Atoms")]
    natoms: String,
    #[tabled(rename = "eV/atom")]
    per_atom: String,
    #[tabled(rename = "Note")]
    note: String,
}

/// 执行 scan
pub fn execute(args: ScanArgs) -> Result<()> {
    output::print_header("Scanning pw.x outputs");

    let files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect()?;

    if files.is_empty() {
        return Err(SlabQeError::NoFilesFound {
            pattern: args.pattern.clone(),
        });
    }

    output::print_info(&format!(
        "Found {} file(s) in '{}'",
        files.len(),
        args.input.display()
    ));

    let parser = QeOutputParser::new()?;
    let pb = progress::create_progress_bar(files.len() as u64, "Parsing");
    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let outcome = parser.parse_file(&path, args.allow_fallback);
        entries.push(ScanEntry { path, outcome });
        pb.inc(1);
    }
    pb.finish_and_clear();

    let rows: Vec<ScanRow> = entries
        .iter()
        .map(|e| scan_row(e, &args.input))
        .collect();
    println!("{}", Table::new(&rows));

    let with_energy = entries
        .iter()
        .filter(|e| matches!(&e.outcome, Ok(out) if out.energy_ry.is_some()))
        .count();
    if with_energy < entries.len() {
        output::print_warning(&format!(
            "{} of {} file(s) without a total energy",
            entries.len() - with_energy,
            entries.len()
        ));
    }

    if let Some(csv_path) = &args.output_csv {
        save_scan_csv(&entries, csv_path)?;
        output::print_success(&format!("Results saved to '{}'", csv_path.display()));
    }

    output::print_done(&format!("{} energies extracted", with_energy));
    Ok(())
}

fn scan_row(entry: &ScanEntry, base: &Path) -> ScanRow {
    let file = entry
        .path
        .strip_prefix(base)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(&entry.path)
        .display()
        .to_string();

    match &entry.outcome {
        Ok(out) => ScanRow {
            file,
            energy_ry: fmt_opt(out.energy_ry, 8),
            energy_ev: fmt_opt(out.energy_ev(), 6),
            natoms: out
                .num_atoms
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            per_atom: fmt_opt(out.energy_per_atom_ev(), 6),
            note: note_for(out).to_string(),
        },
        Err(e) => ScanRow {
            file,
            energy_ry: "-".to_string(),
            energy_ev: "-".to_string(),
            natoms: "-".to_string(),
            per_atom: "-".to_string(),
            note: e.to_string(),
        },
    }
}

fn note_for(out: &QeOutput) -> &'static str {
    if out.energy_ry.is_none() {
        "no energy"
    } else if out.is_heuristic() {
        "heuristic energy"
    } else {
        ""
    }
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

/// 保存扫描结果到 CSV
fn save_scan_csv(entries: &[ScanEntry], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path).map_err(SlabQeError::CsvError)?;

    wtr.write_record(["file", "energy_Ry", "energy_eV", "natoms", "energy_per_atom_eV", "note"])
        .map_err(SlabQeError::CsvError)?;

    for entry in entries {
        let record = match &entry.outcome {
            Ok(out) => [
                entry.path.display().to_string(),
                out.energy_ry.map(|e| format!("{:.10}", e)).unwrap_or_default(),
                out.energy_ev().map(|e| format!("{:.10}", e)).unwrap_or_default(),
                out.num_atoms.map(|n| n.to_string()).unwrap_or_default(),
                out.energy_per_atom_ev()
                    .map(|e| format!("{:.10}", e))
                    .unwrap_or_default(),
                note_for(out).to_string(),
            ],
            Err(e) => [
                entry.path.display().to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                e.to_string(),
            ],
        };
        wtr.write_record(&record).map_err(SlabQeError::CsvError)?;
    }

    wtr.flush().map_err(|e| SlabQeError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_writes_csv() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("a.out"),
            "number of atoms/cell = 2\n!    total energy = -20.5 Ry\n",
        )
        .unwrap();
        fs::write(tmp.path().join("b.out"), "JOB CRASHED\n").unwrap();
        fs::write(tmp.path().join("ignored.txt"), "").unwrap();
        let csv_path = tmp.path().join("scan.csv");

        let args = match Cli::parse_from([
            "slabqe",
            "scan",
            tmp.path().to_str().unwrap(),
            "--output-csv",
            csv_path.to_str().unwrap(),
        ])
        .command
        {
            Commands::Scan(args) => args,
            _ => unreachable!(),
        };
        execute(args).unwrap();

        let mut rdr = csv::Reader::from_path(&csv_path).unwrap();
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert!(records[0][0].ends_with("a.out"));
        assert_eq!(&records[0][1], "-20.5000000000");
        assert_eq!(&records[0][3], "2");
        assert_eq!(&records[1][5], "no energy");
    }

    #[test]
    fn test_scan_no_files() {
        let tmp = TempDir::new().unwrap();
        let args = match Cli::parse_from(["slabqe", "scan", tmp.path().to_str().unwrap()]).command
        {
            Commands::Scan(args) => args,
            _ => unreachable!(),
        };
        assert!(matches!(
            execute(args),
            Err(SlabQeError::NoFilesFound { .. })
        ));
    }

    #[test]
    fn test_note_for() {
        let mut out = QeOutput::default();
        assert_eq!(note_for(&out), "no energy");
        out.energy_ry = Some(-1.0);
        assert_eq!(note_for(&out), "");
    }
}
