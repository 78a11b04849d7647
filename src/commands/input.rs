//! # generate 命令实现
//!
//! 为体相或表面模型写出 pw.x 输入文件：
//! 1. 选择结构与 k 网格（表面模型默认 1 1 1）
//! 2. 在搜索目录中查找赝势；`--pseudo` 显式指定优先，仍缺失时可交互询问
//! 3. 确定 `pseudo_dir`，需要时把赝势复制过去
//! 4. 生成并写出输入文本
//!
//! 会话文件不会被修改。
//!
//! ## 依赖关系
//! - 使用 `cli/input.rs` 定义的参数
//! - 使用 `pseudo/`, `qe/`, `models/session.rs`
//! - 使用 `console` 做交互输入

use super::open_session;
use crate::cli::input::GenerateArgs;
use crate::error::{Result, SlabQeError};
use crate::pseudo::copy::destination_path;
use crate::pseudo::{copy_pseudos, resolve_pseudos, CopyAction, PseudoMap};
use crate::qe::{pseudo_dir_layout, render_input};
use crate::utils::output;

use console::Term;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// 执行 generate
pub fn execute(args: GenerateArgs) -> Result<()> {
    output::print_header(&format!("Generating pw.x input for {}", args.target));

    let session = open_session(&args.session)?;
    let params = &session.qe_input;
    params.validate()?;

    let structure = session.structure(args.target)?;
    let kpoints = session.kpoints_for(args.target);
    let elements = structure.unique_symbols();

    // ── 赝势查找 ──
    let search_dir = args.pseudo_search.clone().or_else(|| {
        let s = params.pp_search_folder.trim();
        (!s.is_empty()).then(|| PathBuf::from(s))
    });
    match &search_dir {
        Some(dir) if dir.is_dir() => {
            output::print_info(&format!("Searching pseudopotentials in {}", dir.display()))
        }
        Some(dir) => output::print_warning(&format!(
            "Pseudopotential folder '{}' does not exist",
            dir.display()
        )),
        None => output::print_info("No pseudopotential search folder configured"),
    }

    let mut resolution = resolve_pseudos(&elements, search_dir.as_deref())?;

    // 显式指定的元素不使用自动查找结果
    let explicit: BTreeMap<String, PathBuf> = args.pseudos.iter().cloned().collect();
    for el in explicit.keys() {
        if !elements.contains(el) {
            output::print_warning(&format!("--pseudo {}: element not in the structure", el));
        } else if resolution.resolved.remove(el).is_some() {
            resolution.missing.push(el.clone());
        }
    }
    for (el, path) in &resolution.resolved {
        output::print_info(&format!("{}: {}", el, path.display()));
    }

    if !resolution.is_complete() {
        output::print_warning(&format!(
            "No pseudopotential found for: {}",
            resolution.missing.join(", ")
        ));
    }

    let interactive = args.interactive && console::user_attended();
    if args.interactive && !interactive {
        output::print_warning("Not attached to a terminal; --interactive ignored");
    }
    let pseudos = resolution.commit(|el| {
        explicit.get(el).cloned().or_else(|| {
            if interactive {
                prompt_for_pseudo(el)
            } else {
                None
            }
        })
    })?;

    // ── 输出位置与 pseudo_dir ──
    let out_path = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!("{}_{}.in", params.effective_prefix(), args.target))
    });
    let in_dir = absolute_parent(&out_path)?;
    fs::create_dir_all(&in_dir).map_err(|e| SlabQeError::FileWriteError {
        path: in_dir.display().to_string(),
        source: e,
    })?;

    let user_dir = args
        .pseudo_dir
        .clone()
        .unwrap_or_else(|| params.pp_input_folder.clone());
    let copy = args.copy_override().unwrap_or(params.copy_pseudos);
    let layout = pseudo_dir_layout(&user_dir, &in_dir, copy);

    let files = match &layout.dest_dir {
        Some(dest) => {
            let records = copy_pseudos(&pseudos, dest)?;
            for (el, record) in &records {
                let msg = format!("{} -> {}", el, destination_path(dest, record).display());
                match record.action {
                    CopyAction::Copied => output::print_success(&format!("Copied {}", msg)),
                    CopyAction::Reused => output::print_skip(&format!("Reused {}", msg)),
                    CopyAction::Renamed => output::print_warning(&format!(
                        "Different file with the same name exists; copied {}",
                        msg
                    )),
                }
            }
            records
                .into_iter()
                .map(|(el, record)| (el, record.file_name))
                .collect()
        }
        None => base_names(&pseudos)?,
    };

    // ── 写出 ──
    let text = render_input(structure, params, kpoints, &layout.pseudo_dir, &files)?;
    fs::write(&out_path, text).map_err(|e| SlabQeError::FileWriteError {
        path: out_path.display().to_string(),
        source: e,
    })?;

    output::print_info(&format!(
        "{} atoms, k-points {} {} {}, pseudo_dir = '{}'",
        structure.natoms(),
        kpoints[0],
        kpoints[1],
        kpoints[2],
        layout.pseudo_dir
    ));
    output::print_success(&format!("Input written to '{}'", out_path.display()));
    Ok(())
}

/// 交互询问一个赝势路径；空输入或读失败返回 None
fn prompt_for_pseudo(element: &str) -> Option<PathBuf> {
    let term = Term::stderr();
    term.write_str(&format!(
        "Pseudopotential file for {} (empty to abort): ",
        element
    ))
    .ok()?;
    let line = term.read_line().ok()?;
    match line.trim() {
        "" => None,
        p => Some(PathBuf::from(p)),
    }
}

/// 输出文件所在目录的绝对路径
fn absolute_parent(path: &Path) -> Result<PathBuf> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|e| SlabQeError::FileReadError {
                path: ".".to_string(),
                source: e,
            })?
            .join(path)
    };
    Ok(abs
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/")))
}

/// 不复制时，输入中只写文件名
fn base_names(pseudos: &PseudoMap) -> Result<BTreeMap<String, String>> {
    pseudos
        .iter()
        .map(|(el, path)| {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    SlabQeError::InvalidArgument(format!("not a file path: {}", path.display()))
                })?;
            Ok((el.clone(), name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::models::{Lattice, Session, Structure};
    use clap::Parser;
    use tempfile::TempDir;

    fn generate_args(argv: &[&str]) -> GenerateArgs {
        let mut full = vec!["slabqe", "generate"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Generate(args) => args,
            _ => unreachable!(),
        }
    }

    /// 临时目录中准备 Cu 体相会话和赝势目录
    fn setup() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let pp = tmp.path().join("pp");
        fs::create_dir(&pp).unwrap();
        fs::write(pp.join("Cu.pbe.UPF"), "cu upf").unwrap();
        fs::write(pp.join("Cu_long_name.UPF"), "other").unwrap();

        let bulk = Structure::from_fractional(
            Lattice::from_parameters(3.6, 3.6, 3.6, 90.0, 90.0, 90.0),
            vec![("Cu".to_string(), [0.0, 0.0, 0.0])],
        )
        .unwrap();
        let mut session = Session::default().with_bulk(bulk);
        session.qe_input.pp_search_folder = pp.display().to_string();
        session.qe_input.kpoints = [6, 6, 6];

        let session_path = tmp.path().join("session.json");
        session.save(&session_path).unwrap();
        (tmp, session_path)
    }

    #[test]
    fn test_generate_with_copy() {
        let (tmp, session_path) = setup();
        let out = tmp.path().join("run/cu_bulk.in");
        let args = generate_args(&[
            "-s",
            session_path.to_str().unwrap(),
            "-t",
            "bulk",
            "-o",
            out.to_str().unwrap(),
            "--copy-pseudos",
        ]);
        execute(args).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("  pseudo_dir = './pseudo',"));
        assert!(text.contains("Cu.pbe.UPF"));
        assert!(text.contains("6 6 6 0 0 0"));
        assert!(tmp.path().join("run/pseudo/Cu.pbe.UPF").is_file());

        // 会话不变
        let reloaded = Session::load(&session_path).unwrap();
        assert!(reloaded.results.bulk_energy_ev.is_none());
    }

    #[test]
    fn test_generate_explicit_pseudo_without_copy() {
        let (tmp, session_path) = setup();
        let explicit = tmp.path().join("pp/Cu_long_name.UPF");
        let out = tmp.path().join("cu.in");
        let assignment = format!("Cu={}", explicit.display());
        let args = generate_args(&[
            "-s",
            session_path.to_str().unwrap(),
            "-t",
            "bulk",
            "-o",
            out.to_str().unwrap(),
            "--pseudo",
            &assignment,
            "--pseudo-dir",
            "/abs/pseudos",
        ]);
        execute(args).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("  pseudo_dir = '/abs/pseudos',"));
        assert!(text.contains("Cu_long_name.UPF"));
        assert!(!tmp.path().join("pseudo").exists());
    }

    #[test]
    fn test_generate_slab_requires_slab() {
        let (tmp, session_path) = setup();
        let out = tmp.path().join("slab.in");
        let args = generate_args(&[
            "-s",
            session_path.to_str().unwrap(),
            "-t",
            "slab",
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(matches!(
            execute(args),
            Err(SlabQeError::MissingDependency(_))
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_pseudo_errors() {
        let (tmp, session_path) = setup();
        let out = tmp.path().join("cu.in");
        let args = generate_args(&[
            "-s",
            session_path.to_str().unwrap(),
            "-t",
            "bulk",
            "-o",
            out.to_str().unwrap(),
            "--pseudo-search",
            tmp.path().join("nowhere").to_str().unwrap(),
        ]);
        assert!(matches!(
            execute(args),
            Err(SlabQeError::MissingPseudopotential { .. })
        ));
    }
}
