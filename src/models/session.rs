//! # 会话数据模型
//!
//! 会话文件 (JSON) 保存体相与表面结构、切面参数、pw.x 参数和能量结果。
//! 每个命令加载会话 → 生成新的会话值 → 成功后整体写回，失败时文件保持不变。
//!
//! 所有键在加载时均可缺省，缺省值与 `Default` 实现一致。
//!
//! ## 依赖关系
//! - 被所有会话相关的 `commands/` 使用
//! - 使用 `models/structure.rs`, `models/calculation.rs`, `slab/`

use crate::error::{Result, SlabQeError};
use crate::models::calculation::{QeOutput, SurfaceEnergy, RY_TO_EV};
use crate::models::structure::Structure;
use crate::slab;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

// ─────────────────────────────────────────────────────────────
// pw.x 参数枚举
// ─────────────────────────────────────────────────────────────

/// calculation 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Calculation {
    #[default]
    Scf,
    Relax,
    Nscf,
}

impl std::fmt::Display for Calculation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Calculation::Scf => write!(f, "scf"),
            Calculation::Relax => write!(f, "relax"),
            Calculation::Nscf => write!(f, "nscf"),
        }
    }
}

/// occupations 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Occupations {
    #[default]
    Fixed,
    Smearing,
    Tetrahedra,
}

impl std::fmt::Display for Occupations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Occupations::Fixed => write!(f, "fixed"),
            Occupations::Smearing => write!(f, "smearing"),
            Occupations::Tetrahedra => write!(f, "tetrahedra"),
        }
    }
}

/// smearing 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Smearing {
    #[default]
    Gaussian,
    MethfesselPaxton,
    MarzariVanderbilt,
}

impl std::fmt::Display for Smearing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Smearing::Gaussian => write!(f, "gaussian"),
            Smearing::MethfesselPaxton => write!(f, "methfessel-paxton"),
            Smearing::MarzariVanderbilt => write!(f, "marzari-vanderbilt"),
        }
    }
}

/// 体相或表面模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Bulk,
    Slab,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Bulk => write!(f, "bulk"),
            Target::Slab => write!(f, "slab"),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 会话结构
// ─────────────────────────────────────────────────────────────

/// pw.x 输入参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QeParams {
    pub calculation: Calculation,
    pub ecutwfc: u32,
    pub ecutrho: u32,
    pub kpoints: [u32; 3],
    /// 表面模型是否使用 `kpoints`（否则为 1 1 1）
    pub override_kpoints: bool,
    pub prefix: String,
    /// 赝势搜索目录
    pub pp_search_folder: String,
    /// 写入 `pseudo_dir` 的目录，也是复制目标
    pub pp_input_folder: String,
    pub copy_pseudos: bool,
    pub outdir: String,
    pub conv_thr: f64,
    pub occupations: Occupations,
    pub smearing: Smearing,
    pub degauss: f64,
    pub nspin: u32,
    /// 0 表示不写 nbnd
    pub nbnd: u32,
    #[serde(deserialize_with = "deserialize_mags")]
    pub starting_mags: [f64; 3],
}

impl Default for QeParams {
    fn default() -> Self {
        QeParams {
            calculation: Calculation::Scf,
            ecutwfc: 40,
            ecutrho: 400,
            kpoints: [4, 4, 1],
            override_kpoints: true,
            prefix: "qe_calc".to_string(),
            pp_search_folder: String::new(),
            pp_input_folder: "./pseudo".to_string(),
            copy_pseudos: false,
            outdir: "./out".to_string(),
            conv_thr: 1e-8,
            occupations: Occupations::Fixed,
            smearing: Smearing::Gaussian,
            degauss: 0.01,
            nspin: 1,
            nbnd: 0,
            starting_mags: [0.0; 3],
        }
    }
}

impl QeParams {
    /// 检查取值范围
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.nspin, 1 | 2) {
            return Err(SlabQeError::InvalidArgument(format!(
                "nspin must be 1 or 2, got {}",
                self.nspin
            )));
        }
        if self.kpoints.iter().any(|&k| k == 0) {
            return Err(SlabQeError::InvalidArgument(format!(
                "k-point mesh must be positive, got {:?}",
                self.kpoints
            )));
        }
        if self.ecutwfc == 0 {
            return Err(SlabQeError::InvalidArgument(
                "ecutwfc must be positive".to_string(),
            ));
        }
        if !(self.conv_thr > 0.0) {
            return Err(SlabQeError::InvalidArgument(format!(
                "conv_thr must be positive, got {}",
                self.conv_thr
            )));
        }
        if self.degauss < 0.0 {
            return Err(SlabQeError::InvalidArgument(format!(
                "degauss must be non-negative, got {}",
                self.degauss
            )));
        }
        Ok(())
    }

    /// 设置 nspin；非自旋极化时初始磁矩清零
    pub fn set_nspin(&mut self, nspin: u32) {
        self.nspin = nspin;
        if nspin != 2 {
            self.starting_mags = [0.0; 3];
        }
    }

    /// 有效前缀（空白时为 qe_calc）
    pub fn effective_prefix(&self) -> &str {
        match self.prefix.trim() {
            "" => "qe_calc",
            p => p,
        }
    }

    /// 有效 outdir（空白时为 ./out）
    pub fn effective_outdir(&self) -> &str {
        match self.outdir.trim() {
            "" => "./out",
            o => o,
        }
    }
}

/// starting_mags 长度不足时补零，超出部分丢弃
fn deserialize_mags<'de, D>(deserializer: D) -> std::result::Result<[f64; 3], D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<f64> = Vec::deserialize(deserializer)?;
    let mut mags = [0.0; 3];
    for (slot, v) in mags.iter_mut().zip(values) {
        *slot = v;
    }
    Ok(mags)
}

/// 体相与表面结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Structures {
    pub bulk: Option<Structure>,
    pub slab: Option<Structure>,
}

/// 能量结果（稀疏）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Results {
    #[serde(rename = "bulk_energy_eV", skip_serializing_if = "Option::is_none")]
    pub bulk_energy_ev: Option<f64>,
    #[serde(rename = "bulk_energy_Ry", skip_serializing_if = "Option::is_none")]
    pub bulk_energy_ry: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulk_natoms: Option<usize>,
    #[serde(rename = "slab_energy_eV", skip_serializing_if = "Option::is_none")]
    pub slab_energy_ev: Option<f64>,
    #[serde(rename = "slab_energy_Ry", skip_serializing_if = "Option::is_none")]
    pub slab_energy_ry: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slab_natoms: Option<usize>,
    #[serde(
        rename = "surface_energy_eV_per_A2",
        skip_serializing_if = "Option::is_none"
    )]
    pub surface_energy_ev_per_a2: Option<f64>,
}

/// 会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub structures: Structures,
    pub miller_index: [i32; 3],
    pub layers: usize,
    /// 真空层厚度 (Å)
    pub vacuum: f64,
    /// 仅用于导出，永不作用于 pw.x 输入
    pub supercell: [usize; 3],
    pub qe_input: QeParams,
    pub results: Results,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            structures: Structures::default(),
            miller_index: [1, 1, 1],
            layers: 6,
            vacuum: 10.0,
            supercell: [1, 1, 1],
            qe_input: QeParams::default(),
            results: Results::default(),
        }
    }
}

impl Session {
    /// 从 JSON 文件加载会话
    pub fn load(path: &Path) -> Result<Session> {
        let content = fs::read_to_string(path).map_err(|e| SlabQeError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;

        let session = Session::from_json(&content).map_err(|e| SlabQeError::SessionFormat {
            path: path.display().to_string(),
            source: e,
        })?;

        session.validate().map_err(|e| SlabQeError::ParseError {
            format: "session".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(session)
    }

    pub fn from_json(content: &str) -> serde_json::Result<Session> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 写回 JSON 文件（2 空格缩进）
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json().map_err(|e| SlabQeError::SessionFormat {
            path: path.display().to_string(),
            source: e,
        })?;

        fs::write(path, json + "\n").map_err(|e| SlabQeError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// 结构一致性：表面模型必须由体相导出
    pub fn validate(&self) -> Result<()> {
        if let Some(bulk) = &self.structures.bulk {
            bulk.validate()?;
        }
        if let Some(slab) = &self.structures.slab {
            if self.structures.bulk.is_none() {
                return Err(SlabQeError::MissingDependency(
                    "slab structure present without a bulk structure".to_string(),
                ));
            }
            slab.validate()?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // 结构操作
    // ─────────────────────────────────────────────────────────────

    /// 替换体相；旧的表面模型随之作废
    pub fn with_bulk(mut self, bulk: Structure) -> Session {
        self.structures.bulk = Some(bulk);
        self.structures.slab = None;
        self
    }

    /// 按当前切面参数重新构建表面模型
    pub fn rebuild_slab(mut self) -> Result<Session> {
        let bulk = self.structures.bulk.as_ref().ok_or_else(|| {
            SlabQeError::MissingDependency("no bulk structure loaded".to_string())
        })?;

        let slab = slab::build_slab(bulk, self.miller_index, self.layers, self.vacuum)?;
        self.structures.slab = Some(slab);
        Ok(self)
    }

    /// 取体相或表面结构
    pub fn structure(&self, target: Target) -> Result<&Structure> {
        match target {
            Target::Bulk => self.structures.bulk.as_ref().ok_or_else(|| {
                SlabQeError::MissingDependency("no bulk structure loaded".to_string())
            }),
            Target::Slab => self.structures.slab.as_ref().ok_or_else(|| {
                SlabQeError::MissingDependency("no slab built".to_string())
            }),
        }
    }

    /// 体相用会话 k 网格；表面模型仅在 override_kpoints 时使用，否则 1 1 1
    pub fn kpoints_for(&self, target: Target) -> [u32; 3] {
        match target {
            Target::Bulk => self.qe_input.kpoints,
            Target::Slab if self.qe_input.override_kpoints => self.qe_input.kpoints,
            Target::Slab => [1, 1, 1],
        }
    }

    // ─────────────────────────────────────────────────────────────
    // 能量结果
    // ─────────────────────────────────────────────────────────────

    /// 记录一次 pw.x 输出；没有能量时报错且不修改会话
    pub fn record_output(mut self, target: Target, output: &QeOutput) -> Result<Session> {
        let energy_ry = output.energy_ry.ok_or_else(|| {
            SlabQeError::MissingDependency("output carries no total energy".to_string())
        })?;
        let energy_ev = energy_ry * RY_TO_EV;

        let r = &mut self.results;
        match target {
            Target::Bulk => {
                r.bulk_energy_ev = Some(energy_ev);
                r.bulk_energy_ry = Some(energy_ry);
                r.bulk_natoms = output.num_atoms;
            }
            Target::Slab => {
                r.slab_energy_ev = Some(energy_ev);
                r.slab_energy_ry = Some(energy_ry);
                r.slab_natoms = output.num_atoms;
            }
        }
        Ok(self)
    }

    /// 两个能量都在时重算表面能；失败时丢弃旧值
    pub fn refresh_surface_energy(mut self) -> (Session, Option<Result<SurfaceEnergy>>) {
        if self.results.bulk_energy_ev.is_none() || self.results.slab_energy_ev.is_none() {
            return (self, None);
        }

        let outcome = self.surface_energy();
        self.results.surface_energy_ev_per_a2 = outcome.as_ref().ok().map(|se| se.ev_per_a2);
        (self, Some(outcome))
    }

    /// 体相原子数：优先输出文件，其次已加载的结构
    pub fn bulk_natoms(&self) -> Option<usize> {
        self.results
            .bulk_natoms
            .filter(|&n| n > 0)
            .or_else(|| self.structures.bulk.as_ref().map(|s| s.natoms()))
    }

    /// 表面模型原子数：优先输出文件，其次已构建的结构
    pub fn slab_natoms(&self) -> Option<usize> {
        self.results
            .slab_natoms
            .filter(|&n| n > 0)
            .or_else(|| self.structures.slab.as_ref().map(|s| s.natoms()))
    }

    /// 计算表面能 (eV/Å²)
    pub fn surface_energy(&self) -> Result<SurfaceEnergy> {
        let (bulk_e, slab_e) = match (self.results.bulk_energy_ev, self.results.slab_energy_ev) {
            (Some(b), Some(s)) => (b, s),
            _ => {
                return Err(SlabQeError::MissingDependency(
                    "both bulk and slab energies must be loaded before calculation".to_string(),
                ))
            }
        };

        let n_bulk = self.bulk_natoms().ok_or_else(|| {
            SlabQeError::MissingDependency(
                "bulk atom count unknown; cannot compute per-atom energy".to_string(),
            )
        })?;
        let n_slab = self.slab_natoms().ok_or_else(|| {
            SlabQeError::MissingDependency(
                "slab atom count unknown; cannot compute surface energy".to_string(),
            )
        })?;

        let area = self
            .structures
            .slab
            .as_ref()
            .map(|s| s.surface_area())
            .ok_or_else(|| {
                SlabQeError::MissingDependency(
                    "slab structure needed for the surface area".to_string(),
                )
            })?;

        SurfaceEnergy::compute(bulk_e, n_bulk, slab_e, n_slab, area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::Lattice;

    fn cubic_bulk() -> Structure {
        Structure::from_fractional(
            Lattice::from_parameters(3.0, 3.0, 3.0, 90.0, 90.0, 90.0),
            vec![("Po".to_string(), [0.0, 0.0, 0.0])],
        )
        .unwrap()
    }

    fn output(energy_ry: f64, natoms: Option<usize>) -> QeOutput {
        QeOutput {
            energy_ry: Some(energy_ry),
            num_atoms: natoms,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let session = Session::from_json(r#"{"layers": 4}"#).unwrap();
        assert_eq!(session.layers, 4);
        assert_eq!(session.supercell, [1, 1, 1]);
        assert_eq!(session.miller_index, [1, 1, 1]);
        assert_eq!(session.qe_input, QeParams::default());
        assert!(session.structures.bulk.is_none());
    }

    #[test]
    fn test_short_starting_mags_padded() {
        let session =
            Session::from_json(r#"{"qe_input": {"nspin": 2, "starting_mags": [0.5]}}"#).unwrap();
        assert_eq!(session.qe_input.starting_mags, [0.5, 0.0, 0.0]);
        assert_eq!(session.qe_input.ecutwfc, 40);
    }

    #[test]
    fn test_unknown_enum_text_rejected() {
        assert!(Session::from_json(r#"{"qe_input": {"calculation": "md"}}"#).is_err());
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let mut session = Session::default().with_bulk(cubic_bulk());
        session.miller_index = [1, -1, 2];
        session.vacuum = 12.345678901234567;
        session.qe_input.conv_thr = 1.2345678901234e-11;
        session.qe_input.degauss = 0.0123456789;
        session.qe_input.smearing = Smearing::MethfesselPaxton;
        session.qe_input.prefix = "NaCl (100) ünïcode".to_string();
        session.qe_input.starting_mags = [0.1 + 0.2, -1.0 / 3.0, 0.0];
        session.results.bulk_energy_ry = Some(-123.456789012345);
        session.results.bulk_energy_ev = Some(-123.456789012345 * RY_TO_EV);
        session = session.rebuild_slab().unwrap();

        let json = session.to_json().unwrap();
        let back = Session::from_json(&json).unwrap();
        assert_eq!(back, session);
        assert_eq!(
            back.qe_input.starting_mags[0].to_bits(),
            (0.1f64 + 0.2).to_bits()
        );
        assert!(json.contains("\"methfessel-paxton\""));
        assert!(json.contains("\"bulk_energy_Ry\""));
        assert!(!json.contains("slab_energy_eV"));
    }

    #[test]
    fn test_new_bulk_discards_slab() {
        let session = Session::default()
            .with_bulk(cubic_bulk())
            .rebuild_slab()
            .unwrap();
        assert!(session.structures.slab.is_some());

        let session = session.with_bulk(cubic_bulk());
        assert!(session.structures.slab.is_none());
    }

    #[test]
    fn test_slab_requires_bulk() {
        assert!(Session::default().rebuild_slab().is_err());
        let json = r#"{"structures": {"bulk": null, "slab":
            {"symbols": ["H"], "positions": [[0,0,0]],
             "cell": [[1,0,0],[0,1,0],[0,0,1]], "pbc": [true,true,false]}}}"#;
        let session = Session::from_json(json).unwrap();
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_slab_kpoints_default_to_gamma_without_override() {
        let mut session = Session::default();
        session.qe_input.kpoints = [6, 6, 2];
        session.qe_input.override_kpoints = false;
        assert_eq!(session.kpoints_for(Target::Bulk), [6, 6, 2]);
        assert_eq!(session.kpoints_for(Target::Slab), [1, 1, 1]);

        session.qe_input.override_kpoints = true;
        assert_eq!(session.kpoints_for(Target::Slab), [6, 6, 2]);
    }

    #[test]
    fn test_surface_energy_after_both_outputs() {
        let mut session = Session::default().with_bulk(cubic_bulk());
        session.miller_index = [0, 0, 1];
        session.layers = 4;
        let session = session.rebuild_slab().unwrap();

        let session = session.record_output(Target::Bulk, &output(-2.0, Some(1))).unwrap();
        let (session, outcome) = session.refresh_surface_energy();
        assert!(outcome.is_none());

        let session = session.record_output(Target::Slab, &output(-7.0, Some(4))).unwrap();
        let (session, outcome) = session.refresh_surface_energy();
        let se = outcome.unwrap().unwrap();

        // (−7 − 4·(−2)) Ry / (2 · 9 Å²)
        let expected = (1.0 * RY_TO_EV) / 18.0;
        assert!((se.ev_per_a2 - expected).abs() < 1e-10);
        assert_eq!(session.results.surface_energy_ev_per_a2, Some(se.ev_per_a2));
    }

    #[test]
    fn test_natoms_fall_back_to_structures() {
        let mut session = Session::default().with_bulk(cubic_bulk());
        session.miller_index = [0, 0, 1];
        session.layers = 3;
        let session = session
            .rebuild_slab()
            .unwrap()
            .record_output(Target::Bulk, &output(-2.0, None))
            .unwrap()
            .record_output(Target::Slab, &output(-5.0, Some(0)))
            .unwrap();

        let se = session.surface_energy().unwrap();
        assert_eq!(se.bulk_natoms, 1);
        assert_eq!(se.slab_natoms, 3);
    }

    #[test]
    fn test_surface_energy_needs_both_energies() {
        let session = Session::default()
            .with_bulk(cubic_bulk())
            .record_output(Target::Bulk, &output(-2.0, Some(1)))
            .unwrap();
        assert!(matches!(
            session.surface_energy(),
            Err(SlabQeError::MissingDependency(_))
        ));
    }

    #[test]
    fn test_failed_refresh_drops_stale_value() {
        let mut session = Session::default()
            .record_output(Target::Bulk, &output(-2.0, Some(1)))
            .unwrap()
            .record_output(Target::Slab, &output(-7.0, Some(4)))
            .unwrap();
        session.results.surface_energy_ev_per_a2 = Some(1.0);

        // 没有表面结构，无法得到面积
        let (session, outcome) = session.refresh_surface_energy();
        assert!(outcome.unwrap().is_err());
        assert_eq!(session.results.surface_energy_ev_per_a2, None);
    }

    #[test]
    fn test_record_without_energy_fails() {
        let result = Session::default().record_output(Target::Bulk, &QeOutput::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_set_nspin_clears_magnetization() {
        let mut params = QeParams::default();
        params.set_nspin(2);
        params.starting_mags = [0.5, 0.0, 0.0];
        params.set_nspin(1);
        assert_eq!(params.starting_mags, [0.0; 3]);
        assert!(params.validate().is_ok());

        params.nspin = 3;
        assert!(params.validate().is_err());
    }
}
