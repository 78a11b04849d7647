//! # QE 计算结果数据模型
//!
//! 存储从 pw.x 输出中提取的总能量和原子数，以及由体相/表面两组结果导出的表面能。
//!
//! ## 依赖关系
//! - 被 `parsers/qe_out.rs` 填充
//! - 被 `models/session.rs`, `commands/energy.rs`, `commands/scan.rs` 使用

use crate::error::{Result, SlabQeError};
use serde::Serialize;

/// 1 Ry 对应的 eV
pub const RY_TO_EV: f64 = 13.605693009;

/// 1 eV/Å² 对应的 J/m²
pub const EV_PER_A2_TO_J_PER_M2: f64 = 16.02176634;

/// 总能量的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnergySource {
    /// 以 `!` 标记的 total energy 行
    Marker,
    /// 末尾 200 行的数字启发式（低置信度）
    TailHeuristic,
}

/// 原子数的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AtomCountSource {
    /// `number of atoms/cell = N`
    Declaration,
    /// 对 ATOMIC_POSITIONS 块计数
    PositionsBlock,
}

/// pw.x 输出解析结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QeOutput {
    /// 总能量 (Ry)
    pub energy_ry: Option<f64>,

    /// 原子数
    pub num_atoms: Option<usize>,

    pub energy_source: Option<EnergySource>,

    pub atoms_source: Option<AtomCountSource>,
}

impl QeOutput {
    /// 总能量 (eV)
    pub fn energy_ev(&self) -> Option<f64> {
        self.energy_ry.map(|e| e * RY_TO_EV)
    }

    /// 每原子能量 (eV)
    pub fn energy_per_atom_ev(&self) -> Option<f64> {
        match (self.energy_ev(), self.num_atoms) {
            (Some(e), Some(n)) if n > 0 => Some(e / n as f64),
            _ => None,
        }
    }

    /// 能量是否来自启发式回退
    pub fn is_heuristic(&self) -> bool {
        self.energy_source == Some(EnergySource::TailHeuristic)
    }
}

/// 表面能计算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceEnergy {
    /// eV/Å²
    pub ev_per_a2: f64,
    /// 表面面积 A (Å²)
    pub area: f64,
    pub bulk_natoms: usize,
    pub slab_natoms: usize,
}

impl SurfaceEnergy {
    /// E_surf = (E_slab - N_slab * E_bulk / N_bulk) / (2A)，两个表面
    pub fn compute(
        bulk_energy_ev: f64,
        bulk_natoms: usize,
        slab_energy_ev: f64,
        slab_natoms: usize,
        area: f64,
    ) -> Result<Self> {
        if bulk_natoms == 0 {
            return Err(SlabQeError::MissingDependency(
                "bulk atom count is zero; cannot compute per-atom energy".to_string(),
            ));
        }
        if !(area > 0.0) {
            return Err(SlabQeError::Geometry(format!(
                "slab surface area must be positive, got {}",
                area
            )));
        }

        let bulk_per_atom = bulk_energy_ev / bulk_natoms as f64;
        let ev_per_a2 = (slab_energy_ev - slab_natoms as f64 * bulk_per_atom) / (2.0 * area);

        Ok(SurfaceEnergy {
            ev_per_a2,
            area,
            bulk_natoms,
            slab_natoms,
        })
    }

    pub fn j_per_m2(&self) -> f64 {
        self.ev_per_a2 * EV_PER_A2_TO_J_PER_M2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_conversion() {
        let out = QeOutput {
            energy_ry: Some(-2.0),
            num_atoms: Some(4),
            ..Default::default()
        };
        assert!((out.energy_ev().unwrap() + 2.0 * RY_TO_EV).abs() < 1e-12);
        assert!((out.energy_per_atom_ev().unwrap() + 0.5 * RY_TO_EV).abs() < 1e-12);
        assert!(!out.is_heuristic());
    }

    #[test]
    fn test_per_atom_requires_atoms() {
        let out = QeOutput {
            energy_ry: Some(-2.0),
            num_atoms: Some(0),
            ..Default::default()
        };
        assert_eq!(out.energy_per_atom_ev(), None);
    }

    #[test]
    fn test_surface_energy_formula() {
        // 体相每原子 -10 eV，表面模型 8 原子 -76 eV，面积 10 Å²
        let se = SurfaceEnergy::compute(-20.0, 2, -76.0, 8, 10.0).unwrap();
        assert!((se.ev_per_a2 - 0.2).abs() < 1e-12);
        assert!((se.j_per_m2() - 0.2 * EV_PER_A2_TO_J_PER_M2).abs() < 1e-12);
    }

    #[test]
    fn test_surface_energy_rejects_bad_inputs() {
        assert!(SurfaceEnergy::compute(-20.0, 0, -76.0, 8, 10.0).is_err());
        assert!(SurfaceEnergy::compute(-20.0, 2, -76.0, 8, 0.0).is_err());
    }
}
