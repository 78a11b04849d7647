//! # 晶体结构数据模型
//!
//! 统一的结构表示：元素符号、笛卡尔坐标 (Å)、晶格矩阵和周期性边界标志。
//! 体相 (bulk) 与表面模型 (slab) 共用此类型，序列化格式与会话文件一致：
//! `{symbols, positions, cell, pbc}`。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `slab/`, `qe/`, `models/session.rs` 使用
//! - 使用 `nalgebra` 做坐标变换

use crate::error::{Result, SlabQeError};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 晶格参数表示
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度。a 沿 x 轴，b 位于 xy 平面。
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).max(0.0).sqrt();

        Lattice {
            matrix: [
                [a, 0.0, 0.0],
                [b * cos_gamma, b * sin_gamma, 0.0],
                [c1, c2, c3],
            ],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 第 i 个晶格向量
    pub fn vector(&self, i: usize) -> Vector3<f64> {
        Vector3::from(self.matrix[i])
    }

    /// 行向量矩阵（nalgebra 形式）
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let m = self.matrix;
        Matrix3::new(
            m[0][0], m[0][1], m[0][2], //
            m[1][0], m[1][1], m[1][2], //
            m[2][0], m[2][1], m[2][2],
        )
    }

    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Lattice {
            matrix: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
        }
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let (va, vb, vc) = (self.vector(0), self.vector(1), self.vector(2));
        let (a, b, c) = (va.norm(), vb.norm(), vc.norm());

        let angle = |u: &Vector3<f64>, v: &Vector3<f64>, lu: f64, lv: f64| {
            if lu * lv > 0.0 {
                (u.dot(v) / (lu * lv)).clamp(-1.0, 1.0).acos().to_degrees()
            } else {
                90.0
            }
        };

        (
            a,
            b,
            c,
            angle(&vb, &vc, b, c),
            angle(&va, &vc, a, c),
            angle(&va, &vb, a, b),
        )
    }

    /// 计算晶格体积（带符号）
    pub fn volume(&self) -> f64 {
        self.to_matrix().determinant()
    }

    /// a × b 的模长，即 ab 面面积 (Å²)
    pub fn ab_area(&self) -> f64 {
        self.vector(0).cross(&self.vector(1)).norm()
    }

    /// 分数坐标转笛卡尔坐标
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }

    /// 笛卡尔坐标转分数坐标；晶格奇异时返回 `None`
    pub fn cart_to_frac(&self, cart: [f64; 3]) -> Option<[f64; 3]> {
        // r = f · M  =>  f = r · M⁻¹
        let inv = self.to_matrix().try_inverse()?;
        let f = inv.transpose() * Vector3::from(cart);
        Some([f[0], f[1], f[2]])
    }
}

/// 原子结构（体相或表面模型）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// 元素符号，与 `positions` 一一对应
    pub symbols: Vec<String>,

    /// 笛卡尔坐标 (Å)
    pub positions: Vec<[f64; 3]>,

    /// 晶格
    pub cell: Lattice,

    /// 三个方向的周期性
    pub pbc: [bool; 3],
}

impl Structure {
    pub fn new(
        symbols: Vec<String>,
        positions: Vec<[f64; 3]>,
        cell: Lattice,
        pbc: [bool; 3],
    ) -> Result<Self> {
        let structure = Structure {
            symbols,
            positions,
            cell,
            pbc,
        };
        structure.validate()?;
        Ok(structure)
    }

    /// 由分数坐标构造周期性结构
    pub fn from_fractional(cell: Lattice, atoms: Vec<(String, [f64; 3])>) -> Result<Self> {
        let (symbols, positions) = atoms
            .into_iter()
            .map(|(el, frac)| (el, cell.frac_to_cart(frac)))
            .unzip();
        Structure::new(symbols, positions, cell, [true; 3])
    }

    /// 检查符号与坐标数量一致
    pub fn validate(&self) -> Result<()> {
        if self.symbols.len() != self.positions.len() {
            return Err(SlabQeError::InvalidArgument(format!(
                "structure has {} symbols but {} positions",
                self.symbols.len(),
                self.positions.len()
            )));
        }
        Ok(())
    }

    pub fn natoms(&self) -> usize {
        self.symbols.len()
    }

    /// 按首次出现顺序去重的元素列表
    pub fn unique_symbols(&self) -> Vec<String> {
        let mut unique: Vec<String> = Vec::new();
        for s in &self.symbols {
            if !unique.contains(s) {
                unique.push(s.clone());
            }
        }
        unique
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for s in &self.symbols {
            *counts.entry(s.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 分数坐标；晶格奇异时报错
    pub fn scaled_positions(&self) -> Result<Vec<[f64; 3]>> {
        self.positions
            .iter()
            .map(|p| {
                self.cell.cart_to_frac(*p).ok_or_else(|| {
                    SlabQeError::Geometry("cell matrix is singular".to_string())
                })
            })
            .collect()
    }

    /// ab 面面积 (Å²)
    pub fn surface_area(&self) -> f64 {
        self.cell.ab_area()
    }

    /// 超胞扩展。原子顺序：先整块复制 (0,0,0)，再 (0,0,1) …，最后一个轴变化最快。
    pub fn repeat(&self, reps: [usize; 3]) -> Result<Structure> {
        if reps.iter().any(|&n| n == 0) {
            return Err(SlabQeError::InvalidArgument(format!(
                "supercell repeats must be >= 1, got {:?}",
                reps
            )));
        }

        let m = self.cell.matrix;
        let n = reps[0] * reps[1] * reps[2] * self.natoms();
        let mut symbols = Vec::with_capacity(n);
        let mut positions = Vec::with_capacity(n);

        for i in 0..reps[0] {
            for j in 0..reps[1] {
                for k in 0..reps[2] {
                    let shift = self.cell.frac_to_cart([i as f64, j as f64, k as f64]);
                    for (s, p) in self.symbols.iter().zip(&self.positions) {
                        symbols.push(s.clone());
                        positions.push([p[0] + shift[0], p[1] + shift[1], p[2] + shift[2]]);
                    }
                }
            }
        }

        let mut matrix = m;
        for (row, &r) in matrix.iter_mut().zip(reps.iter()) {
            for x in row.iter_mut() {
                *x *= r as f64;
            }
        }

        Ok(Structure {
            symbols,
            positions,
            cell: Lattice::from_vectors(matrix),
            pbc: self.pbc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rocksalt() -> Structure {
        let lattice = Lattice::from_parameters(5.64, 5.64, 5.64, 90.0, 90.0, 90.0);
        Structure::from_fractional(
            lattice,
            vec![
                ("Na".to_string(), [0.0, 0.0, 0.0]),
                ("Cl".to_string(), [0.5, 0.5, 0.5]),
                ("Na".to_string(), [0.5, 0.5, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_lattice_from_parameters_cubic() {
        let lattice = Lattice::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0);
        let (a, b, c, alpha, beta, gamma) = lattice.parameters();

        assert!((a - 5.0).abs() < 1e-6);
        assert!((b - 5.0).abs() < 1e-6);
        assert!((c - 5.0).abs() < 1e-6);
        assert!((alpha - 90.0).abs() < 1e-6);
        assert!((beta - 90.0).abs() < 1e-6);
        assert!((gamma - 90.0).abs() < 1e-6);
        assert!((lattice.volume() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_hexagonal() {
        let lattice = Lattice::from_parameters(3.0, 3.0, 5.0, 90.0, 90.0, 120.0);
        let (_, _, c, _, _, gamma) = lattice.parameters();

        assert!((c - 5.0).abs() < 0.01);
        assert!((gamma - 120.0).abs() < 0.01);
        assert!((lattice.ab_area() - 9.0 * (3.0f64).sqrt() / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_frac_cart_round_trip() {
        let lattice = Lattice::from_parameters(4.0, 5.0, 6.0, 80.0, 95.0, 110.0);
        let frac = [0.1, 0.25, 0.7];
        let back = lattice.cart_to_frac(lattice.frac_to_cart(frac)).unwrap();
        for i in 0..3 {
            assert!((back[i] - frac[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unique_symbols_keep_first_appearance() {
        let s = rocksalt();
        assert_eq!(s.unique_symbols(), vec!["Na".to_string(), "Cl".to_string()]);
        assert_eq!(s.formula(), "ClNa2");
    }

    #[test]
    fn test_repeat_orders_blocks_with_last_axis_fastest() {
        let s = rocksalt();
        let sc = s.repeat([1, 1, 2]).unwrap();

        assert_eq!(sc.natoms(), 6);
        assert!((sc.cell.matrix[2][2] - 11.28).abs() < 1e-9);
        // 第二块整体沿 c 平移
        assert!((sc.positions[3][2] - 5.64).abs() < 1e-9);
        assert_eq!(sc.symbols[3], "Na");
    }

    #[test]
    fn test_repeat_rejects_zero() {
        assert!(rocksalt().repeat([1, 0, 1]).is_err());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let lattice = Lattice::from_parameters(3.0, 3.0, 3.0, 90.0, 90.0, 90.0);
        let result = Structure::new(vec!["Fe".to_string()], vec![], lattice, [true; 3]);
        assert!(result.is_err());
    }
}
