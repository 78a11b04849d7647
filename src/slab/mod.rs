//! # 表面模型构建
//!
//! 沿 Miller 指数切割体相，堆叠若干层并在 z 方向加入真空层。
//!
//! ## 流程
//! 1. `basis::surface_basis` 求切面整数基矢
//! 2. 体相分数坐标换到新基矢并折回 [0, 1)
//! 3. 沿 c3 重复 `layers` 次
//! 4. c 替换为其在表面法向上的投影，旋转使 a ∥ x、c ∥ z
//! 5. z 方向非周期：c = 厚度 + 2·真空，最低原子位于 z = vacuum
//!
//! ## 依赖关系
//! - 被 `models/session.rs` 调用
//! - 使用 `models/structure.rs` 与 `nalgebra`

pub mod basis;

use crate::error::{Result, SlabQeError};
use crate::models::{Lattice, Structure};
use nalgebra::{Matrix3, Vector3};

const WRAP_TOL: f64 = 1e-10;

/// 构建表面模型
pub fn build_slab(
    bulk: &Structure,
    miller: [i32; 3],
    layers: usize,
    vacuum: f64,
) -> Result<Structure> {
    if miller == [0, 0, 0] {
        return Err(SlabQeError::InvalidArgument(
            "Miller index (0 0 0) is not a plane".to_string(),
        ));
    }
    if layers == 0 {
        return Err(SlabQeError::InvalidArgument(
            "layer count must be at least 1".to_string(),
        ));
    }
    if !(vacuum >= 0.0) {
        return Err(SlabQeError::InvalidArgument(format!(
            "vacuum must be non-negative, got {}",
            vacuum
        )));
    }
    if bulk.natoms() == 0 {
        return Err(SlabQeError::Geometry("bulk structure has no atoms".to_string()));
    }

    let int_basis = basis::surface_basis(&bulk.cell, miller);
    let basis = Matrix3::from_fn(|i, j| int_basis[i][j] as f64);

    // 体相分数坐标 f 满足 basisᵀ · x = f
    let to_new = basis
        .transpose()
        .try_inverse()
        .ok_or_else(|| SlabQeError::Geometry("surface basis is singular".to_string()))?;

    let unit: Vec<Vector3<f64>> = bulk
        .scaled_positions()?
        .into_iter()
        .map(|f| {
            let x = to_new * Vector3::from(f);
            x.map(|v| v - (v + WRAP_TOL).floor())
        })
        .collect();

    // 新原胞（行向量）
    let cell = basis * bulk.cell.to_matrix();
    let (a1, a2, c_unit) = (row(&cell, 0), row(&cell, 1), row(&cell, 2));

    let mut symbols = Vec::with_capacity(unit.len() * layers);
    let mut positions: Vec<Vector3<f64>> = Vec::with_capacity(unit.len() * layers);
    for n in 0..layers {
        for (sym, x) in bulk.symbols.iter().zip(&unit) {
            symbols.push(sym.clone());
            positions.push(x[0] * a1 + x[1] * a2 + (x[2] + n as f64) * c_unit);
        }
    }

    // c 投影到表面法向
    let a3 = c_unit * layers as f64;
    let normal = a1.cross(&a2);
    let normal_sq = normal.norm_squared();
    if normal_sq < 1e-12 {
        return Err(SlabQeError::Geometry(
            "in-plane lattice vectors are collinear".to_string(),
        ));
    }
    let a3 = normal * (a3.dot(&normal) / normal_sq);

    let skewed = Matrix3::from_rows(&[a1.transpose(), a2.transpose(), a3.transpose()]);
    let to_frac = skewed
        .try_inverse()
        .ok_or_else(|| SlabQeError::Geometry("slab cell is singular".to_string()))?
        .transpose();

    // 标准取向：a ∥ x，b 在 xy 平面，c ∥ z
    let la1 = a1.norm();
    let b_x = a1.dot(&a2) / la1;
    let b_y = (a2.norm_squared() - b_x * b_x).max(0.0).sqrt();
    let oriented = Matrix3::new(
        la1, 0.0, 0.0, //
        b_x, b_y, 0.0, //
        0.0, 0.0, a3.norm(),
    );

    let mut cart: Vec<[f64; 3]> = positions
        .iter()
        .map(|r| {
            let mut f = to_frac * r;
            f[0] -= f[0].floor();
            f[1] -= f[1].floor();
            let p = oriented.transpose() * f;
            [p[0], p[1], p[2]]
        })
        .collect();

    // z 方向加真空并居中
    let z_min = cart.iter().map(|p| p[2]).fold(f64::INFINITY, f64::min);
    let z_max = cart.iter().map(|p| p[2]).fold(f64::NEG_INFINITY, f64::max);
    let height = z_max - z_min + 2.0 * vacuum;
    if !(height > 1e-8) {
        return Err(SlabQeError::Geometry(
            "slab has zero height; add vacuum or layers".to_string(),
        ));
    }
    for p in cart.iter_mut() {
        p[2] += vacuum - z_min;
    }

    let mut matrix = Lattice::from_matrix(&oriented).matrix;
    matrix[2] = [0.0, 0.0, height];

    Structure::new(
        symbols,
        cart,
        Lattice::from_vectors(matrix),
        [true, true, false],
    )
}

fn row(m: &Matrix3<f64>, i: usize) -> Vector3<f64> {
    Vector3::new(m[(i, 0)], m[(i, 1)], m[(i, 2)])
}
