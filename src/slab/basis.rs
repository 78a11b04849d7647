//! # 表面整数基矢
//!
//! 对给定 Miller 指数 (h, k, l) 求整数矩阵 (c1, c2, c3)：c1、c2 张成切面，
//! c3 为堆垛方向，|det| 即每层包含的体相原胞数。
//!
//! 整数除法与取模均按向下取整语义实现，保证负指数下基矢选取确定。
//!
//! ## 依赖关系
//! - 被 `slab/mod.rs` 使用

use crate::models::Lattice;
use nalgebra::Vector3;

const TOL: f64 = 1e-10;

/// 向下取整除法
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// 结果与除数同号的取模
fn floor_mod(a: i64, b: i64) -> i64 {
    a - b * floor_div(a, b)
}

pub(crate) fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// 扩展欧几里得：返回 (x, y) 使 a·x + b·y = gcd(a, b)
pub(crate) fn ext_gcd(a: i64, b: i64) -> (i64, i64) {
    if b == 0 {
        (1, 0)
    } else if floor_mod(a, b) == 0 {
        (0, 1)
    } else {
        let (x, y) = ext_gcd(b, floor_mod(a, b));
        (y, x - y * floor_div(a, b))
    }
}

/// 计算切面整数基矢 [c1, c2, c3]（行向量，以体相晶格为单位）
pub fn surface_basis(lattice: &Lattice, miller: [i32; 3]) -> [[i64; 3]; 3] {
    let [h, k, l] = miller.map(i64::from);
    let (h0, k0, l0) = (h == 0, k == 0, l == 0);

    // 两个指数为零：直接取坐标轴
    if (h0 && k0) || (h0 && l0) || (k0 && l0) {
        return if !h0 {
            [[0, 1, 0], [0, 0, 1], [1, 0, 0]]
        } else if !k0 {
            [[0, 0, 1], [1, 0, 0], [0, 1, 0]]
        } else {
            [[1, 0, 0], [0, 1, 0], [0, 0, 1]]
        };
    }

    let (mut p, mut q) = ext_gcd(k, l);
    let (a1, a2, a3) = (lattice.vector(0), lattice.vector(1), lattice.vector(2));
    let (hf, kf, lf) = (h as f64, k as f64, l as f64);

    // c1·c2 = k1 + i·k2，取使重叠最小的整数 i
    let u: Vector3<f64> = kf * a1 - hf * a2;
    let v: Vector3<f64> = lf * a1 - hf * a3;
    let w: Vector3<f64> = lf * a2 - kf * a3;
    let k1 = (p as f64 * u + q as f64 * v).dot(&w);
    let k2 = (lf * u - kf * v).dot(&w);

    if k2.abs() > TOL {
        let i = -((k1 / k2).round_ties_even() as i64);
        p += i * l;
        q -= i * k;
    }

    let (a, b) = ext_gcd(p * k + q * l, h);
    let g = gcd(l, k);

    [
        [p * k + q * l, -p * h, -q * h],
        [0, l / g, -k / g],
        [b, a * p, a * q],
    ]
}
