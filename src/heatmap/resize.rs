//! Grid resizing by tensor-product interpolating B-splines.
//!
//! Each axis is handled independently: for a source length `n` and a target
//! length `m` we build an `m × n` operator `W` such that resampling a column
//! vector `y` is `W · y`. The full resize is then `W_rows · grid · W_colsᵀ`.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use log::warn;
use ndarray::{Array2, ArrayView2};

use super::HeatmapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMethod {
    Linear,
    #[default]
    Cubic,
    Quintic,
}

impl InterpolationMethod {
    pub fn order(self) -> usize {
        match self {
            InterpolationMethod::Linear => 1,
            InterpolationMethod::Cubic => 3,
            InterpolationMethod::Quintic => 5,
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterpolationMethod::Linear => "linear",
            InterpolationMethod::Cubic => "cubic",
            InterpolationMethod::Quintic => "quintic",
        };
        f.write_str(name)
    }
}

impl FromStr for InterpolationMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(InterpolationMethod::Linear),
            "cubic" => Ok(InterpolationMethod::Cubic),
            "quintic" => Ok(InterpolationMethod::Quintic),
            other => bail!("unknown interpolation method '{other}'"),
        }
    }
}

fn linspace(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![0.0];
    }
    let step = 1.0 / (n - 1) as f64;
    (0..n).map(|i| i as f64 * step).collect()
}

/// Knot vector for an interpolating spline of degree `k` through `x`, placed
/// the way FITPACK places them: data points for odd degrees, midpoints for
/// even degrees, with `k + 1` repeated boundary knots on each end.
fn interpolating_knots(x: &[f64], k: usize) -> Vec<f64> {
    let n = x.len();
    let interior = n - k - 1;
    let mut knots = Vec::with_capacity(n + k + 1);
    knots.extend(std::iter::repeat(x[0]).take(k + 1));
    if k % 2 == 1 {
        knots.extend_from_slice(&x[k / 2 + 1..k / 2 + 1 + interior]);
    } else {
        knots.extend((k / 2 + 1..k / 2 + 1 + interior).map(|j| 0.5 * (x[j - 1] + x[j])));
    }
    knots.extend(std::iter::repeat(x[n - 1]).take(k + 1));
    knots
}

/// Index `s` with `knots[s] <= t < knots[s + 1]`, clamped to the last
/// non-degenerate span at the right boundary.
fn find_span(knots: &[f64], k: usize, coefficients: usize, t: f64) -> usize {
    if t >= knots[coefficients] {
        return coefficients - 1;
    }
    let mut span = k;
    while span + 1 < coefficients && t >= knots[span + 1] {
        span += 1;
    }
    span
}

/// Cox–de Boor: the `k + 1` basis functions that are non-zero at `t`,
/// i.e. `N[span - k ..= span]`.
fn basis_functions(knots: &[f64], k: usize, span: usize, t: f64) -> Vec<f64> {
    let mut values = vec![0.0; k + 1];
    let mut left = vec![0.0; k + 1];
    let mut right = vec![0.0; k + 1];
    values[0] = 1.0;

    for j in 1..=k {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { values[r] / denom };
            values[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        values[j] = saved;
    }
    values
}

/// Matrix whose row `i` holds every basis function evaluated at `points[i]`.
fn basis_matrix(knots: &[f64], k: usize, coefficients: usize, points: &[f64]) -> Array2<f64> {
    let mut matrix = Array2::zeros((points.len(), coefficients));
    for (row, &t) in points.iter().enumerate() {
        let span = find_span(knots, k, coefficients, t);
        for (offset, value) in basis_functions(knots, k, span, t).into_iter().enumerate() {
            matrix[[row, span - k + offset]] = value;
        }
    }
    matrix
}

/// Inverse of a small square matrix by Gauss–Jordan elimination with partial
/// pivoting. `None` when the matrix is singular.
fn invert(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut inv = Array2::eye(n);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for c in 0..n {
                a.swap([pivot, c], [col, c]);
                inv.swap([pivot, c], [col, c]);
            }
        }

        let diag = a[[col, col]];
        for c in 0..n {
            a[[col, c]] /= diag;
            inv[[col, c]] /= diag;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for c in 0..n {
                a[[row, c]] -= factor * a[[col, c]];
                inv[[row, c]] -= factor * inv[[col, c]];
            }
        }
    }
    Some(inv)
}

/// Piecewise-linear resampling operator; replication when `from == 1`.
fn linear_operator(from: usize, to: usize) -> Array2<f64> {
    let mut op = Array2::zeros((to, from));
    if from == 1 {
        op.fill(1.0);
        return op;
    }
    for (row, t) in linspace(to).into_iter().enumerate() {
        let position = t * (from - 1) as f64;
        let lower = (position.floor() as usize).min(from - 2);
        let frac = position - lower as f64;
        op[[row, lower]] = 1.0 - frac;
        op[[row, lower + 1]] = frac;
    }
    op
}

fn spline_operator(from: usize, to: usize, order: usize) -> Array2<f64> {
    let k = order.min((from - 1).max(1));
    if k == 1 {
        return linear_operator(from, to);
    }

    let x = linspace(from);
    let knots = interpolating_knots(&x, k);
    let collocation = basis_matrix(&knots, k, from, &x);
    let Some(inverse) = invert(&collocation) else {
        warn!("Singular collocation system for {from} points at degree {k}; using linear");
        return linear_operator(from, to);
    };
    basis_matrix(&knots, k, from, &linspace(to)).dot(&inverse)
}

fn axis_operator(from: usize, to: usize, order: usize, spline: bool) -> Array2<f64> {
    if from == to {
        Array2::eye(from)
    } else if spline {
        spline_operator(from, to, order)
    } else {
        linear_operator(from, to)
    }
}

/// Resizes `grid` to `shape` with the given interpolation method.
pub fn resize(
    grid: ArrayView2<'_, f64>,
    shape: (usize, usize),
    method: InterpolationMethod,
) -> Result<Array2<f64>, HeatmapError> {
    let (rows, cols) = shape;
    if rows == 0 || cols == 0 {
        return Err(HeatmapError::InvalidShape { rows, cols });
    }
    let (src_rows, src_cols) = grid.dim();
    if src_rows == 0 || src_cols == 0 {
        return Err(HeatmapError::EmptyGrid);
    }
    if (src_rows, src_cols) == shape {
        return Ok(grid.to_owned());
    }

    let spline = src_rows >= 2 && src_cols >= 2;
    let order = method.order();
    let row_op = axis_operator(src_rows, rows, order, spline);
    let col_op = axis_operator(src_cols, cols, order, spline);
    Ok(row_op.dot(&grid).dot(&col_op.t()))
}
