// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use ndarray::{Array1, Array2, Axis};

use crate::error::{HypoError, Result};

/// Outcome of a weighted least-squares solve.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalSolution {
    /// Adjustment per unknown; zero for frozen unknowns.
    pub step: Array1<f64>,
    /// Unknowns held at their current value, in the order they were frozen.
    pub frozen: Vec<usize>,
    /// Inverse of the normal matrix over the solved unknowns (rows and
    /// columns of frozen unknowns are zero).
    pub inverse: Array2<f64>,
}

/// Form `JᵗWJ` and `JᵗWr` for row weights `w`.
pub fn normal_equations(
    jacobian: &Array2<f64>,
    residuals: &Array1<f64>,
    weights: &Array1<f64>,
) -> (Array2<f64>, Array1<f64>) {
    let weighted = jacobian * &weights.view().insert_axis(Axis(1));
    let normal = weighted.t().dot(jacobian);
    let rhs = weighted.t().dot(residuals);
    (normal, rhs)
}

/// Gauss elimination with partial pivoting on `a·x = rhs` for every column
/// of `rhs`. Column order is never permuted, so a rejected pivot at step
/// `k` identifies unknown `k`; `Err(k)` is returned when the largest
/// candidate pivot is not above `tolerance`.
fn gauss(
    mut a: Array2<f64>,
    mut rhs: Array2<f64>,
    tolerance: f64,
) -> std::result::Result<Array2<f64>, usize> {
    let n = a.nrows();
    for k in 0..n {
        let mut pivot_row = k;
        let mut pivot_abs = a[[k, k]].abs();
        for i in k + 1..n {
            if a[[i, k]].abs() > pivot_abs {
                pivot_abs = a[[i, k]].abs();
                pivot_row = i;
            }
        }
        if pivot_abs <= tolerance {
            return Err(k);
        }
        if pivot_row != k {
            for j in 0..n {
                a.swap([k, j], [pivot_row, j]);
            }
            for j in 0..rhs.ncols() {
                rhs.swap([k, j], [pivot_row, j]);
            }
        }
        for i in k + 1..n {
            let factor = a[[i, k]] / a[[k, k]];
            if factor == 0.0 {
                continue;
            }
            for j in k..n {
                a[[i, j]] -= factor * a[[k, j]];
            }
            for j in 0..rhs.ncols() {
                rhs[[i, j]] -= factor * rhs[[k, j]];
            }
        }
    }

    // Back substitution
    let mut x = Array2::<f64>::zeros(rhs.raw_dim());
    for c in 0..rhs.ncols() {
        for i in (0..n).rev() {
            let mut sum = rhs[[i, c]];
            for j in i + 1..n {
                sum -= a[[i, j]] * x[[j, c]];
            }
            x[[i, c]] = sum / a[[i, i]];
        }
    }
    Ok(x)
}

/// Why elimination of the active block stopped, by position in the
/// active list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// The column is numerically empty.
    Empty(usize),
    /// The column depends on the columns before it.
    Dependent(usize),
}

impl Rejection {
    fn position(self) -> usize {
        match self {
            Rejection::Empty(k) | Rejection::Dependent(k) => k,
        }
    }
}

/// Equilibrate the `active` block of the normal equations to unit diagonal
/// and eliminate it. On success returns the scaled solution with the
/// inverse in columns `1..`, and the column scales.
fn eliminate(
    normal: &Array2<f64>,
    rhs: &Array1<f64>,
    active: &[usize],
    tolerance: f64,
) -> std::result::Result<(Array2<f64>, Vec<f64>), Rejection> {
    let m = active.len();
    let max_diag = active
        .iter()
        .map(|&i| normal[[i, i]].abs())
        .fold(0.0_f64, f64::max);

    // A numerically empty column cannot be equilibrated
    let dead = f64::EPSILON * max_diag;
    if let Some(k) = active.iter().position(|&i| normal[[i, i]] <= dead) {
        return Err(Rejection::Empty(k));
    }

    let scale: Vec<f64> = active.iter().map(|&i| normal[[i, i]].sqrt()).collect();
    let mut a = Array2::<f64>::zeros((m, m));
    let mut b = Array2::<f64>::zeros((m, m + 1));
    for (r, &i) in active.iter().enumerate() {
        for (c, &j) in active.iter().enumerate() {
            a[[r, c]] = normal[[i, j]] / (scale[r] * scale[c]);
        }
        b[[r, 0]] = rhs[i] / scale[r];
        b[[r, r + 1]] = 1.0;
    }
    gauss(a, b, tolerance)
        .map(|x| (x, scale))
        .map_err(Rejection::Dependent)
}

/// Solve the symmetric normal equations `normal·x = rhs`.
///
/// Columns are equilibrated to unit diagonal before elimination, so the
/// largest diagonal is 1 and a pivot at or below `tolerance` marks an
/// unconstrained direction. Which unknown is frozen depends on `prefer`
/// (typically depth):
///
/// - an empty column is only constrained at second order, where it trades
///   off against `prefer`, so `prefer` goes first while it is free;
/// - a dependent column freezes `prefer` when `prefer` takes part in the
///   dependency (its own pivot failed, or the system without it is
///   solvable), and otherwise the unknown whose pivot failed.
///
/// The reduced system is then solved again.
///
/// # Errors
/// Returns `SingularSystem` when every unknown has been frozen.
pub fn solve_normal(
    normal: &Array2<f64>,
    rhs: &Array1<f64>,
    tolerance: f64,
    prefer: Option<usize>,
) -> Result<NormalSolution> {
    let total = normal.nrows();
    let mut active: Vec<usize> = (0..total).collect();
    let mut frozen: Vec<usize> = Vec::new();

    loop {
        if active.is_empty() {
            return Err(HypoError::SingularSystem { unknowns: total });
        }

        match eliminate(normal, rhs, &active, tolerance) {
            Ok((x, scale)) => {
                let mut step = Array1::<f64>::zeros(total);
                let mut inverse = Array2::<f64>::zeros((total, total));
                for (r, &i) in active.iter().enumerate() {
                    step[i] = x[[r, 0]] / scale[r];
                    for (c, &j) in active.iter().enumerate() {
                        inverse[[i, j]] = x[[r, c + 1]] / (scale[r] * scale[c]);
                    }
                }
                return Ok(NormalSolution {
                    step,
                    frozen,
                    inverse,
                });
            }
            Err(rejection) => {
                let failed = active[rejection.position()];
                let victim = match prefer.filter(|p| active.contains(p)) {
                    None => failed,
                    Some(p) => match rejection {
                        Rejection::Empty(_) => p,
                        Rejection::Dependent(_) if p == failed => p,
                        Rejection::Dependent(_) => {
                            let without: Vec<usize> =
                                active.iter().copied().filter(|&i| i != p).collect();
                            if !without.is_empty()
                                && eliminate(normal, rhs, &without, tolerance).is_ok()
                            {
                                p
                            } else {
                                failed
                            }
                        }
                    },
                };
                tracing::debug!(unknown = victim, "freezing unconstrained unknown");
                active.retain(|&i| i != victim);
                frozen.push(victim);
            }
        }
    }
}

/// Standard errors from the solved inverse: `sqrt(σ²·diag(inverse))`.
pub fn standard_errors(inverse: &Array2<f64>, variance: f64) -> Array1<f64> {
    inverse
        .diag()
        .mapv(|d| if d > 0.0 { (variance * d).sqrt() } else { 0.0 })
}
