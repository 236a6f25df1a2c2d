//! The modified-Thomas local reducer (a process's half of the parallel reduction) and the
//! back-substitution that undoes it once the reduced system has been solved.
//!
//! Both operate per system on a contiguous `n_row`-length slice; the batch entry points chunk
//! over `n_sys` systems the same way [`crate::thomas`]'s batch kernels do.

use tdma_maybe_par::{MaybeParChunks, MaybeParChunksMut};

use crate::error::{TdmaError, TdmaResult};
use crate::thomas::{guard_pivot, DEFAULT_PIVOT_EPSILON};

/// The two boundary rows a rank contributes to the reduced system once its local block has
/// been reduced: `(A, 1, C, D)` at the local system's first and last row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryRow {
    pub a: f64,
    pub c: f64,
    pub d: f64,
}

/// Runs the modified-Thomas elimination on one system's local block in place.
///
/// On return, `a[i]` and `c[i]` are the coefficients of `x_0` and `x_{n_row-1}` respectively
/// for every row, and `d[i]` is the updated right-hand side -- the invariant from the design's
/// data model: `A_i*x_0 + x_i + C_i*x_{n_row-1} = D_i` for every interior row, with rows `0`
/// and `n_row-1` themselves carrying the boundary coupling. `b` is read for the pivot only and
/// is never written; its reduced diagonal is always `1` and is not stored.
///
/// Requires `n_row >= 3`; shorter blocks must be rejected at plan creation, not here.
pub fn modified_thomas_reduce(a: &mut [f64], b: &[f64], c: &mut [f64], d: &mut [f64]) -> TdmaResult<()> {
    modified_thomas_reduce_with_epsilon(a, b, c, d, DEFAULT_PIVOT_EPSILON)
}

pub fn modified_thomas_reduce_with_epsilon(
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
    epsilon: f64,
) -> TdmaResult<()> {
    let n = d.len();
    if a.len() != n || b.len() != n || c.len() != n {
        return Err(TdmaError::Configuration(format!(
            "mismatched coefficient lengths: a={}, b={}, c={}, d={n}",
            a.len(),
            b.len(),
            c.len()
        )));
    }
    if n < 3 {
        return Err(TdmaError::Configuration(format!(
            "modified Thomas reduction requires n_row >= 3, got {n}"
        )));
    }

    let mut breakdown = None;

    for i in 0..2 {
        let piv = guard_pivot(b[i], i, epsilon, &mut breakdown);
        a[i] /= piv;
        c[i] /= piv;
        d[i] /= piv;
    }

    for i in 2..n {
        let denom = b[i] - a[i] * c[i - 1];
        let r = 1.0 / guard_pivot(denom, i, epsilon, &mut breakdown);
        d[i] = r * (d[i] - a[i] * d[i - 1]);
        c[i] *= r;
        a[i] = -r * a[i] * a[i - 1];
    }

    if n >= 4 {
        for i in (1..=n - 3).rev() {
            d[i] -= c[i] * d[i + 1];
            a[i] -= c[i] * a[i + 1];
            c[i] = -c[i] * c[i + 1];
        }
    }

    let denom = 1.0 - a[1] * c[0];
    let r = 1.0 / guard_pivot(denom, 0, epsilon, &mut breakdown);
    let new_d0 = r * (d[0] - c[0] * d[1]);
    let new_c0 = -r * c[0] * c[1];
    let new_a0 = r * a[0];
    d[0] = new_d0;
    a[0] = new_a0;
    c[0] = new_c0;

    match breakdown {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Extracts the two boundary rows after [`modified_thomas_reduce`] has run.
pub fn boundary_rows(a: &[f64], c: &[f64], d: &[f64]) -> (BoundaryRow, BoundaryRow) {
    let n = d.len();
    let first = BoundaryRow { a: a[0], c: c[0], d: d[0] };
    let last = BoundaryRow { a: a[n - 1], c: c[n - 1], d: d[n - 1] };
    (first, last)
}

/// Undoes the reduction: given the solved values of `x_0` and `x_{n_row-1}` for this system,
/// recovers every interior unknown from the invariant `x_i = D_i - A_i*x_0 - C_i*x_{n_row-1}`.
/// Writes the full solution into `d`, including the two boundary entries themselves.
pub fn back_substitute(a: &[f64], c: &[f64], d: &mut [f64], x_first: f64, x_last: f64) {
    let n = d.len();
    for i in 1..n - 1 {
        d[i] = d[i] - a[i] * x_first - c[i] * x_last;
    }
    d[0] = x_first;
    d[n - 1] = x_last;
}

/// Batch form of [`modified_thomas_reduce`]: reduces each of the `n_sys` systems' local block.
pub fn modified_thomas_reduce_batch(
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
    n_sys: usize,
    n_row: usize,
) -> TdmaResult<()> {
    let expected = n_sys * n_row;
    if a.len() != expected || b.len() != expected || c.len() != expected || d.len() != expected {
        return Err(TdmaError::Configuration(format!(
            "batch reduce expects length {expected} (n_sys={n_sys} * n_row={n_row})"
        )));
    }

    let mut first_err = None;
    for (((a_s, b_s), c_s), d_s) in a
        .par_chunks_mut(n_row)
        .zip(b.par_chunks(n_row))
        .zip(c.par_chunks_mut(n_row))
        .zip(d.par_chunks_mut(n_row))
    {
        if let Err(e) = modified_thomas_reduce(a_s, b_s, c_s, d_s) {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Batch form of [`back_substitute`]: `x_first` and `x_last` hold one value per system.
pub fn back_substitute_batch(
    a: &[f64],
    c: &[f64],
    d: &mut [f64],
    x_first: &[f64],
    x_last: &[f64],
    n_sys: usize,
    n_row: usize,
) -> TdmaResult<()> {
    let expected = n_sys * n_row;
    if a.len() != expected || c.len() != expected || d.len() != expected {
        return Err(TdmaError::Configuration(format!(
            "batch back-substitution expects length {expected} (n_sys={n_sys} * n_row={n_row})"
        )));
    }
    if x_first.len() != n_sys || x_last.len() != n_sys {
        return Err(TdmaError::Configuration(format!(
            "expected {n_sys} boundary values, got x_first={} x_last={}",
            x_first.len(),
            x_last.len()
        )));
    }

    for (s, ((a_s, c_s), d_s)) in a
        .par_chunks(n_row)
        .zip(c.par_chunks(n_row))
        .zip(d.par_chunks_mut(n_row))
        .enumerate()
    {
        back_substitute(a_s, c_s, d_s, x_first[s], x_last[s]);
    }
    Ok(())
}
