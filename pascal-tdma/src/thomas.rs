//! Serial and batch Thomas kernels: the non-cyclic and cyclic direct solvers every other
//! component in this crate eventually bottoms out in, either on a full system (used directly
//! when `P == 1`) or on the `2P`-row reduced system every process assembles.
//!
//! # Layout
//!
//! The design's data model describes batch shapes as `(n_sys, n_row)` in the column-major
//! convention of the Fortran library it was distilled from, where the first-listed axis is
//! physically contiguous. This port uses the more idiomatic Rust equivalent instead: each of
//! the `n_sys` independent systems occupies one contiguous `n_row`-length slice (row-major,
//! "array of systems" rather than "struct of arrays"). The size, ordering, and mutation
//! invariants are unchanged -- only the physical stride is. This is documented as a
//! deliberate adaptation, not a semantic change: see `DESIGN.md`.
//!
//! This layout also makes the batch axis the natural unit of parallelism: each system's
//! elimination is independent of every other, so [`thomas_batch`] and [`cyclic_thomas_batch`]
//! hand whole `n_row`-sized chunks to [`tdma_maybe_par`]'s chunk iterators instead of
//! vectorizing element-by-element within a row step.

use tdma_maybe_par::{MaybeParChunks, MaybeParChunksMut};

use crate::error::{TdmaError, TdmaResult};

/// Pivot magnitudes below this threshold are reported as numerical breakdown and clamped to
/// the threshold (sign preserved) so the sweep can continue. This is an implementation
/// choice -- the design only requires *some* divide-by-zero guard, not a particular value.
pub const DEFAULT_PIVOT_EPSILON: f64 = 1e-12;

pub(crate) fn guard_pivot(value: f64, row: usize, epsilon: f64, breakdown: &mut Option<TdmaError>) -> f64 {
    if value.abs() >= epsilon {
        return value;
    }
    if breakdown.is_none() {
        log::warn!(
            "tridiagonal pivot at row {row} has magnitude {:e}, below breakdown threshold {epsilon:e}; clamping",
            value.abs()
        );
        *breakdown = Some(TdmaError::NumericalBreakdown {
            row,
            magnitude: value.abs(),
            threshold: epsilon,
        });
    }
    if value.is_sign_negative() {
        -epsilon
    } else {
        epsilon
    }
}

fn check_len(name: &str, len: usize, expected: usize) -> TdmaResult<()> {
    if len != expected {
        return Err(TdmaError::Configuration(format!(
            "{name} has length {len}, expected {expected}"
        )));
    }
    Ok(())
}

/// Solves one non-cyclic tridiagonal system `A·x_{i-1} + B·x_i + C·x_{i+1} = D` in place.
///
/// On return, `d` holds the solution and `c` holds the forward-eliminated coefficients;
/// `a` and `b` are left untouched (the classical Thomas sweep never needs to revisit them).
/// `n_row` must be at least 1; the design's `n_row >= 3` floor applies to blocks that will be
/// fed through the modified-Thomas reducer (see [`crate::reduce`]), not to this kernel, which
/// is also used directly to solve the small `2P`-row reduced system.
pub fn thomas(a: &[f64], b: &[f64], c: &mut [f64], d: &mut [f64]) -> TdmaResult<()> {
    thomas_with_epsilon(a, b, c, d, DEFAULT_PIVOT_EPSILON)
}

pub fn thomas_with_epsilon(
    a: &[f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
    epsilon: f64,
) -> TdmaResult<()> {
    let n = d.len();
    check_len("a", a.len(), n)?;
    check_len("b", b.len(), n)?;
    check_len("c", c.len(), n)?;
    if n == 0 {
        return Ok(());
    }

    let mut breakdown = None;

    let piv0 = guard_pivot(b[0], 0, epsilon, &mut breakdown);
    c[0] /= piv0;
    d[0] /= piv0;

    for i in 1..n {
        let denom = b[i] - a[i] * c[i - 1];
        let piv = guard_pivot(denom, i, epsilon, &mut breakdown);
        c[i] /= piv;
        d[i] = (d[i] - a[i] * d[i - 1]) / piv;
    }

    for i in (0..n - 1).rev() {
        d[i] -= c[i] * d[i + 1];
    }

    match breakdown {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Solves one cyclic tridiagonal system, where `a[0]` couples to `x[n-1]` and `c[n-1]`
/// couples to `x[0]`, via the Sherman-Morrison decomposition: a non-cyclic solve of the
/// system plus a rank-one correction vector, combined to cancel the wraparound.
pub fn cyclic_thomas(a: &[f64], b: &[f64], c: &[f64], d: &mut [f64]) -> TdmaResult<()> {
    cyclic_thomas_with_epsilon(a, b, c, d, DEFAULT_PIVOT_EPSILON)
}

pub fn cyclic_thomas_with_epsilon(
    a: &[f64],
    b: &[f64],
    c: &[f64],
    d: &mut [f64],
    epsilon: f64,
) -> TdmaResult<()> {
    let n = d.len();
    check_len("a", a.len(), n)?;
    check_len("b", b.len(), n)?;
    check_len("c", c.len(), n)?;
    if n < 2 {
        return Err(TdmaError::Configuration(format!(
            "cyclic solve needs at least 2 rows, got {n}"
        )));
    }

    let alpha = c[n - 1];
    let beta = a[0];
    // Any nonzero gamma works; `-b[0]` keeps the modified diagonal away from zero when `b[0]`
    // itself is small, which is the usual choice for this decomposition.
    let gamma = if b[0] != 0.0 { -b[0] } else { -1.0 };

    let mut bb = b.to_vec();
    bb[0] -= gamma;
    bb[n - 1] -= alpha * beta / gamma;

    let mut y = d.to_vec();
    let mut c_work = c.to_vec();
    let breakdown_y = thomas_with_epsilon(a, &bb, &mut c_work, &mut y, epsilon);

    let mut z = vec![0.0; n];
    z[0] = gamma;
    z[n - 1] = alpha;
    let mut c_work2 = c.to_vec();
    let breakdown_z = thomas_with_epsilon(a, &bb, &mut c_work2, &mut z, epsilon);

    let fact_num = y[0] + beta * y[n - 1] / gamma;
    let fact_den = 1.0 + z[0] + beta * z[n - 1] / gamma;
    let fact = fact_num / fact_den;

    for i in 0..n {
        d[i] = y[i] - fact * z[i];
    }

    breakdown_y.and(breakdown_z)
}

/// Batch non-cyclic Thomas: applies [`thomas`] to each of the `n_sys` independent systems.
pub fn thomas_batch(
    a: &[f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
    n_sys: usize,
    n_row: usize,
) -> TdmaResult<()> {
    let expected = n_sys * n_row;
    check_len("a", a.len(), expected)?;
    check_len("b", b.len(), expected)?;
    check_len("c", c.len(), expected)?;
    check_len("d", d.len(), expected)?;

    let mut first_err = None;
    for (((a_s, b_s), c_s), d_s) in a
        .par_chunks(n_row)
        .zip(b.par_chunks(n_row))
        .zip(c.par_chunks_mut(n_row))
        .zip(d.par_chunks_mut(n_row))
    {
        if let Err(e) = thomas(a_s, b_s, c_s, d_s) {
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

/// Batch cyclic Thomas: applies [`cyclic_thomas`] to each of the `n_sys` independent systems.
pub fn cyclic_thomas_batch(
    a: &[f64],
    b: &[f64],
    c: &[f64],
    d: &mut [f64],
    n_sys: usize,
    n_row: usize,
) -> TdmaResult<()> {
    let expected = n_sys * n_row;
    check_len("a", a.len(), expected)?;
    check_len("b", b.len(), expected)?;
    check_len("c", c.len(), expected)?;
    check_len("d", d.len(), expected)?;

    let mut first_err = None;
    for (((a_s, b_s), c_s), d_s) in a
        .par_chunks(n_row)
        .zip(b.par_chunks(n_row))
        .zip(c.par_chunks(n_row))
        .zip(d.par_chunks_mut(n_row))
    {
        if let Err(e) = cyclic_thomas(a_s, b_s, c_s, d_s) {
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
