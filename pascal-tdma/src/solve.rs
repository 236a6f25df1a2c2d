//! Ties the local reducer, reduced-system assembly, reduced solve, and back-substitution
//! together into the four public entry points: solve/solve-cyclic for each plan shape.

use tdma_transport::{join4, Communicator};

use crate::error::TdmaResult;
use crate::plan::{PlanMany, PlanSingle};
use crate::reduce::{back_substitute, back_substitute_batch, boundary_rows, modified_thomas_reduce, modified_thomas_reduce_batch};
use crate::thomas::{cyclic_thomas, cyclic_thomas_batch, thomas, thomas_batch};

fn check_single_shape(a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> TdmaResult<usize> {
    let n = d.len();
    if a.len() != n || b.len() != n || c.len() != n {
        return Err(crate::error::TdmaError::Configuration(format!(
            "mismatched coefficient lengths: a={}, b={}, c={}, d={n}",
            a.len(),
            b.len(),
            c.len()
        )));
    }
    Ok(n)
}

/// Solves one global tridiagonal system split across `plan`'s communicator.
pub fn solve_single<C: Communicator>(
    plan: &mut PlanSingle<C>,
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
) -> TdmaResult<()> {
    solve_single_inner(plan, a, b, c, d, false)
}

/// Cyclic variant of [`solve_single`]: `a[0]` and `c[n_row-1]` on rank 0 and the last rank
/// respectively are treated as the wraparound coefficients of the global periodic system.
pub fn solve_single_cyclic<C: Communicator>(
    plan: &mut PlanSingle<C>,
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
) -> TdmaResult<()> {
    solve_single_inner(plan, a, b, c, d, true)
}

fn solve_single_inner<C: Communicator>(
    plan: &mut PlanSingle<C>,
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
    cyclic: bool,
) -> TdmaResult<()> {
    check_single_shape(a, b, c, d)?;

    if plan.p() == 1 {
        return if cyclic {
            cyclic_thomas(a, b, c, d)
        } else {
            thomas(a, b, c, d)
        };
    }

    modified_thomas_reduce(a, b, c, d)?;
    let (first, last) = boundary_rows(a, c, d);

    let gather_rank = plan.gather_rank();
    let comm = plan.comm();
    let req_a = comm.igather_f64(gather_rank, &[first.a, last.a]);
    let req_b = comm.igather_f64(gather_rank, &[1.0, 1.0]);
    let req_c = comm.igather_f64(gather_rank, &[first.c, last.c]);
    let req_d = comm.igather_f64(gather_rank, &[first.d, last.d]);
    let (ga, gb, gc, gd) = join4(req_a, req_b, req_c, req_d)?;

    let mut reduce_err = None;
    let mut gathered_solution = None;
    if plan.is_gather_rank() {
        let (ra, rb, rc, rd) = plan.reduced_scratch_mut();
        *ra = ga.unwrap();
        *rb = gb.unwrap();
        *rc = gc.unwrap();
        let mut rd_owned = gd.unwrap();
        let solve_result = if cyclic {
            cyclic_thomas(ra, rb, rc, &mut rd_owned)
        } else {
            thomas(ra, rb, rc, &mut rd_owned)
        };
        *rd = rd_owned.clone();
        gathered_solution = Some(rd_owned);
        if let Err(e) = solve_result {
            reduce_err = Some(e);
        }
    }

    let comm = plan.comm();
    let mine = comm
        .iscatter_f64(gather_rank, gathered_solution.as_deref(), 2)
        .wait()?;

    back_substitute(a, c, d, mine[0], mine[1]);

    match reduce_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn check_many_shape<C: Communicator>(
    plan: &PlanMany<C>,
    a: &[f64],
    b: &[f64],
    c: &[f64],
    d: &[f64],
) -> TdmaResult<()> {
    let expected = plan.n_sys() * plan.n_row();
    if a.len() != expected || b.len() != expected || c.len() != expected || d.len() != expected {
        return Err(crate::error::TdmaError::Configuration(format!(
            "solve shape ({}) does not match plan shape (n_sys={}, n_row={})",
            a.len(),
            plan.n_sys(),
            plan.n_row()
        )));
    }
    Ok(())
}

/// Solves `plan.n_sys()` independent tridiagonal systems, each split across `plan`'s
/// communicator along the row axis.
pub fn solve_many<C: Communicator>(
    plan: &mut PlanMany<C>,
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
) -> TdmaResult<()> {
    solve_many_inner(plan, a, b, c, d, false)
}

pub fn solve_many_cyclic<C: Communicator>(
    plan: &mut PlanMany<C>,
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
) -> TdmaResult<()> {
    solve_many_inner(plan, a, b, c, d, true)
}

fn solve_many_inner<C: Communicator>(
    plan: &mut PlanMany<C>,
    a: &mut [f64],
    b: &[f64],
    c: &mut [f64],
    d: &mut [f64],
    cyclic: bool,
) -> TdmaResult<()> {
    check_many_shape(plan, a, b, c, d)?;
    let n_sys = plan.n_sys();
    let n_row = plan.n_row();
    let p = plan.p();

    if p == 1 {
        return if cyclic {
            cyclic_thomas_batch(a, b, c, d, n_sys, n_row)
        } else {
            thomas_batch(a, b, c, d, n_sys, n_row)
        };
    }

    let reduce_err = modified_thomas_reduce_batch(a, b, c, d, n_sys, n_row).err();

    {
        let (la, lb, lc, ld) = plan.local_scratch_mut();
        for s in 0..n_sys {
            let row = &a[s * n_row..(s + 1) * n_row];
            let crow = &c[s * n_row..(s + 1) * n_row];
            let drow = &d[s * n_row..(s + 1) * n_row];
            let (first, last) = boundary_rows(row, crow, drow);
            la[s * 2] = first.a;
            la[s * 2 + 1] = last.a;
            lb[s * 2] = 1.0;
            lb[s * 2 + 1] = 1.0;
            lc[s * 2] = first.c;
            lc[s * 2 + 1] = last.c;
            ld[s * 2] = first.d;
            ld[s * 2 + 1] = last.d;
        }
    }

    let send_descs = plan.send_descriptors().to_vec();
    let recv_descs = plan.recv_descriptors().to_vec();
    let my_n_sys_rt = plan.my_n_sys_rt();
    let transposed_len = my_n_sys_rt * 2 * p;

    let (comm, la, lb, lc, ld) = plan.comm_and_local_mut();
    let req_a = comm.ialltoall_descriptors_f64(la, &send_descs, transposed_len, &recv_descs);
    let req_b = comm.ialltoall_descriptors_f64(lb, &send_descs, transposed_len, &recv_descs);
    let req_c = comm.ialltoall_descriptors_f64(lc, &send_descs, transposed_len, &recv_descs);
    let req_d = comm.ialltoall_descriptors_f64(ld, &send_descs, transposed_len, &recv_descs);
    let (ta, tb, tc, td) = join4(req_a, req_b, req_c, req_d)?;

    let (pta, ptb, ptc, ptd) = plan.transposed_scratch_mut();
    *pta = ta;
    *ptb = tb;
    *ptc = tc;
    *ptd = td;

    let reduced_solve_err = {
        let (pta, ptb, ptc, ptd) = plan.transposed_scratch_mut();
        let result = if cyclic {
            cyclic_thomas_batch(pta, ptb, ptc, ptd, my_n_sys_rt, 2 * p)
        } else {
            thomas_batch(pta, ptb, ptc, ptd, my_n_sys_rt, 2 * p)
        };
        result.err()
    };

    // Inverse transpose of the solution stream only: roles of send/recv descriptors swap.
    let local_d_len = n_sys * 2;
    let (comm, _, _, _, ptd) = plan.comm_and_transposed_mut();
    let local_solution = comm
        .ialltoall_descriptors_f64(ptd, &recv_descs, local_d_len, &send_descs)
        .wait()?;

    let x_first: Vec<f64> = (0..n_sys).map(|s| local_solution[s * 2]).collect();
    let x_last: Vec<f64> = (0..n_sys).map(|s| local_solution[s * 2 + 1]).collect();
    back_substitute_batch(a, c, d, &x_first, &x_last, n_sys, n_row)?;

    match reduce_err.or(reduced_solve_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
