use std::iter::zip;

use anyhow::Result;
use full::slice::norm_inf;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use sparsetools::csr::{CCSR, CSR};
use spsolve::Solver;

use crate::debug::{format_f64_vec, format_polar_vec, format_rect_vec};
use crate::sbus::{d_sbus_d_v, SBus};

/// Solves the AC power flow using a full Newton-Raphson method with a
/// polar voltage formulation and power balance equations.
pub(crate) fn newtonpf(
    y_bus: &CSR<usize, Complex64>,
    s_bus_fn: &dyn SBus,
    v0: &[Complex64],
    _ref: &[usize],
    pv: &[usize],
    pq: &[usize],
    solver: &dyn Solver<usize, f64>,
    tol: f64,
    max_it: usize,
) -> Result<(Vec<Complex64>, bool, usize)> {
    let pv_pq = [pv, pq].concat();

    let mut converged = false;
    let mut i = 0;
    let mut v: Vec<Complex64> = v0.to_vec();
    let mut va: Vec<f64> = v.iter().map(|v| v.arg()).collect();
    let mut vm: Vec<f64> = v.iter().map(|v| v.norm()).collect();

    // set up indexing for updating V
    let npv = pv.len();
    let npq = pq.len();
    let (j1, j2) = (0, npv); // j1:j2 - V angle of pv buses
    let (j3, j4) = (j2, j2 + npq); // j3:j4 - V angle of pq buses
    let (j5, j6) = (j4, j4 + npq); // j5:j6 - V mag of pq buses

    // evaluate F(x0)
    let i_bus: Vec<Complex64> = y_bus * &v;
    let s_bus = s_bus_fn.s_bus(&vm);
    let mis: Vec<Complex64> = zip(&v, zip(&i_bus, &s_bus))
        .map(|(v, (i_bus, s_bus))| v * i_bus.conj() - s_bus)
        .collect();
    let mut f: Vec<f64> = [
        pv_pq.iter().map(|&i| mis[i].re).collect::<Vec<_>>(),
        pq.iter().map(|&i| mis[i].im).collect::<Vec<_>>(),
    ]
    .concat();
    log::trace!("Sbus0: {}", format_rect_vec(&s_bus));

    // check tolerance
    let norm_f = norm_inf(&f);
    if norm_f < tol {
        converged = true;
    }
    log::debug!("norm_f0: {}", norm_f);

    // do Newton iterations
    while !converged && i < max_it {
        i += 1;

        // evaluate Jacobian
        let (d_sbus_d_va, d_sbus_d_vm) = d_sbus_d_v(y_bus, &v);

        let j11 = d_sbus_d_va.select(Some(&pv_pq), Some(&pv_pq))?.real();
        let j12 = d_sbus_d_vm.select(Some(&pv_pq), Some(pq))?.real();
        let j21 = d_sbus_d_va.select(Some(pq), Some(&pv_pq))?.imag();
        let j22 = d_sbus_d_vm.select(Some(pq), Some(pq))?.imag();

        let jac = Coo::compose([
            [&j11.to_coo(), &j12.to_coo()],
            [&j21.to_coo(), &j22.to_coo()],
        ])?
        .to_csc();

        // compute update step
        let dx = {
            let mut neg_f: Vec<f64> = f.iter().map(|f| -f).collect();
            solver.solve(
                jac.cols(),
                jac.rowidx(),
                jac.colptr(),
                jac.values(),
                &mut neg_f,
                false,
            )?;
            neg_f
        };
        log::trace!("dx: {}", format_f64_vec(&dx));

        // update voltage
        for (i, j) in (j1..j2).enumerate() {
            va[pv[i]] += dx[j];
        }
        for (i, j) in (j3..j4).enumerate() {
            va[pq[i]] += dx[j];
        }
        for (i, j) in (j5..j6).enumerate() {
            vm[pq[i]] += dx[j];
        }

        // update Vm and Va again in case we wrapped around with a negative Vm
        v = zip(&vm, &va)
            .map(|(&vm, &va)| Complex64::from_polar(vm, va))
            .collect();
        va = v.iter().map(|v| v.arg()).collect();
        vm = v.iter().map(|v| v.norm()).collect();
        log::debug!("V_{}: {}", i, format_polar_vec(&v));

        // evaluate F(x)
        let i_bus: Vec<Complex64> = y_bus * &v;
        let s_bus = s_bus_fn.s_bus(&vm);
        let mis: Vec<Complex64> = zip(&v, zip(&i_bus, &s_bus))
            .map(|(v, (i_bus, s_bus))| v * i_bus.conj() - s_bus)
            .collect();
        f = [
            pv_pq.iter().map(|&i| mis[i].re).collect::<Vec<_>>(),
            pq.iter().map(|&i| mis[i].im).collect::<Vec<_>>(),
        ]
        .concat();

        // check for convergence
        let norm_f = norm_inf(&f);
        if norm_f < tol {
            converged = true;
            log::info!("Newton power flow converged in {} iterations.", i);
        }
        log::debug!("norm_f{}: {}", i, norm_f);
    }

    if !converged {
        log::warn!("Newton power flow did not converge in {} iterations.", i);
    }

    Ok((v, converged, i))
}
