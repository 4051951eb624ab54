use anyhow::Result;
use full::slice::norm_inf;
use sparsetools::coo::Coo;
use spsolve::Solver;

use crate::debug::format_f64_vec;

/// Convergence report of an iterative solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    pub converged: bool,
    pub iterations: usize,
}

/// Solves the DC grid power flow using Newton's method.
///
/// Droop controlled buses superpose a voltage dependent term on their
/// scheduled power, with an optional voltage deadband. Slack bus
/// voltages are held fixed; their powers, and those of the droop buses,
/// are recomputed from the solved voltage profile. The arrays `pdc`,
/// `droop_gain`, `p_dc_set`, `v_dc_set` and `dv_dc_set` are indexed by
/// DC bus.
#[allow(clippy::too_many_arguments)]
pub fn dc_network_pf(
    y_bus: &Coo<usize, f64>,
    vdc: &mut [f64],
    pdc: &mut [f64],
    slack: &[usize],
    noslack: &[usize],
    droop: &[usize],
    droop_gain: &[f64],
    p_dc_set: &[f64],
    v_dc_set: &[f64],
    dv_dc_set: &[f64],
    pol: f64,
    tol: f64,
    max_it: usize,
    solver: &dyn Solver<usize, f64>,
) -> Result<SolveReport> {
    let nb = vdc.len();
    let y_csr = y_bus.to_csr();

    // Scheduled powers: injections are negated extractions, with droop
    // buses solved around their power set-point.
    let mut pdc1: Vec<f64> = pdc.iter().map(|p| -p).collect();
    for &i in droop {
        pdc1[i] = -p_dc_set[i];
    }

    let mut converged = false;
    let mut it = 0;

    while !converged && it <= max_it {
        it += 1;

        let v: Vec<f64> = vdc.to_vec();
        let yv = &y_csr * &v;
        let mut pcalc: Vec<f64> = (0..nb).map(|i| pol * vdc[i] * yv[i]).collect();

        // Jacobian w.r.t. relative voltage updates dV/V.
        let mut jac = Coo::with_capacity(nb, nb, y_bus.nnz() + nb);
        for ((&i, &j), &y) in y_bus
            .rowidx()
            .iter()
            .zip(y_bus.colidx())
            .zip(y_bus.values())
        {
            jac.push(i, j, pol * y * vdc[i] * vdc[j]);
        }
        for i in 0..nb {
            jac.push(i, i, pcalc[i]);
        }

        for &i in droop {
            // Clamp the droop reference voltage to the deadband edge.
            let vset = v_dc_set[i];
            let dv = dv_dc_set[i];
            let vset_lh = if (vdc[i] - vset).abs() <= dv {
                vdc[i]
            } else if vdc[i] - vset > dv {
                vset + dv
            } else {
                vset - dv
            };
            pcalc[i] += (vdc[i] - vset_lh) / droop_gain[i];
            jac.push(i, i, vdc[i] / droop_gain[i]);
        }

        let jac = jac.to_csr().select(Some(noslack), Some(noslack))?.to_csc();
        let mut rhs: Vec<f64> = noslack.iter().map(|&i| pdc1[i] - pcalc[i]).collect();
        solver.solve(
            jac.cols(),
            jac.rowidx(),
            jac.colptr(),
            jac.values(),
            &mut rhs,
            false,
        )?;
        log::trace!("dVdc_{}: {}", it, format_f64_vec(&rhs));

        for (k, &i) in noslack.iter().enumerate() {
            vdc[i] *= 1.0 + rhs[k];
        }

        if norm_inf(&rhs) < tol {
            converged = true;
            log::debug!("dc network power flow converged in {} iterations", it);
        }
    }

    if !converged {
        log::warn!("dc network power flow did not converge in {} iterations", it);
    }

    // Recover the slack and droop bus powers from the voltage profile.
    let v: Vec<f64> = vdc.to_vec();
    let yv = &y_csr * &v;
    for &i in slack.iter().chain(droop) {
        pdc[i] = -pol * vdc[i] * yv[i];
    }

    Ok(SolveReport {
        converged,
        iterations: it,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpcdc::DcBranch;
    use crate::ybusdc::make_ybus_dc;
    use spsolve::rlu::RLU;

    #[test]
    fn test_two_bus_transfer() -> Result<()> {
        let branch = vec![DcBranch {
            f_bus: 0,
            t_bus: 1,
            r: 0.052,
            ..Default::default()
        }];
        let (y_bus, _, _) = make_ybus_dc(2, &branch);

        let mut vdc = vec![1.0, 1.0];
        let mut pdc = vec![0.0, 0.6];
        let solver = RLU::default();
        let report = dc_network_pf(
            &y_bus,
            &mut vdc,
            &mut pdc,
            &[0],
            &[1],
            &[],
            &[0.0; 2],
            &[0.0; 2],
            &[1.0; 2],
            &[0.0; 2],
            2.0,
            1e-8,
            10,
            &solver,
        )?;
        assert!(report.converged);

        // V1 solves 2*V1*(V1 - 1)/0.052 = -0.6.
        let v1 = (1.0 + (1.0_f64 - 4.0 * 0.6 * 0.052 / 2.0).sqrt()) / 2.0;
        assert!((vdc[1] - v1).abs() < 1e-8);
        // The slack bus covers the extraction plus line losses.
        assert!((pdc[0] + 2.0 * (1.0 - v1) / 0.052).abs() < 1e-8);
        assert!(pdc[0] < -0.6);
        Ok(())
    }

    #[test]
    fn test_droop_bus_follows_characteristic() -> Result<()> {
        let branch = vec![
            DcBranch {
                f_bus: 0,
                t_bus: 1,
                r: 0.052,
                ..Default::default()
            },
            DcBranch {
                f_bus: 1,
                t_bus: 2,
                r: 0.052,
                ..Default::default()
            },
            DcBranch {
                f_bus: 0,
                t_bus: 2,
                r: 0.073,
                ..Default::default()
            },
        ];
        let (y_bus, _, _) = make_ybus_dc(3, &branch);

        let mut vdc = vec![1.0; 3];
        let mut pdc = vec![0.0, 0.2, 0.35];
        let droop_gain = [0.0, 0.007, 0.0];
        let p_dc_set = [0.0, 0.219013, 0.0];
        let v_dc_set = [1.0; 3];
        let dv_dc_set = [0.0; 3];
        let solver = RLU::default();
        let report = dc_network_pf(
            &y_bus,
            &mut vdc,
            &mut pdc,
            &[0],
            &[1, 2],
            &[1],
            &droop_gain,
            &p_dc_set,
            &v_dc_set,
            &dv_dc_set,
            2.0,
            1e-8,
            10,
            &solver,
        )?;
        assert!(report.converged);

        // Pdc = Pdcset + (Vdc - Vdcset)/k on the droop bus.
        let expected = p_dc_set[1] + (vdc[1] - v_dc_set[1]) / droop_gain[1];
        assert!((pdc[1] - expected).abs() < 1e-6);
        Ok(())
    }
}
