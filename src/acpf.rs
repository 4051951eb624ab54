// Copyright (c) 2022-2024, Richard Lincoln. All rights reserved.

use std::collections::HashMap;
use std::f64::consts::PI;

use anyhow::Result;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use spsolve::Solver;

use crate::bus_types::bus_types;
use crate::mpc::{Branch, Bus, Gen};
use crate::newton::newtonpf;
use crate::sbus::MakeSBus;
use crate::ybus::make_ybus;

/// Solved AC power flow for one synchronous zone.
pub struct AcSolution {
    pub bus: Vec<Bus>,
    pub gen: Vec<Gen>,
    pub branch: Vec<Branch>,
    pub converged: bool,
    pub iterations: usize,
}

/// AC power flow method used for the AC stage of the sequential AC/DC
/// power flow. The bus numbers of a zone passed to `solve` need not be
/// consecutive; the returned tables use the numbering of the input.
pub trait AcSolver {
    fn solve(&self, base_mva: f64, bus: &[Bus], gen: &[Gen], branch: &[Branch])
        -> Result<AcSolution>;
}

/// Full Newton-Raphson AC power flow.
pub struct NewtonAcSolver<'a> {
    pub tol: f64,
    pub max_it: usize,
    pub solver: &'a dyn Solver<usize, f64>,
}

impl<'a> AcSolver for NewtonAcSolver<'a> {
    fn solve(
        &self,
        base_mva: f64,
        bus: &[Bus],
        gen: &[Gen],
        branch: &[Branch],
    ) -> Result<AcSolution> {
        let (mut bus, mut gen, mut branch) = (bus.to_vec(), gen.to_vec(), branch.to_vec());

        // Renumber onto consecutive local bus numbers for the solve.
        let i2e: Vec<usize> = bus.iter().map(|b| b.bus_i).collect();
        let e2i: HashMap<usize, usize> = i2e.iter().enumerate().map(|(k, &e)| (e, k)).collect();
        for (k, b) in bus.iter_mut().enumerate() {
            b.bus_i = k;
        }
        for g in gen.iter_mut() {
            g.gen_bus = e2i[&g.gen_bus];
        }
        for br in branch.iter_mut() {
            br.f_bus = e2i[&br.f_bus];
            br.t_bus = e2i[&br.t_bus];
        }

        let (ref_, pv, pq) = bus_types(&bus, &gen);

        // Initial voltage, with the magnitude of voltage controlled buses
        // pinned to the generator set-point.
        let mut v0: Vec<Complex64> = bus
            .iter()
            .map(|b| Complex64::from_polar(b.vm, b.va * PI / 180.0))
            .collect();
        for g in gen.iter().filter(|g| g.is_on()) {
            if !pq.contains(&g.gen_bus) {
                v0[g.gen_bus] = Complex64::from_polar(g.vg, v0[g.gen_bus].arg());
            }
        }

        let (y_bus, y_f, y_t) = make_ybus(base_mva, &bus, &branch, true);
        let y_bus = y_bus.to_csr();
        let empty = || Coo::with_size(branch.len(), bus.len());
        let y_f = y_f.unwrap_or_else(empty).to_csr();
        let y_t = y_t.unwrap_or_else(empty).to_csr();

        let s_bus = MakeSBus {
            base_mva,
            bus: &bus,
            gen: &gen,
        };
        let (v, converged, iterations) = newtonpf(
            &y_bus, &s_bus, &v0, &ref_, &pv, &pq, self.solver, self.tol, self.max_it,
        )?;

        for (i, b) in bus.iter_mut().enumerate() {
            b.vm = v[i].norm();
            b.va = v[i].arg() * 180.0 / PI;
        }

        let i_bus = &y_bus * &v;
        update_gen_q(base_mva, &bus, &mut gen, &v, &i_bus);
        update_slack_p(base_mva, &bus, &mut gen, &ref_, &v, &i_bus);

        // Branch power flows.
        let i_fr = &y_f * &v;
        let i_to = &y_t * &v;
        for (i, br) in branch.iter_mut().enumerate() {
            if br.is_on() {
                let s_f = v[br.f_bus] * i_fr[i].conj() * base_mva;
                let s_t = v[br.t_bus] * i_to[i].conj() * base_mva;
                br.pf = s_f.re;
                br.qf = s_f.im;
                br.pt = s_t.re;
                br.qt = s_t.im;
            } else {
                br.pf = 0.0;
                br.qf = 0.0;
                br.pt = 0.0;
                br.qt = 0.0;
            }
        }

        // Restore the caller's bus numbering.
        for (k, b) in bus.iter_mut().enumerate() {
            b.bus_i = i2e[k];
        }
        for g in gen.iter_mut() {
            g.gen_bus = i2e[g.gen_bus];
        }
        for br in branch.iter_mut() {
            br.f_bus = i2e[br.f_bus];
            br.t_bus = i2e[br.t_bus];
        }

        Ok(AcSolution {
            bus,
            gen,
            branch,
            converged,
            iterations,
        })
    }
}

/// Assigns the reactive power dispatch of voltage controlled buses to
/// their generators. A bus with more than one generator has the total
/// divided in proportion to the reactive range of each generator.
fn update_gen_q(base_mva: f64, bus: &[Bus], gen: &mut [Gen], v: &[Complex64], i_bus: &[Complex64]) {
    let mut at_bus = HashMap::<usize, Vec<usize>>::new();
    for (i, g) in gen.iter_mut().enumerate() {
        if g.is_on() {
            let s = v[g.gen_bus] * i_bus[g.gen_bus].conj();
            g.qg = s.im * base_mva + bus[g.gen_bus].qd; // inj Q + local Qd
            at_bus.entry(g.gen_bus).or_default().push(i);
        } else {
            g.qg = 0.0;
        }
    }

    for l in at_bus.values() {
        if l.len() < 2 {
            continue;
        }
        // Each generator currently carries the whole bus dispatch.
        let qg_tot = gen[l[0]].qg;
        let qg_min: f64 = l.iter().map(|&i| gen[i].qmin).sum();
        let qg_max: f64 = l.iter().map(|&i| gen[i].qmax).sum();

        if qg_min.is_infinite() || qg_max.is_infinite() || (qg_max - qg_min).abs() < 1e-13 {
            for &i in l {
                gen[i].qg = qg_tot / l.len() as f64;
            }
        } else {
            let q = (qg_tot - qg_min) / (qg_max - qg_min);
            for &i in l {
                gen[i].qg = gen[i].qmin + q * (gen[i].qmax - gen[i].qmin);
            }
        }
    }
}

/// Assigns the active power balance of each reference bus to its first
/// generator, net of what the other generators at the bus produce.
fn update_slack_p(
    base_mva: f64,
    bus: &[Bus],
    gen: &mut [Gen],
    refbus: &[usize],
    v: &[Complex64],
    i_bus: &[Complex64],
) {
    for &r in refbus {
        let mut refgen: Option<usize> = None;
        let mut others = 0.0;
        for (i, g) in gen.iter().enumerate() {
            if g.is_on() && g.gen_bus == r {
                if refgen.is_none() {
                    refgen = Some(i);
                } else {
                    others += g.pg;
                }
            }
        }
        if let Some(i) = refgen {
            let s = v[r] * i_bus[r].conj();
            gen[i].pg = s.re * base_mva + bus[r].pd - others;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::BusType;
    use spsolve::rlu::RLU;

    #[test]
    fn test_solver_with_sparse_bus_numbers() -> Result<()> {
        // Bus numbers 4 and 9 exercise the local renumbering.
        let bus = vec![
            Bus {
                bus_i: 4,
                bus_type: BusType::REF,
                ..Default::default()
            },
            Bus {
                bus_i: 9,
                bus_type: BusType::PQ,
                pd: 50.0,
                qd: 20.0,
                ..Default::default()
            },
        ];
        let gen = vec![Gen {
            gen_bus: 4,
            vg: 1.02,
            ..Default::default()
        }];
        let branch = vec![Branch {
            f_bus: 4,
            t_bus: 9,
            r: 0.01,
            x: 0.1,
            ..Default::default()
        }];

        let solver = RLU::default();
        let pf = NewtonAcSolver {
            tol: 1e-8,
            max_it: 10,
            solver: &solver,
        };
        let sol = pf.solve(100.0, &bus, &gen, &branch)?;

        assert!(sol.converged);
        assert_eq!(sol.bus[0].bus_i, 4);
        assert_eq!(sol.branch[0].t_bus, 9);
        assert!((sol.bus[0].vm - 1.02).abs() < 1e-8);
        assert!(sol.bus[1].vm < 1.02 && sol.bus[1].vm > 0.9);

        // The slack generator covers the load plus losses.
        assert!(sol.gen[0].pg > 50.0 && sol.gen[0].pg < 52.0);
        assert!((sol.branch[0].pf - sol.gen[0].pg).abs() < 1e-6);
        assert!((sol.branch[0].pt + 50.0).abs() < 1e-6);
        Ok(())
    }
}
