use num_complex::Complex64;
use sparsetools::csr::{CCSR, CSR};

use crate::cmplx;
use crate::mpc::{Bus, Gen};

pub trait SBus {
    fn s_bus(&self, v_m: &[f64]) -> Vec<Complex64>;
}

pub struct MakeSBus<'a> {
    pub base_mva: f64,
    pub bus: &'a [Bus],
    pub gen: &'a [Gen],
}

impl<'a> SBus for MakeSBus<'a> {
    fn s_bus(&self, _v_m: &[f64]) -> Vec<Complex64> {
        make_sbus(self.base_mva, self.bus, self.gen)
    }
}

/// Builds the vector of complex bus power injections, that is,
/// generation minus load, in per unit. Loads are constant power.
pub fn make_sbus(base_mva: f64, bus: &[Bus], gen: &[Gen]) -> Vec<Complex64> {
    let nb = bus.len();

    let mut s_bus = vec![Complex64::default(); nb];

    gen.iter().filter(|g| g.is_on()).for_each(|g| {
        s_bus[g.gen_bus] += cmplx!(g.pg, g.qg) / base_mva;
    });

    bus.iter()
        .enumerate()
        .filter(|(_, b)| b.pd != 0.0 || b.qd != 0.0)
        .for_each(|(i, b)| {
            s_bus[i] -= cmplx!(b.pd, b.qd) / base_mva;
        });

    s_bus
}

/// Computes partial derivatives of power injection w.r.t. voltage, in
/// polar coordinates.
pub fn d_sbus_d_v(
    y_bus: &CSR<usize, Complex64>,
    v: &[Complex64],
) -> (CSR<usize, Complex64>, CSR<usize, Complex64>) {
    let i_bus = y_bus * v;

    let diag_v = CSR::<usize, Complex64>::with_diagonal(v.to_vec());
    let diag_i_bus = CSR::<usize, Complex64>::with_diagonal(i_bus);

    let v_norm = v.iter().map(|v| v / cmplx!(v.norm())).collect();
    let diag_v_norm = CSR::<usize, Complex64>::with_diagonal(v_norm);

    // dSbus/dVa = 1j * diagV * conj(diagIbus - Ybus * diagV)
    // dSbus/dVm = diagV * conj(Ybus * diagVnorm) + conj(diagIbus) * diagVnorm
    let mut d_sbus_d_va = &diag_v * (&diag_i_bus - y_bus * &diag_v).conj() * Complex64::i();
    let d_sbus_d_vm = &diag_v * (y_bus * &diag_v_norm).conj() + diag_i_bus.conj() * &diag_v_norm;

    d_sbus_d_va.sort_indexes();

    (d_sbus_d_va, d_sbus_d_vm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::{Bus, Gen};

    #[test]
    fn test_make_sbus_generation_minus_load() {
        let bus = vec![
            Bus {
                bus_i: 0,
                ..Default::default()
            },
            Bus {
                bus_i: 1,
                pd: 50.0,
                qd: 20.0,
                ..Default::default()
            },
        ];
        let gen = vec![Gen {
            gen_bus: 0,
            pg: 40.0,
            qg: 10.0,
            ..Default::default()
        }];

        let s = make_sbus(100.0, &bus, &gen);
        assert!((s[0] - cmplx!(0.4, 0.1)).norm() < 1e-12);
        assert!((s[1] + cmplx!(0.5, 0.2)).norm() < 1e-12);
    }

    #[test]
    fn test_off_gen_ignored() {
        let bus = vec![Bus::default()];
        let gen = vec![Gen {
            gen_bus: 0,
            pg: 40.0,
            status: false,
            ..Default::default()
        }];
        let s = make_sbus(100.0, &bus, &gen);
        assert!(s[0].norm() < 1e-12);
    }
}
