use std::f64::consts::PI;

use num_complex::Complex64;
use sparsetools::coo::Coo;

use crate::cmplx;
use crate::mpc::{Branch, Bus};

/// Builds the AC bus admittance matrix and, optionally, the branch
/// admittance matrices.
///
/// `Yf * V` is the vector of complex branch currents injected at each
/// branch's "from" bus and `Yt` is the same for the "to" bus end.
pub fn make_ybus(
    base_mva: f64,
    bus: &[Bus],
    branch: &[Branch],
    yf_yt: bool,
) -> (
    Coo<usize, Complex64>,
    Option<Coo<usize, Complex64>>,
    Option<Coo<usize, Complex64>>,
) {
    let nb = bus.len();
    let nl = branch.len();

    // For each branch, compute the elements of the branch admittance matrix where:
    //
    //      | If |   | Yff  Yft |   | Vf |
    //      |    | = |          | * |    |
    //      | It |   | Ytf  Ytt |   | Vt |
    let mut y_bus = Coo::with_size(nb, nb);
    let mut y_f = if yf_yt {
        Some(Coo::with_size(nl, nb))
    } else {
        None
    };
    let mut y_t = if yf_yt {
        Some(Coo::with_size(nl, nb))
    } else {
        None
    };

    for (i, br) in branch.iter().enumerate() {
        let y_s = if br.is_on() {
            cmplx!(1.0) / cmplx!(br.r, br.x)
        } else {
            Complex64::default()
        }; // series admittance
        let b_c = if br.is_on() { br.b } else { 0.0 }; // line charging susceptance
        let t = if br.tap == 0.0 { 1.0 } else { br.tap }; // default tap ratio = 1
        let tap = Complex64::from_polar(t, br.shift * PI / 180.0); // add phase shifters

        let y_tt = y_s + cmplx!(0.0, b_c / 2.0);
        let y_ff = y_tt / (tap * tap.conj());
        let y_ft = -y_s / tap.conj();
        let y_tf = -y_s / tap;

        let (f, t) = (br.f_bus, br.t_bus);

        if yf_yt {
            if let (Some(y_f), Some(y_t)) = (y_f.as_mut(), y_t.as_mut()) {
                y_f.push(i, f, y_ff);
                y_f.push(i, t, y_ft);

                y_t.push(i, f, y_tf);
                y_t.push(i, t, y_tt);
            }
        }

        y_bus.push(f, f, y_ff);
        y_bus.push(f, t, y_ft);
        y_bus.push(t, f, y_tf);
        y_bus.push(t, t, y_tt);
    }

    for (i, b) in bus.iter().enumerate() {
        y_bus.push(i, i, b.y_sh(base_mva));
    }

    (y_bus, y_f, y_t)
}
