use sparsetools::coo::Coo;

use crate::mpcdc::DcBranch;

/// Builds the DC bus admittance matrix and the branch admittance
/// matrices.
///
/// `Yf * V` is the vector of branch currents injected at each DC
/// branch's "from" bus and `Yt` is the same for the "to" bus end.
pub fn make_ybus_dc(
    nb: usize,
    branch: &[DcBranch],
) -> (Coo<usize, f64>, Coo<usize, f64>, Coo<usize, f64>) {
    let nl = branch.len();

    let mut y_bus = Coo::with_size(nb, nb);
    let mut y_f = Coo::with_size(nl, nb);
    let mut y_t = Coo::with_size(nl, nb);

    for (i, br) in branch.iter().enumerate() {
        let y_s = if br.is_on() { 1.0 / br.r } else { 0.0 };
        let (f, t) = (br.f_bus, br.t_bus);

        y_f.push(i, f, y_s);
        y_f.push(i, t, -y_s);

        y_t.push(i, f, -y_s);
        y_t.push(i, t, y_s);

        y_bus.push(f, f, y_s);
        y_bus.push(f, t, -y_s);
        y_bus.push(t, f, -y_s);
        y_bus.push(t, t, y_s);
    }

    (y_bus, y_f, y_t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring3() -> Vec<DcBranch> {
        vec![
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
        ]
    }

    #[test]
    fn test_symmetric_with_zero_row_sums() {
        let (y_bus, _, _) = make_ybus_dc(3, &ring3());
        let y = y_bus.to_csr();

        for i in 0..3 {
            let mut row_sum = 0.0;
            for j in 0..3 {
                assert!((y.get(i, j) - y.get(j, i)).abs() < 1e-12);
                row_sum += y.get(i, j);
            }
            assert!(row_sum.abs() < 1e-12);
        }
    }

    #[test]
    fn test_branch_current_from_voltage_difference() {
        let (_, y_f, y_t) = make_ybus_dc(3, &ring3());
        let v = vec![1.01, 1.0, 0.99];

        let i_f = &y_f.to_csr() * &v;
        let i_t = &y_t.to_csr() * &v;
        assert!((i_f[0] - (1.01 - 1.0) / 0.052).abs() < 1e-12);
        assert!((i_f[0] + i_t[0]).abs() < 1e-12);
    }
}
