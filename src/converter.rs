// Copyright (c) 2022-2024, Richard Lincoln. All rights reserved.

use anyhow::{bail, Result};
use num_complex::Complex64;

use crate::cmplx;

/// Complex voltages and powers along a converter station, from the AC
/// grid bus through the transformer and filter to the converter.
#[derive(Debug, Clone, Copy)]
pub struct Station {
    /// Filter bus voltage.
    pub vf: Complex64,
    /// Power flowing from the filter bus towards the grid transformer.
    pub ssf: Complex64,
    /// Power flowing from the converter towards the filter bus.
    pub scf: Complex64,
    /// Converter voltage.
    pub vc: Complex64,
    /// Converter power injection.
    pub sc: Complex64,
}

/// Evaluates the converter station chain for a grid injection `ss` at
/// grid voltage `vs`, working backwards through the transformer, filter
/// and phase reactor.
pub fn station_chain(
    ss: Complex64,
    vs: Complex64,
    ztf: Complex64,
    bf: f64,
    zc: Complex64,
) -> Station {
    let itf = (ss / vs).conj();
    let vf = vs + itf * ztf;
    let ssf = vf * itf.conj();
    let qf = -bf * vf.norm_sqr();
    let scf = ssf + cmplx!(0.0, qf);
    let ic = (scf / vf).conj();
    let vc = vf + ic * zc;
    let sc = vc * ic.conj();
    Station {
        vf,
        ssf,
        scf,
        vc,
        sc,
    }
}

/// Converter losses from the quadratic current dependent loss model
/// `Ploss = a + b*Ic + c*Ic^2`, with the quadratic coefficient picked
/// by operating mode (rectifier for Pc > 0, inverter for Pc < 0).
pub fn calc_loss_ac(
    pc: f64,
    qc: f64,
    vc: Complex64,
    loss_a: f64,
    loss_b: f64,
    loss_cr: f64,
    loss_ci: f64,
) -> f64 {
    let c = if pc > 0.0 {
        loss_cr
    } else if pc < 0.0 {
        loss_ci
    } else {
        0.0
    };
    let ic = (pc * pc + qc * qc).sqrt() / vc.norm();
    loss_a + loss_b * ic + c * ic * ic
}

/// Converter limit violation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimViol {
    None,
    /// Reactive power outside the current or voltage limits.
    Reactive,
    /// Active power outside the capability diagram.
    Active,
}

/// Intersection points of two circles, ordered by real part. `None`
/// when the circles do not intersect.
fn circle_intersection(
    m1: Complex64,
    r1: f64,
    m2: Complex64,
    r2: f64,
) -> Option<(Complex64, Complex64)> {
    let d = (m2 - m1).norm();
    if d == 0.0 {
        return None;
    }
    let cos_beta = (d * d + r1 * r1 - r2 * r2) / (2.0 * d * r1);
    if cos_beta.abs() > 1.0 {
        return None;
    }
    let alpha = (m2 - m1).arg();
    let beta = cos_beta.acos();
    let p1 = m1 + Complex64::from_polar(r1, alpha - beta);
    let p2 = m1 + Complex64::from_polar(r1, alpha + beta);
    if p1.re <= p2.re {
        Some((p1, p2))
    } else {
        Some((p2, p1))
    }
}

/// Checks converter operation against its PQ capability diagram and
/// clamps the grid side injection to the nearest feasible point.
///
/// The capability diagram combines the maximum current circle of the
/// converter with the minimum and maximum converter voltage circles,
/// based on:
/// J. Beerten, S. Cole and R. Belmans: "Generalized Steady-State VSC
/// MTDC Model for Sequential AC/DC Power Flow Algorithms", IEEE Trans.
/// Pow. Syst., vol. 27, no. 2, 2012, pp. 821 - 829.
///
/// `conv_bus` is the external converter bus number, used in messages.
#[allow(clippy::too_many_arguments)]
pub fn conv_lim(
    ss: Complex64,
    vs: Complex64,
    ztf: Complex64,
    bf: f64,
    zc: Complex64,
    icmax: f64,
    vcmax: f64,
    vcmin: f64,
    conv_bus: usize,
    epslim: f64,
) -> Result<(LimViol, Complex64)> {
    if vcmax < vcmin {
        bail!("vcmin is larger than vcmax for converter at bus {}", conv_bus);
    } else if vcmax == vcmin {
        bail!("vcmin is equal to vcmax for converter at bus {}", conv_bus);
    }

    let ss_old = ss;
    let vsm = vs.norm();
    let mut ps = ss.re;
    let mut qs = ss.im;

    let zf = if bf != 0.0 {
        cmplx!(1.0) / cmplx!(0.0, bf)
    } else {
        cmplx!()
    };

    // Pi-equivalent of the converter station, computed per topology to
    // keep the admittances finite when the transformer or filter is
    // absent.
    let (y1, y2) = if ztf != cmplx!() && bf != 0.0 {
        let num = ztf * zc + zc * zf + zf * ztf;
        (zc / num, zf / num)
    } else if ztf == cmplx!() && bf != 0.0 {
        (cmplx!(1.0) / zf, cmplx!(1.0) / zc)
    } else if ztf != cmplx!() {
        (cmplx!(), cmplx!(1.0) / (ztf + zc))
    } else {
        (cmplx!(), cmplx!(1.0) / zc)
    };
    let g2 = y2.re;
    let b2 = y2.im;
    let y12 = y1 + y2;
    let g12 = y12.re;
    let b12 = y12.im;

    // Maximum current circle.
    let mpl1 = if bf != 0.0 {
        -cmplx!(vsm * vsm) * (cmplx!(1.0) / (zf.conj() + ztf.conj()))
    } else {
        cmplx!()
    };
    let rl1 = if ztf != cmplx!() {
        let ytf = cmplx!(1.0) / ztf;
        let yf = cmplx!(0.0, bf);
        vsm * icmax * (ytf.conj() / (yf.conj() + ytf.conj())).norm()
    } else {
        vsm * icmax
    };

    let pmax_l1 = mpl1.re + rl1;
    let pmin_l1 = mpl1.re - rl1;
    let qpmax_l1 = mpl1.im;
    let qpmin_l1 = mpl1.im;

    // Minimum and maximum voltage circles.
    let mpl2 = -cmplx!(vsm * vsm) * y12.conj();
    let rl2_min = vsm * vcmin * y2.norm();
    let rl2_max = vsm * vcmax * y2.norm();

    // Corner points of the capability diagram, where the voltage
    // circles cut the current circle.
    let vcmin_pq = circle_intersection(mpl1, rl1, mpl2, rl2_min);
    let vcmax_pq = circle_intersection(mpl1, rl1, mpl2, rl2_max);
    if vcmin_pq.is_none() {
        log::info!(
            "lower voltage limit at converter bus {}: no intersections with current limit",
            conv_bus
        );
    }
    if vcmax_pq.is_none() {
        log::info!(
            "upper voltage limit at converter bus {}: no intersections with current limit",
            conv_bus
        );
    }

    let mut pmin = pmin_l1;
    let mut qpmin = qpmin_l1;
    let mut pmax = pmax_l1;
    let mut qpmax = qpmax_l1;

    // A high lower voltage limit or a low upper voltage limit narrows
    // the active power range.
    if let Some((pq1, pq2)) = vcmin_pq {
        if pq1.im > qpmin_l1 || pq2.im > qpmax_l1 {
            log::info!("high lower voltage limit detected at converter bus {}", conv_bus);
        }
        if pq1.im > qpmin_l1 {
            pmin = pq1.re;
            qpmin = pq1.im;
        }
        if pq2.im > qpmax_l1 {
            pmax = pq2.re;
            qpmax = pq2.im;
        }
    }
    if let Some((pq1, pq2)) = vcmax_pq {
        if pq1.im < qpmin_l1 || pq2.im < qpmax_l1 {
            log::info!("low upper voltage limit detected at converter bus {}", conv_bus);
        }
        if pq1.im < qpmin_l1 {
            pmin = pq1.re;
            qpmin = pq1.im;
        }
        if pq2.im < qpmax_l1 {
            pmax = pq2.re;
            qpmax = pq2.im;
        }
    }

    let mut viol;
    if pmin < ps && ps < pmax {
        // Reactive power on the current circle at this active power.
        let qs1 = if mpl1.im < qs {
            mpl1.im + (rl1 * rl1 - (ps - mpl1.re) * (ps - mpl1.re)).sqrt()
        } else {
            mpl1.im - (rl1 * rl1 - (ps - mpl1.re) * (ps - mpl1.re)).sqrt()
        };

        // Reactive power on the voltage circles, from the power
        // transfer over the equivalent link at the limit voltage.
        let qs2_at = |vclim: f64| {
            let a = 1.0 + (b2 / g2) * (b2 / g2);
            let b = -2.0 * (b2 / g2) * (ps + vsm * vsm * g12) / (vsm * vclim * g2);
            let c = {
                let t = (ps + vsm * vsm * g12) / (vsm * vclim * g2);
                t * t - 1.0
            };
            // Only the positive root refers to the upper part.
            let sin_dd = (-b + (b * b - 4.0 * a * c).sqrt()) / (2.0 * a);
            let cos_dd = sin_dd.asin().cos();
            vsm * vsm * b12 + vsm * vclim * (g2 * sin_dd - b2 * cos_dd)
        };
        let qs2_min = qs2_at(vcmin);
        let qs2_max = qs2_at(vcmax);

        if qs > mpl1.im {
            if qs > qs1.min(qs2_max) {
                viol = LimViol::Reactive;
                qs = qs1.min(qs2_max);
            } else if qs < qs2_min {
                viol = LimViol::Reactive;
                qs = qs2_min;
            } else {
                viol = LimViol::None;
            }
        } else {
            if qs < qs1.max(qs2_min) {
                viol = LimViol::Reactive;
                qs = qs1.max(qs2_min);
            } else if qs > qs2_max {
                viol = LimViol::Reactive;
                qs = qs2_max;
            } else {
                viol = LimViol::None;
            }
        }
    } else if ps <= pmin {
        // Grid injected active power lower than the minimum value.
        viol = LimViol::Active;
        ps = pmin;
        qs = qpmin;
    } else {
        // Grid injected active power higher than the maximum value.
        viol = LimViol::Active;
        ps = pmax;
        qs = qpmax;
    }

    let ss_new = cmplx!(ps, qs);

    // Remove violation when the correction is small.
    if (ss_old - ss_new).norm() < epslim {
        viol = LimViol::None;
    }

    Ok((viol, ss_new))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZTF: Complex64 = Complex64 {
        re: 0.0015,
        im: 0.1121,
    };
    const ZC: Complex64 = Complex64 {
        re: 0.0001,
        im: 0.16428,
    };
    const BF: f64 = 0.0887;

    #[test]
    fn test_loss_model_mode_selection() {
        let vc = cmplx!(1.0);
        let (a, b, cr, ci) = (0.01103, 0.887e-2, 2.885e-3, 4.371e-3);

        let rect = calc_loss_ac(1.0, 0.3, vc, a, b, cr, ci);
        let inv = calc_loss_ac(-1.0, 0.3, vc, a, b, cr, ci);
        // Same current, larger quadratic coefficient when inverting.
        assert!(inv > rect);

        let ic: f64 = 0.3;
        let idle = calc_loss_ac(0.0, 0.3, vc, a, b, cr, ci);
        assert!((idle - (a + b * ic)).abs() < 1e-12);
    }

    #[test]
    fn test_station_chain_reactor_loss() {
        let ss = cmplx!(-0.6, -0.4);
        let vs = cmplx!(1.0);
        let st = station_chain(ss, vs, cmplx!(), 0.0, ZC);

        // Without transformer and filter the chain starts at Ss.
        assert!((st.ssf - ss).norm() < 1e-12);
        assert!((st.scf - ss).norm() < 1e-12);

        let ic = (st.scf / st.vf).conj();
        let expected = ss.re + ic.norm_sqr() * ZC.re;
        assert!((st.sc.re - expected).abs() < 1e-12);
    }

    #[test]
    fn test_within_capability_diagram() -> Result<()> {
        let (viol, ss) = conv_lim(
            cmplx!(-0.6, -0.2),
            cmplx!(1.0),
            ZTF,
            BF,
            ZC,
            1.2,
            1.1,
            0.9,
            2,
            1e-2,
        )?;
        assert_eq!(viol, LimViol::None);
        assert!((ss - cmplx!(-0.6, -0.2)).norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_reactive_power_clamped_to_voltage_limit() -> Result<()> {
        let (viol, ss) = conv_lim(
            cmplx!(-0.6, -0.5),
            cmplx!(1.0),
            ZTF,
            BF,
            ZC,
            1.2,
            1.1,
            0.9,
            2,
            1e-2,
        )?;
        assert_eq!(viol, LimViol::Reactive);
        assert!((ss.re + 0.6).abs() < 1e-12);
        // Pulled up onto the minimum voltage circle.
        assert!(ss.im > -0.5 && ss.im < -0.3);
        Ok(())
    }

    #[test]
    fn test_reactive_power_clamped_to_current_limit() -> Result<()> {
        let vs = cmplx!(1.0);
        let ss = cmplx!(-0.2, 0.6);
        let (viol, ss1) = conv_lim(ss, vs, ZTF, BF, ZC, 0.35, 1.1, 0.9, 2, 1e-2)?;
        assert_eq!(viol, LimViol::Reactive);
        assert!((ss1.re - ss.re).abs() < 1e-12);
        assert!(ss1.im < ss.im);

        // The corrected point lands on the maximum current circle.
        let zf = cmplx!(1.0) / cmplx!(0.0, BF);
        let mpl1 = -cmplx!(1.0) / (zf.conj() + ZTF.conj());
        let ytf = cmplx!(1.0) / ZTF;
        let rl1 = 0.35 * (ytf.conj() / (cmplx!(0.0, BF).conj() + ytf.conj())).norm();
        assert!(((ss1 - mpl1).norm() - rl1).abs() < 1e-9);

        // Re-checking the corrected point reports no further violation.
        let (viol2, ss2) = conv_lim(ss1, vs, ZTF, BF, ZC, 0.35, 1.1, 0.9, 2, 1e-2)?;
        assert_eq!(viol2, LimViol::None);
        assert!((ss2 - ss1).norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_active_power_clamped_to_current_limit() -> Result<()> {
        let (viol, ss) = conv_lim(
            cmplx!(-1.5, 0.0),
            cmplx!(1.0),
            ZTF,
            BF,
            ZC,
            1.2,
            1.1,
            0.9,
            2,
            1e-2,
        )?;
        assert_eq!(viol, LimViol::Active);
        assert!(ss.re > -1.5 && ss.re < -1.0);
        Ok(())
    }

    #[test]
    fn test_small_correction_is_not_a_violation() -> Result<()> {
        let (viol, _) = conv_lim(
            cmplx!(-0.6, -0.5),
            cmplx!(1.0),
            ZTF,
            BF,
            ZC,
            1.2,
            1.1,
            0.9,
            2,
            10.0,
        )?;
        assert_eq!(viol, LimViol::None);
        Ok(())
    }

    #[test]
    fn test_inverted_voltage_limits_are_fatal() {
        assert!(conv_lim(
            cmplx!(),
            cmplx!(1.0),
            ZTF,
            BF,
            ZC,
            1.2,
            0.9,
            1.1,
            2,
            1e-2
        )
        .is_err());
    }
}
