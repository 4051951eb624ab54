use anyhow::Result;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use spsolve::Solver;

use crate::cmplx;
use crate::debug::format_f64_vec;

/// Newton iteration for the grid injections of DC slack and voltage
/// droop controlled converters.
///
/// The converter active power injection `pc_spec` and the grid side
/// reactive power `qs_spec` are held fixed, together with the AC grid
/// state `vs`. The converter and filter voltages are solved, yielding
/// the grid side active power, the converter side reactive power and
/// the converter voltage.
///
/// Based on:
/// J. Beerten, S. Cole and R. Belmans: "Generalized Steady-State VSC
/// MTDC Model for Sequential AC/DC Power Flow Algorithms", IEEE Trans.
/// Pow. Syst., vol. 27, no. 2, 2012, pp. 821 - 829.
#[allow(clippy::too_many_arguments)]
pub fn calc_slack_droop(
    pc_spec: &[f64],
    qs_spec: &[f64],
    vs: &[Complex64],
    vf: &[Complex64],
    vc: &[Complex64],
    ztf: &[Complex64],
    bf: &[f64],
    zc: &[Complex64],
    tol: f64,
    max_it: usize,
    solver: &dyn Solver<usize, f64>,
) -> Result<(Vec<f64>, Vec<f64>, Vec<Complex64>, bool)> {
    let ng = pc_spec.len();

    let vsm: Vec<f64> = vs.iter().map(|v| v.norm()).collect();
    let vsa: Vec<f64> = vs.iter().map(|v| v.arg()).collect();
    let mut vfm: Vec<f64> = vf.iter().map(|v| v.norm()).collect();
    let mut vfa: Vec<f64> = vf.iter().map(|v| v.arg()).collect();
    let mut vcm: Vec<f64> = vc.iter().map(|v| v.norm()).collect();
    let mut vca: Vec<f64> = vc.iter().map(|v| v.arg()).collect();

    let gc: Vec<f64> = zc.iter().map(|z| (cmplx!(1.0) / z).re).collect();
    let bc: Vec<f64> = zc.iter().map(|z| (cmplx!(1.0) / z).im).collect();

    // Converters with and without a grid transformer.
    let has_tf: Vec<bool> = ztf.iter().map(|&z| z != cmplx!()).collect();
    let gtf: Vec<f64> = ztf
        .iter()
        .map(|&z| if z != cmplx!() { (cmplx!(1.0) / z).re } else { 0.0 })
        .collect();
    let btf: Vec<f64> = ztf
        .iter()
        .map(|&z| if z != cmplx!() { (cmplx!(1.0) / z).im } else { 0.0 })
        .collect();

    // Unknown ordering: [Vca; Vfa; Vcm; Vfm]. Transformerless
    // converters have their filter bus equations and voltages removed.
    let keep: Vec<usize> = (0..ng)
        .chain((0..ng).filter(|&j| has_tf[j]).map(|j| ng + j))
        .chain((0..ng).filter(|&j| has_tf[j]).map(|j| 2 * ng + j))
        .chain((0..ng).filter(|&j| has_tf[j]).map(|j| 3 * ng + j))
        .collect();

    let powers = |vca: &[f64], vfa: &[f64], vcm: &[f64], vfm: &[f64], j: usize| {
        let cosfc = (vfa[j] - vca[j]).cos();
        let sinfc = (vfa[j] - vca[j]).sin();
        let cossf = (vsa[j] - vfa[j]).cos();
        let sinsf = (vsa[j] - vfa[j]).sin();
        let cossc = (vsa[j] - vca[j]).cos();
        let sinsc = (vsa[j] - vca[j]).sin();

        // Converter side power
        let pc = vcm[j] * vcm[j] * gc[j] - vfm[j] * vcm[j] * (gc[j] * cosfc - bc[j] * sinfc);
        let qc = -vcm[j] * vcm[j] * bc[j] + vfm[j] * vcm[j] * (gc[j] * sinfc + bc[j] * cosfc);

        // Filter side converter power
        let pcf = -vfm[j] * vfm[j] * gc[j] + vfm[j] * vcm[j] * (gc[j] * cosfc + bc[j] * sinfc);
        let qcf = vfm[j] * vfm[j] * bc[j] + vfm[j] * vcm[j] * (gc[j] * sinfc - bc[j] * cosfc);

        // Filter reactive power
        let qf = -bf[j] * vfm[j] * vfm[j];

        // Filter side grid power
        let psf = vfm[j] * vfm[j] * gtf[j] - vfm[j] * vsm[j] * (gtf[j] * cossf - btf[j] * sinsf);
        let qsf = -vfm[j] * vfm[j] * btf[j] + vfm[j] * vsm[j] * (gtf[j] * sinsf + btf[j] * cossf);

        // Grid side power
        let (ps, qs) = if has_tf[j] {
            (
                -vsm[j] * vsm[j] * gtf[j] + vfm[j] * vsm[j] * (gtf[j] * cossf + btf[j] * sinsf),
                vsm[j] * vsm[j] * btf[j] + vfm[j] * vsm[j] * (gtf[j] * sinsf - btf[j] * cossf),
            )
        } else {
            (
                -vsm[j] * vsm[j] * gc[j] + vsm[j] * vcm[j] * (gc[j] * cossc + bc[j] * sinsc),
                vsm[j] * vsm[j] * (bc[j] + bf[j]) + vsm[j] * vcm[j] * (gc[j] * sinsc - bc[j] * cossc),
            )
        };

        (pc, qc, pcf, qcf, qf, psf, qsf, ps, qs)
    };

    let mut it = 0;
    let mut converged = false;

    while it < max_it {
        it += 1;

        let mut mismatch = vec![0.0; 4 * ng];
        let mut pcv = vec![0.0; ng];
        let mut qcv = vec![0.0; ng];
        let mut pcfv = vec![0.0; ng];
        let mut qcfv = vec![0.0; ng];
        let mut psfv = vec![0.0; ng];
        let mut qsfv = vec![0.0; ng];
        let mut psv = vec![0.0; ng];
        let mut qsv = vec![0.0; ng];

        for j in 0..ng {
            let (pc, qc, pcf, qcf, qf, psf, qsf, ps, qs) = powers(&vca, &vfa, &vcm, &vfm, j);
            pcv[j] = pc;
            qcv[j] = qc;
            pcfv[j] = pcf;
            qcfv[j] = qcf;
            psfv[j] = psf;
            qsfv[j] = qsf;
            psv[j] = ps;
            qsv[j] = qs;

            mismatch[j] = pc_spec[j] - pc;
            mismatch[ng + j] = qs_spec[j] - qs;
            mismatch[2 * ng + j] = -(pcf - psf);
            mismatch[3 * ng + j] = -(qcf - qsf - qf);
        }

        // Transformerless converters only balance the converter power;
        // their filter bus mismatches are not part of the test.
        let max_mis = (0..4 * ng)
            .filter(|&k| k < 2 * ng || has_tf[k % ng])
            .map(|k| mismatch[k].abs())
            .fold(0.0, f64::max);
        if max_mis < tol {
            converged = true;
            break;
        }

        let mut jac = Coo::with_capacity(4 * ng, 4 * ng, 16 * ng);
        for j in 0..ng {
            let vcm2 = vcm[j] * vcm[j];
            let vsm2 = vsm[j] * vsm[j];
            let vfm2 = vfm[j] * vfm[j];

            jac.push(j, j, -qcv[j] - vcm2 * bc[j]);
            jac.push(j, 2 * ng + j, pcv[j] + vcm2 * gc[j]);
            if has_tf[j] {
                jac.push(j, ng + j, qcv[j] + vcm2 * bc[j]);
                jac.push(j, 3 * ng + j, pcv[j] - vcm2 * gc[j]);

                jac.push(ng + j, ng + j, -psv[j] - vsm2 * gtf[j]);
                jac.push(ng + j, 3 * ng + j, qsv[j] - vsm2 * btf[j]);

                jac.push(2 * ng + j, j, qcfv[j] - vfm2 * bc[j]);
                jac.push(2 * ng + j, ng + j, -qcfv[j] + qsfv[j] + vfm2 * (bc[j] + btf[j]));
                jac.push(2 * ng + j, 2 * ng + j, pcfv[j] + vfm2 * gc[j]);
                jac.push(2 * ng + j, 3 * ng + j, pcfv[j] - psfv[j] - vfm2 * (gc[j] + gtf[j]));

                jac.push(3 * ng + j, j, -pcfv[j] - vfm2 * gc[j]);
                jac.push(3 * ng + j, ng + j, pcfv[j] - psfv[j] + vfm2 * (gc[j] + gtf[j]));
                jac.push(3 * ng + j, 2 * ng + j, qcfv[j] - vfm2 * bc[j]);
                jac.push(
                    3 * ng + j,
                    3 * ng + j,
                    qcfv[j] - qsfv[j] + vfm2 * (bc[j] + btf[j] + 2.0 * bf[j]),
                );
            } else {
                jac.push(ng + j, j, -psv[j] - vsm2 * gc[j]);
                jac.push(ng + j, 2 * ng + j, qsv[j] - vsm2 * (bc[j] + bf[j]));
            }
        }

        let jac = jac.to_csr().select(Some(&keep), Some(&keep))?.to_csc();
        let mut rhs: Vec<f64> = keep.iter().map(|&k| mismatch[k]).collect();
        solver.solve(
            jac.cols(),
            jac.rowidx(),
            jac.colptr(),
            jac.values(),
            &mut rhs,
            false,
        )?;
        log::trace!("slack/droop corr_{}: {}", it, format_f64_vec(&rhs));

        let mut corr = vec![0.0; 4 * ng];
        for (&k, &c) in keep.iter().zip(&rhs) {
            corr[k] = c;
        }
        for j in 0..ng {
            vca[j] += corr[j];
            vfa[j] += corr[ng + j];
            vcm[j] *= 1.0 + corr[2 * ng + j];
            vfm[j] *= 1.0 + corr[3 * ng + j];
        }
    }

    if !converged {
        log::warn!(
            "slack bus converter power calculation did not converge in {} iterations",
            it
        );
    }

    let mut ps_out = vec![0.0; ng];
    let mut qc_out = vec![0.0; ng];
    let mut vc_out = vec![Complex64::default(); ng];
    for j in 0..ng {
        let (_, qc, _, _, _, _, _, ps, _) = powers(&vca, &vfa, &vcm, &vfm, j);
        ps_out[j] = ps;
        qc_out[j] = qc;
        vc_out[j] = Complex64::from_polar(vcm[j], vca[j]);
    }

    Ok((ps_out, qc_out, vc_out, converged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::station_chain;
    use spsolve::rlu::RLU;

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
    fn test_consistent_state_with_transformer() -> Result<()> {
        // A state produced by the forward station chain satisfies the
        // power balance, so the iteration reproduces it.
        let ss = cmplx!(-0.6, -0.4);
        let vs = cmplx!(1.0);
        let st = station_chain(ss, vs, ZTF, BF, ZC);

        let solver = RLU::default();
        let (ps, qc, vc, converged) = calc_slack_droop(
            &[st.sc.re],
            &[ss.im],
            &[vs],
            &[st.vf],
            &[st.vc],
            &[ZTF],
            &[BF],
            &[ZC],
            1e-8,
            10,
            &solver,
        )?;

        assert!(converged);
        assert!((ps[0] - ss.re).abs() < 1e-6);
        assert!((qc[0] - st.sc.im).abs() < 1e-6);
        assert!((vc[0] - st.vc).norm() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_consistent_state_without_transformer() -> Result<()> {
        let ss = cmplx!(0.3, 0.1);
        let vs = cmplx!(1.02);
        let st = station_chain(ss, vs, cmplx!(), 0.0, ZC);

        let solver = RLU::default();
        let (ps, qc, vc, converged) = calc_slack_droop(
            &[st.sc.re],
            &[ss.im],
            &[vs],
            &[st.vf],
            &[st.vc],
            &[cmplx!()],
            &[0.0],
            &[ZC],
            1e-8,
            10,
            &solver,
        )?;

        assert!(converged);
        assert!((ps[0] - ss.re).abs() < 1e-6);
        assert!((qc[0] - st.sc.im).abs() < 1e-6);
        assert!((vc[0] - st.vc).norm() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_perturbed_state_converges_back() -> Result<()> {
        let ss = cmplx!(-0.6, -0.4);
        let vs = cmplx!(1.0);
        let st = station_chain(ss, vs, ZTF, BF, ZC);

        // Start from a perturbed voltage estimate.
        let vf0 = st.vf * cmplx!(1.01, 0.005);
        let vc0 = st.vc * cmplx!(0.99, -0.005);

        let solver = RLU::default();
        let (ps, _, _, converged) = calc_slack_droop(
            &[st.sc.re],
            &[ss.im],
            &[vs],
            &[vf0],
            &[vc0],
            &[ZTF],
            &[BF],
            &[ZC],
            1e-8,
            10,
            &solver,
        )?;

        assert!(converged);
        assert!((ps[0] - ss.re).abs() < 1e-6);
        Ok(())
    }
}
