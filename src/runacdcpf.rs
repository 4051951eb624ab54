use std::f64::consts::PI;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use num_complex::Complex64;
use spsolve::Solver;

use crate::acpf::AcSolver;
use crate::cmplx;
use crate::converter::{calc_loss_ac, conv_lim, station_chain, LimViol};
use crate::dcpf::dc_network_pf;
use crate::ext_to_int::{ext2int_ac, ext2int_dc};
use crate::int_to_ext::{int2ext_ac, int2ext_dc};
use crate::math::{apply_permutation, permutation_by_key, undo_permutation};
use crate::mpc::{Bus, BusType, Gen, MPC};
use crate::mpcdc::{AcControl, DcControl, MPCDC};
use crate::opt::AcDcOpt;
use crate::outages::{recombine, split_ac_branches, split_converters, split_dc_branches, split_gens};
use crate::pu::{ext2int_pu, int2ext_pu};
use crate::slackdroop::calc_slack_droop;
use crate::ybusdc::make_ybus_dc;
use crate::zones::{ac_zones, zone_check};

const Q_DUMMY_MAX: f64 = 99999.0;
const Q_DUMMY_MIN: f64 = -99999.0;
const P_DUMMY_MAX: f64 = 99999.0;
const P_DUMMY_MIN: f64 = 0.0;

/// Result of a sequential AC/DC power flow.
pub struct AcDcResult {
    pub ac: MPC,
    pub dc: MPCDC,
    pub converged: bool,
    pub iterations: usize,
    pub elapsed: Duration,
}

/// Runs a sequential AC/DC power flow.
///
/// The AC grids and the DC grids are solved alternately. The converter
/// stations couple them: constant power converters appear as loads to
/// the AC side, while the DC slack and voltage droop converters balance
/// each DC grid and have their grid injections recovered from the
/// solved DC state.
pub fn run_acdc_pf(
    mpc: &MPC,
    mpcdc: &MPCDC,
    opt: &AcDcOpt,
    ac_solver: &dyn AcSolver,
    solver: &dyn Solver<usize, f64>,
) -> Result<AcDcResult> {
    if opt.enforce_dc_limits {
        bail!("dc voltage limit enforcement is not supported");
    }
    let t0 = Instant::now();

    let mut ac = mpc.clone();
    let mut dc = mpcdc.clone();
    let base_mva = ac.base_mva;
    let pol = dc.pol.factor();

    // Outages.
    let conv_out = split_converters(&mut dc.bus, &dc.conv);
    dc.conv = conv_out.on.clone();
    let (brdc_on, brdc_off, brdc_status) = split_dc_branches(&dc.branch);
    dc.branch = brdc_on;
    let (brch_on, brch_off, brch_status) = split_ac_branches(&ac.branch);
    ac.branch = brch_on;
    let (gen_on, gen_off, gen_status) = split_gens(&ac.gen);
    ac.gen = gen_on;

    // External to internal numbering.
    let dc_order = ext2int_dc(&mut dc)?;
    let ac_order = ext2int_ac(&mut dc, &mut ac)?;

    // Sort tables by bus number, remembering the row order.
    let bus_pmt = permutation_by_key(&ac.bus, |b| b.bus_i);
    ac.bus = apply_permutation(&ac.bus, &bus_pmt);
    let gen_pmt = permutation_by_key(&ac.gen, |g| g.gen_bus);
    ac.gen = apply_permutation(&ac.gen, &gen_pmt);
    let brch_pmt = permutation_by_key(&ac.branch, |br| br.f_bus);
    ac.branch = apply_permutation(&ac.branch, &brch_pmt);
    let busdc_pmt = permutation_by_key(&dc.bus, |b| b.bus_i);
    dc.bus = apply_permutation(&dc.bus, &busdc_pmt);
    let conv_pmt = permutation_by_key(&dc.conv, |c| c.bus_i);
    dc.conv = apply_permutation(&dc.conv, &conv_pmt);
    let brdc_pmt = permutation_by_key(&dc.branch, |br| br.f_bus);
    dc.branch = apply_permutation(&dc.branch, &brdc_pmt);

    ext2int_pu(base_mva, &mut dc)?;

    let ndc = dc.bus.len();
    let nb = ac.bus.len();
    let ngen = ac.gen.len();

    // Expand the converter table to per DC bus arrays.
    let mut conv_of: Vec<Option<usize>> = vec![None; ndc];
    for (k, c) in dc.conv.iter().enumerate() {
        conv_of[c.bus_i] = Some(k);
    }
    let cdci: Vec<usize> = (0..ndc).filter(|&i| conv_of[i].is_some()).collect();

    let mut dc_ctrl: Vec<Option<DcControl>> = conv_of
        .iter()
        .map(|k| k.map(|k| dc.conv[k].dc_control))
        .collect();
    let mut ac_ctrl: Vec<Option<AcControl>> = conv_of
        .iter()
        .map(|k| k.map(|k| dc.conv[k].ac_control))
        .collect();

    let rows_with = |ctrl: DcControl, dc_ctrl: &[Option<DcControl>]| -> Vec<usize> {
        (0..ndc).filter(|&i| dc_ctrl[i] == Some(ctrl)).collect()
    };
    let mut slackdc = rows_with(DcControl::Slack, &dc_ctrl);
    let mut droopdc = rows_with(DcControl::Droop, &dc_ctrl);
    let ngrid = dc.bus.iter().map(|b| b.grid).max().unwrap_or(0);

    // Every DC grid needs a slack or droop controlled converter.
    for g in 1..=ngrid {
        let has = slackdc
            .iter()
            .chain(&droopdc)
            .any(|&i| dc.bus[i].grid == g);
        if !has {
            bail!("no slack or droop bus in dc grid {}", g);
        }
    }

    // Demote surplus slack converters.
    if !opt.mult_slack {
        for g in 1..=ngrid {
            let in_grid: Vec<usize> = slackdc
                .iter()
                .copied()
                .filter(|&i| dc.bus[i].grid == g)
                .collect();
            if in_grid.len() > 1 {
                for &i in &in_grid[1..] {
                    dc_ctrl[i] = Some(DcControl::NoSlack);
                }
                log::warn!(
                    "multiple dc slack buses defined in grid {}: bus {} kept as the slack bus",
                    g,
                    dc_order.i2e[in_grid[0]]
                );
            }
        }
        slackdc = rows_with(DcControl::Slack, &dc_ctrl);
    }

    let mut slackdroopdc: Vec<usize> = slackdc.iter().chain(&droopdc).copied().collect();
    slackdroopdc.sort_unstable();
    let noslackbdc: Vec<usize> = (0..ndc).filter(|i| !slackdc.contains(i)).collect();

    // Voltage control conflicts between converters and generators.
    for &i in &cdci {
        if ac_ctrl[i] == Some(AcControl::PV) && (ac.bus[i].is_pv() || ac.bus[i].is_ref()) {
            ac_ctrl[i] = Some(AcControl::PQ);
            if let Some(k) = conv_of[i] {
                dc.conv[k].q = 0.0;
            }
            log::warn!(
                "conflicting voltage control on bus {}: converter set to PQ control without Q injection",
                ac_order.i2e[i]
            );
        }
    }

    // Converter station power injections. Reactive set-points only
    // apply to converters in PQ control.
    let mut pvsc = vec![0.0; ndc];
    let mut qvsc = vec![0.0; ndc];
    for &i in &cdci {
        if let Some(k) = conv_of[i] {
            pvsc[i] = dc.conv[k].p / base_mva;
            qvsc[i] = if ac_ctrl[i] == Some(AcControl::PQ) {
                dc.conv[k].q / base_mva
            } else {
                0.0
            };
        }
    }

    // Dummy generators for voltage controlling converters at PQ buses.
    let mut bus_vsc: Vec<Bus> = ac.bus.clone();
    let mut gendm: Vec<Gen> = Vec::new();
    let mut gen_pq: Vec<(usize, usize)> = Vec::new(); // (bus row, gen row)
    for &i in &cdci {
        if ac.bus[i].is_pq() && ac_ctrl[i] == Some(AcControl::PV) {
            bus_vsc[i].bus_type = BusType::PV;

            let v_target = conv_of[i].map(|k| dc.conv[k].v_target).unwrap_or(1.0);
            if let Some(gi) = ac.gen.iter().position(|g| g.gen_bus == i) {
                gen_pq.push((i, gi));
            } else {
                gendm.push(Gen {
                    gen_bus: i,
                    pg: 0.0,
                    qg: 0.0,
                    qmax: Q_DUMMY_MAX,
                    qmin: Q_DUMMY_MIN,
                    vg: v_target,
                    mbase: dc.base_mva_ac,
                    status: true,
                    pmax: P_DUMMY_MAX,
                    pmin: P_DUMMY_MIN,
                });
            }
        }
    }

    // DC voltage droop set-points.
    let mut droop_gain = vec![0.0; ndc];
    let mut p_dc_set = vec![0.0; ndc];
    let mut v_dc_set = vec![0.0; ndc];
    let mut dv_dc_set = vec![0.0; ndc];
    for &i in &cdci {
        if let Some(k) = conv_of[i] {
            droop_gain[i] = dc.conv[k].droop * base_mva;
            p_dc_set[i] = dc.conv[k].p_dc_set / base_mva;
            v_dc_set[i] = dc.conv[k].v_dc_set;
            dv_dc_set[i] = dc.conv[k].dv_dc_set;
        }
    }

    // Droop converters start at their power set-point; each DC slack
    // converter starts by balancing the scheduled powers of its grid.
    for &i in &droopdc {
        pvsc[i] = p_dc_set[i];
    }
    for g in 1..=ngrid {
        let in_grid: Vec<usize> = slackdc
            .iter()
            .copied()
            .filter(|&i| dc.bus[i].grid == g)
            .collect();
        if !in_grid.is_empty() {
            let scheduled: f64 = (0..ndc)
                .filter(|&i| dc.bus[i].grid == g && dc_ctrl[i] != Some(DcControl::Slack))
                .map(|i| pvsc[i])
                .sum();
            for &i in &in_grid {
                pvsc[i] = -scheduled / in_grid.len() as f64;
            }
        }
    }

    // Converters appear as loads to the AC network.
    for &i in &cdci {
        bus_vsc[i].pd = ac.bus[i].pd - pvsc[i] * base_mva;
        bus_vsc[i].qd = ac.bus[i].qd - qvsc[i] * base_mva;
    }

    // Converter loss coefficients in per unit.
    let mut loss_a = vec![0.0; ndc];
    let mut loss_b = vec![0.0; ndc];
    let mut loss_cr = vec![0.0; ndc];
    let mut loss_ci = vec![0.0; ndc];
    let mut ztf = vec![cmplx!(); ndc];
    let mut bf = vec![0.0; ndc];
    let mut zc = vec![cmplx!(); ndc];
    let mut icmax = vec![0.0; ndc];
    let mut vcmax = vec![0.0; ndc];
    let mut vcmin = vec![0.0; ndc];
    for &i in &cdci {
        if let Some(k) = conv_of[i] {
            let c = &dc.conv[k];
            let base_ka = base_mva / (3.0_f64.sqrt() * c.base_kv);
            loss_a[i] = c.loss_a / base_mva;
            loss_b[i] = c.loss_b * base_ka / base_mva;
            loss_cr[i] = c.loss_cr * base_ka * base_ka / base_mva;
            loss_ci[i] = c.loss_ci * base_ka * base_ka / base_mva;
            ztf[i] = c.ztf();
            bf[i] = c.bf;
            zc[i] = c.zc();
            icmax[i] = c.imax;
            vcmax[i] = c.vmax;
            vcmin[i] = c.vmin;
        }
    }

    let (y_bus_dc, y_f_dc, _) = make_ybus_dc(ndc, &dc.branch);
    let y_f_dc = y_f_dc.to_csr();

    zone_check(&ac.bus, &ac.gen, &ac.branch, &ac_order.i2e)?;
    let zones = ac_zones(&ac.bus);

    // Main iteration state.
    let mut vdc: Vec<f64> = dc.bus.iter().map(|b| b.vm).collect();
    let mut pdc = vec![0.0; ndc];
    let mut ps = pvsc.clone();
    let mut qs = vec![0.0; ndc];
    let mut vs = vec![cmplx!(1.0); ndc];
    let mut vf = vec![cmplx!(1.0); ndc];
    let mut vc = vec![cmplx!(1.0); ndc];
    let mut pc = vec![0.0; ndc];
    let mut qc = vec![0.0; ndc];
    let mut psf = vec![0.0; ndc];
    let mut qsf = vec![0.0; ndc];
    let mut qcf = vec![0.0; ndc];
    let mut ploss = vec![0.0; ndc];
    let mut pfdc = vec![0.0; dc.branch.len()];
    let mut ptdc = vec![0.0; dc.branch.len()];

    let gen_base = ac.gen.clone();
    let mut gen_vsc: Vec<Gen> = ac.gen.iter().chain(&gendm).cloned().collect();
    let mut gendm_idx: Vec<usize> = (ngen..gen_vsc.len()).collect();
    let mut gdm_bus: Vec<usize> = gendm.iter().map(|g| g.gen_bus).collect();

    let mut it = 0;
    let mut converged = false;

    while !converged && it <= opt.max_it_acdc {
        it += 1;

        qs = qvsc.clone();
        let mut ss: Vec<Complex64> = (0..ndc).map(|i| cmplx!(ps[i], qs[i])).collect();

        // AC power flow per synchronous zone.
        for &z in &zones {
            let buszi: Vec<usize> = (0..nb).filter(|&i| ac.bus[i].zone == z).collect();
            if buszi.len() <= 1 {
                continue; // infinite bus zone
            }
            let genzi: Vec<usize> = (0..gen_vsc.len())
                .filter(|&i| ac.bus[gen_vsc[i].gen_bus].zone == z)
                .collect();
            let brchzi: Vec<usize> = (0..ac.branch.len())
                .filter(|&i| ac.bus[ac.branch[i].f_bus].zone == z)
                .collect();

            let busz: Vec<Bus> = buszi.iter().map(|&i| bus_vsc[i].clone()).collect();
            let genz: Vec<Gen> = genzi.iter().map(|&i| gen_vsc[i].clone()).collect();
            let branchz: Vec<_> = brchzi.iter().map(|&i| ac.branch[i].clone()).collect();

            let sol = ac_solver.solve(base_mva, &busz, &genz, &branchz)?;
            if !sol.converged {
                log::warn!("ac power flow for zone {} did not converge", z);
            }

            for (k, &i) in buszi.iter().enumerate() {
                bus_vsc[i] = sol.bus[k].clone();
            }
            for (k, &i) in genzi.iter().enumerate() {
                gen_vsc[i] = sol.gen[k].clone();
            }
            for (k, &i) in brchzi.iter().enumerate() {
                ac.branch[i] = sol.branch[k].clone();
            }
        }

        // Reactive power picked up by the voltage controlling
        // converters, from their dummy generators or from the surplus
        // over the local generator dispatch.
        for (d, &gi) in gendm_idx.iter().enumerate() {
            let b = gdm_bus[d];
            ss[b] += cmplx!(0.0, gen_vsc[gi].qg / base_mva);
            gen_vsc[gi].qg = 0.0;
        }
        for &(b, gi) in &gen_pq {
            ss[b] += cmplx!(0.0, (gen_vsc[gi].qg - gen_base[gi].qg) / base_mva);
            gen_vsc[gi].qg = gen_base[gi].qg;
        }

        for i in 0..ndc {
            ps[i] = ss[i].re;
            qs[i] = ss[i].im;
        }

        // Converter station chains.
        for &i in &cdci {
            vs[i] = Complex64::from_polar(bus_vsc[i].vm, bus_vsc[i].va * PI / 180.0);
            let st = station_chain(ss[i], vs[i], ztf[i], bf[i], zc[i]);
            vf[i] = st.vf;
            vc[i] = st.vc;
            pc[i] = st.sc.re;
            qc[i] = st.sc.im;
            psf[i] = st.ssf.re;
            qsf[i] = st.ssf.im;
            qcf[i] = st.scf.im;
        }

        let ps_old = ps.clone();

        // Converter limit enforcement, one worst violator per DC grid
        // and iteration, active power violations first.
        if opt.enforce_ac_limits {
            for g in 1..=ngrid {
                let candidates: Vec<usize> = cdci
                    .iter()
                    .copied()
                    .filter(|&i| dc.bus[i].grid == g && dc_ctrl[i] != Some(DcControl::Slack))
                    .collect();

                let mut viol = vec![LimViol::None; ndc];
                let mut ss_lim = vec![cmplx!(); ndc];
                for &i in &candidates {
                    let (v, s) = conv_lim(
                        ss[i],
                        vs[i],
                        ztf[i],
                        bf[i],
                        zc[i],
                        icmax[i],
                        vcmax[i],
                        vcmin[i],
                        dc_order.i2e[i],
                        opt.tol_lim,
                    )?;
                    viol[i] = v;
                    ss_lim[i] = s;
                }

                let active: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| viol[i] == LimViol::Active)
                    .collect();
                let reactive: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| viol[i] == LimViol::Reactive)
                    .collect();

                let worst = if !active.is_empty() {
                    active
                        .into_iter()
                        .max_by(|&a, &b| {
                            let da = (ss_lim[a] - ss[a]).re.abs();
                            let db = (ss_lim[b] - ss[b]).re.abs();
                            da.total_cmp(&db)
                        })
                        .map(|i| {
                            log::warn!(
                                "active power setpoint of converter {} changed from {:.2} MW to {:.2} MW",
                                dc_order.i2e[i],
                                ss[i].re * base_mva,
                                ss_lim[i].re * base_mva
                            );
                            i
                        })
                } else if !reactive.is_empty() {
                    reactive
                        .into_iter()
                        .max_by(|&a, &b| {
                            let da = (ss_lim[a] - ss[a]).im.abs();
                            let db = (ss_lim[b] - ss[b]).im.abs();
                            da.total_cmp(&db)
                        })
                        .map(|i| {
                            log::warn!(
                                "reactive power setpoint of converter {} changed from {:.2} MVAr to {:.2} MVAr",
                                dc_order.i2e[i],
                                ss[i].im * base_mva,
                                ss_lim[i].im * base_mva
                            );
                            i
                        })
                } else {
                    None
                };

                if let Some(w) = worst {
                    ss[w] = ss_lim[w];
                    pvsc[w] = ss[w].re;
                    qvsc[w] = ss[w].im;
                    bus_vsc[w].pd = ac.bus[w].pd - pvsc[w] * base_mva;
                    bus_vsc[w].qd = ac.bus[w].qd - qvsc[w] * base_mva;

                    // A clamped converter can no longer control its AC
                    // voltage or its DC voltage.
                    if ac_ctrl[w] == Some(AcControl::PV) {
                        ac_ctrl[w] = Some(AcControl::PQ);
                        bus_vsc[w].bus_type = BusType::PQ;
                        log::warn!(
                            "voltage control at converter bus {} removed",
                            dc_order.i2e[w]
                        );

                        if let Some(d) = gdm_bus.iter().position(|&b| b == w) {
                            let gi = gendm_idx[d];
                            gen_vsc.remove(gi);
                            gdm_bus.remove(d);
                            gendm_idx = (ngen..gen_vsc.len()).collect();
                        }
                        gen_pq.retain(|&(b, _)| b != w);
                    }
                    if dc_ctrl[w] == Some(DcControl::Droop) {
                        dc_ctrl[w] = Some(DcControl::NoSlack);
                        droopdc.retain(|&i| i != w);
                        slackdroopdc.retain(|&i| i != w);
                        log::warn!(
                            "droop control at converter bus {} disabled",
                            dc_order.i2e[w]
                        );
                    }
                }
            }

            // Recalculate the station chains with the clamped powers.
            for i in 0..ndc {
                ps[i] = ss[i].re;
                qs[i] = ss[i].im;
            }
            for &i in &cdci {
                let st = station_chain(ss[i], vs[i], ztf[i], bf[i], zc[i]);
                vf[i] = st.vf;
                vc[i] = st.vc;
                pc[i] = st.sc.re;
                qc[i] = st.sc.im;
                psf[i] = st.ssf.re;
                qsf[i] = st.ssf.im;
                qcf[i] = st.scf.im;
            }
        }

        // Converter losses and DC grid power flow.
        for &i in &cdci {
            ploss[i] = calc_loss_ac(
                pc[i], qc[i], vc[i], loss_a[i], loss_b[i], loss_cr[i], loss_ci[i],
            );
            pdc[i] = pc[i] + ploss[i];
        }

        dc_network_pf(
            &y_bus_dc,
            &mut vdc,
            &mut pdc,
            &slackdc,
            &noslackbdc,
            &droopdc,
            &droop_gain,
            &p_dc_set,
            &v_dc_set,
            &dv_dc_set,
            pol,
            opt.tol_dc,
            opt.max_it_dc,
            solver,
        )?;

        // DC line flows.
        let ifdc = &y_f_dc * &vdc;
        for (l, br) in dc.branch.iter().enumerate() {
            pfdc[l] = pol * vdc[br.f_bus] * ifdc[l];
            ptdc[l] = pol * vdc[br.t_bus] * -ifdc[l];
        }

        // Slack/droop converter loss iteration: the converter power
        // follows from the DC side, net of the station losses.
        for &i in &slackdroopdc {
            pc[i] = pdc[i] - ploss[i];
        }

        let mut it_slack = 0;
        let mut converged_sd = slackdroopdc.is_empty();
        while !converged_sd && it_slack <= opt.max_it_slack_droop {
            it_slack += 1;

            let pc_prev: Vec<f64> = slackdroopdc.iter().map(|&i| pc[i]).collect();

            let sd = &slackdroopdc;
            let (ps_sd, qc_sd, vc_sd, _) = calc_slack_droop(
                &sd.iter().map(|&i| pc[i]).collect::<Vec<_>>(),
                &sd.iter().map(|&i| qs[i]).collect::<Vec<_>>(),
                &sd.iter().map(|&i| vs[i]).collect::<Vec<_>>(),
                &sd.iter().map(|&i| vf[i]).collect::<Vec<_>>(),
                &sd.iter().map(|&i| vc[i]).collect::<Vec<_>>(),
                &sd.iter().map(|&i| ztf[i]).collect::<Vec<_>>(),
                &sd.iter().map(|&i| bf[i]).collect::<Vec<_>>(),
                &sd.iter().map(|&i| zc[i]).collect::<Vec<_>>(),
                opt.tol_slack_droop_int,
                opt.max_it_slack_droop_int,
                solver,
            )?;

            for (k, &i) in slackdroopdc.iter().enumerate() {
                ps[i] = ps_sd[k];
                qc[i] = qc_sd[k];
                vc[i] = vc_sd[k];
                ploss[i] = calc_loss_ac(
                    pc[i], qc[i], vc[i], loss_a[i], loss_b[i], loss_cr[i], loss_ci[i],
                );
                pc[i] = pdc[i] - ploss[i];
            }

            let max_dpc = slackdroopdc
                .iter()
                .enumerate()
                .map(|(k, &i)| (pc_prev[k] - pc[i]).abs())
                .fold(0.0, f64::max);
            if max_dpc < opt.tol_slack_droop {
                converged_sd = true;
            }
        }
        if !converged_sd {
            log::warn!(
                "slack/droop converter loss calculation did not converge in {} iterations",
                it_slack
            );
        }

        for &i in &cdci {
            bus_vsc[i].pd = ac.bus[i].pd - ps[i] * base_mva;
        }

        let max_dps = (0..ndc)
            .map(|i| (ps_old[i] - ps[i]).abs())
            .fold(0.0, f64::max);
        if max_dps < opt.tol_acdc {
            converged = true;
        }
    }

    if converged {
        log::info!("sequential solution method converged in {} iterations", it);
    } else {
        log::warn!(
            "sequential solution method did not converge after {} iterations",
            it
        );
    }

    // Final audit of the converter limits.
    if opt.enforce_ac_limits {
        for &i in &cdci {
            let ss_i = cmplx!(ps[i], qs[i]);
            let (v, _) = conv_lim(
                ss_i,
                vs[i],
                ztf[i],
                bf[i],
                zc[i],
                icmax[i],
                vcmax[i],
                vcmin[i],
                dc_order.i2e[i],
                opt.tol_lim,
            )?;
            if v != LimViol::None {
                match dc_ctrl[i] {
                    Some(DcControl::Slack) => log::warn!(
                        "slack bus converter {} is operating outside its limits",
                        dc_order.i2e[i]
                    ),
                    _ => log::warn!(
                        "converter {} is operating outside its limits",
                        dc_order.i2e[i]
                    ),
                }
            }
        }
    }

    // Write the solution back into the data tables.
    for (i, b) in ac.bus.iter_mut().enumerate() {
        b.vm = bus_vsc[i].vm;
        b.va = bus_vsc[i].va;
    }
    ac.gen = gen_vsc[..ngen].to_vec();

    for (i, b) in dc.bus.iter_mut().enumerate() {
        b.pdc = pdc[i] * base_mva;
        b.vm = vdc[i];
    }
    for c in dc.conv.iter_mut() {
        let i = c.bus_i;
        c.dc_control = dc_ctrl[i].unwrap_or(c.dc_control);
        c.ac_control = ac_ctrl[i].unwrap_or(c.ac_control);
        c.p = ps[i] * base_mva;
        c.q = qs[i] * base_mva;
        c.vmc = vc[i].norm();
        c.vac = vc[i].arg() * 180.0 / PI;
        c.pc = pc[i] * base_mva;
        c.qc = qc[i] * base_mva;
        c.p_loss = ploss[i] * base_mva;
        c.vmf = vf[i].norm();
        c.vaf = vf[i].arg() * 180.0 / PI;
        c.pf = psf[i] * base_mva;
        c.qf = qsf[i] * base_mva;
        c.qcf = qcf[i] * base_mva;
    }
    for (l, br) in dc.branch.iter_mut().enumerate() {
        br.pf = pfdc[l] * base_mva;
        br.pt = ptdc[l] * base_mva;
    }

    int2ext_pu(base_mva, &mut dc);

    // Undo the sorting.
    ac.bus = undo_permutation(&ac.bus, &bus_pmt);
    ac.gen = undo_permutation(&ac.gen, &gen_pmt);
    ac.branch = undo_permutation(&ac.branch, &brch_pmt);
    dc.bus = undo_permutation(&dc.bus, &busdc_pmt);
    dc.conv = undo_permutation(&dc.conv, &conv_pmt);
    dc.branch = undo_permutation(&dc.branch, &brdc_pmt);

    int2ext_ac(&ac_order, &mut dc, &mut ac)?;
    int2ext_dc(&dc_order, &mut dc)?;

    // Recombine outages.
    let gen_off: Vec<Gen> = gen_off
        .into_iter()
        .map(|mut g| {
            g.pg = 0.0;
            g.qg = 0.0;
            g
        })
        .collect();
    ac.gen = recombine(&ac.gen, &gen_off, &gen_status);
    ac.branch = recombine(&ac.branch, &brch_off, &brch_status);
    dc.branch = recombine(&dc.branch, &brdc_off, &brdc_status);
    dc.conv = recombine(&dc.conv, &conv_out.off, &conv_out.status);
    for &(row, ac_bus) in &conv_out.cleared_ac {
        dc.bus[row].ac_bus = Some(ac_bus);
    }

    Ok(AcDcResult {
        ac,
        dc,
        converged,
        iterations: it,
        elapsed: t0.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acpf::NewtonAcSolver;
    use crate::cases::{case3_inf, case_hvdc_ptp, case_mtdc_droop};
    use spsolve::rlu::RLU;

    fn solve(ac: &MPC, dc: &MPCDC, opt: &AcDcOpt) -> Result<AcDcResult> {
        let _ = env_logger::builder().is_test(true).try_init();
        let solver = RLU::default();
        let ac_solver = NewtonAcSolver {
            tol: opt.tol_ac,
            max_it: opt.max_it_ac,
            solver: &solver,
        };
        run_acdc_pf(ac, dc, opt, &ac_solver, &solver)
    }

    #[test]
    fn test_ptp_link_power_transfer() -> Result<()> {
        let ac = case3_inf();
        let dc = case_hvdc_ptp();
        let res = solve(&ac, &dc, &AcDcOpt::default())?;
        assert!(res.converged);

        // The constant power converter holds its setpoint.
        assert!((res.dc.conv[0].p + 60.0).abs() < 1e-6);
        assert!((res.dc.conv[0].q + 40.0).abs() < 1e-6);

        // The slack converter injects the transfer minus the losses.
        let ps = res.dc.conv[1].p;
        assert!(ps > 50.0 && ps < 60.0, "slack injection {} MW", ps);

        // The slack bus voltage is held; the rectifier bus rides higher.
        assert!((res.dc.bus[1].vm - 1.0).abs() < 1e-12);
        assert!(res.dc.bus[0].vm > 1.0);

        // Converter and line losses are positive and small.
        assert!(res.dc.conv[0].p_loss > 0.0);
        assert!(res.dc.conv[1].p_loss > 0.0);
        let line_loss = res.dc.branch[0].pf + res.dc.branch[0].pt;
        assert!(line_loss > 0.0 && line_loss < 2.0);
        assert!(res.dc.branch[0].pf > 55.0 && res.dc.branch[0].pf < 65.0);
        Ok(())
    }

    #[test]
    fn test_mtdc_droop_characteristic() -> Result<()> {
        let ac = case3_inf();
        let dcc = case_mtdc_droop();
        let res = solve(&ac, &dcc, &AcDcOpt::default())?;
        assert!(res.converged);

        // Every droop converter ends up on its voltage/power curve.
        for (i, c) in res.dc.conv.iter().enumerate() {
            let pdc = res.dc.bus[i].pdc / 100.0;
            let k = c.droop * 100.0;
            let expected = c.p_dc_set / 100.0 + (res.dc.bus[i].vm - c.v_dc_set) / k;
            assert!(
                (pdc - expected).abs() < 1e-6,
                "droop curve violated at bus {}",
                i + 1
            );
        }

        // The grid balance nets out to the line losses.
        let total: f64 = res.dc.bus.iter().map(|b| b.pdc).sum();
        assert!(total < 0.0 && total > -5.0);
        Ok(())
    }

    #[test]
    fn test_converter_current_limit_clamps_setpoint() -> Result<()> {
        let ac = case3_inf();
        let mut dcc = case_hvdc_ptp();
        dcc.conv[0].imax = 0.35;

        let opt = AcDcOpt {
            enforce_ac_limits: true,
            ..Default::default()
        };
        let res = solve(&ac, &dcc, &opt)?;
        assert!(res.converged);

        // The 72 MVA setpoint exceeds the 35 MVA-ish current rating and
        // is pulled back onto the capability curve.
        let c = &res.dc.conv[0];
        assert!(c.p > -60.0 && c.p < -20.0, "clamped to {} MW", c.p);
        let s = (c.p * c.p + c.q * c.q).sqrt() / 100.0;
        assert!(s < 0.55, "apparent power {} p.u.", s);
        Ok(())
    }

    #[test]
    fn test_voltage_control_conflict_demotes_converter() -> Result<()> {
        use crate::mpc::{Branch, Gen};
        use crate::mpcdc::AcControl;

        // Zone 1 is a real two bus system with the sending converter on
        // its slack bus; zone 2 is an infinite bus for the receiving end.
        let ac = MPC {
            base_mva: 100.0,
            bus: vec![
                Bus {
                    bus_i: 1,
                    bus_type: BusType::REF,
                    base_kv: 345.0,
                    zone: 1,
                    ..Default::default()
                },
                Bus {
                    bus_i: 2,
                    base_kv: 345.0,
                    zone: 1,
                    ..Default::default()
                },
                Bus {
                    bus_i: 3,
                    bus_type: BusType::INF,
                    base_kv: 345.0,
                    zone: 2,
                    ..Default::default()
                },
            ],
            gen: vec![Gen {
                gen_bus: 1,
                qmax: 100.0,
                qmin: -100.0,
                pmax: 250.0,
                ..Default::default()
            }],
            branch: vec![Branch {
                f_bus: 1,
                t_bus: 2,
                r: 0.01,
                x: 0.1,
                ..Default::default()
            }],
        };

        let mut dcc = case_hvdc_ptp();
        dcc.bus[0].ac_bus = Some(1);
        dcc.bus[1].ac_bus = Some(3);
        dcc.conv[0].ac_control = AcControl::PV;

        let res = solve(&ac, &dcc, &AcDcOpt::default())?;
        assert!(res.converged);

        // The generator keeps the voltage; the converter falls back to
        // PQ control with no reactive injection.
        assert_eq!(res.dc.conv[0].ac_control, AcControl::PQ);
        assert!(res.dc.conv[0].q.abs() < 1e-8);
        assert!((res.dc.conv[0].p + 60.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_surplus_dc_slack_is_demoted() -> Result<()> {
        let ac = case3_inf();
        let mut dcc = case_hvdc_ptp();
        dcc.conv[0].dc_control = DcControl::Slack;
        dcc.conv[1].dc_control = DcControl::Slack;

        let res = solve(&ac, &dcc, &AcDcOpt::default())?;
        assert!(res.converged);
        assert_eq!(res.dc.conv[0].dc_control, DcControl::Slack);
        assert_eq!(res.dc.conv[1].dc_control, DcControl::NoSlack);
        Ok(())
    }

    #[test]
    fn test_no_dc_slack_or_droop_is_fatal() {
        let ac = case3_inf();
        let mut dcc = case_hvdc_ptp();
        for c in dcc.conv.iter_mut() {
            c.dc_control = DcControl::NoSlack;
        }
        assert!(solve(&ac, &dcc, &AcDcOpt::default()).is_err());
    }

    #[test]
    fn test_gapped_grid_numbering_is_fatal() {
        let ac = case3_inf();
        let mut dcc = case_mtdc_droop();
        dcc.bus[2].grid = 3;
        assert!(solve(&ac, &dcc, &AcDcOpt::default()).is_err());
    }

    #[test]
    fn test_shared_converter_ac_bus_is_fatal() {
        let ac = case3_inf();
        let mut dcc = case_hvdc_ptp();
        dcc.bus[1].ac_bus = Some(2);
        assert!(solve(&ac, &dcc, &AcDcOpt::default()).is_err());
    }

    #[test]
    fn test_dc_limit_enforcement_is_rejected() {
        let ac = case3_inf();
        let dcc = case_hvdc_ptp();
        let opt = AcDcOpt {
            enforce_dc_limits: true,
            ..Default::default()
        };
        assert!(solve(&ac, &dcc, &opt).is_err());
    }
}
