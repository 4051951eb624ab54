use anyhow::{bail, Result};

use crate::mpcdc::MPCDC;

/// Converts converter and DC network per unit data onto the AC power
/// flow base `base_mva`.
///
/// Only p.u. impedances, susceptances and currents change. Voltages
/// (p.u.) and powers (natural units) are left unaltered. Expects the
/// DC side in internal numbering.
pub fn ext2int_pu(base_mva: f64, mpcdc: &mut MPCDC) -> Result<()> {
    for c in mpcdc.conv.iter_mut() {
        c.rtf *= base_mva / mpcdc.base_mva_ac;
        c.xtf *= base_mva / mpcdc.base_mva_ac;
        c.bf *= base_mva / mpcdc.base_mva_ac;
        c.rc *= base_mva / mpcdc.base_mva_ac;
        c.xc *= base_mva / mpcdc.base_mva_ac;
        c.imax *= mpcdc.base_mva_ac / base_mva;
    }

    for b in mpcdc.bus.iter_mut() {
        let base_r_dc = b.base_kv.powi(2) / mpcdc.base_mva_dc;
        let base_r_ac = b.base_kv.powi(2) / base_mva;
        b.c = b.c / base_r_dc * base_r_ac;
    }

    for br in mpcdc.branch.iter() {
        if mpcdc.bus[br.f_bus].base_kv != mpcdc.bus[br.t_bus].base_kv {
            bail!(
                "base voltages at the terminals of dc branch ({}, {}) do not match",
                br.f_bus,
                br.t_bus
            );
        }
    }
    let branch_kv: Vec<f64> = mpcdc
        .branch
        .iter()
        .map(|br| mpcdc.bus[br.f_bus].base_kv)
        .collect();
    for (br, kv) in mpcdc.branch.iter_mut().zip(branch_kv) {
        let base_r_dc = kv.powi(2) / mpcdc.base_mva_dc;
        let base_r_ac = kv.powi(2) / base_mva;
        br.r *= base_r_dc / base_r_ac;
        br.l *= base_r_dc / base_r_ac;
        br.c = br.c / base_r_dc * base_r_ac;
    }
    Ok(())
}

/// Converts the per unit data back onto the bases of the input files.
pub fn int2ext_pu(base_mva: f64, mpcdc: &mut MPCDC) {
    for c in mpcdc.conv.iter_mut() {
        c.rtf *= mpcdc.base_mva_ac / base_mva;
        c.xtf *= mpcdc.base_mva_ac / base_mva;
        c.bf *= mpcdc.base_mva_ac / base_mva;
        c.rc *= mpcdc.base_mva_ac / base_mva;
        c.xc *= mpcdc.base_mva_ac / base_mva;
        c.imax *= base_mva / mpcdc.base_mva_ac;
    }

    for b in mpcdc.bus.iter_mut() {
        let base_r_dc = b.base_kv.powi(2) / mpcdc.base_mva_dc;
        let base_r_ac = b.base_kv.powi(2) / base_mva;
        b.c = b.c / base_r_ac * base_r_dc;
    }

    let branch_kv: Vec<f64> = mpcdc
        .branch
        .iter()
        .map(|br| mpcdc.bus[br.f_bus].base_kv)
        .collect();
    for (br, kv) in mpcdc.branch.iter_mut().zip(branch_kv) {
        let base_r_dc = kv.powi(2) / mpcdc.base_mva_dc;
        let base_r_ac = kv.powi(2) / base_mva;
        br.r *= base_r_ac / base_r_dc;
        br.l *= base_r_ac / base_r_dc;
        br.c = br.c / base_r_ac * base_r_dc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpcdc::{Converter, DcBranch, DcBus, Polarity, MPCDC};

    fn fixture() -> MPCDC {
        MPCDC {
            base_mva_ac: 120.0,
            base_mva_dc: 90.0,
            pol: Polarity::Bipolar,
            bus: vec![
                DcBus {
                    bus_i: 0,
                    base_kv: 345.0,
                    c: 0.3,
                    ..Default::default()
                },
                DcBus {
                    bus_i: 1,
                    base_kv: 345.0,
                    c: 0.1,
                    ..Default::default()
                },
            ],
            conv: vec![Converter {
                bus_i: 0,
                rtf: 0.0015,
                xtf: 0.1121,
                bf: 0.0887,
                rc: 0.0001,
                xc: 0.16428,
                imax: 1.2,
                ..Default::default()
            }],
            branch: vec![DcBranch {
                f_bus: 0,
                t_bus: 1,
                r: 0.052,
                l: 0.01,
                c: 0.02,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_conversion_factors() -> anyhow::Result<()> {
        let mut mpcdc = fixture();
        ext2int_pu(100.0, &mut mpcdc)?;

        // Converter impedances move onto the smaller system base.
        assert!((mpcdc.conv[0].xtf - 0.1121 * 100.0 / 120.0).abs() < 1e-12);
        assert!((mpcdc.conv[0].imax - 1.2 * 120.0 / 100.0).abs() < 1e-12);
        // Branch resistance scales with baseMVA/baseMVAdc.
        assert!((mpcdc.branch[0].r - 0.052 * 100.0 / 90.0).abs() < 1e-12);
        assert!((mpcdc.bus[0].c - 0.3 * 90.0 / 100.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_round_trip() -> anyhow::Result<()> {
        let mpcdc0 = fixture();
        let mut mpcdc = fixture();
        ext2int_pu(100.0, &mut mpcdc)?;
        int2ext_pu(100.0, &mut mpcdc);

        for (a, b) in mpcdc.conv.iter().zip(&mpcdc0.conv) {
            assert!((a.rtf - b.rtf).abs() < 1e-12);
            assert!((a.xtf - b.xtf).abs() < 1e-12);
            assert!((a.bf - b.bf).abs() < 1e-12);
            assert!((a.imax - b.imax).abs() < 1e-12);
        }
        assert!((mpcdc.branch[0].r - mpcdc0.branch[0].r).abs() < 1e-12);
        assert!((mpcdc.branch[0].c - mpcdc0.branch[0].c).abs() < 1e-12);
        assert!((mpcdc.bus[0].c - mpcdc0.bus[0].c).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_mismatched_branch_base_kv_is_fatal() {
        let mut mpcdc = fixture();
        mpcdc.bus[1].base_kv = 320.0;
        assert!(ext2int_pu(100.0, &mut mpcdc).is_err());
    }
}
