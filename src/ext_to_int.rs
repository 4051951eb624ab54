use anyhow::{bail, format_err, Result};
use std::collections::{HashMap, HashSet};

use crate::mpc::MPC;
use crate::mpcdc::MPCDC;
use crate::order::{AcOrder, DcOrder};

/// Converts external DC bus numbers (possibly non-consecutive) to
/// consecutive internal numbers starting at 0.
///
/// Buses are grouped per DC grid, with AC connected buses ahead of buses
/// without a converter. Converter and branch bus references are updated
/// to the internal numbering.
pub fn ext2int_dc(mpcdc: &mut MPCDC) -> Result<DcOrder> {
    let busdc = &mut mpcdc.bus;

    // Grid numbers must form 1..n without gaps.
    let mut grids: Vec<usize> = busdc.iter().map(|b| b.grid).collect();
    grids.sort_unstable();
    grids.dedup();
    if grids.iter().enumerate().any(|(i, &g)| g != i + 1) {
        bail!("non-successive dc grid numbering detected");
    }

    let mut pmt: Vec<usize> = (0..busdc.len()).collect();
    pmt.sort_by_key(|&i| (busdc[i].grid, busdc[i].ac_bus.is_none()));

    let reordered: Vec<_> = pmt.iter().map(|&i| busdc[i].clone()).collect();
    *busdc = reordered;

    let i2e: Vec<usize> = busdc.iter().map(|b| b.bus_i).collect();
    let e2i: HashMap<usize, usize> = i2e.iter().enumerate().map(|(k, &e)| (e, k)).collect();
    if e2i.len() != i2e.len() {
        bail!("duplicate dc bus numbers detected");
    }

    for (k, b) in busdc.iter_mut().enumerate() {
        b.bus_i = k;
    }
    for c in mpcdc.conv.iter_mut() {
        c.bus_i = *e2i
            .get(&c.bus_i)
            .ok_or_else(|| format_err!("converter references unknown dc bus {}", c.bus_i))?;
    }
    for br in mpcdc.branch.iter_mut() {
        br.f_bus = *e2i
            .get(&br.f_bus)
            .ok_or_else(|| format_err!("dc branch references unknown dc bus {}", br.f_bus))?;
        br.t_bus = *e2i
            .get(&br.t_bus)
            .ok_or_else(|| format_err!("dc branch references unknown dc bus {}", br.t_bus))?;
    }

    Ok(DcOrder { pmt, i2e, e2i })
}

/// Converts external AC bus numbers to consecutive internal numbers.
///
/// Internal AC bus `k < ndc` is the AC terminal of DC bus row `k`. DC
/// buses without an AC connection (converter outages or buses without a
/// converter) borrow a spare AC bus as a dummy. All remaining AC buses
/// follow. Expects the DC side to be in internal numbering already.
pub fn ext2int_ac(mpcdc: &mut MPCDC, mpc: &mut MPC) -> Result<AcOrder> {
    let ndc = mpcdc.bus.len();
    let nb = mpc.bus.len();

    let conv_rows: Vec<(usize, usize)> = mpcdc
        .bus
        .iter()
        .enumerate()
        .filter_map(|(row, b)| b.ac_bus.map(|ac| (row, ac)))
        .collect();
    let dummy: Vec<usize> = mpcdc
        .bus
        .iter()
        .enumerate()
        .filter(|(_, b)| b.ac_bus.is_none())
        .map(|(row, _)| row)
        .collect();

    let conv_ac: HashSet<usize> = conv_rows.iter().map(|&(_, ac)| ac).collect();
    if conv_ac.len() != conv_rows.len() {
        bail!("more than one converter per ac bus detected");
    }
    let ac_all: HashSet<usize> = mpc.bus.iter().map(|b| b.bus_i).collect();
    for &(_, ac) in &conv_rows {
        if !ac_all.contains(&ac) {
            bail!("dc bus references unknown ac bus {}", ac);
        }
    }

    // Spare AC buses without a converter, in bus table order.
    let spares: Vec<usize> = mpc
        .bus
        .iter()
        .map(|b| b.bus_i)
        .filter(|i| !conv_ac.contains(i))
        .collect();
    if spares.len() < dummy.len() {
        bail!(
            "{} dummy ac buses required but only {} spare ac buses available",
            dummy.len(),
            spares.len()
        );
    }

    let mut i2e = vec![0; nb];
    for &(row, ac) in &conv_rows {
        i2e[row] = ac;
    }
    for (j, &row) in dummy.iter().enumerate() {
        i2e[row] = spares[j];
    }
    for (k, &ac) in spares[dummy.len()..].iter().enumerate() {
        i2e[ndc + k] = ac;
    }
    let e2i: HashMap<usize, usize> = i2e.iter().enumerate().map(|(k, &e)| (e, k)).collect();

    for (row, b) in mpcdc.bus.iter_mut().enumerate() {
        b.ac_bus = Some(row);
    }
    for b in mpc.bus.iter_mut() {
        b.bus_i = e2i[&b.bus_i];
    }
    for g in mpc.gen.iter_mut() {
        g.gen_bus = *e2i
            .get(&g.gen_bus)
            .ok_or_else(|| format_err!("generator references unknown ac bus {}", g.gen_bus))?;
    }
    for br in mpc.branch.iter_mut() {
        br.f_bus = *e2i
            .get(&br.f_bus)
            .ok_or_else(|| format_err!("ac branch references unknown ac bus {}", br.f_bus))?;
        br.t_bus = *e2i
            .get(&br.t_bus)
            .ok_or_else(|| format_err!("ac branch references unknown ac bus {}", br.t_bus))?;
    }

    Ok(AcOrder { i2e, e2i, dummy })
}
