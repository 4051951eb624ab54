use anyhow::{format_err, Result};

use crate::math::undo_permutation;
use crate::mpc::MPC;
use crate::mpcdc::MPCDC;
use crate::order::{AcOrder, DcOrder};

/// Restores external AC bus numbers and removes dummy AC terminals.
pub fn int2ext_ac(order: &AcOrder, mpcdc: &mut MPCDC, mpc: &mut MPC) -> Result<()> {
    let ext = |i: usize| {
        order
            .i2e
            .get(i)
            .copied()
            .ok_or_else(|| format_err!("internal ac bus {} out of range", i))
    };

    for b in mpc.bus.iter_mut() {
        b.bus_i = ext(b.bus_i)?;
    }
    for g in mpc.gen.iter_mut() {
        g.gen_bus = ext(g.gen_bus)?;
    }
    for br in mpc.branch.iter_mut() {
        br.f_bus = ext(br.f_bus)?;
        br.t_bus = ext(br.t_bus)?;
    }
    for b in mpcdc.bus.iter_mut() {
        b.ac_bus = match b.ac_bus {
            Some(i) => Some(ext(i)?),
            None => None,
        };
    }
    for &row in &order.dummy {
        mpcdc.bus[row].ac_bus = None;
    }
    Ok(())
}

/// Restores external DC bus numbers and the original bus row order.
pub fn int2ext_dc(order: &DcOrder, mpcdc: &mut MPCDC) -> Result<()> {
    let ext = |i: usize| {
        order
            .i2e
            .get(i)
            .copied()
            .ok_or_else(|| format_err!("internal dc bus {} out of range", i))
    };

    for b in mpcdc.bus.iter_mut() {
        b.bus_i = ext(b.bus_i)?;
    }
    for c in mpcdc.conv.iter_mut() {
        c.bus_i = ext(c.bus_i)?;
    }
    for br in mpcdc.branch.iter_mut() {
        br.f_bus = ext(br.f_bus)?;
        br.t_bus = ext(br.t_bus)?;
    }
    mpcdc.bus = undo_permutation(&mpcdc.bus, &order.pmt);
    Ok(())
}
