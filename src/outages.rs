use crate::mpc::{Branch, Gen};
use crate::mpcdc::{Converter, DcBranch, DcBus};
use crate::order::Status;

/// Splits `rows` into in-service and out-of-service parts, retaining the
/// original row index of every record.
pub(crate) fn partition<T: Clone>(
    rows: &[T],
    is_on: impl Fn(&T) -> bool,
) -> (Vec<T>, Vec<T>, Status) {
    let mut on = Vec::with_capacity(rows.len());
    let mut off = Vec::new();
    let mut status = Status::default();
    for (i, row) in rows.iter().enumerate() {
        if is_on(row) {
            status.on.push(i);
            on.push(row.clone());
        } else {
            status.off.push(i);
            off.push(row.clone());
        }
    }
    (on, off, status)
}

/// Rebuilds the full table in original row order from its two parts.
pub(crate) fn recombine<T: Clone>(on: &[T], off: &[T], status: &Status) -> Vec<T> {
    let n = on.len() + off.len();
    let mut out: Vec<Option<T>> = vec![None; n];
    for (row, &i) in on.iter().zip(&status.on) {
        out[i] = Some(row.clone());
    }
    for (row, &i) in off.iter().zip(&status.off) {
        out[i] = Some(row.clone());
    }
    out.into_iter().flatten().collect()
}

/// Converter outage partition. The outage copies have their power
/// setpoints cleared and the AC terminal of the affected DC bus is
/// removed, remembering it for restoration on output.
pub struct ConvOutages {
    pub on: Vec<Converter>,
    pub off: Vec<Converter>,
    pub status: Status,
    /// `(DC bus row, cleared AC bus number)` for every outage.
    pub cleared_ac: Vec<(usize, usize)>,
}

pub fn split_converters(busdc: &mut [DcBus], conv: &[Converter]) -> ConvOutages {
    let (on, mut off, status) = partition(conv, Converter::is_on);

    let mut cleared_ac = Vec::new();
    for c in off.iter_mut() {
        c.p = 0.0;
        c.q = 0.0;
        if let Some(row) = busdc.iter().position(|b| b.bus_i == c.bus_i) {
            if let Some(ac) = busdc[row].ac_bus.take() {
                cleared_ac.push((row, ac));
            }
        }
    }

    ConvOutages {
        on,
        off,
        status,
        cleared_ac,
    }
}

pub fn split_dc_branches(branch: &[DcBranch]) -> (Vec<DcBranch>, Vec<DcBranch>, Status) {
    partition(branch, DcBranch::is_on)
}

pub fn split_ac_branches(branch: &[Branch]) -> (Vec<Branch>, Vec<Branch>, Status) {
    partition(branch, Branch::is_on)
}

pub fn split_gens(gen: &[Gen]) -> (Vec<Gen>, Vec<Gen>, Status) {
    partition(gen, Gen::is_on)
}
