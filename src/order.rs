use std::collections::HashMap;

/// Row indices of in-service and out-of-service records.
#[derive(Debug, Clone, Default)]
pub struct Status {
    pub on: Vec<usize>,
    pub off: Vec<usize>,
}

/// DC bus renumbering record.
///
/// Internal DC bus numbers are consecutive row indices, grouping buses
/// with an AC grid connection ahead of those without, per DC grid.
#[derive(Debug, Clone)]
pub struct DcOrder {
    /// Row permutation: `pmt[k]` is the pre-permutation row of internal
    /// bus `k`.
    pub pmt: Vec<usize>,

    /// External bus number of internal bus `k`.
    pub i2e: Vec<usize>,

    /// External bus number to internal bus number.
    pub e2i: HashMap<usize, usize>,
}

/// AC bus renumbering record.
///
/// Internal AC bus number `k < ndc` is the AC terminal of DC bus row `k`.
/// DC buses without an AC connection borrow a spare AC bus as a dummy.
#[derive(Debug, Clone)]
pub struct AcOrder {
    /// External bus number of internal bus `k`.
    pub i2e: Vec<usize>,

    /// External bus number to internal bus number.
    pub e2i: HashMap<usize, usize>,

    /// DC bus rows that were assigned a dummy AC bus.
    pub dummy: Vec<usize>,
}
