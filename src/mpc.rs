use num_complex::Complex64;

/// MPC models the AC side of the power system as a directed graph
/// structure.
#[derive(Clone)]
pub struct MPC {
    /// System MVA base used for converting power into per-unit quantities.
    /// Default value is 100.
    pub base_mva: f64,

    /// Power system nodes, including static loads and shunts.
    pub bus: Vec<Bus>,

    /// Generators and dispatchable loads.
    pub gen: Vec<Gen>,

    /// Transmission lines/cables and transformers.
    pub branch: Vec<Branch>,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum BusType {
    /// Fixed active and reactive power.
    PQ = 0,
    /// Fixed voltage magnitude and active power.
    PV = 1,
    /// Reference voltage angle. Slack active and reactive power.
    REF = 2,
    /// Isolated bus.
    NONE = 3,
    /// Ideal bus with fixed voltage magnitude and angle, forming a
    /// single-bus zone that is never solved.
    INF = 4,
}

/// Bus is a node in the power system graph structure.
/// Static loads and shunts are included in the Bus definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    /// Bus number.
    pub bus_i: usize,

    pub bus_type: BusType,

    /// Real power demand (MW).
    pub pd: f64,

    /// Reactive power demand (MVAr).
    pub qd: f64,

    /// Shunt conductance (MW at V = 1.0 p.u.).
    pub gs: f64,

    /// Shunt susceptance (MVAr at V = 1.0 p.u.).
    pub bs: f64,

    /// Area number.
    pub area: usize,

    /// Voltage magnitude (p.u.).
    pub vm: f64,

    /// Voltage angle (degrees).
    pub va: f64,

    /// Base voltage (kV).
    pub base_kv: f64,

    /// Non-synchronized AC zone.
    pub zone: usize,

    /// Maximum voltage magnitude (p.u.).
    pub vmax: f64,

    /// Minimum voltage magnitude (p.u.).
    pub vmin: f64,
}

impl Bus {
    pub fn is_pq(&self) -> bool {
        self.bus_type == BusType::PQ
    }
    pub fn is_pv(&self) -> bool {
        self.bus_type == BusType::PV
    }
    pub fn is_ref(&self) -> bool {
        self.bus_type == BusType::REF
    }
    pub fn is_inf(&self) -> bool {
        self.bus_type == BusType::INF
    }

    pub(crate) fn y_sh(&self, base_mva: f64) -> Complex64 {
        Complex64::new(self.gs, self.bs) / Complex64::new(base_mva, 0.0)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            bus_i: 0,
            bus_type: BusType::PQ,
            pd: 0.0,
            qd: 0.0,
            gs: 0.0,
            bs: 0.0,
            area: 1,
            vm: 1.0,
            va: 0.0,
            base_kv: 0.0,
            zone: 1,
            vmax: 1.1,
            vmin: 0.9,
        }
    }
}

/// Gen is a generator or dispatchable load.
#[derive(Debug, Clone, PartialEq)]
pub struct Gen {
    /// Bus number.
    pub gen_bus: usize,

    /// Real power output (MW).
    pub pg: f64,

    /// Reactive power output (MVAr).
    pub qg: f64,

    /// Maximum reactive power output (MVAr).
    pub qmax: f64,

    /// Minimum reactive power output (MVAr).
    pub qmin: f64,

    /// Voltage magnitude setpoint (p.u.).
    pub vg: f64,

    /// Total MVA base of this machine, defaults to base_mva.
    pub mbase: f64,

    pub status: bool,

    /// Maximum real power output (MW).
    pub pmax: f64,

    /// Minimum real power output (MW).
    pub pmin: f64,
}

impl Gen {
    pub fn is_on(&self) -> bool {
        self.status
    }
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            gen_bus: 0,
            pg: 0.0,
            qg: 0.0,
            qmax: 0.0,
            qmin: 0.0,
            vg: 1.0,
            mbase: 100.0,
            status: true,
            pmax: 0.0,
            pmin: 0.0,
        }
    }
}

/// Branch represents either a transmission line/cable or a two winding
/// transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// From bus number.
    pub f_bus: usize,

    /// To bus number.
    pub t_bus: usize,

    /// Resistance (p.u.).
    pub r: f64,

    /// Reactance (p.u.).
    pub x: f64,

    /// Total line charging susceptance (p.u.).
    pub b: f64,

    /// MVA rating A (long term rating).
    pub rate_a: f64,

    /// MVA rating B (short term rating).
    pub rate_b: f64,

    /// MVA rating C (emergency rating).
    pub rate_c: f64,

    /// Transformer off nominal tap ratio.
    pub tap: f64,

    /// Transformer phase shift angle (degrees).
    pub shift: f64,

    pub status: bool,

    /// Real power injected at "from" bus end (MW).
    pub pf: f64,

    /// Reactive power injected at "from" bus end (MVAr).
    pub qf: f64,

    /// Real power injected at "to" bus end (MW).
    pub pt: f64,

    /// Reactive power injected at "to" bus end (MVAr).
    pub qt: f64,
}

impl Branch {
    pub fn is_on(&self) -> bool {
        self.status
    }
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            f_bus: 0,
            t_bus: 0,
            r: 0.0,
            x: 0.0,
            b: 0.0,
            rate_a: 0.0,
            rate_b: 0.0,
            rate_c: 0.0,
            tap: 0.0,
            shift: 0.0,
            status: true,
            pf: 0.0,
            qf: 0.0,
            pt: 0.0,
            qt: 0.0,
        }
    }
}
