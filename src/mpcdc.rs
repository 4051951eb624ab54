use num_complex::Complex64;

use crate::cmplx;

/// MPCDC models the DC side of the system: DC buses, VSC converter
/// stations and DC branches, possibly spanning several separate DC grids.
#[derive(Clone)]
pub struct MPCDC {
    /// MVA base of the converter AC side data.
    pub base_mva_ac: f64,

    /// MVA base of the DC network data.
    pub base_mva_dc: f64,

    /// DC grid topology.
    pub pol: Polarity,

    pub bus: Vec<DcBus>,

    pub conv: Vec<Converter>,

    pub branch: Vec<DcBranch>,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Polarity {
    /// Asymmetric monopolar grid.
    Monopolar,
    /// Symmetric monopolar or bipolar grid.
    Bipolar,
}

impl Polarity {
    /// Number of poles, used as a multiplier in DC power expressions.
    pub fn factor(&self) -> f64 {
        match self {
            Polarity::Monopolar => 1.0,
            Polarity::Bipolar => 2.0,
        }
    }
}

/// DC side converter control.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum DcControl {
    /// Constant DC voltage.
    Slack,
    /// Distributed DC voltage control.
    Droop,
    /// Constant active power.
    NoSlack,
}

/// AC side converter control.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum AcControl {
    /// AC voltage magnitude control.
    PV,
    /// Constant P and Q injection.
    PQ,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcBus {
    /// DC bus number.
    pub bus_i: usize,

    /// Connected AC bus number, if any.
    pub ac_bus: Option<usize>,

    /// DC grid number, 1..n without gaps.
    pub grid: usize,

    /// DC power extraction (MW).
    pub pdc: f64,

    /// DC voltage magnitude (p.u.).
    pub vm: f64,

    /// Base voltage (kV).
    pub base_kv: f64,

    /// Maximum DC voltage magnitude (p.u.).
    pub vmax: f64,

    /// Minimum DC voltage magnitude (p.u.).
    pub vmin: f64,

    /// DC bus capacitance (p.u.).
    pub c: f64,
}

impl Default for DcBus {
    fn default() -> Self {
        Self {
            bus_i: 0,
            ac_bus: None,
            grid: 1,
            pdc: 0.0,
            vm: 1.0,
            base_kv: 0.0,
            vmax: 1.1,
            vmin: 0.9,
            c: 0.0,
        }
    }
}

/// VSC converter station: transformer, filter and phase reactor between
/// the AC grid bus and the converter, plus the current dependent loss
/// model and the DC side control data.
#[derive(Debug, Clone, PartialEq)]
pub struct Converter {
    /// DC bus number.
    pub bus_i: usize,

    pub dc_control: DcControl,

    pub ac_control: AcControl,

    /// Active power injected into the AC grid (MW).
    pub p: f64,

    /// Reactive power injected into the AC grid (MVAr).
    pub q: f64,

    /// AC voltage magnitude target (p.u.).
    pub v_target: f64,

    /// Transformer resistance (p.u.).
    pub rtf: f64,

    /// Transformer reactance (p.u.).
    pub xtf: f64,

    /// Filter susceptance (p.u.).
    pub bf: f64,

    /// Phase reactor resistance (p.u.).
    pub rc: f64,

    /// Phase reactor reactance (p.u.).
    pub xc: f64,

    /// Converter AC base voltage (kV).
    pub base_kv: f64,

    /// Maximum converter voltage magnitude (p.u.).
    pub vmax: f64,

    /// Minimum converter voltage magnitude (p.u.).
    pub vmin: f64,

    /// Maximum converter current (p.u.).
    pub imax: f64,

    pub status: bool,

    /// Constant loss coefficient (MW).
    pub loss_a: f64,

    /// Linear loss coefficient (kV).
    pub loss_b: f64,

    /// Quadratic loss coefficient, rectifier operation (Ohm).
    pub loss_cr: f64,

    /// Quadratic loss coefficient, inverter operation (Ohm).
    pub loss_ci: f64,

    /// Voltage droop gain (p.u.).
    pub droop: f64,

    /// Voltage droop power set-point (MW).
    pub p_dc_set: f64,

    /// Voltage droop voltage set-point (p.u.).
    pub v_dc_set: f64,

    /// Voltage droop deadband (p.u.).
    pub dv_dc_set: f64,

    /// Solved converter voltage magnitude (p.u.).
    pub vmc: f64,

    /// Solved converter voltage angle (degrees).
    pub vac: f64,

    /// Solved converter side active power (MW).
    pub pc: f64,

    /// Solved converter side reactive power (MVAr).
    pub qc: f64,

    /// Solved converter losses (MW).
    pub p_loss: f64,

    /// Solved filter voltage magnitude (p.u.).
    pub vmf: f64,

    /// Solved filter voltage angle (degrees).
    pub vaf: f64,

    /// Solved grid side power at the filter bus (MW).
    pub pf: f64,

    /// Solved grid side reactive power at the filter bus (MVAr).
    pub qf: f64,

    /// Solved converter side reactive power at the filter bus (MVAr).
    pub qcf: f64,
}

impl Converter {
    pub fn is_on(&self) -> bool {
        self.status
    }

    /// Complex transformer impedance.
    pub fn ztf(&self) -> Complex64 {
        cmplx!(self.rtf, self.xtf)
    }

    /// Complex phase reactor impedance.
    pub fn zc(&self) -> Complex64 {
        cmplx!(self.rc, self.xc)
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self {
            bus_i: 0,
            dc_control: DcControl::NoSlack,
            ac_control: AcControl::PQ,
            p: 0.0,
            q: 0.0,
            v_target: 1.0,
            rtf: 0.0,
            xtf: 0.0,
            bf: 0.0,
            rc: 0.0,
            xc: 0.0,
            base_kv: 0.0,
            vmax: 1.1,
            vmin: 0.9,
            imax: 0.0,
            status: true,
            loss_a: 0.0,
            loss_b: 0.0,
            loss_cr: 0.0,
            loss_ci: 0.0,
            droop: 0.0,
            p_dc_set: 0.0,
            v_dc_set: 1.0,
            dv_dc_set: 0.0,
            vmc: 0.0,
            vac: 0.0,
            pc: 0.0,
            qc: 0.0,
            p_loss: 0.0,
            vmf: 0.0,
            vaf: 0.0,
            pf: 0.0,
            qf: 0.0,
            qcf: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcBranch {
    /// From DC bus number.
    pub f_bus: usize,

    /// To DC bus number.
    pub t_bus: usize,

    /// Resistance (p.u.).
    pub r: f64,

    /// Inductance (p.u./s).
    pub l: f64,

    /// Line charging capacitance (p.u.*s).
    pub c: f64,

    /// MVA rating A (long term rating).
    pub rate_a: f64,

    /// MVA rating B (short term rating).
    pub rate_b: f64,

    /// MVA rating C (emergency rating).
    pub rate_c: f64,

    pub status: bool,

    /// Real power injected at "from" bus end (MW).
    pub pf: f64,

    /// Real power injected at "to" bus end (MW).
    pub pt: f64,
}

impl DcBranch {
    pub fn is_on(&self) -> bool {
        self.status
    }
}

impl Default for DcBranch {
    fn default() -> Self {
        Self {
            f_bus: 0,
            t_bus: 0,
            r: 0.0,
            l: 0.0,
            c: 0.0,
            rate_a: 0.0,
            rate_b: 0.0,
            rate_c: 0.0,
            status: true,
            pf: 0.0,
            pt: 0.0,
        }
    }
}
