//! Small reference systems for hybrid AC/DC power flow studies.

use crate::mpc::{Bus, BusType, MPC};
use crate::mpcdc::{AcControl, Converter, DcBranch, DcBus, DcControl, Polarity, MPCDC};

fn inf_bus(bus_i: usize, zone: usize, vm: f64) -> Bus {
    Bus {
        bus_i,
        bus_type: BusType::INF,
        vm,
        base_kv: 345.0,
        zone,
        ..Default::default()
    }
}

fn vsc(bus_i: usize, dc_control: DcControl, ac_control: AcControl, p: f64, q: f64) -> Converter {
    Converter {
        bus_i,
        dc_control,
        ac_control,
        p,
        q,
        rtf: 0.0015,
        xtf: 0.1121,
        bf: 0.0887,
        rc: 0.0001,
        xc: 0.16428,
        base_kv: 345.0,
        vmax: 1.1,
        vmin: 0.9,
        imax: 1.1,
        loss_a: 1.103,
        loss_b: 0.887,
        loss_cr: 2.885,
        loss_ci: 4.371,
        ..Default::default()
    }
}

fn dc_bus(bus_i: usize, ac_bus: usize) -> DcBus {
    DcBus {
        bus_i,
        ac_bus: Some(ac_bus),
        base_kv: 345.0,
        ..Default::default()
    }
}

/// Three non-synchronized AC zones, each reduced to a single infinite
/// bus. Used as AC terminals for the DC test grids.
pub fn case3_inf() -> MPC {
    MPC {
        base_mva: 100.0,
        bus: vec![
            inf_bus(2, 1, 1.06),
            inf_bus(3, 2, 1.0),
            inf_bus(5, 3, 1.0),
        ],
        gen: vec![],
        branch: vec![],
    }
}

/// Point-to-point VSC HVDC link between the first two zones of
/// [case3_inf]. The sending converter transfers a fixed 60 MW, the
/// receiving converter holds the DC voltage.
pub fn case_hvdc_ptp() -> MPCDC {
    MPCDC {
        base_mva_ac: 100.0,
        base_mva_dc: 100.0,
        pol: Polarity::Bipolar,
        bus: vec![dc_bus(1, 2), dc_bus(2, 3)],
        conv: vec![
            Converter {
                imax: 1.2,
                ..vsc(1, DcControl::NoSlack, AcControl::PQ, -60.0, -40.0)
            },
            Converter {
                imax: 1.2,
                ..vsc(2, DcControl::Slack, AcControl::PQ, 0.0, -5.0)
            },
        ],
        branch: vec![DcBranch {
            f_bus: 1,
            t_bus: 2,
            r: 0.052,
            ..Default::default()
        }],
    }
}

/// Three terminal DC grid spanning the zones of [case3_inf], with all
/// converters under DC voltage droop control.
pub fn case_mtdc_droop() -> MPCDC {
    let droops = [
        (0.005, -58.6274, 1.0079),
        (0.007, 21.9013, 1.0000),
        (0.005, 36.1856, 0.9978),
    ];
    let mut conv = vec![
        vsc(1, DcControl::Droop, AcControl::PV, -60.0, -40.0),
        vsc(2, DcControl::Droop, AcControl::PQ, 0.0, 0.0),
        vsc(3, DcControl::Droop, AcControl::PV, 35.0, 5.0),
    ];
    for (c, &(droop, p_dc_set, v_dc_set)) in conv.iter_mut().zip(&droops) {
        c.droop = droop;
        c.p_dc_set = p_dc_set;
        c.v_dc_set = v_dc_set;
    }

    MPCDC {
        base_mva_ac: 100.0,
        base_mva_dc: 100.0,
        pol: Polarity::Bipolar,
        bus: vec![dc_bus(1, 2), dc_bus(2, 3), dc_bus(3, 5)],
        conv,
        branch: vec![
            DcBranch {
                f_bus: 1,
                t_bus: 2,
                r: 0.052,
                ..Default::default()
            },
            DcBranch {
                f_bus: 2,
                t_bus: 3,
                r: 0.052,
                ..Default::default()
            },
            DcBranch {
                f_bus: 1,
                t_bus: 3,
                r: 0.073,
                ..Default::default()
            },
        ],
    }
}
