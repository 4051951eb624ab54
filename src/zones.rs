use std::collections::HashSet;

use anyhow::{bail, Result};
use itertools::Itertools;

use crate::mpc::{Branch, Bus, Gen};

/// Returns the sorted list of AC zone numbers present in the bus table.
pub fn ac_zones(bus: &[Bus]) -> Vec<usize> {
    bus.iter().map(|b| b.zone).sorted().dedup().collect()
}

/// Checks the non-synchronized AC zone configuration.
///
/// Every zone must hold exactly one AC slack bus backed by a generator,
/// or consist of a single infinite bus. Branches between zones and
/// branches to infinite buses are rejected. `i2e` maps internal bus
/// numbers to the numbering of the input files for reporting.
pub fn zone_check(bus: &[Bus], gen: &[Gen], branch: &[Branch], i2e: &[usize]) -> Result<()> {
    let zones = ac_zones(bus);
    if zones.len() > 1 {
        log::info!("non-synchronised zones: {} ac zones detected", zones.len());
    }

    // Interzonal connections.
    let mut interzone = false;
    for br in branch {
        if bus[br.f_bus].zone != bus[br.t_bus].zone {
            log::error!(
                "remove branch between buses {} and {}",
                i2e[br.f_bus],
                i2e[br.t_bus]
            );
            interzone = true;
        }
    }
    if interzone {
        bail!("connection between different ac zones detected");
    }

    // Connections to infinite buses.
    for br in branch {
        if bus[br.f_bus].is_inf() || bus[br.t_bus].is_inf() {
            bail!(
                "connection with an infinite bus on branch ({}, {})",
                i2e[br.f_bus],
                i2e[br.t_bus]
            );
        }
    }

    let gen_buses: HashSet<usize> = gen.iter().map(|g| g.gen_bus).collect();

    for &z in &zones {
        let in_zone: Vec<&Bus> = bus.iter().filter(|b| b.zone == z).collect();
        let refs: Vec<&&Bus> = in_zone.iter().filter(|b| b.is_ref()).collect();
        let ninf = in_zone.iter().filter(|b| b.is_inf()).count();

        if ninf > 0 && in_zone.len() > ninf {
            bail!("infinite buses and regular buses detected in zone {}", z);
        }
        if ninf > 1 {
            bail!("multiple infinite buses detected in ac zone {}", z);
        }
        if ninf > 0 {
            continue; // infinite bus zone needs no slack
        }

        if refs.is_empty() {
            bail!("no ac slack bus detected in ac zone {}", z);
        }
        if refs.len() > 1 {
            bail!("multiple ac slack buses detected in ac zone {}", z);
        }
        let r = refs[0];
        if !gen_buses.contains(&r.bus_i) {
            bail!("ac slack bus without generator at bus {}", i2e[r.bus_i]);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::BusType;

    fn bus(i: usize, bus_type: BusType, zone: usize) -> Bus {
        Bus {
            bus_i: i,
            bus_type,
            zone,
            ..Default::default()
        }
    }

    fn gen_at(i: usize) -> Gen {
        Gen {
            gen_bus: i,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_two_zone_system() {
        let bus = vec![
            bus(0, BusType::REF, 1),
            bus(1, BusType::PQ, 1),
            bus(2, BusType::INF, 2),
        ];
        let gen = vec![gen_at(0)];
        let branch = vec![Branch {
            f_bus: 0,
            t_bus: 1,
            ..Default::default()
        }];
        assert!(zone_check(&bus, &gen, &branch, &[1, 2, 3]).is_ok());
    }

    #[test]
    fn test_interzone_branch_is_fatal() {
        let bus = vec![bus(0, BusType::REF, 1), bus(1, BusType::REF, 2)];
        let gen = vec![gen_at(0), gen_at(1)];
        let branch = vec![Branch {
            f_bus: 0,
            t_bus: 1,
            ..Default::default()
        }];
        assert!(zone_check(&bus, &gen, &branch, &[1, 2]).is_err());
    }

    #[test]
    fn test_zone_without_slack_is_fatal() {
        let bus = vec![bus(0, BusType::REF, 1), bus(1, BusType::PQ, 2)];
        let gen = vec![gen_at(0)];
        assert!(zone_check(&bus, &gen, &[], &[1, 2]).is_err());
    }

    #[test]
    fn test_slack_without_generator_is_fatal() {
        let bus = vec![bus(0, BusType::REF, 1)];
        assert!(zone_check(&bus, &[], &[], &[1]).is_err());
    }

    #[test]
    fn test_mixed_infinite_zone_is_fatal() {
        let bus = vec![bus(0, BusType::INF, 1), bus(1, BusType::PQ, 1)];
        assert!(zone_check(&bus, &[], &[], &[1, 2]).is_err());
    }
}
