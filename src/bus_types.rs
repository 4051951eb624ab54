use std::collections::HashSet;

use crate::mpc::{Bus, BusType, Gen};

/// Builds index lists for each type of bus (REF, PV, PQ).
///
/// Generators with "out-of-service" status are treated as PQ buses with
/// zero generation (regardless of Pg/Qg values in gen). Isolated and
/// infinite buses appear in none of the lists. Expects `bus` and `gen`
/// to use internal consecutive bus numbering.
pub fn bus_types(bus: &[Bus], gen: &[Gen]) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    // Buses with generators that are ON.
    let bus_gen_status = gen
        .iter()
        .filter(|g| g.is_on())
        .map(|g| g.gen_bus)
        .collect::<HashSet<usize>>();

    let refbus = bus
        .iter()
        .enumerate()
        .filter(|(i, b)| b.is_ref() && bus_gen_status.contains(i))
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();
    let pv = bus
        .iter()
        .enumerate()
        .filter(|(i, b)| b.is_pv() && bus_gen_status.contains(i))
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();
    let pq = bus
        .iter()
        .enumerate()
        .filter(|(i, b)| {
            b.is_pq() || (!bus_gen_status.contains(i) && !matches!(b.bus_type, BusType::NONE | BusType::INF))
        })
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();

    (refbus, pv, pq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::{Bus, BusType, Gen};

    #[test]
    fn test_demotes_pv_without_gen() {
        let bus = vec![
            Bus {
                bus_i: 0,
                bus_type: BusType::REF,
                ..Default::default()
            },
            Bus {
                bus_i: 1,
                bus_type: BusType::PV,
                ..Default::default()
            },
            Bus {
                bus_i: 2,
                bus_type: BusType::PQ,
                ..Default::default()
            },
        ];
        let gen = vec![
            Gen {
                gen_bus: 0,
                ..Default::default()
            },
            Gen {
                gen_bus: 1,
                status: false,
                ..Default::default()
            },
        ];

        let (refbus, pv, pq) = bus_types(&bus, &gen);
        assert_eq!(refbus, vec![0]);
        assert!(pv.is_empty());
        assert_eq!(pq, vec![1, 2]);
    }

    #[test]
    fn test_inf_bus_excluded() {
        let bus = vec![
            Bus {
                bus_i: 0,
                bus_type: BusType::REF,
                ..Default::default()
            },
            Bus {
                bus_i: 1,
                bus_type: BusType::INF,
                ..Default::default()
            },
        ];
        let gen = vec![Gen {
            gen_bus: 0,
            ..Default::default()
        }];

        let (refbus, pv, pq) = bus_types(&bus, &gen);
        assert_eq!(refbus, vec![0]);
        assert!(pv.is_empty());
        assert!(pq.is_empty());
    }
}
