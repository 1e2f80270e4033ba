//! Least-loaded selection strategy.
//!
//! Candidates are ordered by `(different DC, same rack as a tried server,
//! requests / weight, stats_requests / weight)`; the smallest key wins.
//! In case of a tie the first server in list order is selected (stability).

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::load_balancer::server::Server;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    different_dc: bool,
    same_rack: bool,
    load: f64,
    stats_load: f64,
}

impl Candidate {
    fn compare(&self, other: &Self) -> Ordering {
        self.different_dc
            .cmp(&other.different_dc)
            .then(self.same_rack.cmp(&other.same_rack))
            .then(self.load.total_cmp(&other.load))
            .then(self.stats_load.total_cmp(&other.stats_load))
    }
}

/// True when `server` sits outside `datacenter`. Without a requesting
/// datacenter every server counts as local.
pub fn is_different_dc(server: &Server, datacenter: Option<&str>) -> bool {
    match datacenter {
        Some(dc) => server.datacenter() != Some(dc),
        None => false,
    }
}

/// Pick the least loaded eligible server. Returns its index in `servers`.
pub fn select_server(
    servers: &[Arc<Server>],
    excluded: &HashSet<usize>,
    datacenter: Option<&str>,
    allow_cross_dc: bool,
    now: Instant,
) -> Option<usize> {
    let tried_racks: HashSet<&str> = excluded
        .iter()
        .filter_map(|&index| servers.get(index))
        .filter_map(|server| server.rack())
        .collect();

    servers
        .iter()
        .enumerate()
        .filter(|(index, server)| server.is_active() && !excluded.contains(index))
        .filter_map(|(index, server)| {
            let different_dc = is_different_dc(server, datacenter);
            if different_dc && !allow_cross_dc {
                return None;
            }
            let weight = server.effective_weight(now) as f64;
            Some(Candidate {
                index,
                different_dc,
                same_rack: server.rack().is_some_and(|rack| tried_racks.contains(rack)),
                load: server.requests() as f64 / weight,
                stats_load: server.stats_requests() as f64 / weight,
            })
        })
        .min_by(Candidate::compare)
        .map(|candidate| candidate.index)
}
