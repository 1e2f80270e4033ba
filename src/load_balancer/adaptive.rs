//! Adaptive selection strategy.
//!
//! Each candidate is weighted by `health * latency score`, where health is
//! the number of healthy outcomes in its downtime window and the latency
//! score rewards a low mean response time relative to the observed spread.
//! Servers are then sampled without replacement, producing an ordered list of
//! servers to try for one request.

use std::sync::Arc;

use rand::Rng;

use crate::load_balancer::server::Server;

/// Health floor, as a share of the downtime window, so bad luck never
/// drives a server's selection probability to zero.
pub const LOWEST_HEALTH_PERCENT: usize = 2;

/// Latency score given to every candidate while any of them is warming up.
pub const DEFAULT_TIME_SCORE: u64 = 1;

/// Produce `retries_count` positions into `servers`, using the thread-local RNG.
pub fn select_servers(servers: &[Arc<Server>], retries_count: usize) -> Vec<usize> {
    select_servers_with_rng(servers, retries_count, &mut rand::thread_rng())
}

/// Produce `retries_count` positions into `servers`.
///
/// The first `min(len, retries_count)` positions are distinct. Any further
/// positions repeat the sampled order cyclically.
pub fn select_servers_with_rng<R: Rng + ?Sized>(
    servers: &[Arc<Server>],
    retries_count: usize,
    rng: &mut R,
) -> Vec<usize> {
    let count = servers.len();
    if count == 0 || retries_count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0; retries_count];
    }

    let means: Vec<Option<u64>> = servers
        .iter()
        .map(|server| {
            let tracker = server.response_time_tracker();
            (!tracker.is_warm_up()).then(|| tracker.mean())
        })
        .collect();
    let any_warming_up = means.iter().any(Option::is_none);
    let min_mean = means.iter().flatten().copied().min().unwrap_or(0);
    let max_mean = means.iter().flatten().copied().max().unwrap_or(0);

    let mut ids: Vec<usize> = (0..count).collect();
    let mut weights: Vec<u64> = servers
        .iter()
        .zip(&means)
        .map(|(server, mean)| {
            let score = match mean {
                Some(mean) if !any_warming_up => inverted_time_score(min_mean, max_mean, *mean),
                _ => DEFAULT_TIME_SCORE,
            };
            health(server) * score
        })
        .collect();
    let mut total: u64 = weights.iter().sum();

    let picks = count.min(retries_count);
    let mut result = Vec::with_capacity(retries_count);

    for pick in 0..picks {
        let remaining = count - pick;
        let ticket = rng.gen_range(0..total);

        let mut position = remaining - 1;
        let mut cumulative = 0;
        for (i, weight) in weights[..remaining].iter().enumerate() {
            cumulative += weight;
            if ticket < cumulative {
                position = i;
                break;
            }
        }

        result.push(ids[position]);
        total -= weights[position];
        weights.swap(position, remaining - 1);
        ids.swap(position, remaining - 1);
    }

    // TODO: padding repeats the first pass verbatim; measure whether re-weighting helps
    for i in picks..retries_count {
        result.push(result[i % count]);
    }

    result
}

fn health(server: &Server) -> u64 {
    let detector = server.downtime_detector();
    let lowest = (detector.window() * LOWEST_HEALTH_PERCENT / 100).max(1);
    detector.success_count().max(lowest) as u64
}

/// `round(min * max / mean)`, never below 1.
fn inverted_time_score(min_mean: u64, max_mean: u64, mean: u64) -> u64 {
    let score = (min_mean as f64 * max_mean as f64 / mean.max(1) as f64).round() as u64;
    score.max(1)
}
