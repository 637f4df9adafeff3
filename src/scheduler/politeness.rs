//! Inter-request delay and aggregate rate cap (spec.md §4.3 "Politeness").
//! No teacher analogue; modeled directly off the spec's numbers with
//! `tokio::time`, the async runtime already used throughout the scheduler.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks, per host, the time of the last completed HTML page download, plus
/// a project-wide token count for the aggregate rate cap.
pub struct PolitenessGate {
    per_host_delay: Duration,
    max_rate_per_sec: f64,
    last_completion_by_host: HashMap<String, Instant>,
    recent_completions: Vec<Instant>,
}

impl PolitenessGate {
    pub fn new(per_host_delay: Duration, max_rate_per_sec: f64) -> Self {
        PolitenessGate {
            per_host_delay,
            max_rate_per_sec,
            last_completion_by_host: HashMap::new(),
            recent_completions: Vec::new(),
        }
    }

    /// How long the caller must wait before starting the next HTML page
    /// download for `host`. Embedded non-HTML fetches never call this
    /// (spec.md §4.3: "do not consume a delay slot").
    pub fn wait_before_next(&mut self, host: &str, now: Instant) -> Duration {
        let host_wait = self
            .last_completion_by_host
            .get(host)
            .map(|last| (*last + self.per_host_delay).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        self.recent_completions
            .retain(|t| now.saturating_duration_since(*t) < Duration::from_secs(1));
        let rate_wait = if self.max_rate_per_sec > 0.0
            && self.recent_completions.len() as f64 >= self.max_rate_per_sec
        {
            let oldest = self.recent_completions[0];
            (oldest + Duration::from_secs(1)).saturating_duration_since(now)
        } else {
            Duration::ZERO
        };

        host_wait.max(rate_wait)
    }

    /// Records a completed HTML page download so later calls see its
    /// timestamp.
    pub fn record_completion(&mut self, host: &str, now: Instant) {
        self.last_completion_by_host.insert(host.to_string(), now);
        self.recent_completions.push(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_to_a_host_never_waits() {
        let mut gate = PolitenessGate::new(Duration::from_secs(1), 2.0);
        let now = Instant::now();
        assert_eq!(gate.wait_before_next("example.com", now), Duration::ZERO);
    }

    #[test]
    fn second_request_to_same_host_waits_out_the_delay() {
        let mut gate = PolitenessGate::new(Duration::from_secs(1), 10.0);
        let t0 = Instant::now();
        gate.record_completion("example.com", t0);
        let wait = gate.wait_before_next("example.com", t0);
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(1));
    }

    #[test]
    fn different_hosts_do_not_share_a_delay_slot() {
        let mut gate = PolitenessGate::new(Duration::from_secs(1), 10.0);
        let t0 = Instant::now();
        gate.record_completion("a.example.com", t0);
        assert_eq!(gate.wait_before_next("b.example.com", t0), Duration::ZERO);
    }
}
