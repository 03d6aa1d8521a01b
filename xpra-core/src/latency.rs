//! Round-trip latency history from the ping / ping-echo exchange.
//!
//! Two bounded FIFO histories of `(timestamp, latency)` pairs: the
//! latency this client measured to the server, and the latency the
//! server reports having measured to us.

use std::collections::VecDeque;

/// Samples kept per history.
pub const MAX_SAMPLES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    /// When the sample was recorded (ms since the epoch).
    pub at_ms: i64,
    /// Round-trip time in milliseconds.
    pub latency_ms: i64,
}

#[derive(Debug, Clone)]
pub struct LatencyTracker {
    server: VecDeque<LatencySample>,
    client: VecDeque<LatencySample>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            server: VecDeque::with_capacity(MAX_SAMPLES),
            client: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    /// Record a `ping-echo`.
    ///
    /// `echoed_ms` is our own ping timestamp coming back; `client_ms` is
    /// the server's measurement of us, ignored when negative. Returns the
    /// server round-trip just recorded.
    pub fn record_echo(&mut self, now_ms: i64, echoed_ms: i64, client_ms: Option<i64>) -> i64 {
        let rtt = now_ms.saturating_sub(echoed_ms);
        push_bounded(&mut self.server, LatencySample {
            at_ms: now_ms,
            latency_ms: rtt,
        });
        if let Some(cl) = client_ms.filter(|cl| *cl >= 0) {
            push_bounded(&mut self.client, LatencySample {
                at_ms: now_ms,
                latency_ms: cl,
            });
        }
        rtt
    }

    /// Most recent server round-trip, if any ping has been echoed.
    pub fn last_server_latency(&self) -> Option<i64> {
        self.server.back().map(|s| s.latency_ms)
    }

    pub fn last_client_latency(&self) -> Option<i64> {
        self.client.back().map(|s| s.latency_ms)
    }


    /// Server round-trip history, oldest first.
    pub fn server_samples(&self) -> impl ExactSizeIterator<Item = &LatencySample> {
        self.server.iter()
    }

    /// Client round-trip history, oldest first.
    pub fn client_samples(&self) -> impl ExactSizeIterator<Item = &LatencySample> {
        self.client.iter()
    }

    pub fn clear(&mut self) {
        self.server.clear();
        self.client.clear();
    }
}

fn push_bounded(samples: &mut VecDeque<LatencySample>, sample: LatencySample) {
    samples.push_back(sample);
    while samples.len() > MAX_SAMPLES {
        samples.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_has_no_latency() {
        let t = LatencyTracker::new();
        assert_eq!(t.last_server_latency(), None);
        assert_eq!(t.server_samples().len(), 0);
    }

    #[test]
    fn echo_records_round_trip() {
        let mut t = LatencyTracker::new();
        assert_eq!(t.record_echo(1_050, 1_000, Some(12)), 50);
        assert_eq!(t.last_server_latency(), Some(50));
        assert_eq!(t.last_client_latency(), Some(12));
    }

    #[test]
    fn negative_client_latency_ignored() {
        let mut t = LatencyTracker::new();
        t.record_echo(10, 5, Some(-1));
        t.record_echo(10, 5, None);
        assert_eq!(t.server_samples().len(), 2);
        assert_eq!(t.client_samples().len(), 0);
    }

    #[test]
    fn histories_keep_most_recent_hundred() {
        let mut t = LatencyTracker::new();
        for i in 0..150 {
            t.record_echo(1_000 + i, 1_000, Some(i));
        }
        assert_eq!(t.server_samples().len(), MAX_SAMPLES);
        assert_eq!(t.client_samples().len(), MAX_SAMPLES);
        // Oldest 50 evicted first.
        assert_eq!(t.server_samples().next().unwrap().latency_ms, 50);
        assert_eq!(t.client_samples().next().unwrap().latency_ms, 50);
        assert_eq!(t.last_server_latency(), Some(149));
    }

    #[test]
    fn extreme_timestamps_saturate() {
        let mut t = LatencyTracker::new();
        assert_eq!(t.record_echo(0, i64::MIN, None), i64::MAX);
        assert_eq!(t.record_echo(-10, i64::MAX, None), i64::MIN);
    }
}
