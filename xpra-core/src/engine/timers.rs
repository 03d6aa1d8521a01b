//! Deadline bookkeeping for the engine's timers.
//!
//! The engine never sleeps. It arms deadlines here, the driver asks for
//! [`Timers::next_deadline`] and calls back once it has passed.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// `connect` took too long.
    Connect,
    /// `disconnect` took too long.
    Disconnect,
    /// Leave `failed` shortly after entering it.
    FailReset,
    /// Periodic outgoing-queue flush.
    Flush,
    /// Periodic client ping.
    Ping,
}

impl TimerKind {
    /// Order in which simultaneously due timers fire.
    pub const ALL: [TimerKind; 5] = [
        TimerKind::Connect,
        TimerKind::Disconnect,
        TimerKind::FailReset,
        TimerKind::Flush,
        TimerKind::Ping,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default, Clone)]
pub struct Timers {
    deadlines: [Option<i64>; 5],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) `kind` to fire `after` from `now_ms`.
    pub fn arm(&mut self, kind: TimerKind, now_ms: i64, after: Duration) {
        let after = i64::try_from(after.as_millis()).unwrap_or(i64::MAX);
        self.deadlines[kind.slot()] = Some(now_ms.saturating_add(after));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[kind.slot()] = None;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines[kind.slot()].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<i64> {
        self.deadlines[kind.slot()]
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<i64> {
        self.deadlines.iter().flatten().copied().min()
    }

    /// Disarm and return every timer due at `now_ms`, earliest first.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<TimerKind> {
        let mut due: Vec<(i64, TimerKind)> = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                self.deadlines[kind.slot()]
                    .filter(|at| *at <= now_ms)
                    .map(|at| (at, kind))
            })
            .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, kind) in &due {
            self.cancel(*kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}
