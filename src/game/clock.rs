//! Match clock: per-round countdown owned by the coordinator

use std::time::Duration;

use crate::net::protocol::{keys, PropValue, Scope};
use crate::net::store::ReplicatedStore;
use crate::util::time::format_clock;

/// Round length policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundDurations {
    /// Every round before the last
    pub standard: Duration,
    /// The last round
    pub final_round: Duration,
}

impl Default for RoundDurations {
    fn default() -> Self {
        Self {
            standard: Duration::from_secs(240),
            final_round: Duration::from_secs(120),
        }
    }
}

impl RoundDurations {
    pub fn for_round(&self, round: u32, max_rounds: u32) -> Duration {
        if round < max_rounds {
            self.standard
        } else {
            self.final_round
        }
    }
}

/// Outcome of one clock tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockTick {
    /// Round still running with this many seconds left
    Running(f32),
    /// Round just ran out
    Expired,
    /// No round is active
    Idle,
}

/// Authoritative round clock
#[derive(Debug, Clone)]
pub struct MatchClock {
    current_round: u32,
    time_remaining: f32,
    active: bool,
    max_rounds: u32,
}

impl MatchClock {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            current_round: 0,
            time_remaining: 0.0,
            active: false,
            max_rounds,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn is_final_round(&self) -> bool {
        self.current_round >= self.max_rounds
    }

    /// Start `round` with the given length
    pub fn start_round(&mut self, round: u32, duration: Duration) {
        self.current_round = round;
        self.time_remaining = duration.as_secs_f32().max(0.0);
        self.active = self.time_remaining > 0.0;
    }

    /// Advance by one second
    pub fn tick(&mut self) -> ClockTick {
        if !self.active {
            return ClockTick::Idle;
        }
        self.time_remaining = (self.time_remaining - 1.0).max(0.0);
        if self.time_remaining <= 0.0 {
            self.active = false;
            ClockTick::Expired
        } else {
            ClockTick::Running(self.time_remaining)
        }
    }

    /// Round number and remaining time, as replicated at round start
    pub fn round_props(&self) -> [(&'static str, PropValue); 2] {
        [
            (keys::CURRENT_ROUND, PropValue::Int(self.current_round as i64)),
            (keys::ROUND_TIME, PropValue::Float(self.time_remaining as f64)),
        ]
    }

    /// Remaining time, as replicated on every tick
    pub fn time_props(&self) -> [(&'static str, PropValue); 1] {
        [(keys::ROUND_TIME, PropValue::Float(self.time_remaining as f64))]
    }
}

/// Whether the replicated clock shows a round still counting down
pub fn round_active(store: &ReplicatedStore) -> bool {
    store
        .get_f64(Scope::Match, keys::ROUND_TIME)
        .is_some_and(|remaining| remaining > 0.0)
}

/// Timer text an observer renders from its replica, if both keys have arrived
pub fn clock_display(store: &ReplicatedStore) -> Option<String> {
    let round = store.get_i64(Scope::Match, keys::CURRENT_ROUND)?;
    let remaining = store.get_f64(Scope::Match, keys::ROUND_TIME)?;
    Some(format!("Round {}: {}", round, format_clock(remaining as f32)))
}
