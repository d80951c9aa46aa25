//! Round orchestrator: the coordinator's round sequence

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::net::protocol::{Rpc, RpcTarget, Scope};
use crate::net::room::RoomError;
use crate::net::rpc::Outbox;

use super::clock::{ClockTick, MatchClock, RoundDurations};
use super::MatchRules;

/// Reports from the orchestrator task back to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorSignal {
    /// Every round was played to the end
    RoundsExhausted,
}

/// Plays `max_rounds` rounds with intermissions in between.
///
/// Runs as its own task on the coordinator only. Aborting the task halts the sequence
/// wherever it is; nothing is left half-published because every step is a single write
/// or invocation.
pub struct RoundOrchestrator {
    outbox: Arc<Outbox>,
    clock: MatchClock,
    durations: RoundDurations,
    intermission: Duration,
    signals: mpsc::UnboundedSender<CoordinatorSignal>,
}

impl RoundOrchestrator {
    pub fn new(
        outbox: Arc<Outbox>,
        rules: &MatchRules,
        signals: mpsc::UnboundedSender<CoordinatorSignal>,
    ) -> Self {
        Self {
            outbox,
            clock: MatchClock::new(rules.max_rounds),
            durations: rules.durations,
            intermission: rules.intermission,
            signals,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let room_id = self.outbox.room().id();
        let max_rounds = self.clock.max_rounds();
        info!(room_id = %room_id, max_rounds, "Round sequence started");

        for round in 1..=max_rounds {
            if let Err(e) = self.play_round(room_id, round).await {
                debug!(room_id = %room_id, error = %e, "Round sequence stopped");
                return;
            }

            if round < max_rounds {
                if let Err(e) = self.intermission(room_id, round).await {
                    debug!(room_id = %room_id, error = %e, "Round sequence stopped");
                    return;
                }
            }
        }

        info!(room_id = %room_id, "All rounds played");
        let _ = self.signals.send(CoordinatorSignal::RoundsExhausted);
    }

    async fn play_round(&mut self, room_id: Uuid, round: u32) -> Result<(), RoomError> {
        let duration = self.durations.for_round(round, self.clock.max_rounds());
        self.clock.start_round(round, duration);
        self.outbox.publish(Scope::Match, self.clock.round_props())?;

        info!(
            room_id = %room_id,
            round,
            final_round = self.clock.is_final_round(),
            duration_secs = duration.as_secs(),
            "Round {} starting...", round
        );

        let period = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + period, period);

        while self.clock.is_active() {
            ticker.tick().await;
            match self.clock.tick() {
                ClockTick::Running(_) | ClockTick::Expired => {
                    self.outbox.publish(Scope::Match, self.clock.time_props())?;
                }
                ClockTick::Idle => break,
            }
        }

        info!(room_id = %room_id, round, "Round {} complete!", round);
        Ok(())
    }

    async fn intermission(&self, room_id: Uuid, completed_round: u32) -> Result<(), RoomError> {
        self.outbox
            .send(RpcTarget::All, Rpc::ShowRoundComplete { completed_round })?;

        debug!(
            room_id = %room_id,
            secs = self.intermission.as_secs_f32(),
            "Intermission"
        );
        sleep(self.intermission).await;

        self.outbox.send(RpcTarget::All, Rpc::HideRoundComplete)?;
        Ok(())
    }
}
