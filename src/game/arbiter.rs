//! Result arbiter: picks the match winner once, on the coordinator

use chrono::Utc;
use tracing::info;

use crate::net::protocol::{MatchResult, PeerId, ResultTrigger, Winner};

/// Replicated lives above this are treated as corrupt and clamped
pub const MAX_TRUSTED_LIVES: i64 = 8;

/// A participant's terminal standing as seen in replicated metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSnapshot {
    pub peer: PeerId,
    pub display_name: String,
    pub lives: i64,
    pub health: f32,
}

impl ScoreSnapshot {
    fn trusted_lives(&self) -> i64 {
        self.lives.clamp(0, MAX_TRUSTED_LIVES)
    }
}

/// Most lives wins, ties go to the higher health, and the first listed wins a full tie
pub fn decide_winner(snapshots: &[ScoreSnapshot]) -> Option<&ScoreSnapshot> {
    let max_lives = snapshots.iter().map(ScoreSnapshot::trusted_lives).max()?;

    snapshots
        .iter()
        .filter(|s| s.trusted_lives() == max_lives)
        .fold(None, |best: Option<&ScoreSnapshot>, s| match best {
            Some(b) if b.health >= s.health => Some(b),
            _ => Some(s),
        })
}

/// Settles the match at most once
#[derive(Debug, Default)]
pub struct ResultArbiter {
    settled: Option<MatchResult>,
}

impl ResultArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide from score snapshots; `None` if already settled
    pub fn settle(&mut self, trigger: ResultTrigger, snapshots: &[ScoreSnapshot]) -> Option<MatchResult> {
        let winner = decide_winner(snapshots).map(|s| Winner {
            peer: s.peer,
            display_name: s.display_name.clone(),
        });
        self.settle_with(trigger, winner)
    }

    /// Settle with a winner known up front; `None` if already settled
    pub fn settle_with(&mut self, trigger: ResultTrigger, winner: Option<Winner>) -> Option<MatchResult> {
        if self.settled.is_some() {
            return None;
        }

        let result = MatchResult {
            winner,
            trigger,
            decided_at: Utc::now(),
        };

        match &result.winner {
            Some(w) => info!(winner = %w.peer, name = %w.display_name, ?trigger, "Match settled"),
            None => info!(?trigger, "Match settled with no winner"),
        }

        self.settled = Some(result.clone());
        Some(result)
    }
}
