//! Match logic modules

pub mod arbiter;
pub mod clock;
pub mod combat;
pub mod orchestrator;
pub mod player;
pub mod presentation;
pub mod session;
pub mod spawn;

pub use player::{CharacterSelection, CHARACTER_ROSTER};
pub use presentation::SessionContext;
pub use session::{PeerSession, SessionError, SessionHandle, SessionParams};

use std::time::Duration;

use clock::RoundDurations;
use combat::CombatStats;

/// Tunables shared by every session of a match
#[derive(Debug, Clone)]
pub struct MatchRules {
    pub max_rounds: u32,
    pub durations: RoundDurations,
    /// Pause between rounds with the "round complete" panel up
    pub intermission: Duration,
    /// How long a defeated avatar lingers before leaving the room
    pub defeat_grace: Duration,
    /// Timer display refresh interval
    pub timer_poll: Duration,
    pub combat: CombatStats,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            max_rounds: 2,
            durations: RoundDurations::default(),
            intermission: Duration::from_secs(3),
            defeat_grace: Duration::from_secs(10),
            timer_poll: Duration::from_millis(500),
            combat: CombatStats::default(),
        }
    }
}
