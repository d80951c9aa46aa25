//! Scripted peer that plays a match through its session handle

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::game::session::SessionReport;
use crate::game::SessionHandle;
use crate::net::protocol::{PeerId, WeaponKind};

/// Lingering time between seeing the result and leaving
pub const RESULT_LINGER: Duration = Duration::from_secs(5);

const THINK_MIN_MS: u64 = 400;
const THINK_MAX_MS: u64 = 1600;

pub struct Bot {
    handle: SessionHandle,
    opponents: Vec<PeerId>,
    rng: ChaCha8Rng,
}

impl Bot {
    pub fn new(handle: SessionHandle, roster: &[PeerId], seed: u64) -> Self {
        let opponents = roster.iter().copied().filter(|p| *p != handle.peer).collect();
        Self {
            handle,
            opponents,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Attack at random until the match is over, then leave
    pub async fn run(mut self) -> Option<SessionReport> {
        let mut running = false;

        loop {
            let view = self.handle.view();
            if view.left || self.handle.is_finished() {
                break;
            }
            if view.outcome.is_some() {
                sleep(RESULT_LINGER).await;
                self.handle.leave();
                break;
            }
            if view.abandoned {
                debug!(bot = %self.handle.peer, "Coordinator gone, abandoning match");
                self.handle.leave();
                break;
            }

            let think = self.rng.gen_range(THINK_MIN_MS..=THINK_MAX_MS);
            sleep(Duration::from_millis(think)).await;

            // Defeated bots just wait for removal
            if view.eliminated || !view.movement_enabled || self.opponents.is_empty() {
                continue;
            }

            let target = self.opponents[self.rng.gen_range(0..self.opponents.len())];
            let weapon = if self.rng.gen_bool(0.5) {
                WeaponKind::Punch
            } else {
                WeaponKind::Projectile
            };
            debug!(bot = %self.handle.peer, target = %target, ?weapon, "Bot attacking");
            self.handle.attack(target, weapon);

            if self.rng.gen_bool(0.2) {
                running = !running;
                self.handle.set_running(running);
            }
        }

        self.handle.finished().await
    }
}
