//! Simulation host: runs bot matches over the room transport

pub mod bot;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::game::presentation::client_label;
use crate::game::session::SessionReport;
use crate::game::spawn::SpawnPoint;
use crate::game::{
    CharacterSelection, MatchRules, PeerSession, SessionContext, SessionError, SessionParams,
    CHARACTER_ROSTER,
};
use crate::net::protocol::{MatchResult, PeerId};
use crate::net::{Room, RoomRegistry};

use bot::Bot;

const BOT_NAMES: [&str; 6] = ["Ava", "Bo", "Cy", "Dee", "Eli", "Fay"];

/// What one simulated match produced
#[derive(Debug)]
pub struct MatchSummary {
    pub room_id: Uuid,
    pub result: Option<MatchResult>,
    pub reports: Vec<SessionReport>,
}

/// Hosts simulated matches
pub struct SimHost {
    rooms: Arc<RoomRegistry>,
    rules: MatchRules,
    spawn_points: Vec<SpawnPoint>,
    config: SimConfig,
}

impl SimHost {
    pub fn new(
        rooms: Arc<RoomRegistry>,
        rules: MatchRules,
        spawn_points: Vec<SpawnPoint>,
        config: SimConfig,
    ) -> Self {
        Self {
            rooms,
            rules,
            spawn_points,
            config,
        }
    }

    /// Play the configured matches back to back
    pub async fn run(&self) {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        info!(matches = self.config.matches, players = self.config.players, seed, "Simulation starting");

        for n in 1..=self.config.matches {
            match self.play_match(rng.gen()).await {
                Ok(summary) => {
                    info!(
                        match_no = n,
                        room_id = %summary.room_id,
                        winner = summary
                            .result
                            .as_ref()
                            .and_then(|r| r.winner.as_ref())
                            .map(|w| w.display_name.as_str())
                            .unwrap_or("none"),
                        "Simulated match finished"
                    );
                    for report in &summary.reports {
                        info!(
                            match_no = n,
                            peer = %report.peer,
                            name = %report.display_name,
                            lives = report.lives,
                            health = report.health,
                            saw_result = report.result.is_some(),
                            outcome = ?report.outcome,
                            "Bot final state"
                        );
                    }
                }
                Err(e) => error!(match_no = n, error = %e, "Simulated match failed to start"),
            }
        }

        info!("Simulation finished");
    }

    /// Create a room, seat the bots and play until everyone has left
    pub async fn play_match(&self, seed: u64) -> Result<MatchSummary, SessionError> {
        let room = Room::with_damage_limit(Uuid::new_v4(), self.config.damage_rate_limit);
        self.rooms.insert(room.clone());
        info!(room_id = %room.id(), players = self.config.players, "Created simulated room");

        let mut handles = Vec::with_capacity(self.config.players);
        for i in 0..self.config.players {
            let name = bot_name(i);
            let params = SessionParams {
                rules: self.rules.clone(),
                character: Some(CharacterSelection {
                    index: i % CHARACTER_ROSTER.len(),
                    nickname: name.clone(),
                }),
                spawn_points: self.spawn_points.clone(),
                seed,
            };
            let ctx = SessionContext::logging(&client_label(PeerId(i as u32 + 1), &name));
            match PeerSession::start(&room, params, ctx) {
                Ok(handle) => {
                    debug!(
                        room_id = %room.id(),
                        peer = %handle.peer,
                        coordinator = handle.is_coordinator,
                        "Bot seated"
                    );
                    handles.push(handle);
                }
                Err(e) => {
                    for handle in &handles {
                        handle.leave();
                    }
                    return Err(e);
                }
            }
        }

        let roster: Vec<PeerId> = handles.iter().map(|h| h.peer).collect();
        let bots = handles
            .into_iter()
            .enumerate()
            .map(|(i, handle)| Bot::new(handle, &roster, seed.wrapping_add(i as u64 + 1)).run());
        let reports: Vec<SessionReport> = join_all(bots).await.into_iter().flatten().collect();

        Ok(MatchSummary {
            room_id: room.id(),
            result: room.status().result,
            reports,
        })
    }
}

fn bot_name(i: usize) -> String {
    let base = BOT_NAMES[i % BOT_NAMES.len()];
    match i / BOT_NAMES.len() {
        0 => base.to_string(),
        lap => format!("{}{}", base, lap + 1),
    }
}

/// Drop emptied rooms once they have lingered long enough
pub async fn prune_rooms(rooms: Arc<RoomRegistry>, linger: Duration) {
    let linger = chrono::Duration::from_std(linger).unwrap_or_else(|_| chrono::Duration::zero());
    let mut interval = tokio::time::interval(Duration::from_secs(5));

    loop {
        interval.tick().await;
        let pruned = rooms.prune_closed(linger);
        if pruned > 0 {
            info!(pruned, remaining = rooms.active_rooms(), "Pruned closed rooms");
        }
    }
}
