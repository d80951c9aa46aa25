//! Player combat state: health, lives and the death protocol

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::net::protocol::{keys, PeerId, PropValue};

use super::combat::{CombatStats, CombatSystem};
use super::spawn::{SpawnPoint, SpawnRegistry, Vec3};

/// Characters a peer can pick before joining
pub const CHARACTER_ROSTER: [&str; 4] = ["Brawler", "Ninja", "Robot", "Knight"];

/// Character picked in the selection screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSelection {
    pub index: usize,
    pub nickname: String,
}

/// Result of applying damage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Caller does not own this state, or it is already defeated
    Ignored,
    /// Health dropped but stayed above zero
    Damaged { health: f32 },
    /// Health hit zero, a life was lost and the avatar was placed at a spawn point
    Respawned { lives: u32, spawn: SpawnPoint },
    /// Health hit zero on the last life
    Defeated,
}

/// Combat phase of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifePhase {
    Alive,
    Defeated,
}

/// Player state (authoritative on the owning peer)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub owner: PeerId,
    pub display_name: String,
    pub character: CharacterSelection,

    pub health: f32,
    pub lives: u32,
    pub phase: LifePhase,

    pub position: Vec3,
    pub yaw: f32,
    pub velocity: Vec3,
    pub movement_enabled: bool,

    stats: CombatStats,
}

impl PlayerState {
    pub fn new(owner: PeerId, character: CharacterSelection, stats: CombatStats, spawn: SpawnPoint) -> Self {
        Self {
            owner,
            display_name: character.nickname.clone(),
            character,
            health: stats.max_health,
            lives: stats.max_lives,
            phase: LifePhase::Alive,
            position: spawn.position,
            yaw: spawn.yaw,
            velocity: Vec3::ZERO,
            movement_enabled: true,
            stats,
        }
    }

    pub fn is_eliminated(&self) -> bool {
        self.phase == LifePhase::Defeated
    }

    /// Apply damage on behalf of `caller`; only the owner may damage its own state
    pub fn apply_damage(&mut self, caller: PeerId, amount: f32, spawns: &mut SpawnRegistry) -> DamageOutcome {
        if caller != self.owner {
            debug!(owner = %self.owner, caller = %caller, "Ignoring damage from non-owner");
            return DamageOutcome::Ignored;
        }
        if self.is_eliminated() {
            return DamageOutcome::Ignored;
        }

        let (health, depleted) = CombatSystem::apply_damage(self.health, amount);
        self.health = health;

        if depleted {
            self.eliminate(spawns)
        } else {
            DamageOutcome::Damaged { health }
        }
    }

    /// Lose a life, then respawn or go down for good
    fn eliminate(&mut self, spawns: &mut SpawnRegistry) -> DamageOutcome {
        self.lives = CombatSystem::lose_life(self.lives);

        if self.lives > 0 {
            let spawn = spawns.pick();
            self.health = self.stats.max_health;
            self.place(spawn);
            info!(peer = %self.owner, lives = self.lives, "Player lost a life and respawned");
            DamageOutcome::Respawned {
                lives: self.lives,
                spawn,
            }
        } else {
            self.phase = LifePhase::Defeated;
            self.health = 0.0;
            self.velocity = Vec3::ZERO;
            self.movement_enabled = false;
            info!(peer = %self.owner, "Player defeated");
            DamageOutcome::Defeated
        }
    }

    pub fn set_to_max_health(&mut self) {
        self.health = self.stats.max_health;
    }

    /// Intermission reset: full health, fresh spawn, frozen until the round resumes
    pub fn reset_for_intermission(&mut self, spawn: SpawnPoint) {
        self.set_to_max_health();
        self.place(spawn);
        self.movement_enabled = false;
    }

    /// Re-enable movement, returns false for defeated avatars which stay frozen
    pub fn enable_movement(&mut self) -> bool {
        if self.is_eliminated() {
            return false;
        }
        self.movement_enabled = true;
        true
    }

    /// Whether this avatar may start an attack right now
    pub fn can_act(&self) -> bool {
        self.movement_enabled && !self.is_eliminated()
    }

    fn place(&mut self, spawn: SpawnPoint) {
        self.position = spawn.position;
        self.yaw = spawn.yaw;
        self.velocity = Vec3::ZERO;
    }

    /// `{lives, health}` as published to the peer's metadata
    pub fn score_props(&self) -> [(&'static str, PropValue); 2] {
        [
            (keys::LIVES, PropValue::Int(self.lives as i64)),
            (keys::HEALTH, PropValue::Float(self.health as f64)),
        ]
    }

    /// Character selection as published to the peer's metadata
    pub fn selection_props(&self) -> [(&'static str, PropValue); 2] {
        [
            (
                keys::SELECTED_CHARACTER_INDEX,
                PropValue::Int(self.character.index as i64),
            ),
            (
                keys::SELECTED_CHARACTER_NICKNAME,
                PropValue::Text(self.character.nickname.clone()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::spawn::arena_spawn_points;

    fn player() -> (PlayerState, SpawnRegistry) {
        let mut spawns = SpawnRegistry::new(arena_spawn_points(), 3);
        let spawn = spawns.pick();
        let state = PlayerState::new(
            PeerId(1),
            CharacterSelection {
                index: 0,
                nickname: "Ava".to_string(),
            },
            CombatStats::default(),
            spawn,
        );
        (state, spawns)
    }

    #[test]
    fn lethal_hit_costs_exactly_one_life() {
        let (mut p, mut spawns) = player();
        p.velocity = Vec3::new(3.0, 0.0, 1.0);

        let outcome = p.apply_damage(PeerId(1), 250.0, &mut spawns);

        assert!(matches!(outcome, DamageOutcome::Respawned { lives: 1, .. }));
        assert_eq!(p.lives, 1);
        assert_eq!(p.health, 100.0);
        assert_eq!(p.velocity, Vec3::ZERO);
        assert!(arena_spawn_points().contains(&SpawnPoint {
            position: p.position,
            yaw: p.yaw
        }));
    }

    #[test]
    fn health_never_goes_negative() {
        let (mut p, mut spawns) = player();
        let hits = [15.0, 20.0, 15.0, 33.3, 0.0, 99.0, 20.0, 7.5, 500.0, 15.0];
        let mut life_losses = 0;
        let mut lives_before = p.lives;
        for hit in hits {
            p.apply_damage(PeerId(1), hit, &mut spawns);
            assert!(p.health >= 0.0);
            assert!(p.health <= CombatStats::default().max_health);
            if p.lives < lives_before {
                assert_eq!(lives_before - p.lives, 1);
                life_losses += 1;
            }
            lives_before = p.lives;
        }
        assert_eq!(life_losses, 2);
    }

    #[test]
    fn last_life_defeats_and_freezes() {
        let (mut p, mut spawns) = player();
        p.apply_damage(PeerId(1), 100.0, &mut spawns);
        let outcome = p.apply_damage(PeerId(1), 100.0, &mut spawns);

        assert_eq!(outcome, DamageOutcome::Defeated);
        assert!(p.is_eliminated());
        assert_eq!(p.lives, 0);
        assert_eq!(p.health, 0.0);
        assert!(!p.movement_enabled);
        assert!(!p.can_act());
    }

    #[test]
    fn elimination_is_idempotent() {
        let (mut p, mut spawns) = player();
        p.apply_damage(PeerId(1), 100.0, &mut spawns);
        p.apply_damage(PeerId(1), 100.0, &mut spawns);

        for _ in 0..5 {
            assert_eq!(p.apply_damage(PeerId(1), 100.0, &mut spawns), DamageOutcome::Ignored);
        }
        assert_eq!(p.lives, 0);
        assert!(p.is_eliminated());
    }

    #[test]
    fn non_owner_damage_is_a_no_op() {
        let (mut p, mut spawns) = player();
        assert_eq!(p.apply_damage(PeerId(2), 100.0, &mut spawns), DamageOutcome::Ignored);
        assert_eq!(p.health, 100.0);
        assert_eq!(p.lives, 2);
    }

    #[test]
    fn intermission_reset_restores_health_and_freezes() {
        let (mut p, mut spawns) = player();
        p.apply_damage(PeerId(1), 60.0, &mut spawns);
        let spawn = spawns.pick();

        p.reset_for_intermission(spawn);

        assert_eq!(p.health, 100.0);
        assert_eq!(p.position, spawn.position);
        assert!(!p.movement_enabled);
        assert!(p.enable_movement());
        assert!(p.movement_enabled);
    }

    #[test]
    fn defeated_avatar_stays_frozen() {
        let (mut p, mut spawns) = player();
        p.apply_damage(PeerId(1), 100.0, &mut spawns);
        p.apply_damage(PeerId(1), 100.0, &mut spawns);
        p.reset_for_intermission(spawns.pick());

        assert_eq!(p.health, 100.0);
        assert!(!p.enable_movement());
        assert!(!p.movement_enabled);
        assert_eq!(p.lives, 0);
    }

    #[test]
    fn published_score_matches_state() {
        let (mut p, mut spawns) = player();
        p.apply_damage(PeerId(1), 40.0, &mut spawns);
        let props = p.score_props();
        assert_eq!(props[0], (keys::LIVES, PropValue::Int(2)));
        assert_eq!(props[1], (keys::HEALTH, PropValue::Float(60.0)));
    }
}
