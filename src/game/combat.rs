//! Combat system - weapons, damage, lives

use std::time::Duration;

use crate::net::protocol::WeaponKind;

/// Weapon stats per weapon kind
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    /// Cooldown between attacks
    pub cooldown: Duration,
}

impl WeaponStats {
    pub fn for_kind(kind: WeaponKind) -> Self {
        match kind {
            WeaponKind::Punch => Self {
                damage: 15.0,
                cooldown: Duration::from_millis(1400),
            },
            WeaponKind::Projectile => Self {
                damage: 20.0,
                cooldown: Duration::ZERO,
            },
        }
    }
}

/// Health and lives limits for a participant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatStats {
    pub max_health: f32,
    pub max_lives: u32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            max_lives: 2,
        }
    }
}

/// Combat system for damage bookkeeping
pub struct CombatSystem;

impl CombatSystem {
    /// Sanitize a reported damage amount (negative or non-finite counts as none)
    pub fn sanitize_damage(amount: f32) -> f32 {
        if amount.is_finite() {
            amount.max(0.0)
        } else {
            0.0
        }
    }

    /// Apply damage to health, returns (new_health, depleted)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - Self::sanitize_damage(damage)).max(0.0);
        (new_health, new_health <= 0.0)
    }

    /// Lives left after losing one
    pub fn lose_life(lives: u32) -> u32 {
        lives.saturating_sub(1)
    }
}
