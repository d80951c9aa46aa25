//! Spawn points and random placement

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// World position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Position/orientation pair an avatar can be placed at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub position: Vec3,
    /// Heading in degrees
    pub yaw: f32,
}

/// Used when no spawn point is registered
pub const FALLBACK_SPAWN: SpawnPoint = SpawnPoint {
    position: Vec3::new(50.0, 10.0, 40.0),
    yaw: 0.0,
};

/// Default arena layout: four corners facing the center
pub fn arena_spawn_points() -> Vec<SpawnPoint> {
    vec![
        SpawnPoint {
            position: Vec3::new(-30.0, 1.0, -30.0),
            yaw: 45.0,
        },
        SpawnPoint {
            position: Vec3::new(30.0, 1.0, -30.0),
            yaw: 315.0,
        },
        SpawnPoint {
            position: Vec3::new(30.0, 1.0, 30.0),
            yaw: 225.0,
        },
        SpawnPoint {
            position: Vec3::new(-30.0, 1.0, 30.0),
            yaw: 135.0,
        },
    ]
}

/// Ordered spawn point set with a uniform random picker
#[derive(Debug, Clone)]
pub struct SpawnRegistry {
    points: Vec<SpawnPoint>,
    rng: ChaCha8Rng,
}

impl SpawnRegistry {
    pub fn new(points: Vec<SpawnPoint>, seed: u64) -> Self {
        Self {
            points,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Pick a spawn point uniformly at random, or the fallback if none are registered
    pub fn pick(&mut self) -> SpawnPoint {
        if self.points.is_empty() {
            warn!("No spawn points registered, using fallback position");
            return FALLBACK_SPAWN;
        }
        let idx = self.rng.gen_range(0..self.points.len());
        self.points[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_come_from_registered_points() {
        let mut spawns = SpawnRegistry::new(arena_spawn_points(), 7);
        for _ in 0..100 {
            let point = spawns.pick();
            assert!(arena_spawn_points().contains(&point));
        }
    }

    #[test]
    fn every_point_eventually_gets_picked() {
        let mut spawns = SpawnRegistry::new(arena_spawn_points(), 11);
        let mut seen = vec![false; arena_spawn_points().len()];
        for _ in 0..400 {
            let point = spawns.pick();
            let idx = arena_spawn_points().iter().position(|p| *p == point).unwrap();
            seen[idx] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn empty_registry_falls_back() {
        let mut spawns = SpawnRegistry::new(Vec::new(), 1);
        assert_eq!(spawns.pick(), FALLBACK_SPAWN);
    }
}
