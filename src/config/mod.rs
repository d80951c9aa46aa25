//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::clock::RoundDurations;
use crate::game::combat::CombatStats;
use crate::game::spawn::{arena_spawn_points, SpawnPoint, Vec3};
use crate::game::MatchRules;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Bot matches hosted by this process
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Matches to play back to back (0 disables the simulation)
    pub matches: u32,
    /// Bots per match
    pub players: usize,
    /// Fixed RNG seed, random when unset
    pub seed: Option<u64>,
    /// How long an emptied room stays visible on the status surface
    pub room_linger: Duration,
    /// Damage invocations each member may send per second, 0 for no cap
    pub damage_rate_limit: u32,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,

    pub rules: MatchRules,
    pub spawn_points: Vec<SpawnPoint>,
    pub sim: SimConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Some(port) = lookup("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string())
        };

        let defaults = MatchRules::default();
        let rules = MatchRules {
            max_rounds: parse_at_least(&lookup, "MAX_ROUNDS", defaults.max_rounds, 1)?,
            durations: RoundDurations {
                standard: secs(&lookup, "ROUND_SECS", defaults.durations.standard)?,
                final_round: secs(&lookup, "FINAL_ROUND_SECS", defaults.durations.final_round)?,
            },
            intermission: secs(&lookup, "INTERMISSION_SECS", defaults.intermission)?,
            defeat_grace: secs(&lookup, "DEFEAT_GRACE_SECS", defaults.defeat_grace)?,
            timer_poll: Duration::from_millis(parse_at_least(
                &lookup,
                "TIMER_POLL_MS",
                defaults.timer_poll.as_millis() as u64,
                1,
            )?),
            combat: CombatStats {
                max_health: max_health(&lookup, defaults.combat.max_health)?,
                max_lives: parse_at_least(&lookup, "MAX_LIVES", defaults.combat.max_lives, 1)?,
            },
        };

        let spawn_points = match lookup("SPAWN_POINTS") {
            Some(raw) => parse_spawn_points(&raw)?,
            None => arena_spawn_points(),
        };

        let sim = SimConfig {
            matches: parse_or(&lookup, "SIM_MATCHES", 1)?,
            players: parse_at_least(&lookup, "SIM_PLAYERS", 2, 1)?,
            seed: lookup("SIM_SEED")
                .map(|raw| parse_value("SIM_SEED", &raw))
                .transpose()?,
            room_linger: secs(&lookup, "ROOM_LINGER_SECS", Duration::from_secs(60))?,
            damage_rate_limit: parse_or(&lookup, "DAMAGE_RATE_LIMIT", 0)?,
        };

        let log_format = parse_or(&lookup, "LOG_FORMAT", LogFormat::Pretty)?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,

            rules,
            spawn_points,
            sim,
        })
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_at_least<T, F>(lookup: &F, key: &'static str, default: T, min: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + ToString,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if value < min {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn secs<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn max_health<F>(lookup: &F, default: f32) -> Result<f32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f32 = parse_or(lookup, "MAX_HEALTH", default)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid {
            key: "MAX_HEALTH",
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Parse `x,y,z,yaw;x,y,z,yaw;...`
fn parse_spawn_points(raw: &str) -> Result<Vec<SpawnPoint>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "SPAWN_POINTS",
        value: raw.to_string(),
    };

    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts = entry
                .split(',')
                .map(|p| p.trim().parse::<f32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            match parts.as_slice() {
                [x, y, z, yaw] if parts.iter().all(|v| v.is_finite()) => Ok(SpawnPoint {
                    position: Vec3::new(*x, *y, *z),
                    yaw: *yaw,
                }),
                _ => Err(invalid()),
            }
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_rulebook() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.rules.max_rounds, 2);
        assert_eq!(config.rules.durations, RoundDurations::default());
        assert_eq!(config.rules.intermission, Duration::from_secs(3));
        assert_eq!(config.rules.defeat_grace, Duration::from_secs(10));
        assert_eq!(config.rules.timer_poll, Duration::from_millis(500));
        assert_eq!(config.rules.combat, CombatStats::default());
        assert_eq!(config.spawn_points, arena_spawn_points());
        assert_eq!(config.sim.matches, 1);
        assert_eq!(config.sim.players, 2);
        assert_eq!(config.sim.seed, None);
        assert_eq!(config.sim.damage_rate_limit, 0);
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("PORT", "9000"),
            ("LOG_FORMAT", "JSON"),
            ("MAX_ROUNDS", "3"),
            ("ROUND_SECS", "60"),
            ("FINAL_ROUND_SECS", "30"),
            ("MAX_LIVES", "4"),
            ("SIM_SEED", "42"),
            ("DAMAGE_RATE_LIMIT", "10"),
            ("SPAWN_POINTS", "1,2,3,90; -4.5,0,8,180"),
        ])
        .unwrap();

        assert_eq!(config.server_addr.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rules.max_rounds, 3);
        assert_eq!(config.rules.durations.for_round(2, 3), Duration::from_secs(60));
        assert_eq!(config.rules.durations.for_round(3, 3), Duration::from_secs(30));
        assert_eq!(config.rules.combat.max_lives, 4);
        assert_eq!(config.sim.seed, Some(42));
        assert_eq!(config.sim.damage_rate_limit, 10);
        assert_eq!(
            config.spawn_points,
            vec![
                SpawnPoint {
                    position: Vec3::new(1.0, 2.0, 3.0),
                    yaw: 90.0
                },
                SpawnPoint {
                    position: Vec3::new(-4.5, 0.0, 8.0),
                    yaw: 180.0
                },
            ]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("MAX_ROUNDS", "zero")]),
            Err(ConfigError::Invalid { key: "MAX_ROUNDS", .. })
        ));
        assert!(matches!(
            load(&[("MAX_ROUNDS", "0")]),
            Err(ConfigError::Invalid { key: "MAX_ROUNDS", .. })
        ));
        assert!(matches!(
            load(&[("MAX_HEALTH", "-5")]),
            Err(ConfigError::Invalid { key: "MAX_HEALTH", .. })
        ));
        assert!(matches!(
            load(&[("SPAWN_POINTS", "1,2,3")]),
            Err(ConfigError::Invalid { key: "SPAWN_POINTS", .. })
        ));
        assert!(matches!(
            load(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid { key: "LOG_FORMAT", .. })
        ));
        assert!(matches!(
            load(&[("SERVER_ADDR", "not-an-address")]),
            Err(ConfigError::InvalidAddress)
        ));
    }

    #[test]
    fn empty_spawn_list_is_allowed() {
        // Respawns then use the fallback position
        let config = load(&[("SPAWN_POINTS", "")]).unwrap();
        assert!(config.spawn_points.is_empty());
    }
}
