//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use glam::Vec3;

use crate::game::combat::{CollisionPolicy, DamageProfile};
use crate::game::vehicle::TankVariant;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,
    /// Tuning for every session started by this process
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            tick_rate: parse_var("TICK_RATE", defaults.tick_rate)?,
            snapshot_rate: parse_var("SNAPSHOT_RATE", defaults.snapshot_rate)?,
            damage_profile: parse_var("DAMAGE_PROFILE", defaults.damage_profile)?,
            collision_policy: parse_var("COLLISION_POLICY", defaults.collision_policy)?,
            reload_seconds: parse_var("RELOAD_SECONDS", defaults.reload_seconds)?,
            seed: parse_var("SESSION_SEED", rand::random::<u64>())?,
            ..defaults
        };

        session.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            session,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// A vehicle placed when a session starts
#[derive(Clone, Debug)]
pub struct RosterEntry {
    pub variant: TankVariant,
    pub position: Vec3,
    /// Hull yaw in degrees
    pub yaw: f32,
}

/// Highest tick rate the session loop accepts
pub const MAX_TICK_RATE: u32 = 1000;

/// Simulation tuning for one session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Field replication passes per second
    pub snapshot_rate: u32,
    pub damage_profile: DamageProfile,
    pub collision_policy: CollisionPolicy,
    /// Seconds for the main gun to reload after firing
    pub reload_seconds: f32,
    /// Projectile speed (units/s)
    pub projectile_speed: f32,
    /// Projectile time-to-live (seconds)
    pub projectile_lifetime: f32,
    /// Optional travel limit; whichever of lifetime/distance runs out first wins
    pub projectile_max_distance: Option<f32>,
    /// Seed for spawn point selection
    pub seed: u64,
    /// Vehicles spawned at session start
    pub roster: Vec<RosterEntry>,
}

impl SessionConfig {
    /// Reject tuning the tick loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::Invalid {
                name: "TICK_RATE",
                value: self.tick_rate.to_string(),
            });
        }
        if self.snapshot_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "SNAPSHOT_RATE",
                value: "0".to_string(),
            });
        }
        if !self.reload_seconds.is_finite() || self.reload_seconds < 0.0 {
            return Err(ConfigError::Invalid {
                name: "RELOAD_SECONDS",
                value: self.reload_seconds.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            snapshot_rate: 20,
            damage_profile: DamageProfile::Standard,
            collision_policy: CollisionPolicy::ProximitySweep,
            reload_seconds: 3.0,
            projectile_speed: 25.0,
            projectile_lifetime: 5.0,
            projectile_max_distance: None,
            seed: 0,
            roster: vec![
                RosterEntry {
                    variant: TankVariant::T34,
                    position: Vec3::new(-3.5, 0.0, -3.0),
                    yaw: 90.0,
                },
                RosterEntry {
                    variant: TankVariant::Panzer4,
                    position: Vec3::new(-3.5, 0.0, -8.0),
                    yaw: 90.0,
                },
            ],
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
