//! Combat system - main gun, projectiles, damage and respawn

use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;

use super::collision::{sweep_armor, CollisionWorld, Contact, ContactTarget};
use super::physics::{direction_from, hull_to_world, VehicleSimulator};
use super::registry::EntityRegistry;
use super::spawn::{SpawnPoint, SpawnProvider};
use super::vehicle::{TurretState, Vehicle, VehicleId, MAGAZINE_CAPACITY};

/// Recoil push on the firing tank (units/s^2 at the muzzle)
pub const RECOIL_STRENGTH: f32 = 10.0;
/// Push on a tank that takes a shaking hit
pub const HIT_SHAKE_STRENGTH: f32 = 15.0;
/// How long recoil and shake pushes last (seconds)
pub const IMPULSE_DURATION: f32 = 0.2;
/// Time an exploded projectile stays around before removal
pub const EXPLOSION_LINGER: f32 = 1.0;
pub const PROJECTILE_RADIUS: f32 = 0.2;

/// Absorbs float drift when summing tick deltas
const TIMER_EPSILON: f32 = 1e-4;

/// Damage per hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageProfile {
    Light,
    Standard,
    Heavy,
}

impl DamageProfile {
    pub fn damage(self) -> f32 {
        match self {
            DamageProfile::Light => 100.0,
            DamageProfile::Standard => 350.0,
            DamageProfile::Heavy => 550.0,
        }
    }
}

impl FromStr for DamageProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "standard" => Ok(Self::Standard),
            "heavy" => Ok(Self::Heavy),
            other => Err(format!("unknown damage profile: {other}")),
        }
    }
}

/// How projectile hits are found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// The resolver sweeps every projectile step itself
    ProximitySweep,
    /// The physics substrate reports contacts
    Trigger,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sweep" | "proximity" => Ok(Self::ProximitySweep),
            "trigger" => Ok(Self::Trigger),
            other => Err(format!("unknown collision policy: {other}")),
        }
    }
}

/// Main gun and projectile tuning
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    pub damage: f32,
    pub projectile_speed: f32,
    pub projectile_lifetime: f32,
    pub projectile_max_distance: Option<f32>,
    pub projectile_radius: f32,
    pub reload_seconds: f32,
}

impl WeaponStats {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            damage: config.damage_profile.damage(),
            projectile_speed: config.projectile_speed,
            projectile_lifetime: config.projectile_lifetime,
            projectile_max_distance: config.projectile_max_distance,
            projectile_radius: PROJECTILE_RADIUS,
            reload_seconds: config.reload_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectileId(pub u64);

impl fmt::Display for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectileState {
    Flying,
    /// Hit something; kept inert until the linger runs out
    Exploded { linger: f32 },
    /// Ran out of lifetime or range
    Expired,
}

/// A shell in flight
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: ProjectileId,
    /// Firing vehicle, only compared against to skip self-hits
    pub sender: VehicleId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub ttl: f32,
    pub distance_remaining: Option<f32>,
    pub state: ProjectileState,
}

impl Projectile {
    pub fn new(
        id: ProjectileId,
        sender: VehicleId,
        position: Vec3,
        direction: Vec3,
        stats: &WeaponStats,
    ) -> Self {
        Self {
            id,
            sender,
            position,
            velocity: direction.normalize_or_zero() * stats.projectile_speed,
            ttl: stats.projectile_lifetime,
            distance_remaining: stats.projectile_max_distance,
            state: ProjectileState::Flying,
        }
    }

    pub fn is_flying(&self) -> bool {
        self.state == ProjectileState::Flying
    }

    /// Mark as exploded. Only the first call does anything.
    pub fn explode(&mut self, at: Vec3) -> bool {
        if !self.is_flying() {
            return false;
        }
        self.position = at;
        self.state = ProjectileState::Exploded {
            linger: EXPLOSION_LINGER,
        };
        true
    }

    fn should_remove(&self) -> bool {
        match self.state {
            ProjectileState::Flying => false,
            ProjectileState::Exploded { linger } => linger <= 0.0,
            ProjectileState::Expired => true,
        }
    }
}

/// What a projectile hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImpactTarget {
    Vehicle(VehicleId),
    World,
}

/// A projectile that exploded this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub projectile_id: ProjectileId,
    pub sender: VehicleId,
    pub target: ImpactTarget,
    pub point: Vec3,
}

/// A successful shot
#[derive(Debug, Clone)]
pub struct Shot {
    pub projectile: Projectile,
    pub muzzle: Vec3,
    pub direction: Vec3,
}

/// Result of applying damage to a tank
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Already went through the destroyed transition this tick
    Ignored,
    Damaged { health: f32 },
    /// Health ran out; the tank has been moved to `respawn`
    Destroyed { at: Vec3, respawn: SpawnPoint },
}

/// Combat rules for the main gun and projectile lifecycle
pub struct CombatSystem;

impl CombatSystem {
    /// World position and direction of the gun barrel
    pub fn muzzle(vehicle: &Vehicle) -> (Vec3, Vec3) {
        let stats = vehicle.stats();
        let heading = vehicle.turret_world_yaw();
        let direction = direction_from(heading, vehicle.turret.pitch);
        let mount = hull_to_world(
            heading,
            Vec3::new(stats.muzzle_offset.x, stats.muzzle_offset.y, 0.0),
        );
        (
            vehicle.position + mount + direction * stats.muzzle_offset.z,
            direction,
        )
    }

    /// Fire the main gun. Does nothing with an empty breech.
    pub fn fire(vehicle: &mut Vehicle, weapon: &WeaponStats, id: ProjectileId) -> Option<Shot> {
        if vehicle.ammo == 0 {
            return None;
        }

        vehicle.ammo -= 1;
        if vehicle.ammo == 0 {
            vehicle.reload_remaining = weapon.reload_seconds;
        }

        let (muzzle, direction) = Self::muzzle(vehicle);
        VehicleSimulator::start_impulse(vehicle, muzzle, RECOIL_STRENGTH, IMPULSE_DURATION);

        Some(Shot {
            projectile: Projectile::new(id, vehicle.id, muzzle, direction, weapon),
            muzzle,
            direction,
        })
    }

    /// Count the reload down; the breech is refilled once it runs out
    pub fn tick_reload(vehicle: &mut Vehicle, dt: f32) {
        if vehicle.ammo >= MAGAZINE_CAPACITY {
            return;
        }
        vehicle.reload_remaining -= dt;
        if vehicle.reload_remaining <= TIMER_EPSILON {
            vehicle.reload_remaining = 0.0;
            vehicle.ammo = MAGAZINE_CAPACITY;
        }
    }

    /// Move projectiles, age them, and (with the sweep policy) find hits.
    ///
    /// Exploded and expired projectiles are dropped from the list when due.
    pub fn step_projectiles(
        projectiles: &mut Vec<Projectile>,
        vehicles: &EntityRegistry<Vehicle>,
        world: &dyn CollisionWorld,
        policy: CollisionPolicy,
        radius: f32,
        dt: f32,
    ) -> Vec<Impact> {
        let mut impacts = Vec::new();

        for projectile in projectiles.iter_mut() {
            match projectile.state {
                ProjectileState::Flying => {}
                ProjectileState::Exploded { ref mut linger } => {
                    *linger -= dt;
                    continue;
                }
                ProjectileState::Expired => continue,
            }

            let from = projectile.position;
            let to = from + projectile.velocity * dt;

            if policy == CollisionPolicy::ProximitySweep {
                if let Some((t, target)) =
                    Self::sweep(vehicles, world, projectile.sender, from, to, radius)
                {
                    let point = from.lerp(to, t);
                    if projectile.explode(point) {
                        impacts.push(Impact {
                            projectile_id: projectile.id,
                            sender: projectile.sender,
                            target,
                            point,
                        });
                    }
                    continue;
                }
            }

            projectile.position = to;
            projectile.ttl -= dt;
            if let Some(remaining) = projectile.distance_remaining.as_mut() {
                *remaining -= (to - from).length();
            }
            let out_of_range = projectile.distance_remaining.is_some_and(|d| d <= 0.0);
            if projectile.ttl <= TIMER_EPSILON || out_of_range {
                projectile.state = ProjectileState::Expired;
            }
        }

        projectiles.retain(|p| !p.should_remove());
        impacts
    }

    /// Earliest thing the segment touches: armor of any tank but the sender, or world geometry
    fn sweep(
        vehicles: &EntityRegistry<Vehicle>,
        world: &dyn CollisionWorld,
        sender: VehicleId,
        from: Vec3,
        to: Vec3,
        radius: f32,
    ) -> Option<(f32, ImpactTarget)> {
        let armor = vehicles
            .iter()
            .filter(|(id, _)| *id != sender)
            .filter_map(|(id, v)| sweep_armor(v, from, to, radius).map(|t| (t, ImpactTarget::Vehicle(id))));
        let solid = world
            .sweep_solid(from, to, radius)
            .map(|t| (t, ImpactTarget::World));

        armor.chain(solid).min_by(|a, b| a.0.total_cmp(&b.0))
    }

    /// Turn a reported contact into an impact.
    ///
    /// Contacts for projectiles that already exploded, and contacts with the
    /// sender's own armor, are ignored.
    pub fn resolve_contact(projectiles: &mut [Projectile], contact: &Contact) -> Option<Impact> {
        let projectile = projectiles
            .iter_mut()
            .find(|p| p.id == contact.projectile_id)?;

        let target = match contact.target {
            ContactTarget::Armor { vehicle_id } if vehicle_id == projectile.sender => return None,
            ContactTarget::Armor { vehicle_id } => ImpactTarget::Vehicle(vehicle_id),
            ContactTarget::World => ImpactTarget::World,
        };

        if !projectile.explode(contact.point) {
            return None;
        }
        Some(Impact {
            projectile_id: projectile.id,
            sender: projectile.sender,
            target,
            point: contact.point,
        })
    }

    /// Apply a hit to a tank.
    ///
    /// Health running out moves the tank straight to a spawn point with full
    /// health; the caller must evict its crew in the same step.
    pub fn apply_damage(
        vehicle: &mut Vehicle,
        damage: f32,
        impact_point: Vec3,
        shake: bool,
        tick: u64,
        spawns: &mut dyn SpawnProvider,
    ) -> DamageOutcome {
        if vehicle.respawned_at_tick == Some(tick) {
            return DamageOutcome::Ignored;
        }

        vehicle.health -= damage;
        if vehicle.health <= 0.0 {
            let at = vehicle.position;
            let respawn = spawns.find_spawnpoint(vehicle.variant);
            Self::respawn(vehicle, respawn, tick);
            return DamageOutcome::Destroyed { at, respawn };
        }

        if shake {
            VehicleSimulator::start_impulse(
                vehicle,
                impact_point,
                HIT_SHAKE_STRENGTH,
                IMPULSE_DURATION,
            );
        }
        DamageOutcome::Damaged {
            health: vehicle.health,
        }
    }

    /// Reset a tank in place at a spawn point
    pub fn respawn(vehicle: &mut Vehicle, point: SpawnPoint, tick: u64) {
        let stats = vehicle.stats();
        vehicle.position = point.position;
        vehicle.yaw = point.yaw.rem_euclid(360.0);
        vehicle.turret = TurretState {
            target_yaw: vehicle.yaw,
            ..TurretState::default()
        };
        vehicle.local_velocity = Vec3::ZERO;
        vehicle.target_velocity = Vec3::ZERO;
        vehicle.rotation_rate = 0.0;
        vehicle.target_rotation_rate = 0.0;
        vehicle.velocity = Vec3::ZERO;
        vehicle.knockback = Vec3::ZERO;
        vehicle.impulse = None;
        vehicle.wheel_spin = 0.0;
        vehicle.health = stats.max_health;
        vehicle.ammo = MAGAZINE_CAPACITY;
        vehicle.reload_remaining = 0.0;
        vehicle.respawned_at_tick = Some(tick);
    }
}
