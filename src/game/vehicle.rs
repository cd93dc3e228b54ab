//! Vehicle state, seats and per-variant tuning

use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable vehicle identifier, assigned by the authority at spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection-scoped actor identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Crew positions on a tank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Driver,
    Gunner,
}

impl Seat {
    pub const ALL: [Seat; 2] = [Seat::Driver, Seat::Gunner];

    fn index(self) -> usize {
        match self {
            Seat::Driver => 0,
            Seat::Gunner => 1,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seat::Driver => f.write_str("driver"),
            Seat::Gunner => f.write_str("gunner"),
        }
    }
}

/// Occupants of both seats.
///
/// Availability is derived from the occupant slot, so the two can never
/// disagree. Only the occupancy manager writes here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeatTable {
    occupants: [Option<ActorId>; 2],
}

impl SeatTable {
    pub fn occupant(&self, seat: Seat) -> Option<ActorId> {
        self.occupants[seat.index()]
    }

    pub fn is_available(&self, seat: Seat) -> bool {
        self.occupants[seat.index()].is_none()
    }

    pub fn is_occupied(&self, seat: Seat) -> bool {
        !self.is_available(seat)
    }

    /// Availability flags in seat order (driver, gunner)
    pub fn availability(&self) -> [bool; 2] {
        [self.is_available(Seat::Driver), self.is_available(Seat::Gunner)]
    }

    pub(crate) fn set(&mut self, seat: Seat, occupant: Option<ActorId>) -> Option<ActorId> {
        std::mem::replace(&mut self.occupants[seat.index()], occupant)
    }
}

/// Tank models in the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TankVariant {
    T34,
    Panzer4,
}

impl FromStr for TankVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t34" => Ok(Self::T34),
            "panzer4" => Ok(Self::Panzer4),
            other => Err(format!("unknown tank variant: {other}")),
        }
    }
}

/// Tank tuning per variant
#[derive(Debug, Clone, Copy)]
pub struct TankStats {
    /// Ground speed at full throttle (units/s)
    pub tank_speed: f32,
    /// Hull yaw rate at full rotation input (degrees/s)
    pub rotation_speed: f32,
    /// Turret traverse rate (degrees/s)
    pub turret_rotation_speed: f32,
    pub max_health: f32,
    /// Half extents of the armor box, in the hull frame
    pub armor_half_extents: Vec3,
    /// Armor box center above the hull origin
    pub armor_center_height: f32,
    /// Radius used to keep hulls apart
    pub hull_radius: f32,
    /// Muzzle position in the turret frame
    pub muzzle_offset: Vec3,
}

pub const MAX_HEALTH: f32 = 1000.0;
pub const MAGAZINE_CAPACITY: u8 = 1;
pub const TURRET_PITCH_LIMIT: f32 = 15.0;

impl TankStats {
    pub fn for_variant(variant: TankVariant) -> Self {
        match variant {
            TankVariant::T34 => Self {
                tank_speed: 5.0,
                rotation_speed: 35.0,
                turret_rotation_speed: 35.0,
                max_health: MAX_HEALTH,
                armor_half_extents: Vec3::new(1.5, 1.1, 3.0),
                armor_center_height: 1.1,
                hull_radius: 2.0,
                muzzle_offset: Vec3::new(0.0, 2.0, 4.2),
            },
            TankVariant::Panzer4 => Self {
                tank_speed: 5.0,
                rotation_speed: 35.0,
                turret_rotation_speed: 35.0,
                max_health: MAX_HEALTH,
                armor_half_extents: Vec3::new(1.45, 1.2, 2.95),
                armor_center_height: 1.2,
                hull_radius: 2.0,
                muzzle_offset: Vec3::new(0.0, 2.1, 3.9),
            },
        }
    }
}

/// Turret orientation, in degrees, relative to the hull
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurretState {
    pub yaw: f32,
    pub pitch: f32,
    /// World-space heading the gunner is aiming at
    pub target_yaw: f32,
    /// Pitch change waiting for the next tick
    pub pending_pitch: f32,
}

/// Short-lived push applied over several ticks (shake, recoil)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impulse {
    pub origin: Vec3,
    /// Acceleration at the origin (units/s^2), falling off with distance
    pub strength: f32,
    pub remaining: f32,
}

/// Authoritative tank state
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub variant: TankVariant,

    pub position: Vec3,
    /// Hull yaw in degrees, 0..360
    pub yaw: f32,
    pub turret: TurretState,

    /// Current velocity in the hull frame, in throttle units (x lateral, z forward)
    pub local_velocity: Vec3,
    pub target_velocity: Vec3,
    pub rotation_rate: f32,
    pub target_rotation_rate: f32,
    /// World-space velocity produced by the last simulation step
    pub velocity: Vec3,
    /// Cosmetic push from impulses, horizontal only
    pub knockback: Vec3,
    pub impulse: Option<Impulse>,
    /// Forward speed, replicated to animate wheels
    pub wheel_spin: f32,

    pub health: f32,
    pub ammo: u8,
    pub reload_remaining: f32,

    pub seats: SeatTable,

    /// Tick of the last destroyed/respawn transition
    pub respawned_at_tick: Option<u64>,
}

impl Vehicle {
    pub fn new(id: VehicleId, variant: TankVariant, position: Vec3, yaw: f32) -> Self {
        let stats = TankStats::for_variant(variant);
        let yaw = yaw.rem_euclid(360.0);
        Self {
            id,
            variant,
            position,
            yaw,
            turret: TurretState {
                target_yaw: yaw,
                ..TurretState::default()
            },
            local_velocity: Vec3::ZERO,
            target_velocity: Vec3::ZERO,
            rotation_rate: 0.0,
            target_rotation_rate: 0.0,
            velocity: Vec3::ZERO,
            knockback: Vec3::ZERO,
            impulse: None,
            wheel_spin: 0.0,
            health: stats.max_health,
            ammo: MAGAZINE_CAPACITY,
            reload_remaining: 0.0,
            seats: SeatTable::default(),
            respawned_at_tick: None,
        }
    }

    pub fn stats(&self) -> TankStats {
        TankStats::for_variant(self.variant)
    }

    /// World-space yaw of the turret
    pub fn turret_world_yaw(&self) -> f32 {
        (self.yaw + self.turret.yaw).rem_euclid(360.0)
    }
}
