//! Replication of authoritative state to observers
//!
//! Two kinds of traffic leave the authority:
//! - field updates, last-write-wins per (target, field), ordered by `seq`
//! - one-shot events for presentation, delivered at least once and
//!   de-duplicated by id on the observer

pub mod authority;
pub mod observer;

pub use authority::ReplicationLayer;
pub use observer::{ControlState, CosmeticSignals, ShadowVehicle, ShadowWorld};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::combat::ProjectileId;
use crate::game::vehicle::{TankVariant, VehicleId};

/// What a replicated field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum FieldTarget {
    Session,
    Vehicle(VehicleId),
}

/// Replicated field identity, independent of its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Position,
    Yaw,
    Turret,
    WheelSpin,
    Health,
    Ammo,
    Seats,
    Roster,
}

/// A replicated value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Position(Vec3),
    Yaw(f32),
    Turret { yaw: f32, pitch: f32 },
    WheelSpin(f32),
    Health(f32),
    Ammo(u8),
    Seats { driver_open: bool, gunner_open: bool },
    Roster(String),
}

const POSITION_EPSILON: f32 = 1e-3;
const ANGLE_EPSILON: f32 = 1e-2;
const SCALAR_EPSILON: f32 = 1e-3;

impl FieldValue {
    pub fn key(&self) -> FieldKey {
        match self {
            FieldValue::Position(_) => FieldKey::Position,
            FieldValue::Yaw(_) => FieldKey::Yaw,
            FieldValue::Turret { .. } => FieldKey::Turret,
            FieldValue::WheelSpin(_) => FieldKey::WheelSpin,
            FieldValue::Health(_) => FieldKey::Health,
            FieldValue::Ammo(_) => FieldKey::Ammo,
            FieldValue::Seats { .. } => FieldKey::Seats,
            FieldValue::Roster(_) => FieldKey::Roster,
        }
    }

    /// Whether the change from `previous` is worth sending
    pub fn differs_from(&self, previous: &FieldValue) -> bool {
        match (self, previous) {
            (FieldValue::Position(a), FieldValue::Position(b)) => {
                a.distance_squared(*b) > POSITION_EPSILON * POSITION_EPSILON
            }
            (FieldValue::Yaw(a), FieldValue::Yaw(b)) => (a - b).abs() > ANGLE_EPSILON,
            (
                FieldValue::Turret { yaw: ay, pitch: ap },
                FieldValue::Turret { yaw: by, pitch: bp },
            ) => (ay - by).abs() > ANGLE_EPSILON || (ap - bp).abs() > ANGLE_EPSILON,
            (FieldValue::WheelSpin(a), FieldValue::WheelSpin(b)) => (a - b).abs() > SCALAR_EPSILON,
            // Gameplay values replicate on any change
            _ => self != previous,
        }
    }
}

/// One field write, stamped with the authority's global sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub seq: u64,
    pub target: FieldTarget,
    pub value: FieldValue,
}

/// Identity of a vehicle an observer should create a shadow for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpawn {
    pub vehicle_id: VehicleId,
    pub variant: TankVariant,
}

/// One-shot notifications for presentation. Never used to mutate replicated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Fired {
        vehicle_id: VehicleId,
        projectile_id: ProjectileId,
        muzzle: Vec3,
        direction: Vec3,
        speed: f32,
    },
    Hit {
        vehicle_id: VehicleId,
        shooter_id: VehicleId,
        projectile_id: ProjectileId,
        point: Vec3,
        damage: f32,
    },
    Destroyed {
        vehicle_id: VehicleId,
        at: Vec3,
        respawn: Vec3,
    },
    ProjectileExploded {
        projectile_id: ProjectileId,
        point: Vec3,
    },
}

impl GameEvent {
    /// Vehicle the event is about, if any
    pub fn vehicle_id(&self) -> Option<VehicleId> {
        match self {
            GameEvent::Fired { vehicle_id, .. }
            | GameEvent::Hit { vehicle_id, .. }
            | GameEvent::Destroyed { vehicle_id, .. } => Some(*vehicle_id),
            GameEvent::ProjectileExploded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// An event as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub tick: u64,
    pub event: GameEvent,
}

/// Everything an observer needs to rebuild its shadow copy from scratch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    pub tick: u64,
    pub vehicles: Vec<VehicleSpawn>,
    pub updates: Vec<FieldUpdate>,
    /// Recent events, replayed for observers that may have missed them
    pub events: Vec<EventEnvelope>,
}
