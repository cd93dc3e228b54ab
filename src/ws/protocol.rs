//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::intent::{Intent, TurretAim};
use crate::game::vehicle::{ActorId, Seat, VehicleId};
use crate::replication::{EventEnvelope, FieldUpdate, FullState, VehicleSpawn};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ask for a seat, leaving any seat currently held
    Occupy { vehicle_id: VehicleId, seat: Seat },

    /// Give up the held seat
    Vacate,

    /// Driver: desired hull-frame velocity, each axis in -1..=1 (z forward)
    SetLinearVelocity { vehicle_id: VehicleId, velocity: Vec3 },

    /// Driver: desired hull rotation, -1..=1
    SetRotationRate { vehicle_id: VehicleId, rate: f32 },

    /// Gunner: turret aim, absolute or delta
    SetTurretAim { vehicle_id: VehicleId, aim: TurretAim },

    /// Gunner: fire the main gun
    Fire { vehicle_id: VehicleId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the session
    Leave,
}

impl ClientMsg {
    /// The control intent carried by this message, if any
    pub fn intent(&self) -> Option<(VehicleId, Intent)> {
        match *self {
            ClientMsg::SetLinearVelocity {
                vehicle_id,
                velocity,
            } => Some((vehicle_id, Intent::SetLinearVelocity(velocity))),
            ClientMsg::SetRotationRate { vehicle_id, rate } => {
                Some((vehicle_id, Intent::SetRotationRate(rate)))
            }
            ClientMsg::SetTurretAim { vehicle_id, aim } => {
                Some((vehicle_id, Intent::SetTurretAim(aim)))
            }
            ClientMsg::Fire { vehicle_id } => Some((vehicle_id, Intent::Fire)),
            _ => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        actor_id: ActorId,
        session_id: Uuid,
        server_time: u64,
    },

    /// Complete replicated state (on join and after falling behind)
    FullState {
        /// Connection the state is for; `None` goes to everyone
        recipient: Option<ActorId>,
        state: FullState,
    },

    VehicleSpawned { spawn: VehicleSpawn },

    VehicleDespawned { vehicle_id: VehicleId },

    /// Changed fields since the previous pass
    FieldUpdates { tick: u64, updates: Vec<FieldUpdate> },

    /// One-shot events from a tick
    Events { events: Vec<EventEnvelope> },

    SeatGranted {
        actor_id: ActorId,
        vehicle_id: VehicleId,
        seat: Seat,
    },

    SeatRejected {
        actor_id: ActorId,
        vehicle_id: VehicleId,
        seat: Seat,
        /// Machine-readable reason ("seat_taken", "unknown_vehicle", ...)
        reason: String,
    },

    /// The actor no longer holds this seat (vacated, evicted or despawned)
    SeatRevoked {
        actor_id: ActorId,
        vehicle_id: VehicleId,
        seat: Seat,
    },

    /// Error message
    Error {
        recipient: Option<ActorId>,
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        actor_id: ActorId,
        /// Echo back client timestamp
        t: u64,
    },

    /// The session is shutting down
    SessionEnded { reason: String },
}

impl ServerMsg {
    /// Actor this message is addressed to; `None` means every observer
    pub fn recipient(&self) -> Option<ActorId> {
        match self {
            ServerMsg::Welcome { actor_id, .. }
            | ServerMsg::SeatGranted { actor_id, .. }
            | ServerMsg::SeatRejected { actor_id, .. }
            | ServerMsg::SeatRevoked { actor_id, .. }
            | ServerMsg::Pong { actor_id, .. } => Some(*actor_id),
            ServerMsg::FullState { recipient, .. } | ServerMsg::Error { recipient, .. } => {
                *recipient
            }
            _ => None,
        }
    }

    /// Whether the connection for `actor` should forward this message
    pub fn is_for(&self, actor: ActorId) -> bool {
        self.recipient().map_or(true, |recipient| recipient == actor)
    }
}
