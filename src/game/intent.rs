//! Control intents and the per-tick intent buffer

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::vehicle::{ActorId, Seat, VehicleId};

/// Turret aim request, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TurretAim {
    /// World heading and elevation to aim at
    Absolute { yaw: f32, pitch: f32 },
    /// Change relative to the current aim
    Delta { yaw: f32, pitch: f32 },
}

/// A control request from a seat occupant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    /// Desired velocity in the hull frame, each axis in -1..=1 (z forward)
    SetLinearVelocity(Vec3),
    /// Desired hull rotation, -1 (left) ..= 1 (right)
    SetRotationRate(f32),
    SetTurretAim(TurretAim),
    Fire,
}

/// Buffer slot an intent lands in; later intents on a channel replace earlier ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlChannel {
    LinearVelocity,
    RotationRate,
    TurretAim,
    Fire,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntentError {
    #[error("intent carries a non-finite value")]
    NonFinite,

    #[error("unknown vehicle {0}")]
    UnknownVehicle(VehicleId),
}

impl Intent {
    pub fn channel(&self) -> ControlChannel {
        match self {
            Intent::SetLinearVelocity(_) => ControlChannel::LinearVelocity,
            Intent::SetRotationRate(_) => ControlChannel::RotationRate,
            Intent::SetTurretAim(_) => ControlChannel::TurretAim,
            Intent::Fire => ControlChannel::Fire,
        }
    }

    /// Seat whose occupant may issue this intent
    pub fn required_seat(&self) -> Seat {
        match self {
            Intent::SetLinearVelocity(_) | Intent::SetRotationRate(_) => Seat::Driver,
            Intent::SetTurretAim(_) | Intent::Fire => Seat::Gunner,
        }
    }

    /// Reject non-finite input and clamp ranges before it can reach the simulation
    pub fn validate(self) -> Result<Self, IntentError> {
        match self {
            Intent::SetLinearVelocity(v) => {
                if !v.is_finite() {
                    return Err(IntentError::NonFinite);
                }
                let v = Vec3::new(v.x, 0.0, v.z).clamp(Vec3::splat(-1.0), Vec3::splat(1.0));
                Ok(Intent::SetLinearVelocity(v))
            }
            Intent::SetRotationRate(rate) => {
                if !rate.is_finite() {
                    return Err(IntentError::NonFinite);
                }
                Ok(Intent::SetRotationRate(rate.clamp(-1.0, 1.0)))
            }
            Intent::SetTurretAim(aim) => {
                let (yaw, pitch) = match aim {
                    TurretAim::Absolute { yaw, pitch } | TurretAim::Delta { yaw, pitch } => {
                        (yaw, pitch)
                    }
                };
                if !yaw.is_finite() || !pitch.is_finite() {
                    return Err(IntentError::NonFinite);
                }
                Ok(self)
            }
            Intent::Fire => Ok(self),
        }
    }
}

/// Latest intent per channel from one sender
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedIntent {
    pub actor: ActorId,
    pub intent: Intent,
}

/// Intents received between ticks, applied together at the start of the next one.
///
/// Each sender gets its own slot per channel, so a sender without the seat
/// cannot displace the occupant's pending intent.
#[derive(Debug, Default)]
pub struct IntentBuffer {
    latest: BTreeMap<(VehicleId, ControlChannel, ActorId), Intent>,
}

impl IntentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store an intent, replacing the sender's previous one on its channel.
    ///
    /// Aim deltas accumulate so that no turret movement is
    /// lost between ticks.
    pub fn submit(
        &mut self,
        actor: ActorId,
        vehicle_id: VehicleId,
        intent: Intent,
    ) -> Result<(), IntentError> {
        let intent = intent.validate()?;
        let key = (vehicle_id, intent.channel(), actor);

        let merged = match (self.latest.get(&key), intent) {
            (
                Some(Intent::SetTurretAim(prev)),
                Intent::SetTurretAim(TurretAim::Delta { yaw, pitch }),
            ) => Intent::SetTurretAim(match *prev {
                TurretAim::Absolute { yaw: y, pitch: p } => TurretAim::Absolute {
                    yaw: y + yaw,
                    pitch: p + pitch,
                },
                TurretAim::Delta { yaw: y, pitch: p } => TurretAim::Delta {
                    yaw: y + yaw,
                    pitch: p + pitch,
                },
            }),
            _ => intent,
        };

        self.latest.insert(key, merged);
        Ok(())
    }

    /// Take everything buffered, in vehicle then channel order
    pub fn drain(&mut self) -> Vec<(VehicleId, BufferedIntent)> {
        std::mem::take(&mut self.latest)
            .into_iter()
            .map(|((vehicle_id, _, actor), intent)| (vehicle_id, BufferedIntent { actor, intent }))
            .collect()
    }

    /// Drop pending intents for a vehicle that is going away
    pub fn discard_vehicle(&mut self, vehicle_id: VehicleId) {
        self.latest.retain(|(id, _, _), _| *id != vehicle_id);
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_intents_are_rejected() {
        let mut buffer = IntentBuffer::new();
        let actor = ActorId::new();
        assert_eq!(
            buffer.submit(actor, VehicleId(1), Intent::SetRotationRate(f32::NAN)),
            Err(IntentError::NonFinite)
        );
        assert_eq!(
            buffer.submit(
                actor,
                VehicleId(1),
                Intent::SetLinearVelocity(Vec3::new(0.0, 0.0, f32::INFINITY))
            ),
            Err(IntentError::NonFinite)
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn inputs_are_clamped() {
        assert_eq!(
            Intent::SetRotationRate(4.0).validate(),
            Ok(Intent::SetRotationRate(1.0))
        );
        assert_eq!(
            Intent::SetLinearVelocity(Vec3::new(-3.0, 5.0, 2.0)).validate(),
            Ok(Intent::SetLinearVelocity(Vec3::new(-1.0, 0.0, 1.0)))
        );
    }

    #[test]
    fn latest_intent_wins_per_channel() {
        let mut buffer = IntentBuffer::new();
        let actor = ActorId::new();
        let v = VehicleId(1);
        buffer.submit(actor, v, Intent::SetRotationRate(1.0)).unwrap();
        buffer.submit(actor, v, Intent::SetRotationRate(-1.0)).unwrap();
        buffer.submit(actor, v, Intent::Fire).unwrap();
        buffer.submit(actor, v, Intent::Fire).unwrap();

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].1.intent, Intent::SetRotationRate(-1.0));
        assert_eq!(drained[1].1.intent, Intent::Fire);
        assert!(buffer.is_empty());
    }

    #[test]
    fn aim_deltas_accumulate() {
        let mut buffer = IntentBuffer::new();
        let actor = ActorId::new();
        let v = VehicleId(3);
        let delta = |yaw, pitch| Intent::SetTurretAim(TurretAim::Delta { yaw, pitch });
        buffer.submit(actor, v, delta(5.0, 1.0)).unwrap();
        buffer.submit(actor, v, delta(5.0, 2.0)).unwrap();

        assert_eq!(buffer.drain()[0].1.intent, delta(10.0, 3.0));

        buffer
            .submit(actor, v, Intent::SetTurretAim(TurretAim::Absolute { yaw: 90.0, pitch: 0.0 }))
            .unwrap();
        buffer.submit(actor, v, delta(-10.0, 4.0)).unwrap();
        assert_eq!(
            buffer.drain()[0].1.intent,
            Intent::SetTurretAim(TurretAim::Absolute { yaw: 80.0, pitch: 4.0 })
        );
    }

    #[test]
    fn discarding_a_vehicle_keeps_others() {
        let mut buffer = IntentBuffer::new();
        let actor = ActorId::new();
        buffer.submit(actor, VehicleId(1), Intent::Fire).unwrap();
        buffer.submit(actor, VehicleId(2), Intent::Fire).unwrap();
        buffer.discard_vehicle(VehicleId(1));
        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, VehicleId(2));
    }

    #[test]
    fn senders_do_not_share_a_slot() {
        let mut buffer = IntentBuffer::new();
        let driver = ActorId::new();
        let bystander = ActorId::new();
        let v = VehicleId(1);
        buffer
            .submit(driver, v, Intent::SetLinearVelocity(Vec3::Z))
            .unwrap();
        buffer
            .submit(bystander, v, Intent::SetLinearVelocity(Vec3::ZERO))
            .unwrap();
        let delta = Intent::SetTurretAim(TurretAim::Delta { yaw: 5.0, pitch: 0.0 });
        buffer.submit(driver, v, delta).unwrap();
        buffer.submit(bystander, v, delta).unwrap();

        let drained = buffer.drain();
        assert_eq!(drained.len(), 4);
        assert!(drained.iter().any(|(_, b)| b.actor == driver
            && b.intent == Intent::SetLinearVelocity(Vec3::Z)));
        assert!(drained
            .iter()
            .filter(|(_, b)| b.intent.channel() == ControlChannel::TurretAim)
            .all(|(_, b)| b.intent == delta));
    }
}
