//! Authority side: field diffing, sequencing and the recent-event ring

use std::collections::{BTreeMap, VecDeque};

use crate::game::registry::EntityRegistry;
use crate::game::vehicle::{Seat, Vehicle, VehicleId};

use super::{
    EventEnvelope, EventId, FieldKey, FieldTarget, FieldUpdate, FieldValue, FullState,
    GameEvent, VehicleSpawn,
};

/// Events kept for replay on resync
pub const RECENT_EVENT_CAPACITY: usize = 64;

/// Current replicated values for one vehicle
pub fn vehicle_fields(vehicle: &Vehicle) -> [FieldValue; 7] {
    [
        FieldValue::Position(vehicle.position),
        FieldValue::Yaw(vehicle.yaw),
        FieldValue::Turret {
            yaw: vehicle.turret.yaw,
            pitch: vehicle.turret.pitch,
        },
        FieldValue::WheelSpin(vehicle.wheel_spin),
        FieldValue::Health(vehicle.health),
        FieldValue::Ammo(vehicle.ammo),
        FieldValue::Seats {
            driver_open: vehicle.seats.is_available(Seat::Driver),
            gunner_open: vehicle.seats.is_available(Seat::Gunner),
        },
    ]
}

/// Diffs authoritative state against what was last sent
pub struct ReplicationLayer {
    last_sent: BTreeMap<(FieldTarget, FieldKey), FieldValue>,
    next_seq: u64,
    next_event_id: u64,
    recent_events: VecDeque<EventEnvelope>,
    tick_rate: u32,
    /// Field passes per second, never above the tick rate
    snapshot_rate: u32,
    /// Accumulates `snapshot_rate` per tick; a pass is due at `tick_rate`
    snapshot_credit: u32,
}

impl ReplicationLayer {
    pub fn new(tick_rate: u32, snapshot_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            last_sent: BTreeMap::new(),
            next_seq: 1,
            next_event_id: 1,
            recent_events: VecDeque::with_capacity(RECENT_EVENT_CAPACITY),
            tick_rate,
            snapshot_rate: snapshot_rate.clamp(1, tick_rate),
            snapshot_credit: 0,
        }
    }

    /// Check if it's time for a field pass
    pub fn should_send(&mut self) -> bool {
        self.snapshot_credit += self.snapshot_rate;
        if self.snapshot_credit >= self.tick_rate {
            self.snapshot_credit -= self.tick_rate;
            true
        } else {
            false
        }
    }

    /// Run a field pass on the next check (seat changes, respawns)
    pub fn force_next(&mut self) {
        self.snapshot_credit = self.tick_rate - self.snapshot_rate;
    }

    fn stamp(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn diff(&mut self, target: FieldTarget, value: FieldValue, out: &mut Vec<FieldUpdate>) {
        let key = (target, value.key());
        let changed = self
            .last_sent
            .get(&key)
            .map_or(true, |previous| value.differs_from(previous));
        if !changed {
            return;
        }
        let seq = self.stamp();
        self.last_sent.insert(key, value.clone());
        out.push(FieldUpdate { seq, target, value });
    }

    /// Field updates for everything that changed since the last pass
    pub fn collect_updates(
        &mut self,
        vehicles: &EntityRegistry<Vehicle>,
        roster: &str,
    ) -> Vec<FieldUpdate> {
        let mut updates = Vec::new();
        for (id, vehicle) in vehicles.iter() {
            for value in vehicle_fields(vehicle) {
                self.diff(FieldTarget::Vehicle(id), value, &mut updates);
            }
        }
        self.diff(
            FieldTarget::Session,
            FieldValue::Roster(roster.to_string()),
            &mut updates,
        );
        updates
    }

    /// Stop tracking a despawned vehicle
    pub fn forget_vehicle(&mut self, vehicle_id: VehicleId) {
        self.last_sent
            .retain(|(target, _), _| *target != FieldTarget::Vehicle(vehicle_id));
    }

    /// Assign ids to this tick's events and remember them for resync
    pub fn publish_events(&mut self, tick: u64, events: Vec<GameEvent>) -> Vec<EventEnvelope> {
        events
            .into_iter()
            .map(|event| {
                let envelope = EventEnvelope {
                    id: EventId(self.next_event_id),
                    tick,
                    event,
                };
                self.next_event_id += 1;
                if self.recent_events.len() == RECENT_EVENT_CAPACITY {
                    self.recent_events.pop_front();
                }
                self.recent_events.push_back(envelope.clone());
                envelope
            })
            .collect()
    }

    /// Current value of every field, stamped newer than anything sent so far
    pub fn full_state(
        &mut self,
        tick: u64,
        vehicles: &EntityRegistry<Vehicle>,
        roster: &str,
    ) -> FullState {
        let mut updates = Vec::new();
        let mut spawns = Vec::with_capacity(vehicles.len());
        for (id, vehicle) in vehicles.iter() {
            spawns.push(VehicleSpawn {
                vehicle_id: id,
                variant: vehicle.variant,
            });
            for value in vehicle_fields(vehicle) {
                let seq = self.stamp();
                updates.push(FieldUpdate {
                    seq,
                    target: FieldTarget::Vehicle(id),
                    value,
                });
            }
        }
        let seq = self.stamp();
        updates.push(FieldUpdate {
            seq,
            target: FieldTarget::Session,
            value: FieldValue::Roster(roster.to_string()),
        });

        FullState {
            tick,
            vehicles: spawns,
            updates,
            events: self.recent_events.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::vehicle::TankVariant;
    use glam::Vec3;

    fn one_tank() -> (EntityRegistry<Vehicle>, VehicleId) {
        let mut vehicles = EntityRegistry::new();
        let id = vehicles.spawn_with(|id| Vehicle::new(id, TankVariant::T34, Vec3::ZERO, 0.0));
        (vehicles, id)
    }

    #[test]
    fn first_pass_sends_everything_then_only_changes() {
        let (mut vehicles, id) = one_tank();
        let mut layer = ReplicationLayer::new(30, 20);

        let first = layer.collect_updates(&vehicles, "roster");
        assert_eq!(first.len(), 8);
        assert!(first.windows(2).all(|w| w[0].seq < w[1].seq));

        assert!(layer.collect_updates(&vehicles, "roster").is_empty());

        if let Some(v) = vehicles.get_mut(id) {
            v.health = 650.0;
            v.position.x += 0.0001;
        }
        let second = layer.collect_updates(&vehicles, "roster");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].value, FieldValue::Health(650.0));
        assert!(second[0].seq > first[7].seq);
    }

    #[test]
    fn snapshot_interval_from_rates() {
        let mut layer = ReplicationLayer::new(30, 10);
        assert!(!layer.should_send());
        assert!(!layer.should_send());
        assert!(layer.should_send());

        layer.force_next();
        assert!(layer.should_send());
        assert!(!layer.should_send());
    }

    #[test]
    fn uneven_rates_hold_the_configured_snapshot_rate() {
        let mut layer = ReplicationLayer::new(30, 20);
        let sent = (0..30).filter(|_| layer.should_send()).count();
        assert_eq!(sent, 20);

        // Never more than one pass per tick
        let mut layer = ReplicationLayer::new(30, 60);
        assert!((0..30).all(|_| layer.should_send()));
    }

    #[test]
    fn event_ring_is_bounded() {
        let mut layer = ReplicationLayer::new(30, 30);
        let event = GameEvent::ProjectileExploded {
            projectile_id: crate::game::combat::ProjectileId(1),
            point: Vec3::ZERO,
        };
        let first = layer.publish_events(1, vec![event.clone()]);
        assert_eq!(first[0].id, EventId(1));
        for tick in 2..=(RECENT_EVENT_CAPACITY as u64 + 5) {
            layer.publish_events(tick, vec![event.clone()]);
        }

        let (vehicles, _) = one_tank();
        let state = layer.full_state(99, &vehicles, "");
        assert_eq!(state.events.len(), RECENT_EVENT_CAPACITY);
        assert!(state.events.iter().all(|e| e.id != EventId(1)));
    }

    #[test]
    fn full_state_outranks_earlier_updates() {
        let (vehicles, id) = one_tank();
        let mut layer = ReplicationLayer::new(30, 20);
        let sent = layer.collect_updates(&vehicles, "r");
        let max_sent = sent.iter().map(|u| u.seq).max().unwrap_or(0);

        let state = layer.full_state(1, &vehicles, "r");
        assert_eq!(state.vehicles[0].vehicle_id, id);
        assert!(state.updates.iter().all(|u| u.seq > max_sent));
    }
}
