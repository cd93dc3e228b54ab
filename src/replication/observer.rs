//! Observer side: shadow copies, cosmetic timers and client control state

use std::collections::{HashMap, HashSet, VecDeque};

use glam::Vec3;

use crate::game::intent::{Intent, TurretAim};
use crate::game::registry::EntityRegistry;
use crate::game::vehicle::{Seat, TankStats, TankVariant, VehicleId, MAGAZINE_CAPACITY};

use super::{
    EventEnvelope, EventId, FieldKey, FieldTarget, FieldUpdate, FieldValue, FullState,
    GameEvent, VehicleSpawn,
};

/// Wheel animation degrees per unit of wheel spin per second
pub const WHEEL_ANGLE_RATE: f32 = 300.0;
pub const BARREL_RECOIL_SPEED: f32 = 10.0;
pub const BARREL_RECOIL_TIME: f32 = 0.05;
pub const BARREL_RECOIL_MAX: f32 = 0.5;
pub const BARREL_RETURN_SPEED: f32 = 1.0;
pub const EXPLOSION_LIFETIME: f32 = 5.0;

/// Event ids remembered for de-duplication
const SEEN_EVENT_CAPACITY: usize = 256;

/// Presentation-only animation state for one shadow vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cosmetics {
    /// Accumulated wheel rotation, degrees
    pub wheel_angle: f32,
    /// How far the barrel is pushed back
    pub barrel_offset: f32,
    pub recoil_remaining: f32,
}

/// Observer-local copy of a vehicle. Written only by authority messages.
#[derive(Debug, Clone)]
pub struct ShadowVehicle {
    pub id: VehicleId,
    pub variant: TankVariant,
    pub position: Vec3,
    pub yaw: f32,
    pub turret_yaw: f32,
    pub turret_pitch: f32,
    pub wheel_spin: f32,
    pub health: f32,
    pub ammo: u8,
    pub driver_open: bool,
    pub gunner_open: bool,
    pub cosmetics: Cosmetics,
    applied_seq: HashMap<FieldKey, u64>,
}

impl ShadowVehicle {
    fn new(spawn: VehicleSpawn) -> Self {
        Self {
            id: spawn.vehicle_id,
            variant: spawn.variant,
            position: Vec3::ZERO,
            yaw: 0.0,
            turret_yaw: 0.0,
            turret_pitch: 0.0,
            wheel_spin: 0.0,
            health: TankStats::for_variant(spawn.variant).max_health,
            ammo: MAGAZINE_CAPACITY,
            driver_open: true,
            gunner_open: true,
            cosmetics: Cosmetics::default(),
            applied_seq: HashMap::new(),
        }
    }

    fn apply(&mut self, seq: u64, value: &FieldValue) -> bool {
        let key = value.key();
        if self.applied_seq.get(&key).is_some_and(|&applied| applied >= seq) {
            return false;
        }
        match value {
            FieldValue::Position(p) => self.position = *p,
            FieldValue::Yaw(y) => self.yaw = *y,
            FieldValue::Turret { yaw, pitch } => {
                self.turret_yaw = *yaw;
                self.turret_pitch = *pitch;
            }
            FieldValue::WheelSpin(s) => self.wheel_spin = *s,
            FieldValue::Health(h) => self.health = *h,
            FieldValue::Ammo(a) => self.ammo = *a,
            FieldValue::Seats {
                driver_open,
                gunner_open,
            } => {
                self.driver_open = *driver_open;
                self.gunner_open = *gunner_open;
            }
            // Session-level field; never addressed to a vehicle
            FieldValue::Roster(_) => return false,
        }
        self.applied_seq.insert(key, seq);
        true
    }

    pub fn health_fraction(&self) -> f32 {
        (self.health / TankStats::for_variant(self.variant).max_health).clamp(0.0, 1.0)
    }

    fn advance(&mut self, dt: f32) {
        let c = &mut self.cosmetics;
        c.wheel_angle = (c.wheel_angle + self.wheel_spin * dt * WHEEL_ANGLE_RATE).rem_euclid(360.0);
        if c.recoil_remaining > 0.0 {
            c.barrel_offset = (c.barrel_offset + BARREL_RECOIL_SPEED * dt).min(BARREL_RECOIL_MAX);
            c.recoil_remaining -= dt;
        } else {
            c.barrel_offset = (c.barrel_offset - BARREL_RETURN_SPEED * dt).max(0.0);
        }
    }
}

/// A running explosion effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Explosion {
    pub point: Vec3,
    pub remaining: f32,
}

/// Values the presentation layer reads for one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct CosmeticSignals {
    pub wheel_spin: f32,
    pub wheel_angle: f32,
    /// 0 at rest, 1 fully recoiled
    pub barrel_recoil_phase: f32,
    pub health_fraction: f32,
    pub ammo_count: u8,
    pub roster: String,
}

/// Everything an observer knows about the session
#[derive(Debug, Default)]
pub struct ShadowWorld {
    vehicles: EntityRegistry<ShadowVehicle>,
    roster: String,
    roster_seq: u64,
    seen_events: HashSet<EventId>,
    seen_order: VecDeque<EventId>,
    pending_events: Vec<GameEvent>,
    explosions: Vec<Explosion>,
}

impl ShadowWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&ShadowVehicle> {
        self.vehicles.get(id)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &ShadowVehicle> {
        self.vehicles.values()
    }

    pub fn roster(&self) -> &str {
        &self.roster
    }

    pub fn explosions(&self) -> &[Explosion] {
        &self.explosions
    }

    /// Start shadowing a vehicle; an already known id keeps its state
    pub fn spawn(&mut self, spawn: VehicleSpawn) {
        if !self.vehicles.contains(spawn.vehicle_id) {
            self.vehicles
                .insert(spawn.vehicle_id, ShadowVehicle::new(spawn));
        }
    }

    pub fn despawn(&mut self, vehicle_id: VehicleId) {
        self.vehicles.remove(vehicle_id);
    }

    /// Apply one field write. Returns false if it was stale or unaddressed.
    pub fn apply_update(&mut self, update: &FieldUpdate) -> bool {
        match (update.target, &update.value) {
            (FieldTarget::Session, FieldValue::Roster(roster)) => {
                if update.seq <= self.roster_seq {
                    return false;
                }
                self.roster_seq = update.seq;
                self.roster.clone_from(roster);
                true
            }
            (FieldTarget::Session, _) => false,
            (FieldTarget::Vehicle(id), value) => self
                .vehicles
                .get_mut(id)
                .is_some_and(|vehicle| vehicle.apply(update.seq, value)),
        }
    }

    /// Handle an event the first time its id is seen
    pub fn apply_event(&mut self, envelope: &EventEnvelope) -> bool {
        if !self.seen_events.insert(envelope.id) {
            return false;
        }
        self.seen_order.push_back(envelope.id);
        if self.seen_order.len() > SEEN_EVENT_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen_events.remove(&oldest);
            }
        }

        match &envelope.event {
            GameEvent::Fired { vehicle_id, .. } => {
                if let Some(vehicle) = self.vehicles.get_mut(*vehicle_id) {
                    vehicle.cosmetics.recoil_remaining = BARREL_RECOIL_TIME;
                }
            }
            GameEvent::ProjectileExploded { point, .. } => self.explosions.push(Explosion {
                point: *point,
                remaining: EXPLOSION_LIFETIME,
            }),
            GameEvent::Hit { .. } | GameEvent::Destroyed { .. } => {}
        }
        self.pending_events.push(envelope.event.clone());
        true
    }

    /// Rebuild from a full state. Vehicles missing from it are dropped.
    pub fn apply_full_state(&mut self, state: &FullState) {
        for id in self.vehicles.ids() {
            if !state.vehicles.iter().any(|s| s.vehicle_id == id) {
                self.vehicles.remove(id);
            }
        }
        for spawn in &state.vehicles {
            self.spawn(*spawn);
        }
        for update in &state.updates {
            self.apply_update(update);
        }
        for event in &state.events {
            self.apply_event(event);
        }
    }

    /// Events not yet consumed by presentation
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Run cosmetic timers
    pub fn advance(&mut self, dt: f32) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.advance(dt);
        }
        for explosion in &mut self.explosions {
            explosion.remaining -= dt;
        }
        self.explosions.retain(|e| e.remaining > 0.0);
    }

    pub fn signals(&self, vehicle_id: VehicleId) -> Option<CosmeticSignals> {
        let vehicle = self.vehicles.get(vehicle_id)?;
        Some(CosmeticSignals {
            wheel_spin: vehicle.wheel_spin,
            wheel_angle: vehicle.cosmetics.wheel_angle,
            barrel_recoil_phase: vehicle.cosmetics.barrel_offset / BARREL_RECOIL_MAX,
            health_fraction: vehicle.health_fraction(),
            ammo_count: vehicle.ammo,
            roster: self.roster.clone(),
        })
    }
}

/// Client-side control state for the local actor.
///
/// Movement intents are only produced when they differ from the last one
/// sent; everything resets when the seat is revoked.
#[derive(Debug, Default)]
pub struct ControlState {
    seat: Option<(VehicleId, Seat)>,
    last_velocity: Option<Vec3>,
    last_rotation: Option<f32>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seat(&self) -> Option<(VehicleId, Seat)> {
        self.seat
    }

    pub fn granted(&mut self, vehicle_id: VehicleId, seat: Seat) {
        *self = Self {
            seat: Some((vehicle_id, seat)),
            ..Self::default()
        };
    }

    pub fn revoked(&mut self) {
        *self = Self::default();
    }

    fn holds(&self, seat: Seat) -> bool {
        self.seat.is_some_and(|(_, held)| held == seat)
    }

    pub fn linear_velocity(&mut self, velocity: Vec3) -> Option<Intent> {
        if !self.holds(Seat::Driver) || self.last_velocity == Some(velocity) {
            return None;
        }
        self.last_velocity = Some(velocity);
        Some(Intent::SetLinearVelocity(velocity))
    }

    pub fn rotation_rate(&mut self, rate: f32) -> Option<Intent> {
        if !self.holds(Seat::Driver) || self.last_rotation == Some(rate) {
            return None;
        }
        self.last_rotation = Some(rate);
        Some(Intent::SetRotationRate(rate))
    }

    pub fn aim(&mut self, yaw: f32, pitch: f32) -> Option<Intent> {
        if !self.holds(Seat::Gunner) || (yaw == 0.0 && pitch == 0.0) {
            return None;
        }
        Some(Intent::SetTurretAim(TurretAim::Delta { yaw, pitch }))
    }

    pub fn fire(&self) -> Option<Intent> {
        self.holds(Seat::Gunner).then_some(Intent::Fire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combat::ProjectileId;

    fn world_with_tank() -> (ShadowWorld, VehicleId) {
        let mut world = ShadowWorld::new();
        let id = VehicleId(1);
        world.spawn(VehicleSpawn {
            vehicle_id: id,
            variant: TankVariant::T34,
        });
        (world, id)
    }

    fn update(seq: u64, id: VehicleId, value: FieldValue) -> FieldUpdate {
        FieldUpdate {
            seq,
            target: FieldTarget::Vehicle(id),
            value,
        }
    }

    #[test]
    fn stale_field_writes_are_ignored() {
        let (mut world, id) = world_with_tank();
        assert!(world.apply_update(&update(5, id, FieldValue::Health(400.0))));
        assert!(!world.apply_update(&update(3, id, FieldValue::Health(900.0))));
        // Other fields keep their own ordering
        assert!(world.apply_update(&update(4, id, FieldValue::Ammo(0))));

        let tank = world.vehicle(id).unwrap();
        assert_eq!(tank.health, 400.0);
        assert_eq!(tank.ammo, 0);
    }

    #[test]
    fn updates_for_unknown_vehicles_are_dropped() {
        let mut world = ShadowWorld::new();
        assert!(!world.apply_update(&update(1, VehicleId(7), FieldValue::Yaw(10.0))));
    }

    #[test]
    fn events_are_handled_once() {
        let (mut world, id) = world_with_tank();
        let envelope = EventEnvelope {
            id: EventId(10),
            tick: 1,
            event: GameEvent::Fired {
                vehicle_id: id,
                projectile_id: ProjectileId(1),
                muzzle: Vec3::ZERO,
                direction: Vec3::Z,
                speed: 25.0,
            },
        };
        assert!(world.apply_event(&envelope));
        assert!(!world.apply_event(&envelope));
        assert_eq!(world.take_events().len(), 1);
        // Ammo only changes through its own field
        assert_eq!(world.vehicle(id).unwrap().ammo, MAGAZINE_CAPACITY);
    }

    #[test]
    fn barrel_recoils_then_returns() {
        let (mut world, id) = world_with_tank();
        world.apply_event(&EventEnvelope {
            id: EventId(1),
            tick: 1,
            event: GameEvent::Fired {
                vehicle_id: id,
                projectile_id: ProjectileId(1),
                muzzle: Vec3::ZERO,
                direction: Vec3::Z,
                speed: 25.0,
            },
        });

        for _ in 0..5 {
            world.advance(0.01);
        }
        let phase = world.signals(id).unwrap().barrel_recoil_phase;
        assert!(phase > 0.9 && phase <= 1.0, "phase {phase}");

        for _ in 0..100 {
            world.advance(0.01);
        }
        assert_eq!(world.signals(id).unwrap().barrel_recoil_phase, 0.0);
    }

    #[test]
    fn impacts_leave_an_explosion_that_expires() {
        let (mut world, id) = world_with_tank();
        world.apply_event(&EventEnvelope {
            id: EventId(2),
            tick: 1,
            event: GameEvent::ProjectileExploded {
                projectile_id: ProjectileId(4),
                point: Vec3::ONE,
            },
        });
        assert_eq!(
            world.explosions(),
            &[Explosion {
                point: Vec3::ONE,
                remaining: EXPLOSION_LIFETIME,
            }]
        );

        // The kill itself adds no second effect
        world.apply_event(&EventEnvelope {
            id: EventId(3),
            tick: 1,
            event: GameEvent::Destroyed {
                vehicle_id: id,
                at: Vec3::ONE,
                respawn: Vec3::ZERO,
            },
        });
        assert_eq!(world.explosions().len(), 1);
        world.advance(4.0);
        assert_eq!(world.explosions().len(), 1);
        world.advance(1.5);
        assert!(world.explosions().is_empty());
    }

    #[test]
    fn health_fraction_tracks_the_health_field() {
        let (mut world, id) = world_with_tank();
        assert_eq!(world.signals(id).unwrap().health_fraction, 1.0);
        world.apply_update(&update(1, id, FieldValue::Health(250.0)));
        assert!((world.signals(id).unwrap().health_fraction - 0.25).abs() < 1e-6);
    }

    #[test]
    fn wheel_angle_accumulates() {
        let (mut world, id) = world_with_tank();
        world.apply_update(&update(1, id, FieldValue::WheelSpin(0.5)));
        world.advance(0.5);
        assert!((world.signals(id).unwrap().wheel_angle - 75.0).abs() < 1e-3);
    }

    #[test]
    fn control_state_sends_only_changes() {
        let mut control = ControlState::new();
        assert_eq!(control.linear_velocity(Vec3::Z), None);

        control.granted(VehicleId(1), Seat::Driver);
        assert_eq!(control.linear_velocity(Vec3::Z), Some(Intent::SetLinearVelocity(Vec3::Z)));
        assert_eq!(control.linear_velocity(Vec3::Z), None);
        assert_eq!(control.fire(), None);

        control.revoked();
        control.granted(VehicleId(1), Seat::Driver);
        assert!(control.linear_velocity(Vec3::Z).is_some());
    }
}
