//! Session state and authoritative tick loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, MAX_TICK_RATE};
use crate::replication::{GameEvent, ReplicationLayer, VehicleSpawn};
use crate::util::time::TickClock;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::collision::{CollisionWorld, Contact, StaticGeometry};
use super::combat::{
    CollisionPolicy, CombatSystem, DamageOutcome, ImpactTarget, Projectile, ProjectileId,
    WeaponStats,
};
use super::intent::{Intent, IntentBuffer, IntentError, TurretAim};
use super::occupancy::{roster_string, Eviction, OccupancyError, OccupancyManager, SeatAssignment};
use super::physics::VehicleSimulator;
use super::registry::EntityRegistry;
use super::spawn::{SpawnPoint, SpawnProvider, SpawnTable};
use super::vehicle::{ActorId, Seat, TankVariant, Vehicle, VehicleId};

/// Input received from a connection
#[derive(Debug, Clone)]
pub struct ActorInput {
    pub actor_id: ActorId,
    pub msg: ClientMsg,
}

/// Everything the session task accepts
#[derive(Debug)]
pub enum SessionInput {
    Actor(ActorInput),
    /// Projectile contact reported by the physics substrate
    Contact(Contact),
    SpawnVehicle {
        variant: TankVariant,
        reply: oneshot::Sender<VehicleId>,
    },
    DespawnVehicle {
        vehicle_id: VehicleId,
        reply: oneshot::Sender<bool>,
    },
    /// Send the full state to one connection
    Resync { actor_id: ActorId },
}

/// Result of one simulation tick
#[derive(Debug, Default)]
pub struct TickOutput {
    pub tick: u64,
    pub events: Vec<GameEvent>,
    /// Occupants removed by destroyed transitions
    pub evictions: Vec<Eviction>,
}

/// The simulation context for one session. All mutation goes through here.
pub struct SessionState {
    pub id: Uuid,
    pub tick: u64,
    config: SessionConfig,
    weapon: WeaponStats,
    vehicles: EntityRegistry<Vehicle>,
    occupancy: OccupancyManager,
    intents: IntentBuffer,
    projectiles: Vec<Projectile>,
    contacts: Vec<Contact>,
    spawns: Box<dyn SpawnProvider>,
    world: Box<dyn CollisionWorld>,
    next_projectile_id: u64,
    roster: String,
}

impl SessionState {
    /// Session on flat ground with the default arena spawn points
    pub fn new(id: Uuid, config: SessionConfig) -> Self {
        let spawns = Box::new(SpawnTable::default_arena(config.seed));
        let world = Box::new(StaticGeometry::flat_ground(0.0));
        Self::with_collaborators(id, config, spawns, world)
    }

    pub fn with_collaborators(
        id: Uuid,
        config: SessionConfig,
        spawns: Box<dyn SpawnProvider>,
        world: Box<dyn CollisionWorld>,
    ) -> Self {
        let mut state = Self {
            id,
            tick: 0,
            weapon: WeaponStats::from_config(&config),
            vehicles: EntityRegistry::new(),
            occupancy: OccupancyManager::new(),
            intents: IntentBuffer::new(),
            projectiles: Vec::new(),
            contacts: Vec::new(),
            spawns,
            world,
            next_projectile_id: 1,
            roster: String::new(),
            config,
        };

        let roster = state.config.roster.clone();
        for entry in roster {
            state.spawn_vehicle(entry.variant, Some(SpawnPoint::new(entry.position, entry.yaw)));
        }
        state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn vehicles(&self) -> &EntityRegistry<Vehicle> {
        &self.vehicles
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn roster(&self) -> &str {
        &self.roster
    }

    pub fn assignment(&self, actor: ActorId) -> Option<SeatAssignment> {
        self.occupancy.assignment(actor)
    }

    /// Add a tank, at `point` or wherever the spawn provider says
    pub fn spawn_vehicle(&mut self, variant: TankVariant, point: Option<SpawnPoint>) -> VehicleId {
        let point = point.unwrap_or_else(|| self.spawns.find_spawnpoint(variant));
        let id = self
            .vehicles
            .spawn_with(|id| Vehicle::new(id, variant, point.position, point.yaw));
        self.occupancy.mark_roster_dirty();
        self.refresh_roster();

        info!(session_id = %self.id, vehicle_id = %id, ?variant, "Vehicle spawned");
        id
    }

    /// Remove a tank, evicting its crew. `None` if it does not exist.
    pub fn despawn_vehicle(&mut self, vehicle_id: VehicleId) -> Option<Vec<Eviction>> {
        if !self.vehicles.contains(vehicle_id) {
            return None;
        }
        let evictions = self.occupancy.force_vacate_all(&mut self.vehicles, vehicle_id);
        self.intents.discard_vehicle(vehicle_id);
        self.vehicles.remove(vehicle_id);
        self.occupancy.mark_roster_dirty();
        self.refresh_roster();

        info!(session_id = %self.id, vehicle_id = %vehicle_id, "Vehicle despawned");
        Some(evictions)
    }

    pub fn request_seat(
        &mut self,
        actor: ActorId,
        vehicle_id: VehicleId,
        seat: Seat,
    ) -> Result<Option<SeatAssignment>, OccupancyError> {
        let result = self
            .occupancy
            .request_seat(&mut self.vehicles, actor, vehicle_id, seat);
        self.refresh_roster();
        result
    }

    /// Release the actor's seat (explicit vacate, leave or disconnect)
    pub fn vacate_actor(&mut self, actor: ActorId) -> Option<Eviction> {
        let eviction = self.occupancy.leave(&mut self.vehicles, actor);
        if eviction.is_some() {
            debug!(
                session_id = %self.id,
                actor_id = %actor,
                seated = self.occupancy.seated_actors(),
                "Actor left their seat"
            );
        }
        self.refresh_roster();
        eviction
    }

    /// Buffer an intent for the next tick.
    ///
    /// Seat ownership is checked when the intent is applied, not here.
    pub fn submit_intent(
        &mut self,
        actor: ActorId,
        vehicle_id: VehicleId,
        intent: Intent,
    ) -> Result<(), IntentError> {
        if !self.vehicles.contains(vehicle_id) {
            return Err(IntentError::UnknownVehicle(vehicle_id));
        }
        self.intents.submit(actor, vehicle_id, intent)
    }

    /// Queue a contact from the physics substrate for the next tick
    pub fn report_contact(&mut self, contact: Contact) {
        if self.config.collision_policy == CollisionPolicy::Trigger {
            self.contacts.push(contact);
        } else {
            debug!(projectile_id = %contact.projectile_id, "Contact ignored under sweep policy");
        }
    }

    fn refresh_roster(&mut self) {
        if self.occupancy.take_roster_changed() {
            self.roster = roster_string(&self.vehicles);
        }
    }

    /// Advance the session by `dt` seconds
    pub fn run_tick(&mut self, dt: f32) -> TickOutput {
        self.tick += 1;
        let mut out = TickOutput {
            tick: self.tick,
            ..TickOutput::default()
        };

        // Reload runs first so a round that finishes loading can be fired this tick
        for vehicle in self.vehicles.values_mut() {
            CombatSystem::tick_reload(vehicle, dt);
        }

        let mut impacts: Vec<_> = std::mem::take(&mut self.contacts)
            .iter()
            .filter_map(|contact| CombatSystem::resolve_contact(&mut self.projectiles, contact))
            .collect();

        self.apply_intents(&mut out.events);

        for vehicle in self.vehicles.values_mut() {
            VehicleSimulator::step(vehicle, dt);
        }
        VehicleSimulator::separate_hulls(&mut self.vehicles);

        impacts.extend(CombatSystem::step_projectiles(
            &mut self.projectiles,
            &self.vehicles,
            self.world.as_ref(),
            self.config.collision_policy,
            self.weapon.projectile_radius,
            dt,
        ));

        for impact in impacts {
            out.events.push(GameEvent::ProjectileExploded {
                projectile_id: impact.projectile_id,
                point: impact.point,
            });

            let ImpactTarget::Vehicle(target) = impact.target else {
                continue;
            };
            if target == impact.sender {
                continue;
            }
            let Some(vehicle) = self.vehicles.get_mut(target) else {
                continue;
            };

            let outcome = CombatSystem::apply_damage(
                vehicle,
                self.weapon.damage,
                impact.point,
                true,
                self.tick,
                self.spawns.as_mut(),
            );
            if outcome == DamageOutcome::Ignored {
                continue;
            }

            out.events.push(GameEvent::Hit {
                vehicle_id: target,
                shooter_id: impact.sender,
                projectile_id: impact.projectile_id,
                point: impact.point,
                damage: self.weapon.damage,
            });

            if let DamageOutcome::Destroyed { at, respawn } = outcome {
                info!(
                    session_id = %self.id,
                    vehicle_id = %target,
                    shooter_id = %impact.sender,
                    "Vehicle destroyed"
                );
                out.events.push(GameEvent::Destroyed {
                    vehicle_id: target,
                    at,
                    respawn: respawn.position,
                });
                out.evictions
                    .extend(self.occupancy.force_vacate_all(&mut self.vehicles, target));
            }
        }

        self.refresh_roster();
        out
    }

    /// Apply buffered intents whose sender still holds the required seat
    fn apply_intents(&mut self, events: &mut Vec<GameEvent>) {
        for (vehicle_id, buffered) in self.intents.drain() {
            let intent = buffered.intent;
            if !OccupancyManager::holds(
                &self.vehicles,
                buffered.actor,
                vehicle_id,
                intent.required_seat(),
            ) {
                debug!(
                    actor_id = %buffered.actor,
                    vehicle_id = %vehicle_id,
                    channel = ?intent.channel(),
                    "Dropping intent from actor without the seat"
                );
                continue;
            }
            let Some(vehicle) = self.vehicles.get_mut(vehicle_id) else {
                continue;
            };

            match intent {
                Intent::SetLinearVelocity(velocity) => vehicle.target_velocity = velocity,
                Intent::SetRotationRate(rate) => vehicle.target_rotation_rate = rate,
                Intent::SetTurretAim(TurretAim::Absolute { yaw, pitch }) => {
                    vehicle.turret.target_yaw = yaw.rem_euclid(360.0);
                    vehicle.turret.pending_pitch = pitch - vehicle.turret.pitch;
                }
                Intent::SetTurretAim(TurretAim::Delta { yaw, pitch }) => {
                    vehicle.turret.target_yaw = (vehicle.turret.target_yaw + yaw).rem_euclid(360.0);
                    vehicle.turret.pending_pitch += pitch;
                }
                Intent::Fire => {
                    let id = ProjectileId(self.next_projectile_id);
                    match CombatSystem::fire(vehicle, &self.weapon, id) {
                        Some(shot) => {
                            self.next_projectile_id += 1;
                            events.push(GameEvent::Fired {
                                vehicle_id,
                                projectile_id: id,
                                muzzle: shot.muzzle,
                                direction: shot.direction,
                                speed: self.weapon.projectile_speed,
                            });
                            self.projectiles.push(shot.projectile);
                        }
                        None => debug!(vehicle_id = %vehicle_id, "Fire ignored, gun not loaded"),
                    }
                }
            }
        }
    }
}

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<SessionInput>,
    pub update_tx: broadcast::Sender<ServerMsg>,
    pub actor_count: Arc<AtomicUsize>,
    roster: watch::Receiver<String>,
    shutdown: Arc<Notify>,
}

impl SessionHandle {
    pub fn actor_count(&self) -> usize {
        self.actor_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.update_tx.subscribe()
    }

    /// Latest roster string published by the session
    pub fn roster(&self) -> String {
        self.roster.borrow().clone()
    }

    /// Ask the session task to stop
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Registry of all running sessions
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, h)| h)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_actors(&self) -> usize {
        self.sessions.iter().map(|s| s.value().actor_count()).sum()
    }

    pub fn shutdown_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().shutdown();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative session task
pub struct GameSession {
    state: SessionState,
    replication: ReplicationLayer,
    input_rx: mpsc::Receiver<SessionInput>,
    update_tx: broadcast::Sender<ServerMsg>,
    roster_tx: watch::Sender<String>,
    shutdown: Arc<Notify>,
}

impl GameSession {
    /// Create a new session
    pub fn new(id: Uuid, config: SessionConfig) -> (Self, SessionHandle) {
        Self::with_state(SessionState::new(id, config))
    }

    pub fn with_state(state: SessionState) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (update_tx, _) = broadcast::channel(256);
        let (roster_tx, roster_rx) = watch::channel(state.roster().to_string());
        let shutdown = Arc::new(Notify::new());

        let handle = SessionHandle {
            id: state.id,
            input_tx,
            update_tx: update_tx.clone(),
            actor_count: Arc::new(AtomicUsize::new(0)),
            roster: roster_rx,
            shutdown: shutdown.clone(),
        };

        let replication =
            ReplicationLayer::new(state.config().tick_rate, state.config().snapshot_rate);
        let session = Self {
            state,
            replication,
            input_rx,
            update_tx,
            roster_tx,
            shutdown,
        };
        (session, handle)
    }

    /// Run the authoritative tick loop until shut down
    pub async fn run(mut self) {
        let session_id = self.state.id;
        let tick_rate = self.state.config().tick_rate.clamp(1, MAX_TICK_RATE);
        info!(session_id = %session_id, tick_rate, "Session started");

        let mut tick_interval = interval(Duration::from_micros(1_000_000 / tick_rate as u64));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut clock = TickClock::new(tick_rate);
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.process_inputs();
                    let dt = clock.lap();
                    self.step(dt);
                }
                _ = shutdown.notified() => break,
            }
        }

        info!(session_id = %session_id, tick = self.state.tick, "Session ended");
        self.send(ServerMsg::SessionEnded {
            reason: "shutdown".to_string(),
        });
    }

    fn send(&self, msg: ServerMsg) {
        // No receivers just means nobody is watching
        let _ = self.update_tx.send(msg);
    }

    /// Drain everything that arrived since the previous tick
    fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            match input {
                SessionInput::Actor(input) => self.handle_actor(input),
                SessionInput::Contact(contact) => self.state.report_contact(contact),
                SessionInput::SpawnVehicle { variant, reply } => {
                    let vehicle_id = self.state.spawn_vehicle(variant, None);
                    self.send(ServerMsg::VehicleSpawned {
                        spawn: VehicleSpawn {
                            vehicle_id,
                            variant,
                        },
                    });
                    self.replication.force_next();
                    let _ = reply.send(vehicle_id);
                }
                SessionInput::DespawnVehicle { vehicle_id, reply } => {
                    let removed = match self.state.despawn_vehicle(vehicle_id) {
                        Some(evictions) => {
                            self.notify_evictions(&evictions);
                            self.replication.forget_vehicle(vehicle_id);
                            self.send(ServerMsg::VehicleDespawned { vehicle_id });
                            self.replication.force_next();
                            true
                        }
                        None => false,
                    };
                    let _ = reply.send(removed);
                }
                SessionInput::Resync { actor_id } => {
                    let state = self.replication.full_state(
                        self.state.tick,
                        self.state.vehicles(),
                        self.state.roster(),
                    );
                    self.send(ServerMsg::FullState {
                        recipient: Some(actor_id),
                        state,
                    });
                }
            }
        }
    }

    fn handle_actor(&mut self, input: ActorInput) {
        let actor_id = input.actor_id;

        if let Some((vehicle_id, intent)) = input.msg.intent() {
            if let Err(e) = self.state.submit_intent(actor_id, vehicle_id, intent) {
                warn!(actor_id = %actor_id, error = %e, "Rejected intent");
                self.send(ServerMsg::Error {
                    recipient: Some(actor_id),
                    code: "invalid_intent".to_string(),
                    message: e.to_string(),
                });
            }
            return;
        }

        match input.msg {
            ClientMsg::Occupy { vehicle_id, seat } => {
                match self.state.request_seat(actor_id, vehicle_id, seat) {
                    Ok(previous) => {
                        if let Some(previous) = previous {
                            self.send(ServerMsg::SeatRevoked {
                                actor_id,
                                vehicle_id: previous.vehicle_id,
                                seat: previous.seat,
                            });
                        }
                        self.send(ServerMsg::SeatGranted {
                            actor_id,
                            vehicle_id,
                            seat,
                        });
                        self.replication.force_next();
                    }
                    Err(e) => {
                        debug!(actor_id = %actor_id, vehicle_id = %vehicle_id, %seat, reason = e.code(), "Seat request refused");
                        self.send(ServerMsg::SeatRejected {
                            actor_id,
                            vehicle_id,
                            seat,
                            reason: e.code().to_string(),
                        });
                    }
                }
            }
            ClientMsg::Vacate | ClientMsg::Leave => {
                if let Some(eviction) = self.state.vacate_actor(actor_id) {
                    self.notify_evictions(&[eviction]);
                    self.replication.force_next();
                }
            }
            ClientMsg::Ping { t } => self.send(ServerMsg::Pong { actor_id, t }),
            // Intent-carrying messages were handled above
            ClientMsg::SetLinearVelocity { .. }
            | ClientMsg::SetRotationRate { .. }
            | ClientMsg::SetTurretAim { .. }
            | ClientMsg::Fire { .. } => {}
        }
    }

    fn notify_evictions(&self, evictions: &[Eviction]) {
        for eviction in evictions {
            self.send(ServerMsg::SeatRevoked {
                actor_id: eviction.actor_id,
                vehicle_id: eviction.vehicle_id,
                seat: eviction.seat,
            });
        }
    }

    /// Run one tick and publish what changed
    fn step(&mut self, dt: f32) {
        let out = self.state.run_tick(dt);

        if !out.evictions.is_empty() {
            self.notify_evictions(&out.evictions);
            self.replication.force_next();
        }

        if !out.events.is_empty() {
            let events = self.replication.publish_events(out.tick, out.events);
            self.send(ServerMsg::Events { events });
        }

        if self.replication.should_send() {
            let updates = self
                .replication
                .collect_updates(self.state.vehicles(), self.state.roster());
            if !updates.is_empty() {
                self.send(ServerMsg::FieldUpdates {
                    tick: out.tick,
                    updates,
                });
            }
        }

        if *self.roster_tx.borrow() != self.state.roster() {
            self.roster_tx.send_replace(self.state.roster().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn session() -> SessionState {
        SessionState::new(Uuid::new_v4(), SessionConfig::default())
    }

    #[test]
    fn default_roster_is_spawned() {
        let state = session();
        assert_eq!(state.vehicles().len(), 2);
        assert_eq!(
            state.roster(),
            "Tank 1: driver(1) [open], gunner(2) [open]\n\
             Tank 2: driver(1) [open], gunner(2) [open]\n"
        );
    }

    #[test]
    fn roster_follows_seat_changes() {
        let mut state = session();
        let actor = ActorId::new();
        state.request_seat(actor, VehicleId(1), Seat::Driver).unwrap();
        assert!(state.roster().starts_with("Tank 1: driver(1) [closed]"));

        state.vacate_actor(actor);
        assert!(state.roster().starts_with("Tank 1: driver(1) [open]"));
    }

    #[test]
    fn driver_intent_moves_the_tank() {
        let mut state = session();
        let actor = ActorId::new();
        state.request_seat(actor, VehicleId(1), Seat::Driver).unwrap();
        state
            .submit_intent(actor, VehicleId(1), Intent::SetLinearVelocity(Vec3::Z))
            .unwrap();

        let start = state.vehicle(VehicleId(1)).unwrap().position;
        for _ in 0..30 {
            state.run_tick(1.0 / 30.0);
        }
        let tank = state.vehicle(VehicleId(1)).unwrap();
        // Yaw 90 faces +X
        assert!(tank.position.x > start.x + 0.5);
        assert!(tank.local_velocity.z > 0.0);
    }

    #[test]
    fn gunner_intent_from_driver_is_dropped() {
        let mut state = session();
        let actor = ActorId::new();
        state.request_seat(actor, VehicleId(1), Seat::Driver).unwrap();
        state.submit_intent(actor, VehicleId(1), Intent::Fire).unwrap();

        let out = state.run_tick(1.0 / 30.0);
        assert!(out.events.is_empty());
        assert_eq!(state.vehicle(VehicleId(1)).unwrap().ammo, 1);
    }

    #[test]
    fn intents_for_unknown_vehicles_are_rejected() {
        let mut state = session();
        assert_eq!(
            state.submit_intent(ActorId::new(), VehicleId(42), Intent::Fire),
            Err(IntentError::UnknownVehicle(VehicleId(42)))
        );
    }

    #[test]
    fn despawn_evicts_crew() {
        let mut state = session();
        let actor = ActorId::new();
        state.request_seat(actor, VehicleId(2), Seat::Gunner).unwrap();

        let evictions = state.despawn_vehicle(VehicleId(2)).unwrap();
        assert_eq!(evictions.len(), 1);
        assert_eq!(evictions[0].actor_id, actor);
        assert_eq!(state.assignment(actor), None);
        assert!(state.despawn_vehicle(VehicleId(2)).is_none());
        assert_eq!(state.roster().lines().count(), 1);
    }

    #[test]
    fn registry_shutdown_ends_every_session() {
        let registry = SessionRegistry::new();
        let (session, handle) = GameSession::new(Uuid::new_v4(), SessionConfig::default());
        let mut rx = handle.subscribe();
        handle.actor_count.fetch_add(2, Ordering::Relaxed);
        registry.insert(handle.clone());
        assert_eq!(registry.active_sessions(), 1);
        assert_eq!(registry.total_actors(), 2);

        registry.shutdown_all();
        tokio_test::block_on(session.run());

        let mut ended = false;
        while let Ok(msg) = rx.try_recv() {
            ended |= matches!(msg, ServerMsg::SessionEnded { .. });
        }
        assert!(ended);
        assert!(registry.remove(&handle.id).is_some());
        assert_eq!(registry.active_sessions(), 0);
    }

    #[tokio::test]
    async fn session_task_grants_seats_and_ends_on_shutdown() {
        let (session, handle) = GameSession::new(Uuid::new_v4(), SessionConfig::default());
        let mut rx = handle.subscribe();
        let task = tokio::spawn(session.run());

        let actor_id = ActorId::new();
        handle
            .input_tx
            .send(SessionInput::Actor(ActorInput {
                actor_id,
                msg: ClientMsg::Occupy {
                    vehicle_id: VehicleId(1),
                    seat: Seat::Driver,
                },
            }))
            .await
            .unwrap();

        let granted = loop {
            match rx.recv().await.unwrap() {
                ServerMsg::SeatGranted { actor_id: a, .. } => break a,
                _ => continue,
            }
        };
        assert_eq!(granted, actor_id);

        let (reply, spawned) = oneshot::channel();
        handle
            .input_tx
            .send(SessionInput::SpawnVehicle {
                variant: TankVariant::Panzer4,
                reply,
            })
            .await
            .unwrap();
        assert_eq!(spawned.await.unwrap(), VehicleId(3));

        handle.shutdown();
        let ended = loop {
            if let ServerMsg::SessionEnded { .. } = rx.recv().await.unwrap() {
                break true;
            }
        };
        assert!(ended);
        task.await.unwrap();
    }
}
