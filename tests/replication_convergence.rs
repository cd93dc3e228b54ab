//! Authority to observer replication over a running session

use glam::Vec3;
use uuid::Uuid;

use tank_session_server::config::{RosterEntry, SessionConfig};
use tank_session_server::game::combat::DamageProfile;
use tank_session_server::game::intent::{Intent, TurretAim};
use tank_session_server::game::vehicle::{ActorId, Seat, TankVariant, VehicleId};
use tank_session_server::game::SessionState;
use tank_session_server::replication::{
    ControlState, FullState, GameEvent, ReplicationLayer, ShadowWorld, VehicleSpawn,
};

const DT: f32 = 1.0 / 30.0;
const SHOOTER: VehicleId = VehicleId(1);
const TARGET: VehicleId = VehicleId(2);

fn session(profile: DamageProfile) -> SessionState {
    let config = SessionConfig {
        damage_profile: profile,
        roster: vec![
            RosterEntry {
                variant: TankVariant::T34,
                position: Vec3::ZERO,
                yaw: 0.0,
            },
            RosterEntry {
                variant: TankVariant::Panzer4,
                position: Vec3::new(0.0, 0.0, 20.0),
                yaw: 90.0,
            },
        ],
        ..SessionConfig::default()
    };
    SessionState::new(Uuid::new_v4(), config)
}

fn join(state: &SessionState, layer: &mut ReplicationLayer) -> ShadowWorld {
    let mut world = ShadowWorld::new();
    world.apply_full_state(&layer.full_state(state.tick, state.vehicles(), state.roster()));
    world
}

/// One authority tick fanned out to every observer
fn tick(state: &mut SessionState, layer: &mut ReplicationLayer, observers: &mut [&mut ShadowWorld]) {
    let out = state.run_tick(DT);
    let envelopes = layer.publish_events(out.tick, out.events);
    let updates = if layer.should_send() {
        layer.collect_updates(state.vehicles(), state.roster())
    } else {
        Vec::new()
    };
    for world in observers.iter_mut() {
        for envelope in &envelopes {
            world.apply_event(envelope);
        }
        for update in &updates {
            world.apply_update(update);
        }
        world.advance(DT);
    }
}

fn flush(state: &SessionState, layer: &mut ReplicationLayer, world: &mut ShadowWorld) {
    for update in layer.collect_updates(state.vehicles(), state.roster()) {
        world.apply_update(&update);
    }
}

fn assert_converged(state: &SessionState, world: &ShadowWorld) {
    assert_eq!(world.roster(), state.roster());
    for (id, vehicle) in state.vehicles().iter() {
        let shadow = world.vehicle(id).expect("shadow for every vehicle");
        assert!(
            shadow.position.distance(vehicle.position) < 0.01,
            "{id}: {} vs {}",
            shadow.position,
            vehicle.position
        );
        assert!((shadow.yaw - vehicle.yaw).abs() < 0.05);
        assert!((shadow.turret_yaw - vehicle.turret.yaw).abs() < 0.05);
        assert!((shadow.turret_pitch - vehicle.turret.pitch).abs() < 0.05);
        assert_eq!(shadow.health, vehicle.health);
        assert_eq!(shadow.ammo, vehicle.ammo);
        assert_eq!(shadow.driver_open, vehicle.seats.is_available(Seat::Driver));
        assert_eq!(shadow.gunner_open, vehicle.seats.is_available(Seat::Gunner));
    }
}

#[test]
fn observer_tracks_a_driving_and_shooting_tank() {
    let mut state = session(DamageProfile::Standard);
    let mut layer = ReplicationLayer::new(30, 10);
    let mut observer = join(&state, &mut layer);

    let driver = ActorId::new();
    let gunner = ActorId::new();
    state.request_seat(driver, SHOOTER, Seat::Driver).unwrap();
    state.request_seat(gunner, SHOOTER, Seat::Gunner).unwrap();
    state
        .submit_intent(driver, SHOOTER, Intent::SetLinearVelocity(Vec3::new(0.0, 0.0, 1.0)))
        .unwrap();
    state
        .submit_intent(driver, SHOOTER, Intent::SetRotationRate(0.5))
        .unwrap();
    state
        .submit_intent(
            gunner,
            SHOOTER,
            Intent::SetTurretAim(TurretAim::Delta {
                yaw: 10.0,
                pitch: 5.0,
            }),
        )
        .unwrap();

    for _ in 0..30 {
        tick(&mut state, &mut layer, &mut [&mut observer]);
    }
    state.submit_intent(gunner, SHOOTER, Intent::Fire).unwrap();
    for _ in 0..60 {
        tick(&mut state, &mut layer, &mut [&mut observer]);
    }

    flush(&state, &mut layer, &mut observer);
    assert_converged(&state, &observer);

    let seen = observer.take_events();
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, GameEvent::Fired { vehicle_id: SHOOTER, .. }))
            .count(),
        1
    );
    let shadow = observer.vehicle(SHOOTER).unwrap();
    assert!(!shadow.driver_open && !shadow.gunner_open);
    assert!((observer.signals(SHOOTER).unwrap().wheel_spin - 1.0).abs() < 1e-3);
}

#[test]
fn late_joiner_matches_live_observer() {
    let mut state = session(DamageProfile::Standard);
    let mut layer = ReplicationLayer::new(30, 10);
    let mut early = join(&state, &mut layer);

    let gunner = ActorId::new();
    state.request_seat(gunner, SHOOTER, Seat::Gunner).unwrap();
    state.submit_intent(gunner, SHOOTER, Intent::Fire).unwrap();
    for _ in 0..45 {
        tick(&mut state, &mut layer, &mut [&mut early]);
    }

    let mut late = join(&state, &mut layer);
    // Replayed history includes the shot fired before joining
    assert!(late
        .take_events()
        .iter()
        .any(|e| matches!(e, GameEvent::Fired { .. })));
    early.take_events();

    for _ in 0..15 {
        tick(&mut state, &mut layer, &mut [&mut early, &mut late]);
    }
    flush(&state, &mut layer, &mut early);
    let replay = join(&state, &mut layer);
    assert_converged(&state, &early);
    assert_converged(&state, &replay);
    assert_eq!(early.take_events(), late.take_events());
    assert_eq!(replay.roster(), late.roster());
}

#[test]
fn delayed_field_writes_do_not_roll_back() {
    let mut state = session(DamageProfile::Standard);
    let mut layer = ReplicationLayer::new(30, 30);
    let mut observer = join(&state, &mut layer);

    let driver = ActorId::new();
    state.request_seat(driver, SHOOTER, Seat::Driver).unwrap();
    state
        .submit_intent(driver, SHOOTER, Intent::SetLinearVelocity(Vec3::new(0.0, 0.0, 1.0)))
        .unwrap();

    state.run_tick(DT);
    let older = layer.collect_updates(state.vehicles(), state.roster());
    for _ in 0..10 {
        state.run_tick(DT);
    }
    let newer = layer.collect_updates(state.vehicles(), state.roster());
    assert!(!older.is_empty() && !newer.is_empty());

    // Delivered out of order
    for update in &newer {
        assert!(observer.apply_update(update));
    }
    for update in &older {
        let overwritten = newer
            .iter()
            .any(|n| n.target == update.target && n.value.key() == update.value.key());
        assert_eq!(observer.apply_update(update), !overwritten);
    }

    let shadow = observer.vehicle(SHOOTER).unwrap();
    assert!(shadow.position.distance(state.vehicle(SHOOTER).unwrap().position) < 0.01);
}

#[test]
fn resync_does_not_replay_seen_events() {
    let mut state = session(DamageProfile::Standard);
    let mut layer = ReplicationLayer::new(30, 10);
    let mut observer = join(&state, &mut layer);

    let gunner = ActorId::new();
    state.request_seat(gunner, SHOOTER, Seat::Gunner).unwrap();
    state.submit_intent(gunner, SHOOTER, Intent::Fire).unwrap();
    for _ in 0..30 {
        tick(&mut state, &mut layer, &mut [&mut observer]);
    }
    let live = observer.take_events();
    assert!(!live.is_empty());

    let full: FullState = layer.full_state(state.tick, state.vehicles(), state.roster());
    assert_eq!(full.events.len(), live.len());
    observer.apply_full_state(&full);
    assert!(observer.take_events().is_empty());
    assert_converged(&state, &observer);
}

#[test]
fn despawned_vehicle_leaves_shadow_on_resync() {
    let mut state = session(DamageProfile::Standard);
    let mut layer = ReplicationLayer::new(30, 10);
    let mut observer = join(&state, &mut layer);
    assert_eq!(observer.vehicles().count(), 2);

    state.despawn_vehicle(TARGET).unwrap();
    layer.forget_vehicle(TARGET);
    observer.apply_full_state(&layer.full_state(state.tick, state.vehicles(), state.roster()));
    assert!(observer.vehicle(TARGET).is_none());

    let id = state.spawn_vehicle(TankVariant::Panzer4, None);
    observer.spawn(VehicleSpawn {
        vehicle_id: id,
        variant: TankVariant::Panzer4,
    });
    flush(&state, &mut layer, &mut observer);
    assert_converged(&state, &observer);
}

#[test]
fn destroyed_vehicle_revokes_crew_control() {
    let mut state = session(DamageProfile::Heavy);
    let mut layer = ReplicationLayer::new(30, 10);
    let mut observer = join(&state, &mut layer);

    let gunner = ActorId::new();
    let crew = ActorId::new();
    state.request_seat(gunner, SHOOTER, Seat::Gunner).unwrap();
    state.request_seat(crew, TARGET, Seat::Gunner).unwrap();
    let mut control = ControlState::new();
    control.granted(TARGET, Seat::Gunner);
    assert_eq!(control.fire(), Some(Intent::Fire));

    let mut evicted = false;
    for _ in 0..2 {
        state.submit_intent(gunner, SHOOTER, Intent::Fire).unwrap();
        for _ in 0..120 {
            let out = state.run_tick(DT);
            if out.evictions.iter().any(|e| e.actor_id == crew) {
                control.revoked();
                evicted = true;
            }
            for envelope in layer.publish_events(out.tick, out.events) {
                observer.apply_event(&envelope);
            }
            observer.advance(DT);
        }
    }

    assert!(evicted);
    assert_eq!(control.seat(), None);
    assert_eq!(control.fire(), None);
    assert_eq!(control.aim(1.0, 0.0), None);
    // The killing shot's impact explosion is still burning
    assert_eq!(observer.explosions().len(), 1);
    flush(&state, &mut layer, &mut observer);
    assert_converged(&state, &observer);
}
