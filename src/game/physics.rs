//! Tank movement and turret constraints

use glam::{Quat, Vec3};

use super::registry::EntityRegistry;
use super::vehicle::{Impulse, Seat, Vehicle, TURRET_PITCH_LIMIT};

/// Hull velocity change while speeding up (throttle units/s^2)
pub const LINEAR_ACCELERATION: f32 = 1.5;
/// Hull velocity change while slowing down or reversing
pub const LINEAR_DECELERATION: f32 = 3.0;
/// Rotation-rate change while a turn is requested
pub const ROTATION_ACCELERATION: f32 = 2.5;
/// Rotation-rate change while the turn input is released
pub const ROTATION_DECELERATION: f32 = 3.5;

/// Fastest knockback an impulse can produce (units/s)
pub const MAX_KNOCKBACK: f32 = 3.0;
/// How quickly knockback bleeds off (units/s^2)
pub const KNOCKBACK_DAMPING: f32 = 6.0;
/// Distance over which an impulse fades to nothing
pub const IMPULSE_RADIUS: f32 = 5.0;

/// Move `current` toward `target` by at most `max_delta`, never past it
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

/// Vector form of [`move_towards`]
pub fn move_towards_vec(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let diff = target - current;
    let dist = diff.length();
    if dist <= max_delta || dist <= f32::EPSILON {
        target
    } else {
        current + diff / dist * max_delta
    }
}

/// Signed shortest difference `to - from`, in degrees within (-180, 180]
pub fn delta_angle(from: f32, to: f32) -> f32 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Rotate an angle toward a target along the shortest arc
pub fn move_towards_angle(current: f32, target: f32, max_delta: f32) -> f32 {
    let delta = delta_angle(current, target);
    if delta.abs() <= max_delta {
        current + delta
    } else {
        current + delta.signum() * max_delta
    }
}

/// Unit direction for a world heading and elevation, in degrees.
/// Heading 0 faces +Z; positive pitch points up.
pub fn direction_from(yaw: f32, pitch: f32) -> Vec3 {
    let (yaw, pitch) = (yaw.to_radians(), pitch.to_radians());
    Vec3::new(yaw.sin() * pitch.cos(), pitch.sin(), yaw.cos() * pitch.cos())
}

/// Rotate a hull-frame vector into world space
pub fn hull_to_world(yaw: f32, local: Vec3) -> Vec3 {
    Quat::from_rotation_y(yaw.to_radians()) * local
}

/// World-space vector into the hull frame
pub fn world_to_hull(yaw: f32, world: Vec3) -> Vec3 {
    Quat::from_rotation_y(-yaw.to_radians()) * world
}

/// Per-tick integrator for one tank. Authority only.
pub struct VehicleSimulator;

impl VehicleSimulator {
    /// Advance a vehicle by `dt` seconds.
    ///
    /// Inputs are expected to be finite; intents are validated before they
    /// are buffered.
    pub fn step(vehicle: &mut Vehicle, dt: f32) {
        let stats = vehicle.stats();

        // An empty driver seat always coasts to a stop.
        if vehicle.seats.is_available(Seat::Driver) {
            vehicle.target_velocity = Vec3::ZERO;
            vehicle.target_rotation_rate = 0.0;
        }

        let accelerating =
            vehicle.local_velocity.length_squared() < vehicle.target_velocity.length_squared();
        let linear_rate = if accelerating {
            LINEAR_ACCELERATION
        } else {
            LINEAR_DECELERATION
        };
        vehicle.local_velocity =
            move_towards_vec(vehicle.local_velocity, vehicle.target_velocity, linear_rate * dt);

        let rotation_rate = if vehicle.target_rotation_rate != 0.0 {
            ROTATION_ACCELERATION
        } else {
            ROTATION_DECELERATION
        };
        vehicle.rotation_rate = move_towards(
            vehicle.rotation_rate,
            vehicle.target_rotation_rate,
            rotation_rate * dt,
        );

        vehicle.wheel_spin = vehicle.local_velocity.z;

        if vehicle.seats.is_occupied(Seat::Gunner) {
            let turret = &mut vehicle.turret;
            let desired = delta_angle(vehicle.yaw, turret.target_yaw);
            turret.yaw = delta_angle(
                0.0,
                move_towards_angle(turret.yaw, desired, stats.turret_rotation_speed * dt),
            );
            turret.pitch =
                (turret.pitch + turret.pending_pitch).clamp(-TURRET_PITCH_LIMIT, TURRET_PITCH_LIMIT);
        }
        vehicle.turret.pending_pitch = 0.0;

        vehicle.yaw =
            (vehicle.yaw + vehicle.rotation_rate * stats.rotation_speed * dt).rem_euclid(360.0);

        Self::apply_impulse(vehicle, dt);

        let planar = hull_to_world(vehicle.yaw, vehicle.local_velocity * stats.tank_speed);
        vehicle.velocity = Vec3::new(
            planar.x + vehicle.knockback.x,
            vehicle.velocity.y,
            planar.z + vehicle.knockback.z,
        );
        vehicle.position += vehicle.velocity * dt;
    }

    /// Start a push at `origin`, replacing any push in progress
    pub fn start_impulse(vehicle: &mut Vehicle, origin: Vec3, strength: f32, duration: f32) {
        vehicle.impulse = Some(Impulse {
            origin,
            strength,
            remaining: duration,
        });
    }

    fn apply_impulse(vehicle: &mut Vehicle, dt: f32) {
        if let Some(impulse) = vehicle.impulse.as_mut() {
            let offset = vehicle.position - impulse.origin;
            let away = Vec3::new(offset.x, 0.0, offset.z);
            let distance = away.length();
            let falloff = (1.0 - distance / IMPULSE_RADIUS).clamp(0.0, 1.0);
            if distance > f32::EPSILON {
                vehicle.knockback += away / distance * impulse.strength * falloff * dt;
                vehicle.knockback = vehicle.knockback.clamp_length_max(MAX_KNOCKBACK);
            }
            impulse.remaining -= dt;
            if impulse.remaining <= 0.0 {
                vehicle.impulse = None;
            }
        } else {
            vehicle.knockback =
                move_towards_vec(vehicle.knockback, Vec3::ZERO, KNOCKBACK_DAMPING * dt);
        }
    }

    /// Push overlapping hulls apart on the ground plane
    pub fn separate_hulls(vehicles: &mut EntityRegistry<Vehicle>) {
        let hulls: Vec<_> = vehicles
            .iter()
            .map(|(id, v)| (id, v.position, v.stats().hull_radius))
            .collect();

        for i in 0..hulls.len() {
            for j in (i + 1)..hulls.len() {
                let (id1, p1, r1) = hulls[i];
                let (id2, p2, r2) = hulls[j];
                let offset = Vec3::new(p2.x - p1.x, 0.0, p2.z - p1.z);
                let dist = offset.length();
                let overlap = r1 + r2 - dist;
                if overlap <= 0.0 {
                    continue;
                }

                // Coincident hulls get pushed along an arbitrary axis
                let normal = if dist < 0.001 { Vec3::X } else { offset / dist };
                let push = normal * (overlap / 2.0);
                if let Some(v) = vehicles.get_mut(id1) {
                    v.position -= push;
                }
                if let Some(v) = vehicles.get_mut(id2) {
                    v.position += push;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::vehicle::{ActorId, TankVariant, VehicleId};

    const DT: f32 = 1.0 / 30.0;

    fn tank() -> Vehicle {
        Vehicle::new(VehicleId(1), TankVariant::T34, Vec3::ZERO, 0.0)
    }

    fn crewed(seat: Seat) -> Vehicle {
        let mut v = tank();
        v.seats.set(seat, Some(ActorId::new()));
        v
    }

    #[test]
    fn acceleration_is_bounded_and_monotonic() {
        let mut v = crewed(Seat::Driver);
        v.target_velocity = Vec3::Z;
        let mut previous = 0.0;
        for _ in 0..40 {
            VehicleSimulator::step(&mut v, DT);
            let speed = v.local_velocity.z;
            assert!(speed - previous <= LINEAR_ACCELERATION * DT + 1e-5);
            assert!(speed >= previous);
            assert!(speed <= 1.0);
            previous = speed;
        }
        assert_eq!(v.local_velocity, Vec3::Z);
        assert_eq!(v.wheel_spin, 1.0);
    }

    #[test]
    fn braking_is_faster_than_accelerating() {
        let mut v = crewed(Seat::Driver);
        v.local_velocity = Vec3::Z;
        v.target_velocity = Vec3::ZERO;
        VehicleSimulator::step(&mut v, 0.1);
        assert!((v.local_velocity.z - (1.0 - LINEAR_DECELERATION * 0.1)).abs() < 1e-5);
    }

    #[test]
    fn empty_driver_seat_coasts_to_rest() {
        let mut v = tank();
        v.local_velocity = Vec3::Z;
        v.rotation_rate = 1.0;
        v.target_velocity = Vec3::Z;
        v.target_rotation_rate = 1.0;

        VehicleSimulator::step(&mut v, DT);
        assert_eq!(v.target_velocity, Vec3::ZERO);
        assert!(v.local_velocity.z > 0.8, "no instant stop");
        assert!((v.rotation_rate - (1.0 - ROTATION_DECELERATION * DT)).abs() < 1e-5);

        for _ in 0..30 {
            VehicleSimulator::step(&mut v, DT);
        }
        assert_eq!(v.local_velocity, Vec3::ZERO);
        assert_eq!(v.rotation_rate, 0.0);
    }

    #[test]
    fn rotation_spins_up_slower_than_down() {
        let mut v = crewed(Seat::Driver);
        v.target_rotation_rate = 1.0;
        VehicleSimulator::step(&mut v, 0.1);
        assert!((v.rotation_rate - ROTATION_ACCELERATION * 0.1).abs() < 1e-5);
        assert!(v.yaw > 0.0);
    }

    #[test]
    fn world_velocity_follows_hull_yaw() {
        let mut v = crewed(Seat::Driver);
        v.yaw = 90.0;
        v.local_velocity = Vec3::Z;
        v.target_velocity = Vec3::Z;
        v.velocity.y = -2.0;
        VehicleSimulator::step(&mut v, DT);
        assert!((v.velocity.x - 5.0).abs() < 1e-4);
        assert!(v.velocity.z.abs() < 1e-4);
        assert_eq!(v.velocity.y, -2.0, "vertical component is preserved");
    }

    #[test]
    fn turret_pitch_stays_in_limits() {
        let mut v = crewed(Seat::Gunner);
        for delta in [40.0, -3.0, -100.0, 7.5, 1e6] {
            v.turret.pending_pitch = delta;
            VehicleSimulator::step(&mut v, DT);
            assert!(v.turret.pitch.abs() <= TURRET_PITCH_LIMIT);
        }
        assert_eq!(v.turret.pitch, TURRET_PITCH_LIMIT);
    }

    #[test]
    fn turret_traverse_is_rate_limited() {
        let mut v = crewed(Seat::Gunner);
        v.turret.target_yaw = 90.0;
        VehicleSimulator::step(&mut v, 1.0);
        assert!((v.turret.yaw - 35.0).abs() < 1e-4);
        VehicleSimulator::step(&mut v, 10.0);
        assert!((v.turret.yaw - 90.0).abs() < 1e-4);
    }

    #[test]
    fn turret_holds_without_gunner() {
        let mut v = tank();
        v.turret.yaw = 20.0;
        v.turret.target_yaw = 180.0;
        v.turret.pending_pitch = 5.0;
        VehicleSimulator::step(&mut v, 1.0);
        assert_eq!(v.turret.yaw, 20.0);
        assert_eq!(v.turret.pitch, 0.0);
    }

    #[test]
    fn impulse_pushes_away_and_is_bounded() {
        let mut v = tank();
        VehicleSimulator::start_impulse(&mut v, Vec3::new(-1.0, 0.0, 0.0), 1000.0, 0.2);
        for _ in 0..10 {
            VehicleSimulator::step(&mut v, DT);
            assert!(v.knockback.length() <= MAX_KNOCKBACK + 1e-4);
        }
        assert!(v.impulse.is_none());
        assert!(v.position.x > 0.0);
        assert_eq!(v.health, tank().health);
    }

    #[test]
    fn angles_wrap_the_short_way() {
        assert_eq!(delta_angle(350.0, 10.0), 20.0);
        assert_eq!(delta_angle(10.0, 350.0), -20.0);
        assert_eq!(move_towards_angle(350.0, 10.0, 5.0), 355.0);
        let d = direction_from(90.0, 0.0);
        assert!((d - Vec3::X).length() < 1e-5);
        assert!((hull_to_world(90.0, Vec3::Z) - Vec3::X).length() < 1e-5);
        assert!((world_to_hull(90.0, Vec3::X) - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn overlapping_hulls_separate() {
        let mut vehicles = EntityRegistry::new();
        let a = vehicles.spawn_with(|id| Vehicle::new(id, TankVariant::T34, Vec3::ZERO, 0.0));
        let b = vehicles.spawn_with(|id| Vehicle::new(id, TankVariant::T34, Vec3::new(2.0, 0.0, 0.0), 0.0));
        VehicleSimulator::separate_hulls(&mut vehicles);
        let gap = vehicles.get(b).unwrap().position.x - vehicles.get(a).unwrap().position.x;
        assert!((gap - 4.0).abs() < 1e-4);
    }
}
