//! Collision queries for projectiles
//!
//! Two ways a projectile can learn it hit something:
//! - the resolver sweeps each step against armor boxes and world geometry
//! - the physics substrate reports contacts, queued as [`Contact`]

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::combat::ProjectileId;
use super::physics::world_to_hull;
use super::vehicle::{Vehicle, VehicleId};

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Fraction along `from -> to` where the segment enters the box (slab test)
    pub fn segment_entry(&self, from: Vec3, to: Vec3) -> Option<f32> {
        let dir = to - from;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;

        for axis in 0..3 {
            let (origin, d, lo, hi) = (from[axis], dir[axis], self.min[axis], self.max[axis]);
            if d.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t0, mut t1) = ((lo - origin) * inv, (hi - origin) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Swept test of a projectile step against a vehicle's armor box
pub fn sweep_armor(vehicle: &Vehicle, from: Vec3, to: Vec3, radius: f32) -> Option<f32> {
    let stats = vehicle.stats();
    let armor = Aabb::from_center(
        Vec3::new(0.0, stats.armor_center_height, 0.0),
        stats.armor_half_extents,
    )
    .expanded(radius);

    let local_from = world_to_hull(vehicle.yaw, from - vehicle.position);
    let local_to = world_to_hull(vehicle.yaw, to - vehicle.position);
    armor.segment_entry(local_from, local_to)
}

/// Non-vehicle solid geometry the resolver can query
pub trait CollisionWorld: Send {
    /// Earliest fraction along `from -> to` where a sphere of `radius` touches solid geometry
    fn sweep_solid(&self, from: Vec3, to: Vec3, radius: f32) -> Option<f32>;
}

/// Flat ground plus box obstacles
#[derive(Debug, Clone, Default)]
pub struct StaticGeometry {
    pub ground_height: Option<f32>,
    pub obstacles: Vec<Aabb>,
}

impl StaticGeometry {
    pub fn flat_ground(height: f32) -> Self {
        Self {
            ground_height: Some(height),
            obstacles: Vec::new(),
        }
    }

    pub fn with_obstacle(mut self, obstacle: Aabb) -> Self {
        self.obstacles.push(obstacle);
        self
    }
}

impl CollisionWorld for StaticGeometry {
    fn sweep_solid(&self, from: Vec3, to: Vec3, radius: f32) -> Option<f32> {
        let ground = self.ground_height.and_then(|height| {
            let floor = height + radius;
            if to.y > floor {
                None
            } else if from.y <= floor {
                Some(0.0)
            } else {
                Some((from.y - floor) / (from.y - to.y))
            }
        });

        self.obstacles
            .iter()
            .filter_map(|obstacle| obstacle.expanded(radius).segment_entry(from, to))
            .chain(ground)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// What a reported contact touched
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContactTarget {
    Armor { vehicle_id: VehicleId },
    World,
}

/// Contact reported by the physics substrate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub projectile_id: ProjectileId,
    pub target: ContactTarget,
    pub point: Vec3,
}
