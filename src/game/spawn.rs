//! Spawn point selection

use glam::Vec3;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::vehicle::TankVariant;

/// Where and facing which way a tank (re)appears
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub position: Vec3,
    /// Hull yaw in degrees
    pub yaw: f32,
}

impl SpawnPoint {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self { position, yaw }
    }
}

/// Provided by the session bootstrap
pub trait SpawnProvider: Send {
    fn find_spawnpoint(&mut self, variant: TankVariant) -> SpawnPoint;
}

/// Seeded pick from per-variant spawn lists
pub struct SpawnTable {
    t34: Vec<SpawnPoint>,
    panzer4: Vec<SpawnPoint>,
    rng: ChaCha8Rng,
}

impl SpawnTable {
    pub fn new(seed: u64) -> Self {
        Self {
            t34: Vec::new(),
            panzer4: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Spawn points used by the default arena
    pub fn default_arena(seed: u64) -> Self {
        let mut table = Self::new(seed);
        for z in [-3.0, 12.0] {
            table.add(TankVariant::T34, SpawnPoint::new(Vec3::new(-3.5, 0.0, z), 90.0));
        }
        for z in [-8.0, -23.0] {
            table.add(TankVariant::Panzer4, SpawnPoint::new(Vec3::new(-3.5, 0.0, z), 90.0));
        }
        table
    }

    pub fn add(&mut self, variant: TankVariant, point: SpawnPoint) {
        self.points_mut(variant).push(point);
    }

    pub fn points(&self, variant: TankVariant) -> &[SpawnPoint] {
        match variant {
            TankVariant::T34 => &self.t34,
            TankVariant::Panzer4 => &self.panzer4,
        }
    }

    fn points_mut(&mut self, variant: TankVariant) -> &mut Vec<SpawnPoint> {
        match variant {
            TankVariant::T34 => &mut self.t34,
            TankVariant::Panzer4 => &mut self.panzer4,
        }
    }
}

impl SpawnProvider for SpawnTable {
    fn find_spawnpoint(&mut self, variant: TankVariant) -> SpawnPoint {
        let points = match variant {
            TankVariant::T34 => &self.t34,
            TankVariant::Panzer4 => &self.panzer4,
        };
        // Fall back to the other variant's points, then the origin.
        let fallback = if points.is_empty() {
            self.t34.iter().chain(self.panzer4.iter()).copied().collect()
        } else {
            points.clone()
        };
        fallback
            .choose(&mut self.rng)
            .copied()
            .unwrap_or_else(|| SpawnPoint::new(Vec3::ZERO, 0.0))
    }
}
