//! Seat occupancy and control delegation
//!
//! The seat table on each vehicle is the single source of truth for who may
//! drive or aim it. Every intent is checked against it when applied, so
//! vacating a seat is also how an actor's pending control is cancelled.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::{debug, info};

use super::registry::EntityRegistry;
use super::vehicle::{ActorId, Seat, Vehicle, VehicleId};

/// Seat held by an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatAssignment {
    pub vehicle_id: VehicleId,
    pub seat: Seat,
}

/// An occupant removed from a seat, to be told about it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub actor_id: ActorId,
    pub vehicle_id: VehicleId,
    pub seat: Seat,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OccupancyError {
    #[error("{seat} seat on vehicle {vehicle_id} is already taken")]
    SeatTaken { vehicle_id: VehicleId, seat: Seat },

    #[error("unknown vehicle {0}")]
    UnknownVehicle(VehicleId),

    #[error("actor already holds the {seat} seat on vehicle {vehicle_id}")]
    ActorSeated { vehicle_id: VehicleId, seat: Seat },
}

impl OccupancyError {
    /// Short machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            OccupancyError::SeatTaken { .. } => "seat_taken",
            OccupancyError::UnknownVehicle(_) => "unknown_vehicle",
            OccupancyError::ActorSeated { .. } => "actor_seated",
        }
    }
}

/// Grants and revokes seats. Authority only.
#[derive(Debug, Default)]
pub struct OccupancyManager {
    assignments: HashMap<ActorId, SeatAssignment>,
    roster_dirty: bool,
}

impl OccupancyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `actor` in a vacant seat.
    pub fn occupy(
        &mut self,
        vehicles: &mut EntityRegistry<Vehicle>,
        vehicle_id: VehicleId,
        seat: Seat,
        actor: ActorId,
    ) -> Result<(), OccupancyError> {
        if let Some(held) = self.assignments.get(&actor) {
            return Err(OccupancyError::ActorSeated {
                vehicle_id: held.vehicle_id,
                seat: held.seat,
            });
        }

        let vehicle = vehicles
            .get_mut(vehicle_id)
            .ok_or(OccupancyError::UnknownVehicle(vehicle_id))?;

        if vehicle.seats.is_occupied(seat) {
            return Err(OccupancyError::SeatTaken { vehicle_id, seat });
        }

        vehicle.seats.set(seat, Some(actor));
        self.assignments
            .insert(actor, SeatAssignment { vehicle_id, seat });
        self.roster_dirty = true;

        info!(actor_id = %actor, vehicle_id = %vehicle_id, %seat, "Seat occupied");
        Ok(())
    }

    /// Empty a seat. Vacating an empty seat (or an unknown vehicle) does nothing.
    pub fn vacate(
        &mut self,
        vehicles: &mut EntityRegistry<Vehicle>,
        vehicle_id: VehicleId,
        seat: Seat,
    ) -> Option<Eviction> {
        let vehicle = vehicles.get_mut(vehicle_id)?;
        let actor_id = vehicle.seats.set(seat, None)?;

        if self.assignments.get(&actor_id) == Some(&SeatAssignment { vehicle_id, seat }) {
            self.assignments.remove(&actor_id);
        }
        self.roster_dirty = true;

        info!(actor_id = %actor_id, vehicle_id = %vehicle_id, %seat, "Seat vacated");
        Some(Eviction {
            actor_id,
            vehicle_id,
            seat,
        })
    }

    /// Empty both seats, returning whoever was removed
    pub fn force_vacate_all(
        &mut self,
        vehicles: &mut EntityRegistry<Vehicle>,
        vehicle_id: VehicleId,
    ) -> Vec<Eviction> {
        Seat::ALL
            .iter()
            .filter_map(|&seat| self.vacate(vehicles, vehicle_id, seat))
            .collect()
    }

    /// Move `actor` to a seat, leaving any seat they currently hold.
    ///
    /// The target is checked before the old seat is released, so a refused
    /// switch keeps the actor where they were. Returns the seat left behind.
    pub fn request_seat(
        &mut self,
        vehicles: &mut EntityRegistry<Vehicle>,
        actor: ActorId,
        vehicle_id: VehicleId,
        seat: Seat,
    ) -> Result<Option<SeatAssignment>, OccupancyError> {
        let target = SeatAssignment { vehicle_id, seat };
        let previous = self.assignments.get(&actor).copied();
        if previous == Some(target) {
            return Ok(None);
        }

        let vehicle = vehicles
            .get(vehicle_id)
            .ok_or(OccupancyError::UnknownVehicle(vehicle_id))?;
        if vehicle.seats.is_occupied(seat) {
            debug!(actor_id = %actor, vehicle_id = %vehicle_id, %seat, "Seat request refused, seat taken");
            return Err(OccupancyError::SeatTaken { vehicle_id, seat });
        }

        if let Some(held) = previous {
            self.vacate(vehicles, held.vehicle_id, held.seat);
        }
        self.occupy(vehicles, vehicle_id, seat, actor)?;
        Ok(previous)
    }

    /// Release whatever seat the actor holds (explicit leave or disconnect)
    pub fn leave(
        &mut self,
        vehicles: &mut EntityRegistry<Vehicle>,
        actor: ActorId,
    ) -> Option<Eviction> {
        let held = self.assignments.remove(&actor)?;
        let eviction = self.vacate(vehicles, held.vehicle_id, held.seat);
        // The vehicle may already be gone; the assignment is dropped either way.
        if eviction.is_none() {
            self.roster_dirty = true;
        }
        eviction
    }

    pub fn assignment(&self, actor: ActorId) -> Option<SeatAssignment> {
        self.assignments.get(&actor).copied()
    }

    /// Whether `actor` currently holds `seat` on `vehicle_id`
    pub fn holds(
        vehicles: &EntityRegistry<Vehicle>,
        actor: ActorId,
        vehicle_id: VehicleId,
        seat: Seat,
    ) -> bool {
        vehicles
            .get(vehicle_id)
            .map(|v| v.seats.occupant(seat) == Some(actor))
            .unwrap_or(false)
    }

    pub fn seated_actors(&self) -> usize {
        self.assignments.len()
    }

    /// Flag a roster refresh without a seat change (spawn/despawn)
    pub fn mark_roster_dirty(&mut self) {
        self.roster_dirty = true;
    }

    /// Returns true once per batch of seat changes
    pub fn take_roster_changed(&mut self) -> bool {
        std::mem::take(&mut self.roster_dirty)
    }
}

/// Human-readable seat availability for every vehicle, in id order
pub fn roster_string(vehicles: &EntityRegistry<Vehicle>) -> String {
    let label = |open: bool| if open { "open" } else { "closed" };
    let mut roster = String::new();
    for (n, vehicle) in vehicles.values().enumerate() {
        let _ = writeln!(
            roster,
            "Tank {}: driver(1) [{}], gunner(2) [{}]",
            n + 1,
            label(vehicle.seats.is_available(Seat::Driver)),
            label(vehicle.seats.is_available(Seat::Gunner)),
        );
    }
    roster
}
