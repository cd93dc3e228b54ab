//! Game simulation modules

pub mod collision;
pub mod combat;
pub mod intent;
pub mod occupancy;
pub mod physics;
pub mod registry;
pub mod session;
pub mod spawn;
pub mod vehicle;

pub use combat::{CollisionPolicy, CombatSystem, DamageProfile};
pub use occupancy::{OccupancyError, OccupancyManager};
pub use physics::VehicleSimulator;
pub use registry::EntityRegistry;
pub use session::{GameSession, SessionHandle, SessionRegistry, SessionState, TickOutput};
pub use vehicle::{ActorId, Seat, TankVariant, Vehicle, VehicleId};
