//! Vehicle registry keyed by id
//!
//! The authority and every observer keep their own registry. The authority
//! allocates ids; observers insert whatever ids the authority announces.

use std::collections::BTreeMap;

use super::vehicle::VehicleId;

/// Id-ordered arena of vehicle records
#[derive(Debug, Clone)]
pub struct EntityRegistry<T> {
    entries: BTreeMap<VehicleId, T>,
    next_id: u32,
}

impl<T> EntityRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Allocate a fresh id and insert the record built for it (authority side)
    pub fn spawn_with(&mut self, build: impl FnOnce(VehicleId) -> T) -> VehicleId {
        let id = VehicleId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.entries.insert(id, build(id));
        id
    }

    /// Insert under an id chosen elsewhere (observer side)
    pub fn insert(&mut self, id: VehicleId, entry: T) -> Option<T> {
        self.next_id = self.next_id.max(id.0.wrapping_add(1));
        self.entries.insert(id, entry)
    }

    pub fn remove(&mut self, id: VehicleId) -> Option<T> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: VehicleId) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<VehicleId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VehicleId, &T)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }
}

impl<T> Default for EntityRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
