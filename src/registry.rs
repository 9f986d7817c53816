// 📇 Registry - owners and their vehicles
//
// Owners and vehicles are write-once here: register, look up, list.

use crate::error::{ParkingError, Result};
use crate::models::{normalize_plate, Owner, Vehicle};
use crate::store::ParkingStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Counts from a bulk registration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

pub struct Registry<S: ParkingStore> {
    store: Arc<S>,
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ParkingError::InvalidInput(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

impl<S: ParkingStore> Registry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Registry { store }
    }

    pub fn register_owner(&self, owner: &Owner) -> Result<Owner> {
        let owner = Owner {
            id: required(&owner.id, "owner id")?,
            name: required(&owner.name, "owner name")?,
            phone: owner.phone.trim().to_string(),
            address: owner.address.trim().to_string(),
        };

        if !self.store.insert_owner(&owner)? {
            return Err(ParkingError::DuplicateOwner { owner_id: owner.id });
        }
        info!(owner = %owner.id, "owner registered");
        Ok(owner)
    }

    pub fn register_vehicle(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        let vehicle = Vehicle {
            plate: normalize_plate(&required(&vehicle.plate, "plate")?),
            brand: vehicle.brand.trim().to_string(),
            model: vehicle.model.trim().to_string(),
            owner_id: required(&vehicle.owner_id, "owner id")?,
        };

        if self.store.find_owner(&vehicle.owner_id)?.is_none() {
            return Err(ParkingError::OwnerNotFound {
                owner_id: vehicle.owner_id,
            });
        }
        if !self.store.insert_vehicle(&vehicle)? {
            return Err(ParkingError::DuplicateVehicle {
                plate: vehicle.plate,
            });
        }
        info!(plate = %vehicle.plate, owner = %vehicle.owner_id, "vehicle registered");
        Ok(vehicle)
    }

    pub fn list_owners(&self) -> Result<Vec<Owner>> {
        self.store.list_owners()
    }

    pub fn find_vehicle(&self, plate: &str) -> Result<Option<Vehicle>> {
        self.store.find_vehicle(&normalize_plate(plate))
    }

    /// Register many owners; duplicates are counted, anything else aborts
    pub fn register_owners(&self, owners: &[Owner]) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for owner in owners {
            match self.register_owner(owner) {
                Ok(_) => summary.inserted += 1,
                Err(ParkingError::DuplicateOwner { .. }) => summary.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }

    /// Register many vehicles; duplicates are counted, anything else aborts
    pub fn register_vehicles(&self, vehicles: &[Vehicle]) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for vehicle in vehicles {
            match self.register_vehicle(vehicle) {
                Ok(_) => summary.inserted += 1,
                Err(ParkingError::DuplicateVehicle { .. }) => summary.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }
}
