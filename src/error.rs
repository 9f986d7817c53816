// ⚠️ Errors - what can go wrong while parking, billing or registering

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, ParkingError>;

/// Everything that can go wrong while parking, billing or registering.
///
/// Store-level transport failures are folded into [`ParkingError::Persistence`]
/// at the data-access boundary, so engine code never sees a raw driver error.
#[derive(Debug, Error)]
pub enum ParkingError {
    /// No vehicle with this plate has been registered.
    #[error("vehicle {plate} is not registered")]
    VehicleUnregistered { plate: String },

    /// The vehicle already has an open parking record.
    #[error("vehicle {plate} is already parked")]
    AlreadyParked { plate: String },

    /// Exit requested for a vehicle that is not parked.
    #[error("vehicle {plate} has no open parking record")]
    NoOpenRecord { plate: String },

    /// Billing requested for a vehicle that never left the lot.
    #[error("no closed parking record to bill for vehicle {plate}")]
    NoClosedRecord { plate: String },

    /// A stored space string did not match `F<row>,C<col>`.
    #[error("malformed space encoding {raw:?}")]
    MalformedSpaceEncoding { raw: String },

    /// A stored timestamp could not be read back.
    #[error("invalid timestamp {raw:?}")]
    InvalidTimestamp { raw: String },

    #[error("owner {owner_id} is not registered")]
    OwnerNotFound { owner_id: String },

    #[error("owner {owner_id} is already registered")]
    DuplicateOwner { owner_id: String },

    #[error("vehicle {plate} is already registered")]
    DuplicateVehicle { plate: String },

    /// A required field was missing or blank.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store failed or returned something unusable.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ParkingError {
    /// True for failures caused by the store rather than by the request.
    pub fn is_persistence(&self) -> bool {
        matches!(self, ParkingError::Persistence(_))
    }
}

impl From<rusqlite::Error> for ParkingError {
    fn from(err: rusqlite::Error) -> Self {
        ParkingError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusqlite_errors_become_persistence() {
        let err: ParkingError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.is_persistence());
        assert!(err.to_string().starts_with("persistence error"));
    }

    #[test]
    fn test_messages_name_the_plate() {
        let err = ParkingError::AlreadyParked {
            plate: "ABC123".to_string(),
        };
        assert_eq!(err.to_string(), "vehicle ABC123 is already parked");
        assert!(!err.is_persistence());
    }
}
