// 🗄️ Store - persistence contract consumed by the engines
//
// Every method is one self-contained operation: implementations acquire their
// connection on entry and release it before returning, whatever the outcome.
// Driver failures surface as ParkingError::Persistence.

use crate::error::Result;
use crate::models::{ClosedOccupancy, InvoiceDetail, NewInvoice, OpenOccupancy, Owner, Vehicle};
use chrono::NaiveDateTime;

pub trait ParkingStore: Send + Sync {
    // ------------------------------------------------------------------
    // Owners
    // ------------------------------------------------------------------

    /// Returns false when the id is already taken.
    fn insert_owner(&self, owner: &Owner) -> Result<bool>;

    /// All owners, ordered by name.
    fn list_owners(&self) -> Result<Vec<Owner>>;

    fn find_owner(&self, id: &str) -> Result<Option<Owner>>;

    // ------------------------------------------------------------------
    // Vehicles
    // ------------------------------------------------------------------

    /// Returns false when the plate is taken or the owner does not exist.
    fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<bool>;

    fn find_vehicle(&self, plate: &str) -> Result<Option<Vehicle>>;

    /// Whether the plate has a record with no exit time.
    fn has_open_record(&self, plate: &str) -> Result<bool>;

    // ------------------------------------------------------------------
    // Occupancy records
    // ------------------------------------------------------------------

    fn list_open_records(&self) -> Result<Vec<OpenOccupancy>>;

    fn insert_occupancy(&self, plate: &str, entry_time: NaiveDateTime, space: &str)
        -> Result<bool>;

    /// Sets the exit time on the plate's open record. False if there was none.
    fn close_open_record(&self, plate: &str, exit_time: NaiveDateTime) -> Result<bool>;

    /// Closed record with the latest exit time.
    fn find_latest_closed(&self, plate: &str) -> Result<Option<ClosedOccupancy>>;

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    /// Writes the invoice and returns its generated id.
    fn insert_invoice(&self, invoice: &NewInvoice) -> Result<i64>;

    fn find_invoice(&self, id: i64) -> Result<Option<InvoiceDetail>>;
}
