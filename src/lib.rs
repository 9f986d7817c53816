// Parking Lot Manager - Core Library
// Exposes the engines and the store for the CLI, the dashboard and the web server

pub mod error;
pub mod clock;
pub mod space;
pub mod grid;
pub mod models;
pub mod store;
pub mod db;
pub mod allocation;     // Who parks where + waiting list
pub mod billing;        // Invoices on exit
pub mod registry;       // Owners & vehicles
pub mod import;         // CSV bulk registration
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{ParkingError, Result};
pub use clock::{Clock, ManualClock, SystemClock};
pub use space::Space;
pub use grid::{Grid, LotLayout};
pub use models::{
    ClosedOccupancy, InvoiceDetail, NewInvoice, OpenOccupancy, Owner, Vehicle,
    normalize_plate,
};
pub use store::ParkingStore;
pub use db::{setup_database, SqliteStore};
pub use allocation::{AllocationEngine, EntryOutcome, ExitOutcome, LotSnapshot, Promotion};
pub use billing::{BillingEngine, Charge, compute_charge, parse_timestamp, DEFAULT_RATE_PER_MINUTE};
pub use registry::{ImportSummary, Registry};
pub use import::{load_owners_csv, load_vehicles_csv};
pub use config::Config;

use std::sync::Arc;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a front end needs, wired to one store and one clock
pub struct ParkingLot<S: ParkingStore> {
    pub allocation: Arc<AllocationEngine<S>>,
    pub billing: Arc<BillingEngine<S>>,
    pub registry: Arc<Registry<S>>,
}

impl<S: ParkingStore> ParkingLot<S> {
    pub fn new(store: Arc<S>, layout: LotLayout, rate_per_minute: f64, clock: Arc<dyn Clock>) -> Self {
        ParkingLot {
            allocation: Arc::new(AllocationEngine::new(store.clone(), layout, clock.clone())),
            billing: Arc::new(BillingEngine::with_rate(store.clone(), clock, rate_per_minute)),
            registry: Arc::new(Registry::new(store)),
        }
    }
}

impl<S: ParkingStore> Clone for ParkingLot<S> {
    fn clone(&self) -> Self {
        ParkingLot {
            allocation: Arc::clone(&self.allocation),
            billing: Arc::clone(&self.billing),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl ParkingLot<SqliteStore> {
    /// Open the configured database with the system clock
    pub fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.database_path)?);
        Ok(ParkingLot::new(
            store,
            config.layout,
            config.rate_per_minute,
            Arc::new(SystemClock),
        ))
    }
}
