// 🅿️ Allocation Engine - who parks where
//
// Responsibilities:
// - Rebuild the occupancy grid from the open records before every decision
// - Assign the first free space (row-major) to an arriving vehicle
// - Keep a FIFO wait queue while the lot is full
// - Promote the head of the queue when a vehicle leaves
//
// Grid refresh, space choice and record insert all happen under one mutex,
// so two requests can never be handed the same space by this engine.

use crate::clock::Clock;
use crate::error::{ParkingError, Result};
use crate::grid::{Grid, LotLayout};
use crate::models::normalize_plate;
use crate::space::Space;
use crate::store::ParkingStore;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

// ============================================================================
// OUTCOMES
// ============================================================================

/// What happened to a vehicle that asked to come in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Parked in the given space
    Parked { plate: String, space: Space },

    /// Lot full; waiting at `position` (1 = next in line)
    Queued { plate: String, position: usize },
}

impl EntryOutcome {
    pub fn plate(&self) -> &str {
        match self {
            EntryOutcome::Parked { plate, .. } | EntryOutcome::Queued { plate, .. } => plate,
        }
    }

    pub fn space(&self) -> Option<Space> {
        match self {
            EntryOutcome::Parked { space, .. } => Some(*space),
            EntryOutcome::Queued { .. } => None,
        }
    }

    pub fn is_parked(&self) -> bool {
        matches!(self, EntryOutcome::Parked { .. })
    }
}

impl fmt::Display for EntryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryOutcome::Parked { plate, space } => {
                write!(f, "Vehicle {} parked in space {}.", plate, space)
            }
            EntryOutcome::Queued { plate, position } => write!(
                f,
                "Lot full. Vehicle {} added to the waiting list (position {}).",
                plate, position
            ),
        }
    }
}

/// A queued plate pulled in after an exit
#[derive(Debug)]
pub struct Promotion {
    pub plate: String,
    pub outcome: std::result::Result<EntryOutcome, ParkingError>,
}

#[derive(Debug)]
pub struct ExitOutcome {
    pub plate: String,
    pub promotion: Option<Promotion>,
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vehicle {} has left.", self.plate)?;
        match &self.promotion {
            Some(Promotion {
                outcome: Ok(entry), ..
            }) => write!(f, " {}", entry),
            Some(Promotion { plate, outcome: Err(e) }) => {
                write!(f, " Could not admit waiting vehicle {}: {}.", plate, e)
            }
            None => Ok(()),
        }
    }
}

/// Grid plus queue, for dashboards
#[derive(Debug, Clone, Serialize)]
pub struct LotSnapshot {
    pub layout: LotLayout,
    pub grid: Grid,
    pub wait_queue: Vec<String>,
}

impl LotSnapshot {
    pub fn occupied(&self) -> usize {
        self.grid.occupied_count()
    }

    pub fn capacity(&self) -> usize {
        self.layout.capacity()
    }
}

// ============================================================================
// ALLOCATION ENGINE
// ============================================================================

struct LotState {
    grid: Grid,
    wait_queue: VecDeque<String>,
}

pub struct AllocationEngine<S: ParkingStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    layout: LotLayout,
    state: Mutex<LotState>,
}

impl<S: ParkingStore> AllocationEngine<S> {
    pub fn new(store: Arc<S>, layout: LotLayout, clock: Arc<dyn Clock>) -> Self {
        AllocationEngine {
            store,
            clock,
            layout,
            state: Mutex::new(LotState {
                grid: Grid::new(layout),
                wait_queue: VecDeque::new(),
            }),
        }
    }

    pub fn layout(&self) -> LotLayout {
        self.layout
    }

    fn lock(&self) -> MutexGuard<'_, LotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the grid from the open records and return a copy of it
    pub fn refresh_grid(&self) -> Result<Grid> {
        let mut state = self.lock();
        self.rebuild_grid(&mut state)?;
        Ok(state.grid.clone())
    }

    /// First free space after a refresh, `None` when the lot is full
    pub fn find_free_space(&self) -> Result<Option<Space>> {
        let mut state = self.lock();
        self.rebuild_grid(&mut state)?;
        Ok(state.grid.first_free())
    }

    /// Plates waiting for a space, head first
    pub fn wait_queue(&self) -> Vec<String> {
        self.lock().wait_queue.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> Result<LotSnapshot> {
        let mut state = self.lock();
        self.rebuild_grid(&mut state)?;
        Ok(LotSnapshot {
            layout: self.layout,
            grid: state.grid.clone(),
            wait_queue: state.wait_queue.iter().cloned().collect(),
        })
    }

    /// Park a vehicle, or queue it if the lot is full
    pub fn register_entry(&self, plate: &str) -> Result<EntryOutcome> {
        let plate = normalize_plate(plate);
        let mut state = self.lock();
        self.enter(&mut state, plate)
    }

    /// Close the vehicle's session and admit the next waiting vehicle, if any
    pub fn register_exit(&self, plate: &str) -> Result<ExitOutcome> {
        let plate = normalize_plate(plate);
        let mut state = self.lock();

        let exit_time = self.clock.now();
        if !self.store.close_open_record(&plate, exit_time)? {
            return Err(ParkingError::NoOpenRecord { plate });
        }
        info!(plate = %plate, "vehicle left the lot");

        if let Some(space) = state.grid.position_of(&plate) {
            debug!(plate = %plate, space = %space, "space released");
        }

        let promotion = match state.wait_queue.pop_front() {
            Some(next) => {
                let outcome = self.enter(&mut state, next.clone());
                match &outcome {
                    Ok(entry) => info!(plate = %next, outcome = %entry, "promoted from waiting list"),
                    Err(e) => warn!(plate = %next, error = %e, "waiting vehicle could not be admitted"),
                }
                Some(Promotion {
                    plate: next,
                    outcome,
                })
            }
            None => None,
        };

        Ok(ExitOutcome { plate, promotion })
    }

    // ------------------------------------------------------------------
    // Internals (caller holds the state lock)
    // ------------------------------------------------------------------

    fn enter(&self, state: &mut LotState, plate: String) -> Result<EntryOutcome> {
        if self.store.find_vehicle(&plate)?.is_none() {
            return Err(ParkingError::VehicleUnregistered { plate });
        }
        if self.store.has_open_record(&plate)? {
            return Err(ParkingError::AlreadyParked { plate });
        }

        self.rebuild_grid(state)?;

        let Some(space) = state.grid.first_free() else {
            if !state.wait_queue.contains(&plate) {
                state.wait_queue.push_back(plate.clone());
                info!(plate = %plate, waiting = state.wait_queue.len(), "lot full, vehicle queued");
            }
            let position = state
                .wait_queue
                .iter()
                .position(|p| *p == plate)
                .map_or(state.wait_queue.len(), |i| i + 1);
            return Ok(EntryOutcome::Queued { plate, position });
        };

        let entry_time = self.clock.now();
        if !self
            .store
            .insert_occupancy(&plate, entry_time, &space.label())?
        {
            return Err(ParkingError::Persistence(format!(
                "entry for {} was not recorded",
                plate
            )));
        }

        state.grid.place(space, &plate);
        // A parked plate no longer waits
        state.wait_queue.retain(|p| *p != plate);
        info!(plate = %plate, space = %space, "vehicle parked");
        Ok(EntryOutcome::Parked { plate, space })
    }

    fn rebuild_grid(&self, state: &mut LotState) -> Result<()> {
        let records = self.store.list_open_records()?;
        state.grid.clear();

        for record in records {
            let raw = record.space.as_deref().unwrap_or_default();
            let space = match raw.parse::<Space>() {
                Ok(space) => space,
                Err(e) => {
                    warn!(plate = %record.plate, error = %e, "skipping open record");
                    continue;
                }
            };

            if !self.layout.contains(space) {
                warn!(
                    plate = %record.plate,
                    space = %space,
                    rows = self.layout.rows,
                    columns = self.layout.columns,
                    "skipping open record outside the lot"
                );
                continue;
            }

            if !state.grid.place(space, &record.plate) {
                warn!(
                    plate = %record.plate,
                    space = %space,
                    holder = state.grid.get(space).unwrap_or_default(),
                    "skipping open record for a space that is already taken"
                );
            }
        }

        debug!(
            occupied = state.grid.occupied_count(),
            capacity = self.layout.capacity(),
            "grid rebuilt"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::SqliteStore;
    use crate::models::{ClosedOccupancy, InvoiceDetail, NewInvoice, OpenOccupancy, Owner, Vehicle};
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn plate(n: usize) -> String {
        format!("CAR{:03}", n)
    }

    /// Store with `vehicles` registered plates CAR000, CAR001, ...
    fn store_with(vehicles: usize) -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_owner(&Owner::new("0922222222", "Luis Mora", "0988000222", "Calle 9"))
            .unwrap();
        for n in 0..vehicles {
            assert!(store
                .insert_vehicle(&Vehicle::new(&plate(n), "Chevrolet", "Aveo", "0922222222"))
                .unwrap());
        }
        Arc::new(store)
    }

    fn engine(store: Arc<SqliteStore>, rows: usize, columns: usize) -> AllocationEngine<SqliteStore> {
        AllocationEngine::new(
            store,
            LotLayout::new(rows, columns),
            Arc::new(ManualClock::new(start())),
        )
    }

    #[test]
    fn test_entry_takes_first_free_space() {
        let engine = engine(store_with(3), 2, 2);

        let first = engine.register_entry("car000").unwrap();
        assert_eq!(
            first,
            EntryOutcome::Parked {
                plate: "CAR000".to_string(),
                space: Space::new(0, 0),
            }
        );
        assert_eq!(engine.register_entry("CAR001").unwrap().space(), Some(Space::new(0, 1)));
        assert_eq!(engine.register_entry("CAR002").unwrap().space(), Some(Space::new(1, 0)));
        assert_eq!(engine.find_free_space().unwrap(), Some(Space::new(1, 1)));
    }

    #[test]
    fn test_unregistered_vehicle_changes_nothing() {
        let store = store_with(1);
        let engine = engine(store.clone(), 1, 1);
        engine.register_entry("CAR000").unwrap();

        let err = engine.register_entry("GHOST1").unwrap_err();
        assert!(matches!(err, ParkingError::VehicleUnregistered { ref plate } if plate == "GHOST1"));
        assert!(engine.wait_queue().is_empty());
        assert_eq!(engine.refresh_grid().unwrap().occupied_count(), 1);
        assert_eq!(store.count_records("GHOST1").unwrap(), 0);
    }

    #[test]
    fn test_already_parked() {
        let engine = engine(store_with(1), 2, 2);
        engine.register_entry("CAR000").unwrap();

        let err = engine.register_entry(" car000 ").unwrap_err();
        assert!(matches!(err, ParkingError::AlreadyParked { .. }));
        assert_eq!(engine.refresh_grid().unwrap().occupied_count(), 1);
    }

    #[test]
    fn test_full_lot_queues_idempotently() {
        let engine = engine(store_with(3), 1, 1);
        engine.register_entry("CAR000").unwrap();

        let queued = engine.register_entry("CAR001").unwrap();
        assert_eq!(
            queued,
            EntryOutcome::Queued {
                plate: "CAR001".to_string(),
                position: 1,
            }
        );
        engine.register_entry("CAR002").unwrap();

        // Asking again keeps the original place in line
        let again = engine.register_entry("CAR001").unwrap();
        assert_eq!(
            again,
            EntryOutcome::Queued {
                plate: "CAR001".to_string(),
                position: 1,
            }
        );
        assert_eq!(engine.wait_queue(), vec!["CAR001", "CAR002"]);
    }

    #[test]
    fn test_exit_without_open_record() {
        let engine = engine(store_with(1), 1, 1);
        let err = engine.register_exit("CAR000").unwrap_err();
        assert!(matches!(err, ParkingError::NoOpenRecord { .. }));
    }

    #[test]
    fn test_exit_with_empty_queue() {
        let engine = engine(store_with(1), 1, 2);
        engine.register_entry("CAR000").unwrap();

        let exit = engine.register_exit("CAR000").unwrap();
        assert_eq!(exit.plate, "CAR000");
        assert!(exit.promotion.is_none());
        assert_eq!(exit.to_string(), "Vehicle CAR000 has left.");
        assert_eq!(engine.refresh_grid().unwrap().occupied_count(), 0);
    }

    #[test]
    fn test_exit_promotes_head_and_keeps_order() {
        let engine = engine(store_with(4), 1, 1);
        engine.register_entry("CAR000").unwrap();
        engine.register_entry("CAR001").unwrap();
        engine.register_entry("CAR002").unwrap();
        engine.register_entry("CAR003").unwrap();

        let exit = engine.register_exit("CAR000").unwrap();
        let promotion = exit.promotion.as_ref().unwrap();
        assert_eq!(promotion.plate, "CAR001");
        assert_eq!(
            promotion.outcome.as_ref().unwrap(),
            &EntryOutcome::Parked {
                plate: "CAR001".to_string(),
                space: Space::new(0, 0),
            }
        );
        assert_eq!(engine.wait_queue(), vec!["CAR002", "CAR003"]);
        assert!(exit.to_string().contains("Vehicle CAR001 parked in space F1,C1."));
    }

    #[test]
    fn test_scenario_four_by_five() {
        let store = store_with(21);
        let engine = engine(store, 4, 5);

        for n in 0..20 {
            assert!(engine.register_entry(&plate(n)).unwrap().is_parked());
        }
        assert_eq!(engine.find_free_space().unwrap(), None);

        let queued = engine.register_entry(&plate(20)).unwrap();
        assert!(!queued.is_parked());
        assert_eq!(engine.wait_queue(), vec![plate(20)]);

        // CAR007 sits in the 8th space: F2,C3
        let freed = engine.refresh_grid().unwrap().position_of(&plate(7)).unwrap();
        assert_eq!(freed, Space::new(1, 2));

        let exit = engine.register_exit(&plate(7)).unwrap();
        let promoted = exit.promotion.unwrap().outcome.unwrap();
        assert_eq!(promoted.plate(), plate(20));
        assert_eq!(promoted.space(), Some(freed));
        assert!(engine.wait_queue().is_empty());

        let grid = engine.refresh_grid().unwrap();
        assert!(grid.is_full());
        assert_eq!(grid.get(freed), Some(plate(20).as_str()));
    }

    #[test]
    fn test_refresh_skips_malformed_and_out_of_bounds() {
        let store = store_with(4);
        store.insert_raw_open_record("CAR000", "2024-06-03 07:00:00", "garbage").unwrap();
        store.insert_raw_open_record("CAR001", "2024-06-03 07:00:00", "F9,C9").unwrap();
        store.insert_raw_open_record("CAR002", "2024-06-03 07:00:00", "F1,C2").unwrap();
        store.insert_raw_open_record("CAR003", "2024-06-03 07:00:00", "F1,C2").unwrap();
        let engine = engine(store, 2, 2);

        let grid = engine.refresh_grid().unwrap();
        assert_eq!(grid.occupied_count(), 1);
        assert_eq!(grid.get(Space::new(0, 1)), Some("CAR002"));
        assert_eq!(engine.find_free_space().unwrap(), Some(Space::new(0, 0)));
    }

    #[test]
    fn test_grid_follows_store_between_calls() {
        let store = store_with(2);
        let engine = engine(store.clone(), 1, 2);
        engine.register_entry("CAR000").unwrap();

        // Someone else closes the session behind the engine's back
        store.close_open_record("CAR000", start()).unwrap();
        assert_eq!(engine.find_free_space().unwrap(), Some(Space::new(0, 0)));
    }

    #[test]
    fn test_concurrent_entries_never_share_a_space() {
        let store = store_with(12);
        let engine = Arc::new(engine(store, 2, 5));

        let handles: Vec<_> = (0..12)
            .map(|n| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.register_entry(&plate(n)).unwrap())
            })
            .collect();
        let outcomes: Vec<EntryOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut spaces: Vec<Space> = outcomes.iter().filter_map(EntryOutcome::space).collect();
        spaces.sort();
        spaces.dedup();
        assert_eq!(spaces.len(), 10);
        assert_eq!(engine.wait_queue().len(), 2);
    }

    // ------------------------------------------------------------------
    // Store that can be told to refuse occupancy inserts
    // ------------------------------------------------------------------

    struct FlakyStore {
        inner: SqliteStore,
        reject_entries: AtomicBool,
    }

    impl ParkingStore for FlakyStore {
        fn insert_owner(&self, owner: &Owner) -> Result<bool> {
            self.inner.insert_owner(owner)
        }
        fn list_owners(&self) -> Result<Vec<Owner>> {
            self.inner.list_owners()
        }
        fn find_owner(&self, id: &str) -> Result<Option<Owner>> {
            self.inner.find_owner(id)
        }
        fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<bool> {
            self.inner.insert_vehicle(vehicle)
        }
        fn find_vehicle(&self, plate: &str) -> Result<Option<Vehicle>> {
            self.inner.find_vehicle(plate)
        }
        fn has_open_record(&self, plate: &str) -> Result<bool> {
            self.inner.has_open_record(plate)
        }
        fn list_open_records(&self) -> Result<Vec<OpenOccupancy>> {
            self.inner.list_open_records()
        }
        fn insert_occupancy(&self, plate: &str, entry_time: NaiveDateTime, space: &str) -> Result<bool> {
            if self.reject_entries.load(Ordering::SeqCst) {
                return Err(ParkingError::Persistence("connection lost".to_string()));
            }
            self.inner.insert_occupancy(plate, entry_time, space)
        }
        fn close_open_record(&self, plate: &str, exit_time: NaiveDateTime) -> Result<bool> {
            self.inner.close_open_record(plate, exit_time)
        }
        fn find_latest_closed(&self, plate: &str) -> Result<Option<ClosedOccupancy>> {
            self.inner.find_latest_closed(plate)
        }
        fn insert_invoice(&self, invoice: &NewInvoice) -> Result<i64> {
            self.inner.insert_invoice(invoice)
        }
        fn find_invoice(&self, id: i64) -> Result<Option<InvoiceDetail>> {
            self.inner.find_invoice(id)
        }
    }

    /// FlakyStore with plates EVA001, EVA002, ...
    fn flaky_store(vehicles: usize, reject_entries: bool) -> Arc<FlakyStore> {
        let inner = SqliteStore::open_in_memory().unwrap();
        inner.insert_owner(&Owner::new("1", "Eva", "", "")).unwrap();
        for n in 1..=vehicles {
            let plate = format!("EVA{:03}", n);
            inner.insert_vehicle(&Vehicle::new(&plate, "VW", "Gol", "1")).unwrap();
        }
        Arc::new(FlakyStore {
            inner,
            reject_entries: AtomicBool::new(reject_entries),
        })
    }

    #[test]
    fn test_persistence_failure_leaves_grid_untouched() {
        let store = flaky_store(1, true);
        let clock = Arc::new(ManualClock::new(start()));
        let engine = AllocationEngine::new(store.clone(), LotLayout::new(1, 2), clock.clone());

        let err = engine.register_entry("EVA001").unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(engine.refresh_grid().unwrap().occupied_count(), 0);
        assert!(engine.wait_queue().is_empty());

        store.reject_entries.store(false, Ordering::SeqCst);
        clock.advance(Duration::minutes(1));
        assert!(engine.register_entry("EVA001").unwrap().is_parked());
    }

    #[test]
    fn test_failed_promotion_is_reported_and_dropped() {
        let store = flaky_store(3, false);
        let engine = AllocationEngine::new(
            store.clone(),
            LotLayout::new(1, 1),
            Arc::new(ManualClock::new(start())),
        );
        engine.register_entry("EVA001").unwrap();
        engine.register_entry("EVA002").unwrap();
        engine.register_entry("EVA003").unwrap();

        store.reject_entries.store(true, Ordering::SeqCst);
        let exit = engine.register_exit("EVA001").unwrap();

        let promotion = exit.promotion.as_ref().unwrap();
        assert_eq!(promotion.plate, "EVA002");
        assert!(promotion.outcome.as_ref().unwrap_err().is_persistence());
        assert_eq!(
            exit.to_string(),
            "Vehicle EVA001 has left. Could not admit waiting vehicle EVA002: \
             persistence error: connection lost."
        );

        // Only the head is tried; the rest keep their places
        assert_eq!(engine.wait_queue(), vec!["EVA003"]);
        assert_eq!(engine.refresh_grid().unwrap().occupied_count(), 0);
    }

    #[test]
    fn test_exit_of_queued_plate_keeps_it_waiting() {
        let engine = engine(store_with(2), 1, 1);
        engine.register_entry("CAR000").unwrap();
        engine.register_entry("CAR001").unwrap();

        let err = engine.register_exit("CAR001").unwrap_err();
        assert!(matches!(err, ParkingError::NoOpenRecord { ref plate } if plate == "CAR001"));
        assert_eq!(engine.wait_queue(), vec!["CAR001"]);
    }

    #[test]
    fn test_direct_entry_leaves_the_wait_queue() {
        let store = store_with(3);
        let engine = engine(store.clone(), 1, 1);
        engine.register_entry("CAR000").unwrap();
        engine.register_entry("CAR001").unwrap();
        engine.register_entry("CAR002").unwrap();

        // Space freed outside the engine, then a waiting plate retries
        store.close_open_record("CAR000", start()).unwrap();
        assert!(engine.register_entry("CAR001").unwrap().is_parked());
        assert_eq!(engine.wait_queue(), vec!["CAR002"]);

        // Its own exit promotes the next plate, not itself
        let exit = engine.register_exit("CAR001").unwrap();
        assert_eq!(exit.promotion.as_ref().unwrap().plate, "CAR002");
        assert!(!store.has_open_record("CAR001").unwrap());
        assert!(store.has_open_record("CAR002").unwrap());
        assert!(engine.wait_queue().is_empty());
    }
}
