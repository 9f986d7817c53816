use crate::clock::format_timestamp;
use crate::error::{ParkingError, Result};
use crate::models::{ClosedOccupancy, InvoiceDetail, NewInvoice, OpenOccupancy, Owner, Vehicle};
use crate::store::ParkingStore;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Vehicles must point at a real owner, records at a real vehicle
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Owners & Vehicles
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS owners (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS vehicles (
            plate TEXT PRIMARY KEY,
            brand TEXT NOT NULL,
            model TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            FOREIGN KEY (owner_id) REFERENCES owners(id) ON DELETE CASCADE
        )",
        [],
    )?;

    // ==========================================================================
    // Occupancy records (one row per parking session)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS occupancy_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plate TEXT NOT NULL,
            entry_time TEXT NOT NULL,
            exit_time TEXT,
            space TEXT,
            FOREIGN KEY (plate) REFERENCES vehicles(plate) ON DELETE CASCADE
        )",
        [],
    )?;

    // ==========================================================================
    // Invoices
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id INTEGER NOT NULL,
            plate TEXT NOT NULL,
            minutes REAL NOT NULL,
            amount REAL NOT NULL,
            issued_at TEXT NOT NULL,
            FOREIGN KEY (record_id) REFERENCES occupancy_records(id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================

    // At most one open session per vehicle
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_open_record
         ON occupancy_records(plate) WHERE exit_time IS NULL",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_plate_exit ON occupancy_records(plate, exit_time)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_owner ON vehicles(owner_id)",
        [],
    )?;

    Ok(())
}

/// Ok(false) for constraint violations (duplicate key, missing foreign key)
fn inserted(result: rusqlite::Result<usize>) -> Result<bool> {
    match result {
        Ok(rows) => Ok(rows == 1),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed [`ParkingStore`]
///
/// The connection sits behind a mutex; each trait call holds the lock for
/// exactly one operation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sessions ever recorded for a plate
    pub fn count_records(&self, plate: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM occupancy_records WHERE plate = ?1",
            [plate],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Write a finished session directly (imports, fixtures)
    pub fn insert_closed_record(
        &self,
        plate: &str,
        entry_time: &str,
        exit_time: &str,
        space: &str,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO occupancy_records (plate, entry_time, exit_time, space)
             VALUES (?1, ?2, ?3, ?4)",
            params![plate, entry_time, exit_time, space],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Write an open session with an arbitrary space string (legacy data)
    pub fn insert_raw_open_record(&self, plate: &str, entry_time: &str, space: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO occupancy_records (plate, entry_time, space) VALUES (?1, ?2, ?3)",
            params![plate, entry_time, space],
        )?;
        Ok(())
    }
}

impl ParkingStore for SqliteStore {
    fn insert_owner(&self, owner: &Owner) -> Result<bool> {
        let conn = self.conn();
        inserted(conn.execute(
            "INSERT INTO owners (id, name, phone, address) VALUES (?1, ?2, ?3, ?4)",
            params![owner.id, owner.name, owner.phone, owner.address],
        ))
    }

    fn list_owners(&self) -> Result<Vec<Owner>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, phone, address FROM owners ORDER BY name ASC, id ASC",
        )?;

        let owners = stmt
            .query_map([], |row| {
                Ok(Owner {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    phone: row.get(2)?,
                    address: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(owners)
    }

    fn find_owner(&self, id: &str) -> Result<Option<Owner>> {
        let conn = self.conn();
        let owner = conn
            .query_row(
                "SELECT id, name, phone, address FROM owners WHERE id = ?1",
                [id],
                |row| {
                    Ok(Owner {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        address: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(owner)
    }

    fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<bool> {
        let conn = self.conn();
        inserted(conn.execute(
            "INSERT INTO vehicles (plate, brand, model, owner_id) VALUES (?1, ?2, ?3, ?4)",
            params![vehicle.plate, vehicle.brand, vehicle.model, vehicle.owner_id],
        ))
    }

    fn find_vehicle(&self, plate: &str) -> Result<Option<Vehicle>> {
        let conn = self.conn();
        let vehicle = conn
            .query_row(
                "SELECT plate, brand, model, owner_id FROM vehicles WHERE plate = ?1",
                [plate],
                |row| {
                    Ok(Vehicle {
                        plate: row.get(0)?,
                        brand: row.get(1)?,
                        model: row.get(2)?,
                        owner_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(vehicle)
    }

    fn has_open_record(&self, plate: &str) -> Result<bool> {
        let conn = self.conn();
        let open: Option<i64> = conn
            .query_row(
                "SELECT id FROM occupancy_records WHERE plate = ?1 AND exit_time IS NULL",
                [plate],
                |row| row.get(0),
            )
            .optional()?;
        Ok(open.is_some())
    }

    fn list_open_records(&self) -> Result<Vec<OpenOccupancy>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT plate, space FROM occupancy_records
             WHERE exit_time IS NULL
             ORDER BY entry_time ASC, id ASC",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(OpenOccupancy {
                    plate: row.get(0)?,
                    space: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn insert_occupancy(&self, plate: &str, entry_time: NaiveDateTime, space: &str) -> Result<bool> {
        let conn = self.conn();
        inserted(conn.execute(
            "INSERT INTO occupancy_records (plate, entry_time, space) VALUES (?1, ?2, ?3)",
            params![plate, format_timestamp(entry_time), space],
        ))
    }

    fn close_open_record(&self, plate: &str, exit_time: NaiveDateTime) -> Result<bool> {
        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE occupancy_records SET exit_time = ?1
             WHERE plate = ?2 AND exit_time IS NULL",
            params![format_timestamp(exit_time), plate],
        )?;
        Ok(rows > 0)
    }

    fn find_latest_closed(&self, plate: &str) -> Result<Option<ClosedOccupancy>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT id, plate, entry_time, exit_time, space FROM occupancy_records
                 WHERE plate = ?1 AND exit_time IS NOT NULL
                 ORDER BY datetime(exit_time) DESC, id DESC
                 LIMIT 1",
                [plate],
                |row| {
                    Ok(ClosedOccupancy {
                        id: row.get(0)?,
                        plate: row.get(1)?,
                        entry_time: row.get(2)?,
                        exit_time: row.get(3)?,
                        space: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn insert_invoice(&self, invoice: &NewInvoice) -> Result<i64> {
        let conn = self.conn();
        let id: Option<i64> = conn
            .query_row(
                "INSERT INTO invoices (record_id, plate, minutes, amount, issued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING id",
                params![
                    invoice.record_id,
                    invoice.plate,
                    invoice.minutes,
                    invoice.amount,
                    format_timestamp(invoice.issued_at),
                ],
                |row| row.get(0),
            )
            .optional()?;

        id.ok_or_else(|| {
            ParkingError::Persistence(format!(
                "invoice for {} was written without returning its id",
                invoice.plate
            ))
        })
    }

    fn find_invoice(&self, id: i64) -> Result<Option<InvoiceDetail>> {
        let conn = self.conn();
        let detail = conn
            .query_row(
                "SELECT i.id, i.plate, i.minutes, i.amount, i.issued_at,
                        r.entry_time, r.exit_time, r.space,
                        o.name, o.id
                 FROM invoices i
                 JOIN occupancy_records r ON i.record_id = r.id
                 JOIN vehicles v ON i.plate = v.plate
                 JOIN owners o ON v.owner_id = o.id
                 WHERE i.id = ?1",
                [id],
                |row| {
                    Ok(InvoiceDetail {
                        id: row.get(0)?,
                        plate: row.get(1)?,
                        minutes: row.get(2)?,
                        amount: row.get(3)?,
                        issued_at: row.get(4)?,
                        entry_time: row.get(5)?,
                        exit_time: row.get(6)?,
                        space: row.get(7)?,
                        owner_name: row.get(8)?,
                        owner_id: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(detail)
    }
}
