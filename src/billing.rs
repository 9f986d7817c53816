// 🧾 Billing Engine - charge for time parked
//
// Formula:
//   minutes = round((exit - entry) in seconds / 60, 2)
//   amount  = minutes × rate_per_minute
//
// Stored timestamps may carry fractional seconds; they are truncated before
// the duration is computed so billing stays at whole-second granularity.

use crate::clock::Clock;
use crate::error::{ParkingError, Result};
use crate::models::{normalize_plate, InvoiceDetail, NewInvoice};
use crate::store::ParkingStore;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Default tariff, currency units per minute
pub const DEFAULT_RATE_PER_MINUTE: f64 = 15.0;

// ============================================================================
// CHARGE CALCULATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Charge {
    pub minutes: f64,
    pub amount: f64,
}

/// Round to two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the charge for one session. Negative durations bill as zero.
pub fn compute_charge(entry: NaiveDateTime, exit: NaiveDateTime, rate_per_minute: f64) -> Charge {
    let seconds = (exit - entry).num_seconds().max(0);
    let minutes = round2(seconds as f64 / 60.0);
    Charge {
        minutes,
        amount: minutes * rate_per_minute,
    }
}

/// Parse a stored timestamp, dropping anything after the seconds
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated form, and either one
/// followed by `.fff…`.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let whole_seconds = raw.trim().split('.').next().unwrap_or_default();

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(whole_seconds, fmt).ok())
        .ok_or_else(|| ParkingError::InvalidTimestamp {
            raw: raw.to_string(),
        })
}

// ============================================================================
// BILLING ENGINE
// ============================================================================

pub struct BillingEngine<S: ParkingStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    rate_per_minute: f64,
}

impl<S: ParkingStore> BillingEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self::with_rate(store, clock, DEFAULT_RATE_PER_MINUTE)
    }

    pub fn with_rate(store: Arc<S>, clock: Arc<dyn Clock>, rate_per_minute: f64) -> Self {
        BillingEngine {
            store,
            clock,
            rate_per_minute,
        }
    }

    pub fn rate_per_minute(&self) -> f64 {
        self.rate_per_minute
    }

    /// Bill the vehicle's most recent finished session; returns the invoice id
    pub fn generate_invoice(&self, plate: &str) -> Result<i64> {
        let plate = normalize_plate(plate);
        let record = self
            .store
            .find_latest_closed(&plate)?
            .ok_or_else(|| ParkingError::NoClosedRecord {
                plate: plate.clone(),
            })?;

        let entry = parse_timestamp(&record.entry_time)?;
        let exit = parse_timestamp(&record.exit_time)?;
        if exit < entry {
            warn!(
                plate = %plate,
                entry = %record.entry_time,
                exit = %record.exit_time,
                "exit precedes entry, billing zero minutes"
            );
        }

        let charge = compute_charge(entry, exit, self.rate_per_minute);
        let id = self.store.insert_invoice(&NewInvoice {
            record_id: record.id,
            plate: plate.clone(),
            minutes: charge.minutes,
            amount: charge.amount,
            issued_at: self.clock.now(),
        })?;

        info!(
            plate = %plate,
            invoice = id,
            minutes = charge.minutes,
            amount = charge.amount,
            "invoice issued"
        );
        Ok(id)
    }

    /// Full invoice for display, `None` if there is no such invoice
    pub fn get_invoice(&self, id: i64) -> Result<Option<InvoiceDetail>> {
        self.store.find_invoice(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationEngine;
    use crate::clock::ManualClock;
    use crate::db::SqliteStore;
    use crate::grid::LotLayout;
    use crate::models::{Owner, Vehicle};
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn seeded_store() -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_owner(&Owner::new("0933333333", "Marta Vera", "0977000333", "Av. Loja 3"))
            .unwrap();
        store
            .insert_vehicle(&Vehicle::new("GBA1234", "Mazda", "3", "0933333333"))
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_five_and_a_half_minutes() {
        let charge = compute_charge(at(10, 0, 0), at(10, 5, 30), 15.0);
        assert_eq!(charge.minutes, 5.5);
        assert_eq!(charge.amount, 82.5);
    }

    #[test]
    fn test_minutes_rounded_to_two_decimals() {
        // 100 s = 1.6666… min
        let charge = compute_charge(at(10, 0, 0), at(10, 1, 40), 15.0);
        assert_eq!(charge.minutes, 1.67);
    }

    #[test]
    fn test_negative_duration_bills_zero() {
        let charge = compute_charge(at(10, 0, 0), at(9, 0, 0), 15.0);
        assert_eq!(charge.minutes, 0.0);
        assert_eq!(charge.amount, 0.0);
    }

    #[test]
    fn test_parse_timestamp_truncates_fraction() {
        assert_eq!(parse_timestamp("2024-07-15 10:05:30.987").unwrap(), at(10, 5, 30));
        assert_eq!(parse_timestamp("2024-07-15T10:05:30").unwrap(), at(10, 5, 30));
        assert_eq!(parse_timestamp(" 2024-07-15 10:05:30 ").unwrap(), at(10, 5, 30));
        assert!(matches!(
            parse_timestamp("15/07/2024 10:05"),
            Err(ParkingError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_fractional_seconds_in_store_are_ignored() {
        let store = seeded_store();
        store
            .insert_closed_record("GBA1234", "2024-07-15 10:00:00.750", "2024-07-15 10:05:30.100", "F1,C1")
            .unwrap();
        let billing = BillingEngine::new(store, Arc::new(ManualClock::new(at(11, 0, 0))));

        let id = billing.generate_invoice("GBA1234").unwrap();
        let invoice = billing.get_invoice(id).unwrap().unwrap();
        assert_eq!(invoice.minutes, 5.5);
        assert_eq!(invoice.amount, 82.5);
    }

    #[test]
    fn test_no_closed_record() {
        let billing = BillingEngine::new(seeded_store(), Arc::new(ManualClock::new(at(9, 0, 0))));
        let err = billing.generate_invoice("GBA1234").unwrap_err();
        assert!(matches!(err, ParkingError::NoClosedRecord { ref plate } if plate == "GBA1234"));
    }

    #[test]
    fn test_uses_most_recent_exit() {
        let store = seeded_store();
        store
            .insert_closed_record("GBA1234", "2024-07-15 08:00:00", "2024-07-15 09:00:00", "F1,C1")
            .unwrap();
        store
            .insert_closed_record("GBA1234", "2024-07-15 12:00:00", "2024-07-15 12:10:00", "F1,C2")
            .unwrap();
        let billing = BillingEngine::new(store, Arc::new(ManualClock::new(at(13, 0, 0))));

        let invoice = billing
            .get_invoice(billing.generate_invoice("gba1234").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(invoice.minutes, 10.0);
        assert_eq!(invoice.amount, 150.0);
        assert_eq!(invoice.space.as_deref(), Some("F1,C2"));
        assert_eq!(invoice.issued_at, "2024-07-15 13:00:00");
    }

    #[test]
    fn test_unknown_invoice_is_none() {
        let billing = BillingEngine::new(seeded_store(), Arc::new(ManualClock::new(at(9, 0, 0))));
        assert!(billing.get_invoice(77).unwrap().is_none());
    }

    #[test]
    fn test_park_leave_and_bill() {
        let store = seeded_store();
        let clock = Arc::new(ManualClock::new(at(10, 0, 0)));
        let lot = AllocationEngine::new(store.clone(), LotLayout::default(), clock.clone());
        let billing = BillingEngine::with_rate(store, clock.clone(), 2.0);

        lot.register_entry("GBA1234").unwrap();
        clock.advance(Duration::seconds(45 * 60 + 18));
        lot.register_exit("GBA1234").unwrap();

        let invoice = billing
            .get_invoice(billing.generate_invoice("GBA1234").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(invoice.minutes, 45.3);
        assert_eq!(invoice.amount, 90.6);
        assert_eq!(invoice.entry_time, "2024-07-15 10:00:00");
        assert_eq!(invoice.exit_time.as_deref(), Some("2024-07-15 10:45:18"));
        assert_eq!(invoice.owner_name, "Marta Vera");
    }
}
