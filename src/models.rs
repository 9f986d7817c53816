// 🚗 Records the lot persists: owners, vehicles, parking sessions, invoices

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Plates are compared trimmed and uppercased everywhere
pub fn normalize_plate(plate: &str) -> String {
    plate.trim().to_uppercase()
}

// ============================================================================
// OWNERS & VEHICLES
// ============================================================================

/// Vehicle owner, keyed by national ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

impl Owner {
    pub fn new(id: &str, name: &str, phone: &str, address: &str) -> Self {
        Owner {
            id: id.to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            address: address.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub plate: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    pub owner_id: String,
}

impl Vehicle {
    pub fn new(plate: &str, brand: &str, model: &str, owner_id: &str) -> Self {
        Vehicle {
            plate: normalize_plate(plate),
            brand: brand.to_string(),
            model: model.to_string(),
            owner_id: owner_id.to_string(),
        }
    }
}

// ============================================================================
// OCCUPANCY
// ============================================================================

/// A vehicle currently inside the lot, with its space exactly as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenOccupancy {
    pub plate: String,
    pub space: Option<String>,
}

/// A finished parking session, timestamps exactly as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedOccupancy {
    pub id: i64,
    pub plate: String,
    pub entry_time: String,
    pub exit_time: String,
    pub space: Option<String>,
}

// ============================================================================
// INVOICES
// ============================================================================

/// Invoice about to be written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInvoice {
    pub record_id: i64,
    pub plate: String,
    pub minutes: f64,
    pub amount: f64,
    pub issued_at: NaiveDateTime,
}

/// Invoice joined with its session, vehicle and owner, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDetail {
    pub id: i64,
    pub plate: String,
    pub minutes: f64,
    pub amount: f64,
    pub issued_at: String,
    pub entry_time: String,
    pub exit_time: Option<String>,
    pub space: Option<String>,
    pub owner_name: String,
    pub owner_id: String,
}
