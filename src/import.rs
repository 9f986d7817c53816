// 📥 CSV import - bulk owner and vehicle registration
//
// owners.csv:   id,name,phone,address
// vehicles.csv: plate,brand,model,owner_id

use crate::models::{Owner, Vehicle};
use anyhow::{Context, Result};
use std::path::Path;

pub fn load_owners_csv(csv_path: &Path) -> Result<Vec<Owner>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open owners CSV: {:?}", csv_path))?;

    let mut owners = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let owner: Owner =
            result.with_context(|| format!("Failed to read owner on data row {}", line + 1))?;
        owners.push(owner);
    }

    Ok(owners)
}

pub fn load_vehicles_csv(csv_path: &Path) -> Result<Vec<Vehicle>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open vehicles CSV: {:?}", csv_path))?;

    let mut vehicles = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let vehicle: Vehicle =
            result.with_context(|| format!("Failed to read vehicle on data row {}", line + 1))?;
        vehicles.push(vehicle);
    }

    Ok(vehicles)
}
