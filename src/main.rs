// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use parking_lot_manager::logging::init_logging;
use parking_lot_manager::{
    load_owners_csv, load_vehicles_csv, Config, LotSnapshot, ParkingLot, Space,
};

const USAGE: &str = "usage: parking-lot-manager [init | import-owners <csv> | import-vehicles <csv> | status]";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = Config::from_env()?;

    match args.get(1).map(String::as_str) {
        None => run_ui_mode(&config),
        Some("init") => {
            init_logging()?;
            run_init(&config)
        }
        Some("import-owners") => {
            init_logging()?;
            run_import_owners(&config, csv_arg(&args)?)
        }
        Some("import-vehicles") => {
            init_logging()?;
            run_import_vehicles(&config, csv_arg(&args)?)
        }
        Some("status") => {
            init_logging()?;
            run_status(&config)
        }
        Some(other) => {
            eprintln!("{}", USAGE);
            bail!("unknown command: {}", other)
        }
    }
}

fn csv_arg(args: &[String]) -> Result<&Path> {
    match args.get(2) {
        Some(path) => Ok(Path::new(path)),
        None => {
            eprintln!("{}", USAGE);
            bail!("missing CSV path")
        }
    }
}

fn open_lot(config: &Config) -> Result<ParkingLot<parking_lot_manager::SqliteStore>> {
    ParkingLot::open(config)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))
}

fn run_init(config: &Config) -> Result<()> {
    println!("🅿️  Parking Lot Manager v{}", parking_lot_manager::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    open_lot(config)?;
    println!("✓ Database ready: {:?}", config.database_path);
    println!(
        "✓ Lot: {} rows × {} columns ({} spaces), rate {:.2}/min",
        config.layout.rows,
        config.layout.columns,
        config.layout.capacity(),
        config.rate_per_minute
    );
    Ok(())
}

fn run_import_owners(config: &Config, csv_path: &Path) -> Result<()> {
    println!("\n📂 Loading owners from {:?}...", csv_path);
    let owners = load_owners_csv(csv_path)?;
    println!("✓ Loaded {} owners from CSV", owners.len());

    let lot = open_lot(config)?;
    let summary = lot.registry.register_owners(&owners)?;
    println!("✓ Inserted: {} owners", summary.inserted);
    println!("✓ Skipped duplicates: {}", summary.skipped);
    Ok(())
}

fn run_import_vehicles(config: &Config, csv_path: &Path) -> Result<()> {
    println!("\n📂 Loading vehicles from {:?}...", csv_path);
    let vehicles = load_vehicles_csv(csv_path)?;
    println!("✓ Loaded {} vehicles from CSV", vehicles.len());

    let lot = open_lot(config)?;
    let summary = lot.registry.register_vehicles(&vehicles)?;
    println!("✓ Inserted: {} vehicles", summary.inserted);
    println!("✓ Skipped duplicates: {}", summary.skipped);
    Ok(())
}

fn run_status(config: &Config) -> Result<()> {
    let lot = open_lot(config)?;
    let snapshot = lot.allocation.snapshot()?;

    println!(
        "🅿️  {}/{} spaces occupied",
        snapshot.occupied(),
        snapshot.capacity()
    );
    println!("{}", render_grid(&snapshot));

    // The waiting list lives in the serving process, not in the database
    println!("Waiting list is held by the running dashboard or server.");
    Ok(())
}

/// Plain-text grid: one line per row, "·" for a free space
fn render_grid(snapshot: &LotSnapshot) -> String {
    let width = 10;
    let mut out = format!("{:<5}", "");
    for column in 0..snapshot.layout.columns {
        out.push_str(&format!("{:<width$}", format!("C{}", column + 1), width = width));
    }

    for row in 0..snapshot.layout.rows {
        out.push('\n');
        out.push_str(&format!("{:<5}", format!("F{}", row + 1)));
        for column in 0..snapshot.layout.columns {
            let cell = snapshot.grid.get(Space::new(row, column)).unwrap_or("·");
            out.push_str(&format!("{:<width$}", cell, width = width));
        }
    }
    out
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    parking_lot_manager::logging::init_file_logging(&config.log_file)?;
    println!("🖥️  Loading Parking Lot dashboard...\n");

    let lot = open_lot(config)?;
    let mut app = ui::App::new(lot)?;
    ui::run_ui(&mut app)?;

    println!("\n✅ Dashboard closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web UI: cargo run --bin parking-server --features server");
    std::process::exit(1);
}
