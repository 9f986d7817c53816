// Parking Lot Manager - Web Server
// HTML dashboard + forms, and a small JSON API, with Axum

use anyhow::Context;
use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use parking_lot_manager::logging::init_logging;
use parking_lot_manager::{
    Config, InvoiceDetail, LotSnapshot, Owner, ParkingLot, Space, SqliteStore, Vehicle,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    lot: ParkingLot<SqliteStore>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Flash message carried across a redirect in the query string
#[derive(Debug, Default, Deserialize)]
struct Flash {
    msg: Option<String>,
    level: Option<String>,
}

#[derive(Deserialize)]
struct PlateForm {
    plate: String,
}

#[derive(Deserialize)]
struct OwnerForm {
    id: String,
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    address: String,
}

#[derive(Deserialize)]
struct VehicleForm {
    plate: String,
    #[serde(default)]
    brand: String,
    #[serde(default)]
    model: String,
    owner_id: String,
}

fn redirect_with(path: &str, level: &str, message: &str) -> Redirect {
    Redirect::to(&format!(
        "{}?level={}&msg={}",
        path,
        level,
        urlencoding::encode(message)
    ))
}

// ============================================================================
// HTML rendering
// ============================================================================

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, flash: &Flash, body: &str) -> Html<String> {
    let flash_html = match &flash.msg {
        Some(msg) => {
            let level = match flash.level.as_deref() {
                Some("success") => "success",
                Some("danger") => "danger",
                _ => "info",
            };
            format!(r#"<p class="flash {}">{}</p>"#, level, escape_html(msg))
        }
        None => String::new(),
    };

    Html(format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
nav a {{ margin-right: 1em; }}
table.lot td {{ border: 1px solid #999; width: 7em; height: 2.5em; text-align: center; }}
td.free {{ background: #dfd; }}
td.taken {{ background: #fdd; font-weight: bold; }}
.flash {{ padding: .5em; border-radius: 4px; }}
.flash.success {{ background: #dfd; }}
.flash.danger {{ background: #fdd; }}
.flash.info {{ background: #def; }}
</style>
</head>
<body>
<nav><a href="/">Dashboard</a><a href="/owners">Owners</a><a href="/vehicles">Vehicles</a></nav>
<h1>{title}</h1>
{flash_html}
{body}
</body>
</html>"#,
        title = escape_html(title),
        flash_html = flash_html,
        body = body,
    ))
}

fn render_lot(snapshot: &LotSnapshot) -> String {
    let mut html = String::from(r#"<table class="lot"><tr><th></th>"#);
    for column in 0..snapshot.layout.columns {
        html.push_str(&format!("<th>C{}</th>", column + 1));
    }
    html.push_str("</tr>");

    for row in 0..snapshot.layout.rows {
        html.push_str(&format!("<tr><th>F{}</th>", row + 1));
        for column in 0..snapshot.layout.columns {
            match snapshot.grid.get(Space::new(row, column)) {
                Some(plate) => html.push_str(&format!(r#"<td class="taken">{}</td>"#, escape_html(plate))),
                None => html.push_str(r#"<td class="free">free</td>"#),
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");

    html.push_str(&format!(
        "<p>{} of {} spaces occupied.</p><h2>Waiting list</h2>",
        snapshot.occupied(),
        snapshot.capacity()
    ));
    if snapshot.wait_queue.is_empty() {
        html.push_str("<p>Nobody is waiting.</p>");
    } else {
        html.push_str("<ol>");
        for plate in &snapshot.wait_queue {
            html.push_str(&format!("<li>{}</li>", escape_html(plate)));
        }
        html.push_str("</ol>");
    }
    html
}

fn render_invoice(invoice: &InvoiceDetail) -> String {
    format!(
        r#"<table>
<tr><th>Invoice</th><td>#{id}</td></tr>
<tr><th>Plate</th><td>{plate}</td></tr>
<tr><th>Owner</th><td>{owner} ({owner_id})</td></tr>
<tr><th>Space</th><td>{space}</td></tr>
<tr><th>Entry</th><td>{entry}</td></tr>
<tr><th>Exit</th><td>{exit}</td></tr>
<tr><th>Minutes</th><td>{minutes:.2}</td></tr>
<tr><th>Amount</th><td>${amount:.2}</td></tr>
<tr><th>Issued</th><td>{issued}</td></tr>
</table>"#,
        id = invoice.id,
        plate = escape_html(&invoice.plate),
        owner = escape_html(&invoice.owner_name),
        owner_id = escape_html(&invoice.owner_id),
        space = escape_html(invoice.space.as_deref().unwrap_or("-")),
        entry = escape_html(&invoice.entry_time),
        exit = escape_html(invoice.exit_time.as_deref().unwrap_or("-")),
        minutes = invoice.minutes,
        amount = invoice.amount,
        issued = escape_html(&invoice.issued_at),
    )
}

fn error_page(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        page("Error", &Flash::default(), &format!("<p>{}</p>", escape_html(message))),
    )
        .into_response()
}

// ============================================================================
// Page Handlers
// ============================================================================

/// GET / - Lot grid, waiting list, entry/exit forms
async fn dashboard(State(state): State<AppState>, Query(flash): Query<Flash>) -> Response {
    match state.lot.allocation.snapshot() {
        Ok(snapshot) => {
            let body = format!(
                r#"{lot}
<h2>Entry</h2>
<form method="post" action="/enter"><input name="plate" placeholder="Plate" required> <button>Enter</button></form>
<h2>Exit</h2>
<form method="post" action="/exit"><input name="plate" placeholder="Plate" required> <button>Exit &amp; bill</button></form>"#,
                lot = render_lot(&snapshot)
            );
            page("Parking Lot", &flash, &body).into_response()
        }
        Err(e) => {
            error!("Error loading lot: {}", e);
            error_page(&format!("Could not load the lot: {}", e))
        }
    }
}

/// GET /owners - Owner registration form
async fn owners_page(Query(flash): Query<Flash>) -> Html<String> {
    let body = r#"<form method="post" action="/owners">
<p><input name="id" placeholder="National ID" required></p>
<p><input name="name" placeholder="Name" required></p>
<p><input name="phone" placeholder="Phone"></p>
<p><input name="address" placeholder="Address"></p>
<button>Register owner</button>
</form>"#;
    page("Register owner", &flash, body)
}

/// POST /owners - Register an owner
async fn register_owner(State(state): State<AppState>, Form(form): Form<OwnerForm>) -> Redirect {
    let owner = Owner::new(&form.id, &form.name, &form.phone, &form.address);
    match state.lot.registry.register_owner(&owner) {
        Ok(owner) => redirect_with("/owners", "success", &format!("Owner {} registered.", owner.name)),
        Err(e) => redirect_with("/owners", "danger", &format!("Error registering owner: {}", e)),
    }
}

/// GET /vehicles - Vehicle registration form with owner picker
async fn vehicles_page(State(state): State<AppState>, Query(flash): Query<Flash>) -> Response {
    let owners = match state.lot.registry.list_owners() {
        Ok(owners) => owners,
        Err(e) => {
            error!("Error listing owners: {}", e);
            return error_page(&format!("Could not load owners: {}", e));
        }
    };

    let options: String = owners
        .iter()
        .map(|o| {
            format!(
                r#"<option value="{}">{} ({})</option>"#,
                escape_html(&o.id),
                escape_html(&o.name),
                escape_html(&o.id)
            )
        })
        .collect();

    let body = format!(
        r#"<form method="post" action="/vehicles">
<p><input name="plate" placeholder="Plate" required></p>
<p><input name="brand" placeholder="Brand"></p>
<p><input name="model" placeholder="Model"></p>
<p><select name="owner_id" required>{}</select></p>
<button>Register vehicle</button>
</form>"#,
        options
    );
    page("Register vehicle", &flash, &body).into_response()
}

/// POST /vehicles - Register a vehicle
async fn register_vehicle(State(state): State<AppState>, Form(form): Form<VehicleForm>) -> Redirect {
    let vehicle = Vehicle::new(&form.plate, &form.brand, &form.model, &form.owner_id);
    match state.lot.registry.register_vehicle(&vehicle) {
        Ok(vehicle) => redirect_with("/vehicles", "success", &format!("Vehicle {} registered.", vehicle.plate)),
        Err(e) => redirect_with("/vehicles", "danger", &format!("Error registering vehicle: {}", e)),
    }
}

/// POST /enter - Park or queue a vehicle
async fn enter_vehicle(State(state): State<AppState>, Form(form): Form<PlateForm>) -> Redirect {
    match state.lot.allocation.register_entry(&form.plate) {
        Ok(outcome) => {
            let level = if outcome.is_parked() { "success" } else { "info" };
            redirect_with("/", level, &outcome.to_string())
        }
        Err(e) => redirect_with("/", "danger", &format!("Error: {}", e)),
    }
}

/// POST /exit - Close the session, bill it, show the invoice
async fn exit_vehicle(State(state): State<AppState>, Form(form): Form<PlateForm>) -> Redirect {
    let exit = match state.lot.allocation.register_exit(&form.plate) {
        Ok(exit) => exit,
        Err(e) => return redirect_with("/", "danger", &format!("Error: {}", e)),
    };

    match state.lot.billing.generate_invoice(&exit.plate) {
        Ok(id) => redirect_with(&format!("/invoices/{}", id), "success", &exit.to_string()),
        Err(e) => {
            error!("Error generating invoice for {}: {}", exit.plate, e);
            redirect_with(
                "/",
                "danger",
                &format!("{} Error generating invoice: {}", exit, e),
            )
        }
    }
}

/// GET /invoices/:id - Invoice view
async fn invoice_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(flash): Query<Flash>,
) -> Response {
    match state.lot.billing.get_invoice(id) {
        Ok(Some(invoice)) => page(&format!("Invoice #{}", id), &flash, &render_invoice(&invoice)).into_response(),
        Ok(None) => redirect_with("/", "danger", "Error: invoice not found.").into_response(),
        Err(e) => redirect_with("/", "danger", &format!("Error loading invoice: {}", e)).into_response(),
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/lot - Grid and waiting list
async fn api_lot(State(state): State<AppState>) -> Response {
    match state.lot.allocation.snapshot() {
        Ok(snapshot) => (StatusCode::OK, Json(ApiResponse::ok(snapshot))).into_response(),
        Err(e) => {
            error!("Error loading lot: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<LotSnapshot>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// GET /api/invoices/:id - One invoice
async fn api_invoice(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.lot.billing.get_invoice(id) {
        Ok(Some(invoice)) => (StatusCode::OK, Json(ApiResponse::ok(invoice))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<InvoiceDetail>::err("invoice not found")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<InvoiceDetail>::err(e.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState) -> Router {
    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/lot", get(api_lot))
        .route("/invoices/:id", get(api_invoice))
        .with_state(state.clone());

    // Build main router
    Router::new()
        .route("/", get(dashboard))
        .route("/owners", get(owners_page).post(register_owner))
        .route("/vehicles", get(vehicles_page).post(register_vehicle))
        .route("/enter", post(enter_vehicle))
        .route("/exit", post(exit_vehicle))
        .route("/invoices/:id", get(invoice_page))
        .with_state(state)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_logging()?;

    let lot = ParkingLot::open(&config)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    info!(
        database = ?config.database_path,
        rows = config.layout.rows,
        columns = config.layout.columns,
        rate = config.rate_per_minute,
        "parking lot ready"
    );

    let app = build_router(AppState { lot });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
