use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use casa_core::{Analytics, CasaService, DashboardStats};
use casa_csv::{CsvError, ImportReport};
use casa_schema::{Lead, LeadActivity, LeadPatch, NewActivity, NewLead, Profile};
use casa_store::{InMemoryStore, LeadFilter, LeadOrder, LeadStore, OrderField, Page, StoreError};
use casa_types::{LeadSource, LeadStatus, Role};

/// Identity claim header. Authentication itself is external; this server
/// only consumes the resulting user id.
const USER_HEADER: &str = "x-user-id";

type ApiError = (StatusCode, String);

#[derive(Clone)]
struct AppState {
    service: Arc<CasaService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Bootstrap admin: stable across restarts when configured, otherwise
    // generated and logged so dev clients can pick it up.
    let admin = match std::env::var("CASA_ADMIN_ID") {
        Ok(raw) if !raw.is_empty() => raw.parse()?,
        _ => Uuid::new_v4(),
    };
    let store = Arc::new(InMemoryStore::with_admin(admin, "Admin"));
    let service = Arc::new(CasaService::new(store));
    tracing::info!(%admin, "bootstrap admin provisioned");

    let state = AppState { service };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/identities", post(register_identity))
        .route("/profiles", get(list_profiles))
        .route("/profiles/:id", get(get_profile).patch(update_profile))
        .route("/profiles/:id/role", put(set_role))
        .route("/leads", get(list_leads).post(create_lead))
        .route(
            "/leads/:id",
            get(get_lead).patch(update_lead).delete(delete_lead),
        )
        .route(
            "/leads/:id/activities",
            get(list_activities).post(create_activity),
        )
        .route("/import", post(import_csv))
        .route("/export", get(export_csv))
        .route("/stats/dashboard", get(dashboard))
        .route("/stats/analytics", get(analytics))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("CASA_HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:7000".into())
        .parse()?;
    tracing::info!(%addr, "casa HTTP server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

fn caller_from(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            format!("missing {USER_HEADER} header"),
        ))?;
    raw.parse().map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            format!("invalid {USER_HEADER} header"),
        )
    })
}

fn store_error(err: StoreError) -> ApiError {
    let status = match err {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::AccessDenied(_) => StatusCode::FORBIDDEN,
        StoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
    };
    (status, err.to_string())
}

fn csv_error(err: CsvError) -> ApiError {
    match err {
        CsvError::Malformed(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CsvError::Store(inner) => store_error(inner),
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default)]
    display_name: Option<String>,
}

async fn register_identity(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let user_id = req.user_id.unwrap_or_else(Uuid::new_v4);
    let profile = state
        .service
        .store()
        .register_identity(user_id, req.display_name.as_deref())
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn list_profiles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let caller = caller_from(&headers)?;
    let profiles = state
        .service
        .store()
        .list_profiles(caller)
        .await
        .map_err(store_error)?;
    Ok(Json(profiles))
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Profile>, ApiError> {
    let caller = caller_from(&headers)?;
    let profile = state
        .service
        .store()
        .get_profile(caller, id)
        .await
        .map_err(store_error)?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct ProfilePatch {
    display_name: String,
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ProfilePatch>,
) -> Result<Json<Profile>, ApiError> {
    let caller = caller_from(&headers)?;
    let profile = state
        .service
        .store()
        .update_profile(caller, id, &req.display_name)
        .await
        .map_err(store_error)?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct RoleRequest {
    role: Role,
}

async fn set_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<RoleRequest>,
) -> Result<Json<Profile>, ApiError> {
    let caller = caller_from(&headers)?;
    let profile = state
        .service
        .store()
        .set_role(caller, id, req.role)
        .await
        .map_err(store_error)?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct LeadQuery {
    #[serde(default)]
    status: Option<LeadStatus>,
    #[serde(default)]
    source: Option<LeadSource>,
    #[serde(default)]
    assigned_to: Option<Uuid>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    sort: Option<OrderField>,
    #[serde(default)]
    desc: Option<bool>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_leads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LeadQuery>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let caller = caller_from(&headers)?;
    let filter = LeadFilter {
        status: query.status,
        source: query.source,
        assigned_to: query.assigned_to,
        search: query.search,
    };
    let order = match query.sort {
        Some(field) => LeadOrder {
            field,
            descending: query.desc.unwrap_or(false),
        },
        None => LeadOrder::default(),
    };
    let page = Page {
        offset: query.offset.unwrap_or(0),
        limit: query.limit.unwrap_or(Page::default().limit),
    };
    let leads = state
        .service
        .store()
        .list_leads(caller, &filter, order, page)
        .await
        .map_err(store_error)?;
    Ok(Json(leads))
}

async fn create_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<NewLead>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    let caller = caller_from(&headers)?;
    let lead = state
        .service
        .create_lead(caller, draft)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn get_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, ApiError> {
    let caller = caller_from(&headers)?;
    let lead = state
        .service
        .store()
        .get_lead(caller, id)
        .await
        .map_err(store_error)?;
    Ok(Json(lead))
}

async fn update_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(patch): Json<LeadPatch>,
) -> Result<Json<Lead>, ApiError> {
    let caller = caller_from(&headers)?;
    let lead = state
        .service
        .update_lead(caller, id, patch)
        .await
        .map_err(store_error)?;
    Ok(Json(lead))
}

async fn delete_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let caller = caller_from(&headers)?;
    state
        .service
        .store()
        .delete_lead(caller, id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_activities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LeadActivity>>, ApiError> {
    let caller = caller_from(&headers)?;
    let activities = state
        .service
        .store()
        .list_activities(caller, id)
        .await
        .map_err(store_error)?;
    Ok(Json(activities))
}

#[derive(Debug, Deserialize)]
struct ActivityRequest {
    activity_type: String,
    description: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

async fn create_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ActivityRequest>,
) -> Result<(StatusCode, Json<LeadActivity>), ApiError> {
    let caller = caller_from(&headers)?;
    let activity = state
        .service
        .store()
        .insert_activity(
            caller,
            NewActivity {
                lead_id: id,
                activity_type: req.activity_type,
                description: req.description,
                metadata: req.metadata,
            },
        )
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(activity)))
}

async fn import_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ImportReport>, ApiError> {
    let caller = caller_from(&headers)?;
    let report = state
        .service
        .import_csv(caller, &body)
        .await
        .map_err(csv_error)?;
    Ok(Json(report))
}

async fn export_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_from(&headers)?;
    let csv = state
        .service
        .export_csv(caller)
        .await
        .map_err(csv_error)?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv))
}

async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardStats>, ApiError> {
    let caller = caller_from(&headers)?;
    let stats = state
        .service
        .dashboard_stats(caller)
        .await
        .map_err(store_error)?;
    Ok(Json(stats))
}

async fn analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Analytics>, ApiError> {
    let caller = caller_from(&headers)?;
    let analytics = state
        .service
        .analytics(caller)
        .await
        .map_err(store_error)?;
    Ok(Json(analytics))
}
