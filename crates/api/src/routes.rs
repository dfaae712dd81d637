use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use subtracker_core::billing::cancellation::DismissedSet;
use subtracker_core::billing::distribution::{group_monthly_by_category, CategoryTotal};
use subtracker_core::billing::renewal::{renewal_schedule, RenewalSchedule};
use subtracker_core::dashboard::DashboardSummary;
use subtracker_core::domain::contract::{SubscriptionForm, SubscriptionPatch};
use subtracker_core::domain::subscription::Subscription;
use subtracker_core::storage::{self, SubscriptionStore};
use subtracker_core::time::calendar::local_today;

#[derive(Clone)]
pub struct AppState {
    pub store: Option<Arc<dyn SubscriptionStore>>,
    pub utc_offset_minutes: i32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route(
            "/subscriptions/:id",
            patch(update_subscription).put(replace_subscription),
        )
        .route("/dashboard", get(get_dashboard))
        .route("/renewals", get(get_renewals))
        .route("/distribution", get(get_distribution))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn bad_request(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("{err:#}"),
        }
    }

    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "record store is not configured".to_string(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }

    fn from_store(err: anyhow::Error) -> Self {
        if storage::is_not_found(&err) {
            return Self {
                status: StatusCode::NOT_FOUND,
                message: format!("{err:#}"),
            };
        }
        Self::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// The configured store, acting for the caller when a bearer token is present.
fn store_for(state: &AppState, headers: &HeaderMap) -> Result<Arc<dyn SubscriptionStore>, ApiError> {
    let store = state.store.as_ref().ok_or_else(ApiError::unavailable)?;
    Ok(match bearer_token(headers) {
        Some(token) => store.with_access_token(token),
        None => Arc::clone(store),
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_subscriptions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let store = store_for(&state, &headers)?;
    let subs = store.list().await.map_err(ApiError::from_store)?;
    Ok(Json(subs))
}

async fn create_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<SubscriptionForm>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let store = store_for(&state, &headers)?;
    let fields = form
        .validate_and_into_fields()
        .map_err(ApiError::bad_request)?;

    let sub = store.insert(&fields).await.map_err(ApiError::from_store)?;
    tracing::info!(id = %sub.id, name = %sub.name, "subscription added");
    Ok((StatusCode::CREATED, Json(sub)))
}

async fn update_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<SubscriptionPatch>,
) -> Result<Json<Subscription>, ApiError> {
    let store = store_for(&state, &headers)?;
    let id = parse_id(&id)?;
    let patch = patch
        .validate_and_normalize()
        .map_err(ApiError::bad_request)?;

    let sub = store
        .update(id, &patch)
        .await
        .map_err(ApiError::from_store)?;
    tracing::info!(%id, "subscription updated");
    Ok(Json(sub))
}

/// Edit dialog submit: every editable column is overwritten from the form, so unchecking
/// notifications clears `notification_days`.
async fn replace_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(form): Json<SubscriptionForm>,
) -> Result<Json<Subscription>, ApiError> {
    let store = store_for(&state, &headers)?;
    let id = parse_id(&id)?;
    let patch = form
        .validate_and_into_fields()
        .map_err(ApiError::bad_request)?
        .into_patch();

    let sub = store
        .update(id, &patch)
        .await
        .map_err(ApiError::from_store)?;
    tracing::info!(%id, "subscription replaced");
    Ok(Json(sub))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::bad_request(e.into()))
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    /// Comma-separated ids whose cancellation alert was dismissed this session.
    dismissed: Option<String>,
}

async fn get_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardSummary>, ApiError> {
    let store = store_for(&state, &headers)?;
    let dismissed = DismissedSet::parse_list(query.dismissed.as_deref().unwrap_or(""))
        .map_err(ApiError::bad_request)?;

    let subs = store.list().await.map_err(ApiError::from_store)?;
    let now = chrono::Utc::now();
    let today = local_today(now, state.utc_offset_minutes).map_err(ApiError::internal)?;

    Ok(Json(DashboardSummary::build(&subs, now, today, &dismissed)))
}

async fn get_renewals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RenewalSchedule>, ApiError> {
    let store = store_for(&state, &headers)?;
    let subs = store.list().await.map_err(ApiError::from_store)?;
    Ok(Json(renewal_schedule(&subs, chrono::Utc::now())))
}

async fn get_distribution(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CategoryTotal>>, ApiError> {
    let store = store_for(&state, &headers)?;
    let subs = store.list().await.map_err(ApiError::from_store)?;
    Ok(Json(group_monthly_by_category(&subs)))
}
