use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{Property, Visit};
use crate::routes::published_property;
use crate::scheduling::{
    check_availability, create_visit, delete_visit, parse_visit_date, suggest_slots, update_visit,
    Availability, ConflictQuery, SlotWindow, VisitChanges, VisitRepository, VisitRequest,
};
use crate::AppState;

#[derive(Deserialize)]
pub struct VisitListParams {
    property_id: String,
    date: Option<String>,
}

#[derive(Deserialize)]
pub struct ConflictParams {
    property_id: String,
    date: String,
    time: String,
    exclude_visit_id: Option<String>,
}

#[derive(Serialize)]
struct ConflictResponse {
    conflict: bool,
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    /// Start times of the visits in the way.
    conflicting_times: Vec<String>,
}

#[derive(Deserialize)]
pub struct SlotParams {
    property_id: String,
    date: String,
}

#[derive(Serialize)]
struct SlotsResponse {
    date: String,
    slots: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/properties", get(list_properties))
        .route("/api/visits", get(list_visits).post(create))
        .route("/api/visits/conflict", get(conflict))
        .route("/api/visits/slots", get(slots))
        .route("/api/visits/{id}", patch(update).delete(remove))
}

async fn list_properties(State(state): State<AppState>) -> Result<Json<Vec<Property>>, ApiError> {
    let properties: Vec<Property> =
        sqlx::query_as("SELECT * FROM properties WHERE published = 1 ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(properties))
}

async fn list_visits(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Query(params): Query<VisitListParams>,
) -> Result<Json<Vec<Visit>>, ApiError> {
    let visits = match params.date.as_deref().filter(|d| !d.is_empty()) {
        Some(raw) => {
            let day = parse_visit_date(raw)?;
            state.db.list_by_property_and_day(&params.property_id, day).await?
        }
        None => {
            sqlx::query_as(
                "SELECT * FROM visits WHERE property_id = ? ORDER BY visit_date, visit_time",
            )
            .bind(&params.property_id)
            .fetch_all(&state.db)
            .await?
        }
    };
    Ok(Json(visits))
}

/// Advisory check for the booking form. Bookings re-check on write.
async fn conflict(
    State(state): State<AppState>,
    Query(params): Query<ConflictParams>,
) -> Result<Json<ConflictResponse>, ApiError> {
    let date = parse_visit_date(&params.date)?;
    let mut query = ConflictQuery::new(params.property_id, date, params.time.trim())?;
    if let Some(id) = params.exclude_visit_id.filter(|id| !id.is_empty()) {
        query = query.excluding(id);
    }

    let availability = check_availability(&state.db, &query).await;
    let conflicting_times = match &availability {
        Availability::Conflict(visits) => visits.iter().map(|v| v.visit_time.clone()).collect(),
        _ => Vec::new(),
    };

    Ok(Json(ConflictResponse {
        conflict: availability.blocks_booking(),
        verified: availability.is_verified(),
        message: availability.message(),
        conflicting_times,
    }))
}

async fn slots(
    State(state): State<AppState>,
    Query(params): Query<SlotParams>,
) -> Result<Json<SlotsResponse>, ApiError> {
    let date = parse_visit_date(&params.date)?;
    let visits = match state.db.list_by_property_and_day(&params.property_id, date).await {
        Ok(visits) => visits,
        Err(e) => {
            tracing::error!(property_id = %params.property_id, "failed to load visits for slots: {e}");
            return Err(ApiError::Unverified);
        }
    };

    let slots = suggest_slots(&visits, &params.property_id, date, SlotWindow::default())
        .into_iter()
        .map(|t| t.to_string())
        .collect();

    Ok(Json(SlotsResponse {
        date: date.format("%Y-%m-%d").to_string(),
        slots,
    }))
}

async fn create(
    State(state): State<AppState>,
    Json(request): Json<VisitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if published_property(&state.db, &request.property_id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let visit = create_visit(&state.db, request).await?;
    Ok((StatusCode::CREATED, Json(visit)))
}

async fn update(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
    Json(changes): Json<VisitChanges>,
) -> Result<Json<Visit>, ApiError> {
    let visit = update_visit(&state.db, &id, changes).await?;
    Ok(Json(visit))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    delete_visit(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
