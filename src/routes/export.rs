use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{Property, Visit};
use crate::AppState;

#[derive(Serialize)]
struct ExportProperty {
    #[serde(flatten)]
    property: Property,
    visits: Vec<Visit>,
}

#[derive(Serialize)]
struct ExportData {
    exported_at: String,
    exported_by: String,
    properties: Vec<ExportProperty>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/export", get(export_data))
}

async fn export_data(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let properties: Vec<Property> = sqlx::query_as("SELECT * FROM properties ORDER BY created_at")
        .fetch_all(&state.db)
        .await?;

    let mut visits: Vec<Visit> =
        sqlx::query_as("SELECT * FROM visits ORDER BY visit_date, visit_time")
            .fetch_all(&state.db)
            .await?;

    let properties = properties
        .into_iter()
        .map(|property| {
            let (own, rest): (Vec<Visit>, Vec<Visit>) = std::mem::take(&mut visits)
                .into_iter()
                .partition(|v| v.property_id == property.id);
            visits = rest;
            ExportProperty {
                property,
                visits: own,
            }
        })
        .collect();

    let export = ExportData {
        exported_at: chrono::Utc::now().to_rfc3339(),
        exported_by: user.name,
        properties,
    };

    let filename = format!("immo-export-{}.json", chrono::Local::now().format("%Y-%m-%d"));
    let content_disposition = format!("attachment; filename=\"{}\"", filename);

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&content_disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((headers, Json(export)))
}
