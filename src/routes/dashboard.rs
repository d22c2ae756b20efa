use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{PropertyStatus, User};
use crate::routes::visits::{VisitRow, VisitWithProperty};
use crate::AppState;

struct StatusCount {
    status: String,
    count: i64,
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
struct DashboardTemplate {
    total_properties: i64,
    published_properties: i64,
    by_status: Vec<StatusCount>,
    pending_visits: i64,
    upcoming: Vec<VisitRow>,
    static_hash: &'static str,
    user: Option<User>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/admin", get(dashboard))
}

/// Zero-fill so every status shows up, in declaration order.
fn status_counts(rows: Vec<(PropertyStatus, i64)>) -> Vec<StatusCount> {
    PropertyStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status: status.to_string(),
            count: rows
                .iter()
                .find(|(s, _)| *s == status)
                .map(|(_, n)| *n)
                .unwrap_or(0),
        })
        .collect()
}

async fn dashboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let today = chrono::Local::now().date_naive();

    let (total_properties, published_properties): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(published), 0) FROM properties",
    )
    .fetch_one(&state.db)
    .await?;

    let by_status: Vec<(PropertyStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM properties GROUP BY status")
            .fetch_all(&state.db)
            .await?;

    let (pending_visits,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM visits WHERE status = 'pending' AND visit_date >= ?",
    )
    .bind(today)
    .fetch_one(&state.db)
    .await?;

    let upcoming: Vec<VisitWithProperty> = sqlx::query_as(
        r#"
        SELECT v.*, p.title AS property_title
        FROM visits v
        JOIN properties p ON p.id = v.property_id
        WHERE v.status IN ('pending', 'confirmed') AND v.visit_date >= ?
        ORDER BY v.visit_date ASC, v.visit_time ASC
        LIMIT 10
        "#
    )
    .bind(today)
    .fetch_all(&state.db)
    .await?;

    let template = DashboardTemplate {
        total_properties,
        published_properties,
        by_status: status_counts(by_status),
        pending_visits,
        upcoming: upcoming.into_iter().map(VisitRow::from).collect(),
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}
