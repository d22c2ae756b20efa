use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect},
    routing::{delete, get, post},
    Form, Router,
};
use serde::Deserialize;
use sqlx::FromRow;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{User, Visit, VisitStatus};
use crate::routes::{select_options, SelectOption};
use crate::scheduling::booking::{CONFLICT_MESSAGE, UNVERIFIED_MESSAGE};
use crate::scheduling::{delete_visit, update_visit, BookingError, VisitChanges};
use crate::AppState;

#[derive(FromRow)]
pub(crate) struct VisitWithProperty {
    #[sqlx(flatten)]
    pub visit: Visit,
    pub property_title: String,
}

pub struct VisitRow {
    pub id: String,
    pub property_id: String,
    pub property_title: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub date: String,
    pub time: String,
    pub status: String,
}

impl From<VisitWithProperty> for VisitRow {
    fn from(row: VisitWithProperty) -> Self {
        let v = row.visit;
        Self {
            date: v.visit_date.format("%a %d %b %Y").to_string(),
            status: v.status.to_string(),
            id: v.id,
            property_id: v.property_id,
            property_title: row.property_title,
            client_name: v.client_name,
            client_email: v.client_email,
            client_phone: v.client_phone,
            time: v.visit_time,
        }
    }
}

#[derive(Template)]
#[template(path = "admin/visits/list.html")]
struct VisitListTemplate {
    visits: Vec<VisitRow>,
    status_options: Vec<SelectOption>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "admin/visits/form.html")]
struct VisitFormTemplate {
    visit: VisitRow,
    date: String,
    time: String,
    client_phone: String,
    notes: String,
    status_options: Vec<SelectOption>,
    errors: HashMap<String, String>,
    notice: Option<String>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Deserialize)]
pub struct VisitFilter {
    status: Option<String>,
    property_id: Option<String>,
}

#[derive(Deserialize)]
pub struct VisitForm {
    date: String,
    time: String,
    status: String,
    client_phone: Option<String>,
    notes: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/visits", get(list_visits))
        .route("/admin/visits/{id}/edit", get(edit_visit_form))
        .route("/admin/visits/{id}", post(update_visit_submit))
        .route("/admin/visits/{id}", delete(delete_visit_submit))
}

pub(crate) async fn fetch_visit(
    db: &sqlx::SqlitePool,
    id: &str,
) -> Result<Option<VisitWithProperty>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT v.*, p.title AS property_title
        FROM visits v
        JOIN properties p ON p.id = v.property_id
        WHERE v.id = ?
        "#
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

async fn list_visits(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<VisitFilter>,
) -> Result<impl IntoResponse, AppError> {
    let status = filter.status.as_deref().and_then(VisitStatus::parse);
    let property_id = filter.property_id.filter(|p| !p.is_empty());

    let rows: Vec<VisitWithProperty> = sqlx::query_as(
        r#"
        SELECT v.*, p.title AS property_title
        FROM visits v
        JOIN properties p ON p.id = v.property_id
        WHERE (?1 IS NULL OR v.status = ?1)
          AND (?2 IS NULL OR v.property_id = ?2)
        ORDER BY v.visit_date DESC, v.visit_time ASC
        "#
    )
    .bind(status)
    .bind(&property_id)
    .fetch_all(&state.db)
    .await?;

    let template = VisitListTemplate {
        visits: rows.into_iter().map(VisitRow::from).collect(),
        status_options: select_options(
            &VisitStatus::ALL,
            VisitStatus::as_str,
            status.map(|s| s.as_str()).unwrap_or(""),
        ),
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

fn visit_form_page(
    row: VisitWithProperty,
    form: Option<VisitForm>,
    errors: HashMap<String, String>,
    notice: Option<String>,
    user: User,
) -> VisitFormTemplate {
    let (date, time, status, client_phone, notes) = match form {
        Some(f) => (
            f.date,
            f.time,
            f.status,
            f.client_phone.unwrap_or_default(),
            f.notes.unwrap_or_default(),
        ),
        None => (
            row.visit.visit_date.format("%Y-%m-%d").to_string(),
            row.visit.visit_time.clone(),
            row.visit.status.as_str().to_string(),
            row.visit.client_phone.clone().unwrap_or_default(),
            row.visit.notes.clone().unwrap_or_default(),
        ),
    };

    VisitFormTemplate {
        status_options: select_options(&VisitStatus::ALL, VisitStatus::as_str, &status),
        visit: VisitRow::from(row),
        date,
        time,
        client_phone,
        notes,
        errors,
        notice,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    }
}

async fn edit_visit_form(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let Some(row) = fetch_visit(&state.db, &id).await? else {
        return Ok(Redirect::to("/admin/visits").into_response());
    };

    let template = visit_form_page(row, None, HashMap::new(), None, user);
    Ok(Html(template.render()?).into_response())
}

async fn update_visit_submit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Form(form): Form<VisitForm>,
) -> Result<impl IntoResponse, AppError> {
    let Some(row) = fetch_visit(&state.db, &id).await? else {
        return Ok(Redirect::to("/admin/visits").into_response());
    };

    let Some(status) = VisitStatus::parse(&form.status) else {
        let errors = HashMap::from([("status".to_string(), "Choose a status".to_string())]);
        let template = visit_form_page(row, Some(form), errors, None, user);
        return Ok(Html(template.render()?).into_response());
    };

    let changes = VisitChanges {
        date: Some(form.date.clone()),
        time: Some(form.time.clone()),
        status: Some(status),
        client_phone: Some(form.client_phone.clone().unwrap_or_default()),
        notes: Some(form.notes.clone().unwrap_or_default()),
    };

    let (errors, notice) = match update_visit(&state.db, &id, changes).await {
        Ok(_) => return Ok(Redirect::to("/admin/visits").into_response()),
        Err(BookingError::Validation(errors)) => (errors, None),
        Err(BookingError::Conflict) => (HashMap::new(), Some(CONFLICT_MESSAGE.to_string())),
        Err(BookingError::PropertyUnavailable) => (
            HashMap::new(),
            Some("This property no longer accepts visits.".to_string()),
        ),
        Err(e) if e.is_retryable() => (HashMap::new(), Some(UNVERIFIED_MESSAGE.to_string())),
        Err(BookingError::VisitNotFound) => {
            return Ok(Redirect::to("/admin/visits").into_response());
        }
        Err(BookingError::PropertyNotFound) => return Err(AppError::NotFound),
        Err(BookingError::Database(e)) => return Err(AppError::Database(e)),
    };

    let template = visit_form_page(row, Some(form), errors, notice, user);
    Ok(Html(template.render()?).into_response())
}

async fn delete_visit_submit(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match delete_visit(&state.db, &id).await {
        Ok(()) | Err(BookingError::VisitNotFound) => {}
        Err(BookingError::Database(e)) => return Err(AppError::Database(e)),
        Err(e) => tracing::warn!(visit_id = %id, "unexpected error deleting visit: {e}"),
    }

    Ok(([("HX-Redirect", "/admin/visits")], ""))
}
