//! Booking, rescheduling and availability checks on top of the conflict checker.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{SqliteExecutor, SqlitePool};
use thiserror::Error;

use crate::models::{PropertyStatus, Visit, VisitStatus};

use super::conflict::{ConflictQuery, conflicting_visits, has_conflict};
use super::repository::{VisitRepository, fetch_day};
use super::time::{VisitTime, parse_visit_date};

pub const CONFLICT_MESSAGE: &str =
    "This time slot is already taken. Please pick a time at least one hour away from existing visits.";
pub const UNVERIFIED_MESSAGE: &str =
    "We could not verify availability right now. Please try again.";

/// Outcome of checking a slot against the visits currently on record.
#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Clear,
    Conflict(Vec<Visit>),
    /// The visits could not be fetched. Treated as taken.
    Unverified,
}

impl Availability {
    pub fn blocks_booking(&self) -> bool {
        !matches!(self, Availability::Clear)
    }

    pub fn is_verified(&self) -> bool {
        !matches!(self, Availability::Unverified)
    }

    pub fn message(&self) -> Option<&'static str> {
        match self {
            Availability::Clear => None,
            Availability::Conflict(_) => Some(CONFLICT_MESSAGE),
            Availability::Unverified => Some(UNVERIFIED_MESSAGE),
        }
    }
}

/// Check a proposed slot. Failing to load the visits blocks the booking.
pub async fn check_availability<R>(repo: &R, query: &ConflictQuery) -> Availability
where
    R: VisitRepository + Sync,
{
    match repo.list_by_property_and_day(&query.property_id, query.date).await {
        Ok(visits) => {
            let conflicts: Vec<Visit> = conflicting_visits(&visits, query).cloned().collect();
            if conflicts.is_empty() {
                Availability::Clear
            } else {
                Availability::Conflict(conflicts)
            }
        }
        Err(e) => {
            tracing::error!(
                property_id = %query.property_id,
                date = %query.date,
                "failed to load visits for availability check: {e}"
            );
            Availability::Unverified
        }
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("invalid visit details")]
    Validation(HashMap<String, String>),

    #[error("property not found")]
    PropertyNotFound,

    #[error("property is no longer open for visits")]
    PropertyUnavailable,

    #[error("visit not found")]
    VisitNotFound,

    #[error("time slot conflicts with an existing visit")]
    Conflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// Primary SQLite result codes; extended codes keep them in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl BookingError {
    /// Lost a race for the database write lock. The caller may try again.
    pub fn is_retryable(&self) -> bool {
        let BookingError::Database(sqlx::Error::Database(e)) = self else {
            return false;
        };
        e.code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
    }

    fn field(name: &str, message: &str) -> Self {
        BookingError::Validation(HashMap::from([(name.to_string(), message.to_string())]))
    }
}

/// A visit request as submitted by the booking form or the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitRequest {
    pub property_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
}

impl VisitRequest {
    /// Check every field, returning the parsed slot or all field errors at once.
    pub fn validate(&self) -> Result<(NaiveDate, VisitTime), BookingError> {
        let mut errors = HashMap::new();

        if self.client_name.trim().is_empty() {
            errors.insert("client_name".to_string(), "Name is required".to_string());
        } else if self.client_name.trim().chars().count() > 200 {
            errors.insert(
                "client_name".to_string(),
                "Name must be under 200 characters".to_string(),
            );
        }

        let email = self.client_email.trim();
        if email.is_empty() {
            errors.insert("client_email".to_string(), "Email is required".to_string());
        } else if !looks_like_email(email) {
            errors.insert(
                "client_email".to_string(),
                "Email address is not valid".to_string(),
            );
        }

        let date = parse_date_field(&self.date, &mut errors);
        let time = parse_time_field(&self.time, &mut errors);

        match (date, time) {
            (Some(date), Some(time)) if errors.is_empty() => Ok((date, time)),
            _ => Err(BookingError::Validation(errors)),
        }
    }
}

/// Fields an agent may change on an existing visit. Absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitChanges {
    pub date: Option<String>,
    pub time: Option<String>,
    pub status: Option<VisitStatus>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

fn parse_date_field(raw: &str, errors: &mut HashMap<String, String>) -> Option<NaiveDate> {
    match parse_visit_date(raw) {
        Ok(date) => Some(date),
        Err(_) => {
            errors.insert("date".to_string(), "Date must be YYYY-MM-DD".to_string());
            None
        }
    }
}

fn parse_time_field(raw: &str, errors: &mut HashMap<String, String>) -> Option<VisitTime> {
    match raw.trim().parse::<VisitTime>() {
        Ok(time) => Some(time),
        Err(_) => {
            errors.insert("time".to_string(), "Time must be HH:MM (24h)".to_string());
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn property_status<'c, E>(executor: E, property_id: &str) -> Result<PropertyStatus, BookingError>
where
    E: SqliteExecutor<'c>,
{
    let status: Option<(PropertyStatus,)> = sqlx::query_as("SELECT status FROM properties WHERE id = ?")
        .bind(property_id)
        .fetch_optional(executor)
        .await?;

    status.map(|(s,)| s).ok_or(BookingError::PropertyNotFound)
}

/// Book a new visit.
///
/// The conflict check and the insert share one transaction, so a competing
/// booking either is visible to the check or makes this commit fail.
pub async fn create_visit(pool: &SqlitePool, request: VisitRequest) -> Result<Visit, BookingError> {
    let (date, time) = request.validate()?;

    let mut tx = pool.begin().await?;

    if !property_status(&mut *tx, &request.property_id)
        .await?
        .accepts_visits()
    {
        return Err(BookingError::PropertyUnavailable);
    }

    let query = ConflictQuery::at(request.property_id.as_str(), date, time);
    let existing = fetch_day(&mut *tx, &query.property_id, date).await?;
    if has_conflict(&existing, &query) {
        tracing::info!(property_id = %query.property_id, %date, %time, "visit rejected: slot taken");
        return Err(BookingError::Conflict);
    }

    let mut visit = Visit::new(
        request.property_id,
        request.client_name.trim().to_string(),
        request.client_email.trim().to_string(),
        date,
        time.to_string(),
    );
    visit.client_phone = non_empty(request.client_phone);
    visit.notes = non_empty(request.notes);

    sqlx::query(
        r#"
        INSERT INTO visits (id, property_id, client_name, client_email, client_phone, visit_date, visit_time, status, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(&visit.id)
    .bind(&visit.property_id)
    .bind(&visit.client_name)
    .bind(&visit.client_email)
    .bind(&visit.client_phone)
    .bind(visit.visit_date)
    .bind(&visit.visit_time)
    .bind(visit.status)
    .bind(&visit.notes)
    .bind(&visit.created_at)
    .bind(&visit.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(visit_id = %visit.id, property_id = %visit.property_id, %date, %time, "visit booked");
    Ok(visit)
}

/// Apply `changes` to a visit, re-running the conflict check against every
/// other visit when the result is still active.
///
/// Reactivating or moving a visit also requires the property to still accept
/// visits. Edits that leave an active slot untouched do not.
pub async fn update_visit(
    pool: &SqlitePool,
    visit_id: &str,
    changes: VisitChanges,
) -> Result<Visit, BookingError> {
    let mut errors = HashMap::new();
    let new_date = changes
        .date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .and_then(|raw| parse_date_field(raw, &mut errors));
    let new_time = changes
        .time
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .and_then(|raw| parse_time_field(raw, &mut errors));
    if !errors.is_empty() {
        return Err(BookingError::Validation(errors));
    }

    let mut tx = pool.begin().await?;

    let visit: Option<Visit> = sqlx::query_as("SELECT * FROM visits WHERE id = ?")
        .bind(visit_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(mut visit) = visit else {
        return Err(BookingError::VisitNotFound);
    };

    let was_active = visit.status.is_active();
    let original_slot = (visit.visit_date, visit.visit_time.clone());

    if let Some(date) = new_date {
        visit.visit_date = date;
    }
    let time = match new_time {
        Some(time) => time,
        None => visit.visit_time.parse::<VisitTime>().map_err(|_| {
            BookingError::field("time", "Stored time is invalid, please set a new time")
        })?,
    };
    visit.visit_time = time.to_string();
    if let Some(status) = changes.status {
        visit.status = status;
    }
    if changes.client_phone.is_some() {
        visit.client_phone = non_empty(changes.client_phone);
    }
    if changes.notes.is_some() {
        visit.notes = non_empty(changes.notes);
    }

    if visit.status.is_active() {
        let moved = original_slot != (visit.visit_date, visit.visit_time.clone());
        if (!was_active || moved)
            && !property_status(&mut *tx, &visit.property_id)
                .await?
                .accepts_visits()
        {
            return Err(BookingError::PropertyUnavailable);
        }

        let query = ConflictQuery::at(visit.property_id.as_str(), visit.visit_date, time)
            .excluding(visit.id.as_str());
        let existing = fetch_day(&mut *tx, &visit.property_id, visit.visit_date).await?;
        if has_conflict(&existing, &query) {
            tracing::info!(visit_id = %visit.id, date = %visit.visit_date, %time, "reschedule rejected: slot taken");
            return Err(BookingError::Conflict);
        }
    }

    visit.updated_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE visits
        SET visit_date = ?, visit_time = ?, status = ?, client_phone = ?, notes = ?, updated_at = ?
        WHERE id = ?
        "#
    )
    .bind(visit.visit_date)
    .bind(&visit.visit_time)
    .bind(visit.status)
    .bind(&visit.client_phone)
    .bind(&visit.notes)
    .bind(&visit.updated_at)
    .bind(&visit.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(visit_id = %visit.id, status = %visit.status, "visit updated");
    Ok(visit)
}

pub async fn delete_visit(pool: &SqlitePool, visit_id: &str) -> Result<(), BookingError> {
    let result = sqlx::query("DELETE FROM visits WHERE id = ?")
        .bind(visit_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(BookingError::VisitNotFound);
    }
    tracing::info!(visit_id, "visit deleted");
    Ok(())
}
