use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use chrono::{Duration, Local, NaiveDate};
use serde::Deserialize;

use crate::auth::MaybeUser;
use crate::error::AppError;
use crate::models::{ListingType, Property, User};
use crate::routes::{published_property, select_options, SelectOption};
use crate::scheduling::booking::{CONFLICT_MESSAGE, UNVERIFIED_MESSAGE};
use crate::scheduling::{
    create_visit, parse_visit_date, suggest_slots, BookingError, SlotWindow, VisitRepository,
    VisitRequest,
};
use crate::AppState;

pub struct PropertyCard {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub listing: String,
    pub price: String,
    pub city: String,
    pub bedrooms: Option<i64>,
    pub area_sqm: Option<f64>,
    pub status: String,
}

impl From<Property> for PropertyCard {
    fn from(p: Property) -> Self {
        Self {
            price: p.formatted_price(),
            kind: p.kind.to_string(),
            listing: p.listing.to_string(),
            status: p.status.to_string(),
            id: p.id,
            title: p.title,
            city: p.city,
            bedrooms: p.bedrooms,
            area_sqm: p.area_sqm,
        }
    }
}

#[derive(Template)]
#[template(path = "properties/list.html")]
struct ListingsTemplate {
    properties: Vec<PropertyCard>,
    city: String,
    listing_options: Vec<SelectOption>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Default, Clone)]
pub struct BookingFormValues {
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub date: String,
    pub time: String,
    pub notes: String,
}

#[derive(Template)]
#[template(path = "properties/show.html")]
struct PropertyTemplate {
    property: PropertyCard,
    description: Option<String>,
    address: String,
    bathrooms: Option<i64>,
    accepts_visits: bool,
    form: BookingFormValues,
    errors: HashMap<String, String>,
    notice: Option<String>,
    booked: bool,
    slots: Vec<String>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Deserialize)]
pub struct ListingsQuery {
    city: Option<String>,
    listing: Option<String>,
}

#[derive(Deserialize)]
pub struct PropertyQuery {
    booked: Option<u8>,
}

#[derive(Deserialize)]
pub struct BookingForm {
    client_name: String,
    client_email: String,
    client_phone: Option<String>,
    date: String,
    time: String,
    notes: Option<String>,
}

impl BookingForm {
    fn values(&self) -> BookingFormValues {
        BookingFormValues {
            client_name: self.client_name.clone(),
            client_email: self.client_email.clone(),
            client_phone: self.client_phone.clone().unwrap_or_default(),
            date: self.date.clone(),
            time: self.time.clone(),
            notes: self.notes.clone().unwrap_or_default(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_properties))
        .route("/properties/{id}", get(show_property))
        .route("/properties/{id}/visits", post(book_visit))
}

async fn list_properties(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<ListingsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let city = query
        .city
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let listing = query
        .listing
        .as_deref()
        .and_then(|l| ListingType::ALL.into_iter().find(|t| t.as_str() == l));

    let properties: Vec<Property> = sqlx::query_as(
        r#"
        SELECT * FROM properties
        WHERE published = 1
          AND (?1 IS NULL OR city = ?1 COLLATE NOCASE)
          AND (?2 IS NULL OR listing = ?2)
        ORDER BY created_at DESC
        "#
    )
    .bind(&city)
    .bind(listing)
    .fetch_all(&state.db)
    .await?;

    let template = ListingsTemplate {
        properties: properties.into_iter().map(PropertyCard::from).collect(),
        city: city.unwrap_or_default(),
        listing_options: select_options(
            &ListingType::ALL,
            ListingType::as_str,
            listing.map(|l| l.as_str()).unwrap_or(""),
        ),
        static_hash: crate::STATIC_HASH,
        user,
    };
    Ok(Html(template.render()?))
}

/// Tomorrow, the earliest day the public form proposes.
fn default_visit_date() -> NaiveDate {
    Local::now().date_naive() + Duration::days(1)
}

async fn free_slots(state: &AppState, property_id: &str, date: NaiveDate) -> Vec<String> {
    match state.db.list_by_property_and_day(property_id, date).await {
        Ok(visits) => suggest_slots(&visits, property_id, date, SlotWindow::default())
            .into_iter()
            .map(|t| t.to_string())
            .collect(),
        Err(e) => {
            tracing::error!(property_id, "failed to load visits for slot suggestions: {e}");
            Vec::new()
        }
    }
}

fn property_page(
    property: Property,
    form: BookingFormValues,
    errors: HashMap<String, String>,
    notice: Option<String>,
    booked: bool,
    slots: Vec<String>,
    user: Option<User>,
) -> PropertyTemplate {
    PropertyTemplate {
        description: property.description.clone(),
        address: property.address.clone(),
        bathrooms: property.bathrooms,
        accepts_visits: property.status.accepts_visits(),
        property: PropertyCard::from(property),
        form,
        errors,
        notice,
        booked,
        slots,
        static_hash: crate::STATIC_HASH,
        user,
    }
}

async fn show_property(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
    Query(query): Query<PropertyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let Some(property) = published_property(&state.db, &id).await? else {
        return Err(AppError::NotFound);
    };

    let date = default_visit_date();
    let slots = free_slots(&state, &property.id, date).await;
    let form = BookingFormValues {
        date: date.format("%Y-%m-%d").to_string(),
        ..BookingFormValues::default()
    };

    let template = property_page(
        property,
        form,
        HashMap::new(),
        None,
        query.booked.is_some(),
        slots,
        user,
    );
    Ok(Html(template.render()?))
}

async fn book_visit(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
    Form(form): Form<BookingForm>,
) -> Result<impl IntoResponse, AppError> {
    let Some(property) = published_property(&state.db, &id).await? else {
        return Err(AppError::NotFound);
    };

    let values = form.values();
    let request = VisitRequest {
        property_id: property.id.clone(),
        client_name: form.client_name,
        client_email: form.client_email,
        client_phone: form.client_phone,
        date: form.date,
        time: form.time,
        notes: form.notes,
    };

    let (errors, notice) = match create_visit(&state.db, request).await {
        Ok(_) => {
            return Ok(Redirect::to(&format!("/properties/{id}?booked=1")).into_response());
        }
        Err(BookingError::Validation(errors)) => (errors, None),
        Err(BookingError::Conflict) => (HashMap::new(), Some(CONFLICT_MESSAGE.to_string())),
        Err(BookingError::PropertyUnavailable) => (
            HashMap::new(),
            Some("This property is no longer open for visits.".to_string()),
        ),
        Err(BookingError::PropertyNotFound | BookingError::VisitNotFound) => {
            return Err(AppError::NotFound);
        }
        Err(BookingError::Database(e)) => {
            tracing::error!(property_id = %id, "booking failed: {e}");
            (HashMap::new(), Some(UNVERIFIED_MESSAGE.to_string()))
        }
    };

    let date = parse_visit_date(&values.date).unwrap_or_else(|_| default_visit_date());
    let slots = free_slots(&state, &property.id, date).await;

    let template = property_page(property, values, errors, notice, false, slots, user);
    Ok(Html(template.render()?).into_response())
}
