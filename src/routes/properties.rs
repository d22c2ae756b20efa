use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect},
    routing::{delete, get, post},
    Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::FromRow;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{ListingType, Property, PropertyKind, PropertyStatus, User};
use crate::routes::{select_options, SelectOption};
use crate::AppState;

/// Property row for the admin table, with its count of upcoming active visits.
#[derive(FromRow)]
struct PropertyWithVisits {
    #[sqlx(flatten)]
    property: Property,
    upcoming_visits: i64,
}

struct PropertyRow {
    id: String,
    title: String,
    city: String,
    price: String,
    listing: String,
    status: String,
    published: bool,
    upcoming_visits: i64,
}

#[derive(Template)]
#[template(path = "admin/properties/list.html")]
struct PropertyListTemplate {
    properties: Vec<PropertyRow>,
    static_hash: &'static str,
    user: Option<User>,
}

/// Raw form values, kept as text so a rejected submission re-renders as typed.
#[derive(Deserialize, Default, Clone)]
pub struct PropertyForm {
    title: String,
    description: Option<String>,
    kind: String,
    listing: String,
    price: String,
    address: String,
    city: String,
    bedrooms: Option<String>,
    bathrooms: Option<String>,
    area_sqm: Option<String>,
    status: String,
    published: Option<String>,
}

impl From<&Property> for PropertyForm {
    fn from(p: &Property) -> Self {
        Self {
            title: p.title.clone(),
            description: p.description.clone(),
            kind: p.kind.as_str().to_string(),
            listing: p.listing.as_str().to_string(),
            price: p.price.to_string(),
            address: p.address.clone(),
            city: p.city.clone(),
            bedrooms: p.bedrooms.map(|n| n.to_string()),
            bathrooms: p.bathrooms.map(|n| n.to_string()),
            area_sqm: p.area_sqm.map(|n| n.to_string()),
            status: p.status.as_str().to_string(),
            published: p.published.then(|| "on".to_string()),
        }
    }
}

#[derive(Template)]
#[template(path = "admin/properties/form.html")]
struct PropertyFormTemplate {
    /// `None` when creating.
    property_id: Option<String>,
    title: String,
    description: String,
    price: String,
    address: String,
    city: String,
    bedrooms: String,
    bathrooms: String,
    area_sqm: String,
    published: bool,
    kind_options: Vec<SelectOption>,
    listing_options: Vec<SelectOption>,
    status_options: Vec<SelectOption>,
    errors: HashMap<String, String>,
    static_hash: &'static str,
    user: Option<User>,
}

impl PropertyFormTemplate {
    fn new(
        property_id: Option<String>,
        form: PropertyForm,
        errors: HashMap<String, String>,
        user: User,
    ) -> Self {
        Self {
            property_id,
            kind_options: select_options(&PropertyKind::ALL, PropertyKind::as_str, &form.kind),
            listing_options: select_options(&ListingType::ALL, ListingType::as_str, &form.listing),
            status_options: select_options(&PropertyStatus::ALL, PropertyStatus::as_str, &form.status),
            title: form.title,
            description: form.description.unwrap_or_default(),
            price: form.price,
            address: form.address,
            city: form.city,
            bedrooms: form.bedrooms.unwrap_or_default(),
            bathrooms: form.bathrooms.unwrap_or_default(),
            area_sqm: form.area_sqm.unwrap_or_default(),
            published: form.published.is_some(),
            errors,
            static_hash: crate::STATIC_HASH,
            user: Some(user),
        }
    }
}

/// Parsed, validated property fields.
struct PropertyInput {
    title: String,
    description: Option<String>,
    kind: PropertyKind,
    listing: ListingType,
    price: i64,
    address: String,
    city: String,
    bedrooms: Option<i64>,
    bathrooms: Option<i64>,
    area_sqm: Option<f64>,
    status: PropertyStatus,
    published: bool,
}

fn optional_count(
    raw: &Option<String>,
    field: &str,
    label: &str,
    errors: &mut HashMap<String, String>,
) -> Option<i64> {
    let raw = raw.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<i64>() {
        Ok(n) if n >= 0 => Some(n),
        _ => {
            errors.insert(field.to_string(), format!("{label} must be a whole number"));
            None
        }
    }
}

fn validate_property_form(form: &PropertyForm) -> Result<PropertyInput, HashMap<String, String>> {
    let mut errors = HashMap::new();

    let title = form.title.trim();
    if title.is_empty() {
        errors.insert("title".to_string(), "Title is required".to_string());
    } else if title.chars().count() > 200 {
        errors.insert("title".to_string(), "Title must be under 200 characters".to_string());
    }

    if form.address.trim().is_empty() {
        errors.insert("address".to_string(), "Address is required".to_string());
    }

    if form.city.trim().is_empty() {
        errors.insert("city".to_string(), "City is required".to_string());
    }

    let price = match form.price.trim().parse::<i64>() {
        Ok(p) if p >= 0 => Some(p),
        _ => {
            errors.insert("price".to_string(), "Price must be a positive whole number".to_string());
            None
        }
    };

    let kind = PropertyKind::ALL.into_iter().find(|k| k.as_str() == form.kind);
    if kind.is_none() {
        errors.insert("kind".to_string(), "Choose a property type".to_string());
    }
    let listing = ListingType::ALL.into_iter().find(|l| l.as_str() == form.listing);
    if listing.is_none() {
        errors.insert("listing".to_string(), "Choose sale or rent".to_string());
    }
    let status = PropertyStatus::ALL.into_iter().find(|s| s.as_str() == form.status);
    if status.is_none() {
        errors.insert("status".to_string(), "Choose a status".to_string());
    }

    let bedrooms = optional_count(&form.bedrooms, "bedrooms", "Bedrooms", &mut errors);
    let bathrooms = optional_count(&form.bathrooms, "bathrooms", "Bathrooms", &mut errors);

    let area_sqm = match form.area_sqm.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<f64>() {
            Ok(a) if a.is_finite() && a > 0.0 => Some(a),
            _ => {
                errors.insert("area_sqm".to_string(), "Area must be a positive number".to_string());
                None
            }
        },
    };

    match (price, kind, listing, status) {
        (Some(price), Some(kind), Some(listing), Some(status)) if errors.is_empty() => {
            Ok(PropertyInput {
                title: title.to_string(),
                description: form
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                kind,
                listing,
                price,
                address: form.address.trim().to_string(),
                city: form.city.trim().to_string(),
                bedrooms,
                bathrooms,
                area_sqm,
                status,
                published: form.published.is_some(),
            })
        }
        _ => Err(errors),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/properties", get(list_properties))
        .route("/admin/properties/new", get(new_property_form))
        .route("/admin/properties", post(create_property))
        .route("/admin/properties/{id}/edit", get(edit_property_form))
        .route("/admin/properties/{id}", post(update_property))
        .route("/admin/properties/{id}", delete(delete_property))
}

async fn list_properties(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let today = chrono::Local::now().date_naive();
    let rows: Vec<PropertyWithVisits> = sqlx::query_as(
        r#"
        SELECT p.*, COUNT(v.id) AS upcoming_visits
        FROM properties p
        LEFT JOIN visits v
          ON v.property_id = p.id
         AND v.status IN ('pending', 'confirmed')
         AND v.visit_date >= ?
        GROUP BY p.id
        ORDER BY p.updated_at DESC
        "#
    )
    .bind(today)
    .fetch_all(&state.db)
    .await?;

    let properties = rows
        .into_iter()
        .map(|row| PropertyRow {
            price: row.property.formatted_price(),
            listing: row.property.listing.to_string(),
            status: row.property.status.to_string(),
            published: row.property.published,
            id: row.property.id,
            title: row.property.title,
            city: row.property.city,
            upcoming_visits: row.upcoming_visits,
        })
        .collect();

    let template = PropertyListTemplate {
        properties,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

async fn new_property_form(AuthUser(user): AuthUser) -> Result<impl IntoResponse, AppError> {
    let form = PropertyForm {
        kind: PropertyKind::House.as_str().to_string(),
        listing: ListingType::Sale.as_str().to_string(),
        status: PropertyStatus::Available.as_str().to_string(),
        ..PropertyForm::default()
    };
    let template = PropertyFormTemplate::new(None, form, HashMap::new(), user);
    Ok(Html(template.render()?))
}

async fn create_property(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<PropertyForm>,
) -> Result<impl IntoResponse, AppError> {
    let input = match validate_property_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            let template = PropertyFormTemplate::new(None, form, errors, user);
            return Ok(Html(template.render()?).into_response());
        }
    };

    let mut property = Property::new(
        input.title,
        input.kind,
        input.listing,
        input.price,
        input.address,
        input.city,
    );
    property.description = input.description;
    property.bedrooms = input.bedrooms;
    property.bathrooms = input.bathrooms;
    property.area_sqm = input.area_sqm;
    property.status = input.status;
    property.published = input.published;

    sqlx::query(
        r#"
        INSERT INTO properties (id, title, description, kind, listing, price, address, city, bedrooms, bathrooms, area_sqm, status, published, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(&property.id)
    .bind(&property.title)
    .bind(&property.description)
    .bind(property.kind)
    .bind(property.listing)
    .bind(property.price)
    .bind(&property.address)
    .bind(&property.city)
    .bind(property.bedrooms)
    .bind(property.bathrooms)
    .bind(property.area_sqm)
    .bind(property.status)
    .bind(property.published)
    .bind(&property.created_at)
    .bind(&property.updated_at)
    .execute(&state.db)
    .await?;

    tracing::info!(property_id = %property.id, user_id = %user.id, "property created");
    Ok(Redirect::to("/admin/properties").into_response())
}

async fn edit_property_form(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let property: Option<Property> = sqlx::query_as("SELECT * FROM properties WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;

    let Some(property) = property else {
        return Ok(Redirect::to("/admin/properties").into_response());
    };

    let template =
        PropertyFormTemplate::new(Some(id), PropertyForm::from(&property), HashMap::new(), user);
    Ok(Html(template.render()?).into_response())
}

async fn update_property(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Form(form): Form<PropertyForm>,
) -> Result<impl IntoResponse, AppError> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM properties WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Ok(Redirect::to("/admin/properties").into_response());
    }

    let input = match validate_property_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            let template = PropertyFormTemplate::new(Some(id), form, errors, user);
            return Ok(Html(template.render()?).into_response());
        }
    };

    sqlx::query(
        r#"
        UPDATE properties
        SET title = ?, description = ?, kind = ?, listing = ?, price = ?, address = ?, city = ?,
            bedrooms = ?, bathrooms = ?, area_sqm = ?, status = ?, published = ?, updated_at = ?
        WHERE id = ?
        "#
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.kind)
    .bind(input.listing)
    .bind(input.price)
    .bind(&input.address)
    .bind(&input.city)
    .bind(input.bedrooms)
    .bind(input.bathrooms)
    .bind(input.area_sqm)
    .bind(input.status)
    .bind(input.published)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    tracing::info!(property_id = %id, user_id = %user.id, "property updated");
    Ok(Redirect::to("/admin/properties").into_response())
}

async fn delete_property(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM properties WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() > 0 {
        tracing::info!(property_id = %id, user_id = %user.id, "property deleted");
    }

    // htmx follows the header instead of swapping the body
    Ok(([("HX-Redirect", "/admin/properties")], ""))
}
