use serde::{Deserialize, Deserializer};
use sqlx::SqlitePool;
use std::fs;

use crate::models::{ListingType, Property, PropertyKind, PropertyStatus, User};

// Listing feeds send prices either as numbers or as strings like "350 000"
fn deserialize_price<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Int(i64),
        Float(f64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Int(i) => Ok(i),
        StringOrNumber::Float(f) => Ok(f.round() as i64),
        StringOrNumber::String(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid price: {s:?}")))
        }
    }
}

#[derive(Deserialize)]
struct ImportedProperty {
    title: String,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_listing")]
    listing: String,
    #[serde(deserialize_with = "deserialize_price")]
    price: i64,
    address: String,
    city: String,
    bedrooms: Option<i64>,
    bathrooms: Option<i64>,
    #[serde(alias = "area")]
    area_sqm: Option<f64>,
    status: Option<String>,
    #[serde(default = "default_published")]
    published: bool,
}

fn default_listing() -> String {
    "sale".to_string()
}

fn default_published() -> bool {
    true
}

fn parse_kind(raw: &str) -> PropertyKind {
    match raw.trim().to_lowercase().as_str() {
        "house" | "villa" => PropertyKind::House,
        "apartment" | "flat" | "condo" => PropertyKind::Apartment,
        "land" | "plot" => PropertyKind::Land,
        "commercial" | "office" | "retail" => PropertyKind::Commercial,
        other => {
            tracing::warn!("Unknown property type: {other}, defaulting to house");
            PropertyKind::House
        }
    }
}

fn parse_listing(raw: &str) -> ListingType {
    match raw.trim().to_lowercase().as_str() {
        "rent" | "rental" | "lease" => ListingType::Rent,
        _ => ListingType::Sale,
    }
}

fn parse_status(raw: Option<&str>) -> PropertyStatus {
    let Some(raw) = raw else {
        return PropertyStatus::Available;
    };
    PropertyStatus::ALL
        .into_iter()
        .find(|s| s.as_str() == raw.trim().to_lowercase())
        .unwrap_or_else(|| {
            tracing::warn!("Unknown property status: {raw}, defaulting to available");
            PropertyStatus::Available
        })
}

/// Import a JSON array of listings. All rows land in one transaction.
pub async fn import_properties(
    pool: &SqlitePool,
    file_path: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file_path)?;
    let listings: Vec<ImportedProperty> = serde_json::from_str(&content)?;

    let mut imported = 0;
    let mut tx = pool.begin().await?;

    for listing in listings {
        let mut property = Property::new(
            listing.title,
            parse_kind(&listing.kind),
            parse_listing(&listing.listing),
            listing.price,
            listing.address,
            listing.city,
        );
        property.description = listing.description;
        property.bedrooms = listing.bedrooms;
        property.bathrooms = listing.bathrooms;
        property.area_sqm = listing.area_sqm;
        property.status = parse_status(listing.status.as_deref());
        property.published = listing.published;

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
        .execute(&mut *tx)
        .await?;

        imported += 1;
    }

    tx.commit().await?;
    tracing::info!(imported, "properties imported from {file_path}");
    Ok(imported)
}

pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: Option<&str>,
) -> Result<User, Box<dyn std::error::Error>> {
    let user = User::new(name.to_string(), email.map(str::to_string));

    sqlx::query(
        "INSERT INTO users (id, name, email, invite_code, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)"
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.invite_code)
    .bind(&user.created_at)
    .bind(&user.updated_at)
    .execute(pool)
    .await?;

    Ok(user)
}
