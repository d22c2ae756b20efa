use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum PropertyKind {
    House,
    Apartment,
    Land,
    Commercial,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 4] = [
        PropertyKind::House,
        PropertyKind::Apartment,
        PropertyKind::Land,
        PropertyKind::Commercial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::House => "house",
            PropertyKind::Apartment => "apartment",
            PropertyKind::Land => "land",
            PropertyKind::Commercial => "commercial",
        }
    }
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ListingType {
    Sale,
    Rent,
}

impl ListingType {
    pub const ALL: [ListingType; 2] = [ListingType::Sale, ListingType::Rent];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Sale => "sale",
            ListingType::Rent => "rent",
        }
    }
}

impl std::fmt::Display for ListingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingType::Sale => write!(f, "for sale"),
            ListingType::Rent => write!(f, "for rent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum PropertyStatus {
    Available,
    Reserved,
    Sold,
    Rented,
}

impl PropertyStatus {
    pub const ALL: [PropertyStatus; 4] = [
        PropertyStatus::Available,
        PropertyStatus::Reserved,
        PropertyStatus::Sold,
        PropertyStatus::Rented,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyStatus::Available => "available",
            PropertyStatus::Reserved => "reserved",
            PropertyStatus::Sold => "sold",
            PropertyStatus::Rented => "rented",
        }
    }

    /// Whether visits can still be booked for a property in this status.
    pub fn accepts_visits(&self) -> bool {
        matches!(self, PropertyStatus::Available | PropertyStatus::Reserved)
    }
}

impl std::fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Property {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: PropertyKind,
    pub listing: ListingType,
    pub price: i64,
    pub address: String,
    pub city: String,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub area_sqm: Option<f64>,
    pub status: PropertyStatus,
    pub published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Property {
    pub fn new(
        title: String,
        kind: PropertyKind,
        listing: ListingType,
        price: i64,
        address: String,
        city: String,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            description: None,
            kind,
            listing,
            price,
            address,
            city,
            bedrooms: None,
            bathrooms: None,
            area_sqm: None,
            status: PropertyStatus::Available,
            published: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Price with thousands separators, e.g. `1 250 000`.
    pub fn formatted_price(&self) -> String {
        let digits = self.price.unsigned_abs().to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(' ');
            }
            out.push(ch);
        }
        if self.price < 0 {
            out.insert(0, '-');
        }
        out
    }
}
