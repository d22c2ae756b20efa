pub mod api;
pub mod auth;
pub mod dashboard;
pub mod export;
pub mod listings;
pub mod properties;
pub mod visits;

use sqlx::SqlitePool;

use crate::models::Property;

/// One `<option>` of a `<select>`.
pub struct SelectOption {
    pub value: &'static str,
    pub label: String,
    pub selected: bool,
}

pub(crate) fn select_options<T>(
    all: &[T],
    value_of: impl Fn(&T) -> &'static str,
    current: &str,
) -> Vec<SelectOption>
where
    T: std::fmt::Display,
{
    all.iter()
        .map(|item| {
            let value = value_of(item);
            SelectOption {
                value,
                label: item.to_string(),
                selected: value == current,
            }
        })
        .collect()
}

pub(crate) async fn published_property(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<Property>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM properties WHERE id = ? AND published = 1")
        .bind(id)
        .fetch_optional(db)
        .await
}
