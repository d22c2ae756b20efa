use std::convert::Infallible;
use std::future::Future;

use chrono::NaiveDate;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::Visit;

/// Source of the visits a conflict check runs against.
///
/// Implementations return every visit of the property on that day regardless
/// of status; the checker does its own filtering.
pub trait VisitRepository {
    type Error: std::error::Error + Send + Sync + 'static;

    fn list_by_property_and_day(
        &self,
        property_id: &str,
        day: NaiveDate,
    ) -> impl Future<Output = Result<Vec<Visit>, Self::Error>> + Send;
}

impl VisitRepository for SqlitePool {
    type Error = sqlx::Error;

    async fn list_by_property_and_day(
        &self,
        property_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<Visit>, sqlx::Error> {
        fetch_day(self, property_id, day).await
    }
}

pub(crate) async fn fetch_day<'c, E>(
    executor: E,
    property_id: &str,
    day: NaiveDate,
) -> Result<Vec<Visit>, sqlx::Error>
where
    E: SqliteExecutor<'c>,
{
    sqlx::query_as(
        "SELECT * FROM visits WHERE property_id = ? AND visit_date = ? ORDER BY visit_time",
    )
    .bind(property_id)
    .bind(day)
    .fetch_all(executor)
    .await
}

/// Visits already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryVisits {
    visits: Vec<Visit>,
}

impl MemoryVisits {
    pub fn new(visits: Vec<Visit>) -> Self {
        Self { visits }
    }
}

impl VisitRepository for MemoryVisits {
    type Error = Infallible;

    async fn list_by_property_and_day(
        &self,
        property_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<Visit>, Infallible> {
        Ok(self
            .visits
            .iter()
            .filter(|v| v.property_id == property_id && v.visit_date == day)
            .cloned()
            .collect())
    }
}
