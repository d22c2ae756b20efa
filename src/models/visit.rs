use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum VisitStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl VisitStatus {
    pub const ALL: [VisitStatus; 4] = [
        VisitStatus::Pending,
        VisitStatus::Confirmed,
        VisitStatus::Cancelled,
        VisitStatus::Completed,
    ];

    /// Active visits still occupy a slot in the property's calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, VisitStatus::Pending | VisitStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Pending => "pending",
            VisitStatus::Confirmed => "confirmed",
            VisitStatus::Cancelled => "cancelled",
            VisitStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Visit {
    pub id: String,
    pub property_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub visit_date: NaiveDate,
    /// Wall-clock start, `HH:MM` in 24-hour format.
    pub visit_time: String,
    pub status: VisitStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Visit {
    pub fn new(
        property_id: String,
        client_name: String,
        client_email: String,
        visit_date: NaiveDate,
        visit_time: String,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            property_id,
            client_name,
            client_email,
            client_phone: None,
            visit_date,
            visit_time,
            status: VisitStatus::Pending,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
