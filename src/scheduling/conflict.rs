//! Detect visits that collide with a proposed slot.
//!
//! Two active visits for the same property on the same calendar day collide
//! when their start times are strictly less than [`VISIT_BUFFER_MINUTES`]
//! apart. Visits on different days are never compared, even across midnight.

use chrono::NaiveDate;

use crate::models::Visit;

use super::time::{TimeParseError, VisitTime};

/// Minimum spacing between two active visits of the same property.
pub const VISIT_BUFFER_MINUTES: u16 = 60;

/// A proposed visit slot to test against existing visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictQuery {
    pub property_id: String,
    pub date: NaiveDate,
    pub time: VisitTime,
    /// Set when re-checking an existing visit so it does not collide with itself.
    pub exclude_visit_id: Option<String>,
}

impl ConflictQuery {
    /// Build a query from a raw `HH:MM` string.
    pub fn new(
        property_id: impl Into<String>,
        date: NaiveDate,
        time: &str,
    ) -> Result<Self, TimeParseError> {
        Ok(Self::at(property_id, date, time.parse()?))
    }

    pub fn at(property_id: impl Into<String>, date: NaiveDate, time: VisitTime) -> Self {
        Self {
            property_id: property_id.into(),
            date,
            time,
            exclude_visit_id: None,
        }
    }

    pub fn excluding(mut self, visit_id: impl Into<String>) -> Self {
        self.exclude_visit_id = Some(visit_id.into());
        self
    }

    fn considers(&self, visit: &Visit) -> bool {
        visit.property_id == self.property_id
            && visit.visit_date == self.date
            && visit.status.is_active()
            && self.exclude_visit_id.as_deref() != Some(visit.id.as_str())
    }
}

/// Active visits in `visits` that collide with the proposed slot.
pub fn conflicting_visits<'a>(
    visits: &'a [Visit],
    query: &'a ConflictQuery,
) -> impl Iterator<Item = &'a Visit> + 'a {
    visits
        .iter()
        .filter(move |visit| query.considers(visit))
        .filter(move |visit| match visit.visit_time.parse::<VisitTime>() {
            Ok(existing) => existing.minutes_between(&query.time) < VISIT_BUFFER_MINUTES,
            Err(e) => {
                tracing::warn!(visit_id = %visit.id, "skipping stored visit with unusable time: {e}");
                false
            }
        })
}

/// Whether the proposed slot collides with any active visit in `visits`.
pub fn has_conflict(visits: &[Visit], query: &ConflictQuery) -> bool {
    conflicting_visits(visits, query).next().is_some()
}

/// Opening hours and granularity used when proposing free slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub opens: VisitTime,
    /// Latest moment a visit may still be running.
    pub closes: VisitTime,
    pub step_minutes: u16,
}

impl Default for SlotWindow {
    fn default() -> Self {
        Self {
            opens: VisitTime::from_hm(9, 0).unwrap_or(VisitTime::MIDNIGHT),
            closes: VisitTime::from_hm(18, 0).unwrap_or(VisitTime::MIDNIGHT),
            step_minutes: 30,
        }
    }
}

/// Start times within `window` that would not conflict with `visits`.
///
/// Every returned time leaves a full buffer before `window.closes`.
pub fn suggest_slots(
    visits: &[Visit],
    property_id: &str,
    date: NaiveDate,
    window: SlotWindow,
) -> Vec<VisitTime> {
    let mut slots = Vec::new();
    if window.step_minutes == 0 {
        return slots;
    }

    let mut candidate = Some(window.opens);
    while let Some(time) = candidate {
        match time.checked_add_minutes(VISIT_BUFFER_MINUTES) {
            Some(end) if end <= window.closes => {}
            _ => break,
        }

        let query = ConflictQuery::at(property_id, date, time);
        if !has_conflict(visits, &query) {
            slots.push(time);
        }
        candidate = time.checked_add_minutes(window.step_minutes);
    }

    slots
}
