//! Visit scheduling: slot parsing, conflict detection and the booking service.

pub mod booking;
pub mod conflict;
pub mod repository;
pub mod time;

pub use booking::{
    Availability, BookingError, VisitChanges, VisitRequest, check_availability, create_visit,
    delete_visit, update_visit,
};
pub use conflict::{
    ConflictQuery, SlotWindow, VISIT_BUFFER_MINUTES, conflicting_visits, has_conflict,
    suggest_slots,
};
pub use repository::{MemoryVisits, VisitRepository};
pub use time::{DateParseError, TimeParseError, VisitTime, parse_visit_date};
