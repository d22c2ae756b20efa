pub mod property;
pub mod user;
pub mod visit;

pub use property::{ListingType, Property, PropertyKind, PropertyStatus};
pub use user::User;
pub use visit::{Visit, VisitStatus};
