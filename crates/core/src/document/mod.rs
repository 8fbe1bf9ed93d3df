pub mod id;
pub mod model;
pub mod timestamp;
pub mod validate;

pub use id::{PlaceIdPolicy, RestaurantRef, PLACE_ID_POLICY_V1};
pub use model::{fields, ReviewRecord, Temporal};
pub use validate::{has_valid_foreign_keys, validate_foreign_keys, ForeignKeyError};
