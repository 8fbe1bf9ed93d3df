/// Foreign-key validation for review documents.
use thiserror::Error;

use super::id::RestaurantRef;
use super::model::{fields, has_text, ReviewRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ForeignKeyError {
    #[error("userId is missing")]
    MissingUserId,
    #[error("userId must be a non-empty string")]
    InvalidUserId,
    #[error("restaurantId is missing")]
    MissingRestaurantId,
    #[error("restaurantId must be a document ID or place ID")]
    InvalidRestaurantId,
}

fn is_absent(record: &ReviewRecord, key: &str) -> bool {
    record.content.get(key).map_or(true, |v| v.is_null())
}

pub fn has_valid_user_id(record: &ReviewRecord) -> bool {
    has_text(record.user_id())
}

pub fn has_valid_restaurant_id(record: &ReviewRecord) -> bool {
    record
        .restaurant_id()
        .is_some_and(|raw| RestaurantRef::parse(raw).is_valid())
}

pub fn has_valid_foreign_keys(record: &ReviewRecord) -> bool {
    has_valid_user_id(record) && has_valid_restaurant_id(record)
}

/// Validate both foreign keys, reporting the first failure.
pub fn validate_foreign_keys(record: &ReviewRecord) -> Result<(), ForeignKeyError> {
    if !has_valid_user_id(record) {
        return Err(if is_absent(record, fields::USER_ID) {
            ForeignKeyError::MissingUserId
        } else {
            ForeignKeyError::InvalidUserId
        });
    }
    if !has_valid_restaurant_id(record) {
        return Err(if is_absent(record, fields::RESTAURANT_ID) {
            ForeignKeyError::MissingRestaurantId
        } else {
            ForeignKeyError::InvalidRestaurantId
        });
    }
    Ok(())
}
