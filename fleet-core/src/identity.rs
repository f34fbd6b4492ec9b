//! Identity types for fleet entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Server identifier. New ids are UUIDv7 so they sort by creation time.
pub type ServerId = Uuid;

/// FileArtifact identifier.
pub type FileId = Uuid;

/// Actor id of the user performing an operation.
pub type UserId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 entity id.
pub fn new_entity_id() -> Uuid {
    Uuid::now_v7()
}
