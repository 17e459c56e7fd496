//! Shared primitive types used across the entire engine.

/// Row identifier for any persisted record. Always positive once assigned.
pub type RecordId = i64;

/// A stable, unique identifier for an end user.
pub type UserId = String;
