//! Core data models for the access-log cache.
//!
//! Remote objects are addressed by [`object::ObjectKey`]; rows persisted in
//! SQLite map to [`consumed::ConsumedLog`] and [`usage::UsageRecord`] via
//! `sqlx::FromRow`.

pub mod consumed;
pub mod object;
pub mod usage;
