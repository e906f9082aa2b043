// src/handlers/mod.rs

pub mod attempts;
pub mod auth;
pub mod exam_types;
pub mod questions;
pub mod results;
pub mod subjects;
pub mod uploads;
pub mod users;

/// Default page size for list endpoints.
pub(crate) fn default_limit() -> i64 {
    100
}
