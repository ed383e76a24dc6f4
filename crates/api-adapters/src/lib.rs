//! # api-adapters
//!
//! HTTP surface of the Marvin services. Handlers translate requests into
//! service calls and `AppError`s into status codes; they hold no logic of
//! their own.

#[cfg(feature = "web-axum")]
pub mod web;
