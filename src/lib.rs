//! Floodgate - In-Process Request Throttling
//!
//! This crate implements fixed-window request throttling for HTTP services.
//! A [`throttle::ThrottleStore`] keeps per-key counters over fixed time
//! windows and answers admit/deny decisions in O(1) from the request hot
//! path; a [`throttle::Sweeper`] reclaims expired entries in the background,
//! and [`http`] maps decisions onto axum responses (429 + `Retry-After`).

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod throttle;
