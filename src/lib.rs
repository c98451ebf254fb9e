//! Turnstile - In-memory Admission Control
//!
//! This crate decides, for each incoming unit of work, whether to admit or
//! reject it under a configured rate constraint. Five interchangeable
//! algorithms share one decision contract, and an identity registry gives
//! every caller its own limiter with idle expiry.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod ratelimit;
