//! Enrollment engine and HTTP surface for capacity-bounded park activity
//! sessions.
//!
//! The heart of the crate is the [`enrollment`] module: the domain model, the
//! storage collaborator traits, the batch enrollment engine, and the axum
//! router exposing it. [`config`], [`telemetry`], and [`error`] carry the
//! service-level plumbing shared with the api binary.

pub mod config;
pub mod enrollment;
pub mod error;
pub mod telemetry;
