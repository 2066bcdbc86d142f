//! Courtroom simulation engine: scenario catalog, evidence search, AI adjudication,
//! rubric scoring, and certification, plus the configuration and telemetry shared by
//! the service binary.

pub mod config;
pub mod error;
pub mod simulation;
pub mod telemetry;

pub use error::AppError;
