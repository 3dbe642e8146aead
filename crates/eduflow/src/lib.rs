//! eduflow: data-entry approval workflow engine for school networks.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
