//! Infrastructure adapters and runtime bootstrap.

pub mod clients;
pub mod error;
pub mod http;
pub mod notifications;
pub mod telemetry;
pub mod upstream;
