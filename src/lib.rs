//! Offline cache gateway for the DentalTech storefront.
//!
//! [`worker`] holds the offline cache controller and its lifecycle;
//! [`cache`] the versioned partitions it reads and writes. [`infra`] wires
//! both to HTTP listeners and the upstream storefront.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;
pub mod worker;
