//! Build status server: aggregates CI build results and drives a
//! traffic-light style indicator.
//!
//! CI servers report finished builds over UDP (or HTTP POST). The server
//! keeps the last status of every tracked build in a YAML file and, after
//! each recorded result, tells the indicator whether all builds pass.

pub mod config;
pub mod dashboard;
pub mod events;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod services;
pub mod transport;
