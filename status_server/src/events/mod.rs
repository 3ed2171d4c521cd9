//! Inbound build events.
//!
//! Events are transient: decoded per message, used to update the status
//! store, then dropped.

pub mod build;
