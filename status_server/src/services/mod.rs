//! Core services: status store, event intake, indicator notifier, the
//! pipeline tying them together and the queue serializing HTTP events.

pub mod event_queue;
pub mod intake_service;
pub mod notify_service;
pub mod pipeline;
pub mod store_service;
