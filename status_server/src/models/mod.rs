//! Domain models: build-name masks and the persisted status map.

pub mod mask;
pub mod status;
