//! Application layer
//!
//! The service facade callers go through: it wires repositories, storage
//! and the orchestrator together and tracks the runs this process spawned.

pub mod linking_service;

pub use linking_service::LinkingService;
