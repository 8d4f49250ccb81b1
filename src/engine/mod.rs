// src/engine/mod.rs

//! Orchestration of one experiment run.
//!
//! The run protocol itself lives in [`supervisor`]; [`retry`] wraps the
//! remote calls on the cleanup and failure paths, where losing an update is
//! worse than waiting for the store to come back.

pub mod retry;
pub mod supervisor;

pub use retry::retry;
pub use supervisor::{EXEC_INFO_FIELD, RunOutcome, Supervisor, creation_document};
