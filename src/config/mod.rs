// src/config/mod.rs

//! Runner settings for mlrun.
//!
//! Responsibilities:
//! - Define the TOML-backed settings model (`model.rs`).
//! - Load a settings file from disk (`loader.rs`).
//! - Validate basic invariants like positive intervals (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_settings};
pub use model::{RunnerSettings, TensorBoardSettings};
pub use validate::validate_settings;
