// src/exec/mod.rs

//! Process execution layer.
//!
//! Everything that runs another program lives here, on top of
//! `tokio::process::Command`.
//!
//! - [`env`] computes the environment of the supervised program.
//! - [`process`] spawns the program and pumps its merged output.
//! - [`console`] tees that output into `console.log` and our stdout.
//! - [`auxiliary`] starts the TensorBoard side process and waits for the URL
//!   it announces.

pub mod auxiliary;
pub mod console;
pub mod env;
pub mod process;

pub use auxiliary::AuxProcess;
pub use console::{CONSOLE_LOG_FILE, ConsoleDuplicator};
pub use env::{ForcedEnvironment, current_environment, derive_child_environment};
pub use process::{ChildProgram, exit_code};
