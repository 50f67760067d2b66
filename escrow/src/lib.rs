//! Custos escrow authority tooling
//!
//! Configuration, key-file handling and the end-to-end simulator behind the
//! `custos-escrow` binary.

#![warn(missing_docs)]

pub mod config;
pub mod keyfile;
pub mod simulate;

pub use config::EscrowConfig;
pub use simulate::{SimulationOptions, SimulationReport};
