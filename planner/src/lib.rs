//! nanofolio-planner: build a portfolio from a JSON price file.
//!
//! Reads a TOML config and a price file, runs the nanofolio pipeline
//! (estimate → optimize → clean → allocate), and prints the resulting
//! weights, expected performance and share order.

pub mod commands;
pub mod config;
pub mod error;
pub mod prices;
pub mod report;
