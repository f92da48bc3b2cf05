//! Starsweep CLI - Command-line interface for the Starsweep repository harvester
//!
//! This crate provides the CLI application that ties together all Starsweep components.

pub mod config;

pub use config::{Command, Config, ExportFormat, OutputFormat, SearchArgs};
