//! Configuration module for the transcode queue
//!
//! Handles loading settings, queues, profiles and rules from TOML files and
//! environment variable overrides.

pub mod config;

pub use config::*;
