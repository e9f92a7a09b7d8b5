//! Ambient concerns: configuration, bootstrap errors, logging init.

pub mod config;
pub mod error;
pub mod logging;
