//! Command handlers for the `starshot` binary.

pub mod config;
pub mod download;
pub mod generate;
pub mod predictions;
pub mod proxy;
