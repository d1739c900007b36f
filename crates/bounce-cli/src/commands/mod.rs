//! CLI command implementations.

pub mod config;
pub mod devices;
pub mod info;
pub mod render;
