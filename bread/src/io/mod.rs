//! I/O helpers for the CLI and the demo server.

pub mod config;
