//! Declarative browse/read/edit/add/delete ("BREAD") views over a model schema.
//!
//! A [`scaffold::Bread`] is built once from configuration and validated
//! against the schema. Requests then flow through it:
//!
//! - **[`core`]**: Pure logic. Field-spec resolution and validation, column
//!   ordering, search compilation, pagination. No I/O.
//! - **[`store`]**: In-memory storage implementing the ordering and record
//!   traits the core needs.
//! - **[`io`]**: Reading the TOML site file.
//!
//! View pipelines ([`browse`], [`read`], [`form`]) and the permission gate
//! ([`access`]) combine the two for the CLI and the demo server.

pub mod access;
pub mod browse;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod form;
pub mod io;
pub mod logging;
pub mod read;
pub mod scaffold;
pub mod site;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
