//! Deterministic, pure logic shared by every BREAD view.
//!
//! Core modules are free of I/O. They operate on the schema, on records
//! reached through the [`record::Record`] trait, and on raw request strings.

pub mod columns;
pub mod fieldspec;
pub mod ordering;
pub mod pagination;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod search;
pub mod validate;
pub mod value;
