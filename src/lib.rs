//! Shelf sentinel library
//!
//! Exposes the shelf engine and its transports for integration testing and
//! binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
