//! Core types and trait definitions for the Pulso orchestration backend.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod appointment;
pub mod call;
pub mod error;
pub mod event;
pub mod lead;
pub mod message;
pub mod rules;
pub mod store;

pub use error::{Error, Result};
