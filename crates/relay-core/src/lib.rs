//! `relay-core`: domain types, configuration and shared errors for the
//! relay integration scheduler.

pub mod config;
pub mod error;
pub mod types;

pub use error::{RelayError, Result};
