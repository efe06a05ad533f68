//! `relay-engine` runs one integration. It opens both connections, streams the
//! source rows and binds each row through the mapping set. The target query
//! runs once per row, and every run appends exactly one run log.

pub mod driver;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod notify;
pub mod secrets;
pub mod value;

pub use engine::ExecutionEngine;
pub use error::RunError;
pub use notify::{NotifyError, RunNotifier, TracingNotifier};
pub use secrets::{EnvSecrets, PlainSecrets, SecretError, SecretResolver};
pub use value::SqlValue;
