use relay_core::types::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    /// Referenced environment variable is unset or not unicode.
    #[error("secret for connection {connection} is unavailable: {reason}")]
    Unavailable { connection: String, reason: String },
}

/// Turns a stored connection descriptor into the plaintext connection string
/// a driver needs.
///
/// Called right before a session is opened. The returned string is handed to
/// the driver and dropped; it is never stored or logged.
pub trait SecretResolver: Send + Sync {
    fn reveal(&self, connection: &Connection) -> Result<String, SecretError>;
}

/// Connection strings are stored in plaintext.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSecrets;

impl SecretResolver for PlainSecrets {
    fn reveal(&self, connection: &Connection) -> Result<String, SecretError> {
        Ok(connection.connection_string.clone())
    }
}

/// Resolves `env:VAR` connection strings from the process environment and
/// passes everything else through.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretResolver for EnvSecrets {
    fn reveal(&self, connection: &Connection) -> Result<String, SecretError> {
        match connection.connection_string.strip_prefix("env:") {
            Some(var) => std::env::var(var.trim()).map_err(|e| SecretError::Unavailable {
                connection: connection.name.clone(),
                reason: format!("{var}: {e}"),
            }),
            None => Ok(connection.connection_string.clone()),
        }
    }
}
