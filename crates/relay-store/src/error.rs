use thiserror::Error;

/// Errors raised by the catalog repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A connection cannot be deleted while integrations still use it.
    #[error("connection {id} is referenced by {integrations} integration(s)")]
    ConnectionInUse { id: String, integrations: usize },

    /// Two mappings of one integration target the same parameter.
    #[error("duplicate target parameter in mapping set: {parameter}")]
    DuplicateParameter { parameter: String },

    /// A stored value could not be decoded into its domain type.
    #[error("invalid stored value: {0}")]
    InvalidRow(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
