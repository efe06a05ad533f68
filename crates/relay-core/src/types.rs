use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new record identifier.
///
/// UUIDv7 is time-sortable, so log rows and catalog rows list in creation
/// order without an extra index.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current UTC time as an RFC3339 string, the format every table stores.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The database engine behind a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseKind {
    SqlServer,
    PostgreSql,
    MySql,
    Oracle,
    Sqlite,
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatabaseKind::SqlServer => "SqlServer",
            DatabaseKind::PostgreSql => "PostgreSql",
            DatabaseKind::MySql => "MySql",
            DatabaseKind::Oracle => "Oracle",
            DatabaseKind::Sqlite => "Sqlite",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" => Ok(DatabaseKind::SqlServer),
            "postgresql" | "postgres" => Ok(DatabaseKind::PostgreSql),
            "mysql" => Ok(DatabaseKind::MySql),
            "oracle" => Ok(DatabaseKind::Oracle),
            "sqlite" => Ok(DatabaseKind::Sqlite),
            other => Err(format!("unknown database kind: {other}")),
        }
    }
}

/// A named database connection descriptor.
///
/// `connection_string` is a secret. The `Debug` impl masks it so the struct
/// can be logged freely.
#[derive(Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub connection_string: String,
    pub kind: DatabaseKind,
    pub is_active: bool,
    pub created_at: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field(
                "connection_string",
                &mask_connection_string(&self.connection_string),
            )
            .field("kind", &self.kind)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Redact credentials from a connection string.
///
/// Handles `key=value` pairs (password / pwd keys are blanked) and URLs with a
/// `user:password@host` authority.
pub fn mask_connection_string(raw: &str) -> String {
    if let Some(scheme_end) = raw.find("://") {
        let (scheme, rest) = raw.split_at(scheme_end + 3);
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        if let Some(at) = authority.rfind('@') {
            let userinfo = &authority[..at];
            let user = userinfo.split(':').next().unwrap_or_default();
            return format!("{scheme}{user}:****{}", &rest[at..]);
        }
        return raw.to_string();
    }

    // ADO-style strings separate pairs with ';' (keys may contain spaces),
    // libpq-style strings separate them with whitespace.
    let sep = if raw.contains(';') { ";" } else { " " };
    raw.split(sep)
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_secret_key(key) => format!("{key}=****"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join(sep)
}

fn is_secret_key(key: &str) -> bool {
    matches!(
        key.trim().to_ascii_lowercase().as_str(),
        "password" | "pwd" | "pass" | "secret"
    )
}

/// One `source column -> target parameter` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub id: String,
    pub integration_id: String,
    pub source_column: String,
    pub target_parameter: String,
    /// Zero-based insertion order; drives positional binding.
    pub position: u32,
}

/// A new mapping before it is attached to an integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSpec {
    pub source_column: String,
    pub target_parameter: String,
}

impl MappingSpec {
    pub fn new(source_column: impl Into<String>, target_parameter: impl Into<String>) -> Self {
        Self {
            source_column: source_column.into(),
            target_parameter: target_parameter.into(),
        }
    }
}

/// A one-way transfer definition: source query on one connection, target
/// query on another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub source_connection_id: String,
    pub target_connection_id: String,
    pub source_query: String,
    pub target_query: String,
    pub group_name: Option<String>,
    /// Ascending order within `group_name`.
    pub execution_order: i32,
    pub created_at: String,
}

/// Fields needed to create an [`Integration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIntegration {
    pub name: String,
    pub source_connection_id: String,
    pub target_connection_id: String,
    pub source_query: String,
    pub target_query: String,
    pub group_name: Option<String>,
    pub execution_order: i32,
    pub mappings: Vec<MappingSpec>,
}

/// An integration with its connections and mappings loaded, ready to run.
#[derive(Debug, Clone)]
pub struct ResolvedIntegration {
    pub integration: Integration,
    pub source: Connection,
    pub target: Connection,
    /// Ordered by `position`.
    pub mappings: Vec<Mapping>,
}

/// A cron schedule bound to an integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub integration_id: String,
    pub cron_expression: String,
    /// Opaque handle of the live trigger, set once the scheduler registers it.
    pub trigger_handle: Option<String>,
    pub suspended: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationLog {
    pub id: String,
    pub integration_id: String,
    pub run_at: String,
    pub success: bool,
    pub message: Option<String>,
    pub row_count: u64,
    pub duration_ms: u64,
    pub error_kind: Option<ErrorKind>,
    /// Present only when `success` is false.
    pub error_detail: Option<String>,
}

/// Structured result returned to whoever asked for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub integration_id: String,
    pub success: bool,
    pub row_count: u64,
    pub duration_ms: u64,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
    /// Id of the log row written for this run; `None` if the append failed.
    pub log_id: Option<String>,
}

impl RunOutcome {
    /// The log row this outcome corresponds to.
    pub fn to_log(&self, id: String, run_at: String) -> IntegrationLog {
        IntegrationLog {
            id,
            integration_id: self.integration_id.clone(),
            run_at,
            success: self.success,
            message: self.message.clone(),
            row_count: self.row_count,
            duration_ms: self.duration_ms,
            error_kind: self.error_kind,
            error_detail: self.error_detail.clone(),
        }
    }
}

/// Closed failure taxonomy shared by the engine and the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InactiveConnection,
    ConnectionFailed,
    UnsupportedDatabase,
    SourceQueryError,
    TargetQueryError,
    MappingError,
    InvalidCronExpression,
    AlreadyRunning,
    Cancelled,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Stable code string stored in the run log and shown to callers.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InactiveConnection => "INACTIVE_CONNECTION",
            ErrorKind::ConnectionFailed => "CONNECTION_FAILED",
            ErrorKind::UnsupportedDatabase => "UNSUPPORTED_DATABASE",
            ErrorKind::SourceQueryError => "SOURCE_QUERY_ERROR",
            ErrorKind::TargetQueryError => "TARGET_QUERY_ERROR",
            ErrorKind::MappingError => "MAPPING_ERROR",
            ErrorKind::InvalidCronExpression => "INVALID_CRON_EXPRESSION",
            ErrorKind::AlreadyRunning => "ALREADY_RUNNING",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "INACTIVE_CONNECTION" => ErrorKind::InactiveConnection,
            "CONNECTION_FAILED" => ErrorKind::ConnectionFailed,
            "UNSUPPORTED_DATABASE" => ErrorKind::UnsupportedDatabase,
            "SOURCE_QUERY_ERROR" => ErrorKind::SourceQueryError,
            "TARGET_QUERY_ERROR" => ErrorKind::TargetQueryError,
            "MAPPING_ERROR" => ErrorKind::MappingError,
            "INVALID_CRON_EXPRESSION" => ErrorKind::InvalidCronExpression,
            "ALREADY_RUNNING" => ErrorKind::AlreadyRunning,
            "CANCELLED" => ErrorKind::Cancelled,
            "NOT_FOUND" => ErrorKind::NotFound,
            "INTERNAL_ERROR" => ErrorKind::Internal,
            other => return Err(format!("unknown error kind: {other}")),
        };
        Ok(kind)
    }
}
