use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Statement};
use tracing::warn;

use super::{BoundParam, DriverError, Row, RowStream};
use crate::value::SqlValue;

/// PostgreSQL session over a single `tokio-postgres` client.
pub struct PostgresSession {
    client: Client,
    connection: JoinHandle<()>,
    /// Target statements, prepared once per run, keyed by the original SQL.
    prepared: HashMap<String, Statement>,
}

impl PostgresSession {
    pub async fn open(connection_string: &str) -> Result<Self, DriverError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(Self {
            client,
            connection,
            prepared: HashMap::new(),
        })
    }

    pub async fn fetch(self, sql: &str) -> Result<RowStream, DriverError> {
        let stmt = self.client.prepare(sql).await?;
        let columns: Arc<[String]> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let types: Vec<Type> = stmt.columns().iter().map(|c| c.type_().clone()).collect();
        let rows = self
            .client
            .query_raw(&stmt, std::iter::empty::<&(dyn ToSql + Sync)>())
            .await?;

        let stream = rows.map(move |row| -> Result<Row, DriverError> {
            let row = row?;
            let values = types
                .iter()
                .enumerate()
                .map(|(i, ty)| read_value(&row, i, ty))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Row::new(Arc::clone(&columns), values))
        });
        // The stream needs the client (and its connection task) alive.
        Ok(RowStream::new(stream, self))
    }

    /// Execute with `@name` placeholders rewritten to `$n` in mapping order.
    pub async fn execute(&mut self, sql: &str, params: &[BoundParam]) -> Result<u64, DriverError> {
        let stmt = match self.prepared.get(sql) {
            Some(stmt) => stmt.clone(),
            None => {
                let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                let rewritten = rewrite_named_placeholders(sql, &names);
                let stmt = self.client.prepare(&rewritten).await?;
                self.prepared.insert(sql.to_string(), stmt.clone());
                stmt
            }
        };

        if stmt.params().len() != params.len() {
            return Err(DriverError::Binding(format!(
                "target query takes {} parameters, mapping supplies {}",
                stmt.params().len(),
                params.len()
            )));
        }

        let boxed = params
            .iter()
            .zip(stmt.params())
            .map(|(p, ty)| to_param(&p.value, ty).map_err(|e| bind_error(&p.name, e)))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| &**b as &(dyn ToSql + Sync)).collect();
        Ok(self.client.execute(&stmt, &refs).await?)
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

fn bind_error(name: &str, reason: String) -> DriverError {
    DriverError::Binding(format!("parameter {name}: {reason}"))
}

/// Replace `@name` / `:name` placeholders with `$1..$n`, numbered by the
/// position of `name` in `names`.
///
/// Quoted literals and identifiers are left alone, as are `::` casts and any
/// placeholder that is not in `names`. A name given without a prefix matches
/// its `@` form.
pub fn rewrite_named_placeholders(sql: &str, names: &[&str]) -> String {
    let position = |token: &str| {
        names.iter().position(|n| {
            if n.starts_with(['@', ':']) {
                *n == token
            } else {
                token.strip_prefix('@') == Some(*n)
            }
        })
    };

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '@' | ':' => {
                let prev_colon = i > 0 && chars[i - 1] == ':';
                let starts_ident = chars
                    .get(i + 1)
                    .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_');
                if prev_colon || !starts_ident {
                    out.push(c);
                    i += 1;
                    continue;
                }
                let end = chars[i + 1..]
                    .iter()
                    .position(|n| !(n.is_ascii_alphanumeric() || *n == '_'))
                    .map_or(chars.len(), |p| i + 1 + p);
                let token: String = chars[i..end].iter().collect();
                match position(&token) {
                    Some(idx) => out.push_str(&format!("${}", idx + 1)),
                    None => out.push_str(&token),
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn read_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<SqlValue, DriverError> {
    fn wrap<T>(v: Option<T>, f: impl FnOnce(T) -> SqlValue) -> SqlValue {
        v.map_or(SqlValue::Null, f)
    }

    let value = if *ty == Type::BOOL {
        wrap(row.try_get::<_, Option<bool>>(idx)?, SqlValue::Bool)
    } else if *ty == Type::INT2 {
        wrap(row.try_get::<_, Option<i16>>(idx)?, |v| SqlValue::Integer(v.into()))
    } else if *ty == Type::INT4 {
        wrap(row.try_get::<_, Option<i32>>(idx)?, |v| SqlValue::Integer(v.into()))
    } else if *ty == Type::INT8 {
        wrap(row.try_get::<_, Option<i64>>(idx)?, SqlValue::Integer)
    } else if *ty == Type::FLOAT4 {
        wrap(row.try_get::<_, Option<f32>>(idx)?, |v| SqlValue::Real(v.into()))
    } else if *ty == Type::FLOAT8 {
        wrap(row.try_get::<_, Option<f64>>(idx)?, SqlValue::Real)
    } else if *ty == Type::BYTEA {
        wrap(row.try_get::<_, Option<Vec<u8>>>(idx)?, SqlValue::Blob)
    } else if *ty == Type::TIMESTAMPTZ {
        wrap(row.try_get::<_, Option<DateTime<Utc>>>(idx)?, |v| {
            SqlValue::Text(v.to_rfc3339())
        })
    } else if *ty == Type::TIMESTAMP {
        wrap(row.try_get::<_, Option<NaiveDateTime>>(idx)?, |v| {
            SqlValue::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        })
    } else if *ty == Type::DATE {
        wrap(row.try_get::<_, Option<NaiveDate>>(idx)?, |v| SqlValue::Text(v.to_string()))
    } else {
        // TEXT, VARCHAR, BPCHAR, NAME and friends. Anything else has to be
        // cast to text in the source query.
        wrap(row.try_get::<_, Option<String>>(idx)?, SqlValue::Text)
    };
    Ok(value)
}

type PgParam = Box<dyn ToSql + Sync + Send>;

/// Coerce a value to the parameter type the server inferred for its slot.
///
/// NULLs are typed too, since tokio-postgres checks the Rust type against
/// the declared one before looking at the value.
fn to_param(value: &SqlValue, ty: &Type) -> Result<PgParam, String> {
    if *ty == Type::BOOL {
        Ok(Box::new(as_bool(value)?))
    } else if *ty == Type::INT2 {
        let v = as_i64(value)?.map(i16::try_from).transpose().map_err(|e| e.to_string())?;
        Ok(Box::new(v))
    } else if *ty == Type::INT4 {
        let v = as_i64(value)?.map(i32::try_from).transpose().map_err(|e| e.to_string())?;
        Ok(Box::new(v))
    } else if *ty == Type::INT8 {
        Ok(Box::new(as_i64(value)?))
    } else if *ty == Type::FLOAT4 {
        Ok(Box::new(as_f64(value)?.map(|v| v as f32)))
    } else if *ty == Type::FLOAT8 {
        Ok(Box::new(as_f64(value)?))
    } else if *ty == Type::BYTEA {
        let v = match value {
            SqlValue::Null => None,
            SqlValue::Blob(b) => Some(b.clone()),
            SqlValue::Text(s) => Some(s.clone().into_bytes()),
            other => return Err(format!("cannot bind {} as bytea", other.type_name())),
        };
        Ok(Box::new(v))
    } else if *ty == Type::TIMESTAMPTZ {
        let v = as_text(value)
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| e.to_string())?;
        Ok(Box::new(v))
    } else if *ty == Type::TIMESTAMP {
        let v = as_text(value)
            .map(|s| parse_naive_timestamp(&s))
            .transpose()?;
        Ok(Box::new(v))
    } else if *ty == Type::DATE {
        let v = as_text(value)
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| e.to_string())?;
        Ok(Box::new(v))
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty) {
        Ok(Box::new(as_text(value)))
    } else {
        Err(format!("unsupported parameter type {ty}; cast it in the target query"))
    }
}

fn as_bool(value: &SqlValue) -> Result<Option<bool>, String> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Bool(b) => Ok(Some(*b)),
        SqlValue::Integer(i) => Ok(Some(*i != 0)),
        SqlValue::Text(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Ok(Some(true)),
            "false" | "f" | "0" | "no" => Ok(Some(false)),
            _ => Err(format!("cannot bind '{s}' as bool")),
        },
        other => Err(format!("cannot bind {} as bool", other.type_name())),
    }
}

fn as_i64(value: &SqlValue) -> Result<Option<i64>, String> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Bool(b) => Ok(Some(i64::from(*b))),
        SqlValue::Integer(i) => Ok(Some(*i)),
        SqlValue::Real(r) if r.fract() == 0.0 => Ok(Some(*r as i64)),
        SqlValue::Text(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("cannot bind '{s}' as integer")),
        other => Err(format!("cannot bind {} as integer", other.type_name())),
    }
}

fn as_f64(value: &SqlValue) -> Result<Option<f64>, String> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Integer(i) => Ok(Some(*i as f64)),
        SqlValue::Real(r) => Ok(Some(*r)),
        SqlValue::Text(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("cannot bind '{s}' as float")),
        other => Err(format!("cannot bind {} as float", other.type_name())),
    }
}

fn as_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_naive_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| format!("cannot bind '{s}' as timestamp: {e}"))
}
