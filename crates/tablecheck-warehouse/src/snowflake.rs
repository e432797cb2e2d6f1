//! Snowflake backend over the HTTP session protocol.
//!
//! A connection is one login session: `connect` logs in with the configured
//! credentials and the session's warehouse, database and schema, statements
//! run with positional bindings, and `close` logs out. Results are requested
//! as JSON and may arrive inline, in chunks, or after asynchronous polling.

use crate::{
    ConnectionParams, Connector, Dialect, ResultSet, SnowflakeDialect, WarehouseConfig,
    WarehouseConnection,
};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tablecheck_core::{Result, TableCheckError, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Codes meaning "query still running, poll `getResultUrl`"
const QUERY_IN_PROGRESS: &[&str] = &["333333", "333334"];

/// Codes in this range concern the session itself (expired, invalid token)
const SESSION_CODE_PREFIX: &str = "390";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

const CLIENT_APP_ID: &str = "tablecheck";

// ============================================================================
// Connector
// ============================================================================

/// Connector holding the Snowflake credentials.
///
/// The blocking HTTP client is built per connection so that it is created
/// and dropped on the thread doing the warehouse work.
pub struct SnowflakeConnector {
    config: WarehouseConfig,
    base_url: String,
}

impl std::fmt::Debug for SnowflakeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeConnector")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl SnowflakeConnector {
    pub fn new(config: WarehouseConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;
        Ok(Self { config, base_url })
    }

    fn http_client(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("{}/{}", CLIENT_APP_ID, env!("CARGO_PKG_VERSION")))
                .unwrap_or_else(|_| HeaderValue::from_static(CLIENT_APP_ID)),
        );

        Client::builder()
            .default_headers(headers)
            .timeout(self.config.query_timeout)
            .gzip(true)
            .build()
            .map_err(|e| TableCheckError::Connection(format!("Failed to build HTTP client: {}", e)))
    }

    fn login_url(&self, params: &ConnectionParams) -> Result<url::Url> {
        let request_id = Uuid::new_v4().to_string();
        url::Url::parse_with_params(
            &format!("{}/session/v1/login-request", self.base_url),
            &[
                ("warehouse", params.warehouse.as_str()),
                ("databaseName", params.database.as_str()),
                ("schemaName", params.schema.as_str()),
                ("request_id", request_id.as_str()),
            ],
        )
        .map_err(|e| TableCheckError::Config(format!("Invalid login URL: {}", e)))
    }
}

impl Connector for SnowflakeConnector {
    fn dialect(&self) -> &dyn Dialect {
        &SnowflakeDialect
    }

    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn WarehouseConnection>> {
        let (Some(user), Some(password), Some(account)) = (
            self.config.user.as_deref(),
            self.config.password.as_deref(),
            self.config.account.as_deref(),
        ) else {
            return Err(TableCheckError::Config(
                "Snowflake credentials are not configured".to_string(),
            ));
        };

        // ACCOUNT_NAME is the locator without region or cloud suffix
        let account_name = account.split('.').next().unwrap_or(account);

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": account_name,
                "LOGIN_NAME": user,
                "PASSWORD": password,
            }
        });

        let http = self.http_client()?;
        let response: ApiResponse<LoginData> = http
            .post(self.login_url(params)?)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| TableCheckError::Connection(format!("Snowflake login failed: {}", e)))?;

        if !response.success {
            return Err(TableCheckError::Connection(format!(
                "Snowflake login rejected: {}",
                response.message.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        let token = response
            .data
            .and_then(|d| d.token)
            .ok_or_else(|| TableCheckError::Connection("Login response had no token".to_string()))?;

        info!(
            warehouse = %params.warehouse,
            database = %params.database,
            schema = %params.schema,
            "Snowflake session opened"
        );

        let mut conn = SnowflakeConnection {
            http,
            base_url: self.base_url.clone(),
            token,
            sequence: 0,
            timeout: self.config.query_timeout,
        };
        conn.query("ALTER SESSION SET QUERY_RESULT_FORMAT = 'JSON'", &[])?;
        Ok(Box::new(conn))
    }
}

// ============================================================================
// Connection
// ============================================================================

/// An open Snowflake session
pub struct SnowflakeConnection {
    http: Client,
    base_url: String,
    token: String,
    sequence: u64,
    timeout: Duration,
}

impl SnowflakeConnection {
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Snowflake Token=\"{}\"", self.token))
            .header(ACCEPT, "application/snowflake")
    }

    fn submit(&mut self, sql: &str, params: &[Value]) -> Result<QueryData> {
        self.sequence += 1;
        let url = format!(
            "{}/queries/v1/query-request?requestId={}",
            self.base_url,
            Uuid::new_v4()
        );

        let mut body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": self.sequence,
            "querySubmissionTime": Utc::now().timestamp_millis(),
        });
        if !params.is_empty() {
            body["bindings"] = bindings(params);
        }

        let started = Instant::now();
        let mut response: ApiResponse<QueryData> = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(transport_error)?;

        // Long-running statements hand back a result URL to poll
        while response.is_in_progress() {
            if started.elapsed() > self.timeout {
                return Err(TableCheckError::Query(format!(
                    "Query did not finish within {:?}",
                    self.timeout
                )));
            }
            let result_url = response
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .ok_or_else(|| {
                    TableCheckError::Query("In-progress query without a result URL".to_string())
                })?;
            std::thread::sleep(POLL_INTERVAL);
            response = self
                .authorized(self.http.get(format!("{}{}", self.base_url, result_url)))
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json())
                .map_err(transport_error)?;
        }

        let data = response.into_data()?;
        debug!(
            query_id = data.query_id.as_deref().unwrap_or(""),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Snowflake statement complete"
        );
        Ok(data)
    }

    fn fetch_chunks(&self, data: &QueryData) -> Result<Vec<Vec<serde_json::Value>>> {
        let mut headers = HeaderMap::new();
        if !data.chunk_headers.is_empty() {
            for (name, value) in &data.chunk_headers {
                let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| TableCheckError::Query(format!("Bad chunk header: {}", e)))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| TableCheckError::Query(format!("Bad chunk header: {}", e)))?;
                headers.insert(name, value);
            }
        } else if let Some(qrmk) = &data.qrmk {
            headers.insert(
                "x-amz-server-side-encryption-customer-algorithm",
                HeaderValue::from_static("AES256"),
            );
            headers.insert(
                "x-amz-server-side-encryption-customer-key",
                HeaderValue::from_str(qrmk)
                    .map_err(|e| TableCheckError::Query(format!("Bad result key: {}", e)))?,
            );
        }

        let mut rows = Vec::new();
        for chunk in &data.chunks {
            let body = self
                .http
                .get(&chunk.url)
                .headers(headers.clone())
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.text())
                .map_err(transport_error)?;
            rows.extend(parse_chunk(&body)?);
        }
        Ok(rows)
    }
}

impl WarehouseConnection for SnowflakeConnection {
    fn dialect(&self) -> &dyn Dialect {
        &SnowflakeDialect
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        debug!(sql, params = params.len(), "Snowflake query");
        let data = self.submit(sql, params)?;
        let chunk_rows = self.fetch_chunks(&data)?;
        decode_result(&data, chunk_rows)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        debug!(sql, params = params.len(), "Snowflake execute");
        let data = self.submit(sql, params)?;
        Ok(affected_rows(&data))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let url = format!("{}/session/logout-request?delete=true", self.base_url);
        match self
            .authorized(self.http.post(&url))
            .json(&json!({}))
            .send()
            .and_then(|r| r.error_for_status())
        {
            Ok(_) => {
                debug!("Snowflake session closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Snowflake logout failed");
                Err(TableCheckError::Connection(format!("Logout failed: {}", e)))
            }
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    success: bool,
}

impl ApiResponse<QueryData> {
    fn is_in_progress(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|c| QUERY_IN_PROGRESS.contains(&c))
    }

    fn into_data(self) -> Result<QueryData> {
        if self.success {
            return Ok(self.data.unwrap_or_default());
        }
        let code = self.code.unwrap_or_default();
        let message = self
            .message
            .unwrap_or_else(|| "unknown error".to_string());
        if code.starts_with(SESSION_CODE_PREFIX) {
            Err(TableCheckError::Connection(format!(
                "Snowflake session error {}: {}",
                code, message
            )))
        } else {
            Err(TableCheckError::Query(format!(
                "Snowflake error {}: {}",
                code, message
            )))
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryData {
    rowtype: Vec<RowType>,
    rowset: Vec<Vec<serde_json::Value>>,
    chunks: Vec<Chunk>,
    chunk_headers: HashMap<String, String>,
    qrmk: Option<String>,
    get_result_url: Option<String>,
    query_id: Option<String>,
    stats: Option<DmlStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DmlStats {
    num_rows_inserted: u64,
    num_rows_updated: u64,
    num_rows_deleted: u64,
}

// ============================================================================
// Encoding and decoding
// ============================================================================

fn transport_error(e: reqwest::Error) -> TableCheckError {
    TableCheckError::Connection(format!("Snowflake request failed: {}", e))
}

/// Positional bindings keyed "1", "2", ...
fn bindings(params: &[Value]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let (kind, text) = match value {
                Value::Null => ("TEXT", None),
                Value::Boolean(b) => ("BOOLEAN", Some(b.to_string())),
                Value::Integer(n) => ("FIXED", Some(n.to_string())),
                Value::Float(f) => ("REAL", Some(f.to_string())),
                Value::Text(s) => ("TEXT", Some(s.clone())),
                Value::Date(_) | Value::Timestamp(_) => ("TEXT", Some(value.to_string())),
            };
            ((i + 1).to_string(), json!({ "type": kind, "value": text }))
        })
        .collect();
    serde_json::Value::Object(map)
}

/// Chunk bodies are comma-separated row arrays without the outer brackets.
fn parse_chunk(body: &str) -> Result<Vec<Vec<serde_json::Value>>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&format!("[{}]", trimmed))?)
}

fn decode_result(data: &QueryData, chunk_rows: Vec<Vec<serde_json::Value>>) -> Result<ResultSet> {
    let columns = data.rowtype.iter().map(|c| c.name.clone()).collect();
    let rows = data
        .rowset
        .iter()
        .chain(chunk_rows.iter())
        .map(|row| {
            data.rowtype
                .iter()
                .zip(row.iter())
                .map(|(ty, cell)| decode_cell(ty, cell))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ResultSet { columns, rows })
}

fn decode_cell(ty: &RowType, cell: &serde_json::Value) -> Result<Value> {
    let text = match cell {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let bad = || {
        TableCheckError::Query(format!(
            "Cannot decode {} value '{}' in column {}",
            ty.kind, text, ty.name
        ))
    };

    let value = match ty.kind.to_ascii_lowercase().as_str() {
        "fixed" if ty.scale.unwrap_or(0) == 0 => match text.parse::<i64>() {
            Ok(i) => Value::Integer(i),
            // NUMBER(38,0) beyond i64 still renders, as a float
            Err(_) => Value::Float(text.parse().map_err(|_| bad())?),
        },
        "fixed" | "real" => Value::Float(text.parse().map_err(|_| bad())?),
        "boolean" => match text.as_str() {
            "1" | "true" | "TRUE" => Value::Boolean(true),
            "0" | "false" | "FALSE" => Value::Boolean(false),
            _ => return Err(bad()),
        },
        "date" => {
            let days: i64 = text.parse().map_err(|_| bad())?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(bad)?;
            Value::Date(
                epoch
                    .checked_add_signed(chrono::Duration::days(days))
                    .ok_or_else(bad)?,
            )
        }
        "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => {
            // TIMESTAMP_TZ appends the offset after a space
            let epoch = text.split_whitespace().next().unwrap_or_default();
            Value::Timestamp(parse_epoch(epoch).ok_or_else(bad)?)
        }
        _ => Value::Text(text.clone()),
    };
    Ok(value)
}

/// Parse "seconds.fraction" since the Unix epoch.
fn parse_epoch(text: &str) -> Option<DateTime<Utc>> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i128 = whole.parse().ok()?;
    let frac: i128 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", frac).parse().ok()?
    };

    let mut nanos = whole * 1_000_000_000 + frac;
    if negative {
        nanos = -nanos;
    }
    let secs = i64::try_from(nanos.div_euclid(1_000_000_000)).ok()?;
    let sub = u32::try_from(nanos.rem_euclid(1_000_000_000)).ok()?;
    DateTime::from_timestamp(secs, sub)
}

/// Rows touched by a DML statement.
fn affected_rows(data: &QueryData) -> u64 {
    if let Some(stats) = &data.stats {
        return stats.num_rows_inserted + stats.num_rows_updated + stats.num_rows_deleted;
    }
    // Otherwise the counts come back as a one-row result
    data.rowset
        .first()
        .map(|row| {
            row.iter()
                .filter_map(|cell| match cell {
                    serde_json::Value::String(s) => s.parse::<u64>().ok(),
                    serde_json::Value::Number(n) => n.as_u64(),
                    _ => None,
                })
                .sum()
        })
        .unwrap_or(0)
}
