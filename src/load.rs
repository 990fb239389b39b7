use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use reqwest::Url;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SheetsSettings;
use crate::table::{Table, Value};

/// Destination for a finished table.
pub trait Sink {
    fn name(&self) -> &str;
    fn write(&self, table: &Table) -> Result<()>;
}

/// Write to one sink; failures are logged and reported as `false`.
pub fn load(sink: &dyn Sink, table: &Table) -> bool {
    match sink.write(table) {
        Ok(()) => {
            info!("Saved {} rows to {}", table.len(), sink.name());
            true
        }
        Err(e) => {
            warn!("Failed to save to {}: {:#}", sink.name(), e);
            false
        }
    }
}

// ── CSV ──

pub struct CsvSink {
    path: PathBuf,
    label: String,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("CSV {}", path.display());
        CsvSink { path, label }
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &str {
        &self.label
    }

    fn write(&self, table: &Table) -> Result<()> {
        let mut w = csv::Writer::from_path(&self.path)
            .with_context(|| format!("Failed to create {:?}", self.path))?;
        w.write_record(table.columns())?;
        for row in table.rows() {
            w.write_record(row.iter().map(Value::to_cell))?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Read a CSV written by `CsvSink` (or the raw scrape) back into text cells.
/// Empty cells become `Null`.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut r = csv::Reader::from_path(path).with_context(|| format!("Failed to open {:?}", path))?;
    let columns: Vec<String> = r.headers()?.iter().map(str::to_string).collect();
    let rows = r
        .records()
        .map(|rec| {
            rec.map(|rec| {
                rec.iter()
                    .map(|s| if s.is_empty() { Value::Null } else { Value::from(s) })
                    .collect()
            })
        })
        .collect::<Result<Vec<Vec<Value>>, _>>()?;
    Ok(Table::new(columns, rows))
}

// ── SQLite ──

const SQL_TABLE: &str = "products";

pub struct SqliteSink {
    url: String,
    label: String,
}

impl SqliteSink {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let label = format!("SQLite {}", url);
        SqliteSink { url, label }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Float(x) => ToSqlOutput::Owned(SqlValue::Real(*x)),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column affinity from the first non-null cell.
fn affinity(table: &Table, col: usize) -> &'static str {
    match table.rows().iter().map(|r| &r[col]).find(|v| !v.is_null()) {
        Some(Value::Float(_)) => "REAL",
        Some(Value::Int(_)) => "INTEGER",
        _ => "TEXT",
    }
}

/// A bare path, `:memory:`, `sqlite://path` or a `file:` URI. Any other
/// scheme names a server database this sink cannot reach.
fn sqlite_target(url: &str) -> Result<&str> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        return Ok(path);
    }
    match url.split_once("://") {
        Some((scheme, _)) if scheme != "file" => {
            bail!("Unsupported database scheme {:?}: only SQLite files are supported", scheme)
        }
        _ => Ok(url),
    }
}

impl Sink for SqliteSink {
    fn name(&self) -> &str {
        &self.label
    }

    fn write(&self, table: &Table) -> Result<()> {
        let target = sqlite_target(&self.url)?;
        let conn = Connection::open(target)
            .with_context(|| format!("Failed to open {}", self.url))?;
        write_sqlite(&conn, table)
    }
}

/// Replace the `products` table with the contents of `table`.
pub fn write_sqlite(conn: &Connection, table: &Table) -> Result<()> {
    let cols: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} {}", quote_ident(c), affinity(table, i)))
        .collect();
    let placeholders: Vec<String> = (1..=table.columns().len()).map(|i| format!("?{}", i)).collect();

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} ({cols});",
        t = quote_ident(SQL_TABLE),
        cols = cols.join(", ")
    ))?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(SQL_TABLE),
            placeholders.join(", ")
        ))?;
        for row in table.rows() {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Google Sheets ──

const SHEETS_API: &str = "https://sheets.googleapis.com";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UpdateResponse {
    #[serde(rename = "updatedCells", default)]
    updated_cells: u64,
}

pub struct SheetsSink {
    credentials_path: PathBuf,
    spreadsheet_id: String,
    range: String,
    api_base: String,
    client: Client,
}

impl SheetsSink {
    pub fn new(settings: &SheetsSettings) -> Self {
        SheetsSink {
            credentials_path: settings.credentials_path.clone(),
            spreadsheet_id: settings.spreadsheet_id.clone(),
            range: settings.range.clone(),
            api_base: SHEETS_API.to_string(),
            client: Client::new(),
        }
    }

    #[cfg(test)]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Service-account JWT bearer exchange.
    fn access_token(&self) -> Result<String> {
        let raw = fs::read_to_string(&self.credentials_path)
            .with_context(|| format!("Failed to read credentials {:?}", self.credentials_path))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).context("Invalid service account key file")?;

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &key.client_email,
            scope: SHEETS_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Invalid service account private key")?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let token: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()?
            .error_for_status()
            .context("Token exchange rejected")?
            .json()?;
        Ok(token.access_token)
    }

    fn values_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid Sheets API base {:?}", self.api_base))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", self.range.as_str()]);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        Ok(url)
    }
}

/// Header row followed by every data row.
pub fn sheet_values(table: &Table) -> Vec<Vec<serde_json::Value>> {
    let header: Vec<serde_json::Value> = table.columns().iter().map(|c| c.as_str().into()).collect();
    std::iter::once(header)
        .chain(table.rows().iter().map(|row| {
            row.iter()
                .map(|v| match v {
                    Value::Null => "".into(),
                    Value::Text(s) => s.as_str().into(),
                    Value::Float(x) => (*x).into(),
                    Value::Int(i) => (*i).into(),
                })
                .collect()
        }))
        .collect()
}

impl Sink for SheetsSink {
    fn name(&self) -> &str {
        "Google Sheets"
    }

    fn write(&self, table: &Table) -> Result<()> {
        let token = self.access_token()?;
        let body = serde_json::json!({
            "range": self.range,
            "majorDimension": "ROWS",
            "values": sheet_values(table),
        });
        let resp: UpdateResponse = self
            .client
            .put(self.values_url()?)
            .bearer_auth(token)
            .json(&body)
            .send()?
            .error_for_status()
            .context("Sheets update rejected")?
            .json()?;
        info!("{} cells updated in Google Sheets", resp.updated_cells);
        Ok(())
    }
}
