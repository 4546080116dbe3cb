//! Google Sheets v4 REST backend.
//!
//! Uses a bearer access token obtained out of band (service account or
//! OAuth tooling). A missing spreadsheet id or token is reported as
//! `Unavailable` on every call so the rest of the system keeps working on
//! local data.

use super::a1;
use super::backend::{CellWrite, SheetBackend};
use crate::error::{Backend, Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://sheets.googleapis.com/v4";

/// Request timeout; each sync cycle is the retry mechanism.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Google Sheets backend.
#[derive(Debug)]
pub struct GoogleSheetsBackend {
    client: reqwest::Client,
    endpoint: String,
    spreadsheet_id: Option<String>,
    token: Option<String>,
    app_secret: Option<String>,
    /// Numeric sheet ids by tab title, needed for row deletion.
    sheet_ids: Mutex<HashMap<String, i64>>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateValuesResponse {
    #[serde(default)]
    total_updated_cells: usize,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl GoogleSheetsBackend {
    /// Create a backend. `endpoint` defaults to [`DEFAULT_ENDPOINT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        spreadsheet_id: Option<String>,
        token: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            spreadsheet_id: spreadsheet_id.filter(|s| !s.trim().is_empty()),
            token: token.filter(|s| !s.trim().is_empty()),
            app_secret: None,
            sheet_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Send an `X-App-Secret` header with every request (for proxy endpoints).
    #[must_use]
    pub fn with_app_secret(mut self, secret: Option<String>) -> Self {
        self.app_secret = secret.filter(|s| !s.is_empty());
        self
    }

    /// Whether both the spreadsheet id and the token are configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.spreadsheet_id.is_some() && self.token.is_some()
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (&self.spreadsheet_id, &self.token) {
            (Some(id), Some(token)) => Ok((id, token)),
            (None, _) => Err(Error::unavailable(
                Backend::Sheet,
                "spreadsheet id not configured",
            )),
            (_, None) => Err(Error::unavailable(
                Backend::Sheet,
                "access token not configured",
            )),
        }
    }

    /// Build `{endpoint}/spreadsheets/{id}/{segments...}` with each segment
    /// percent-encoded.
    fn url(&self, id: &str, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid sheets endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config("sheets endpoint cannot be a base URL".to_string()))?
            .push("spreadsheets")
            .push(id)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: reqwest::Url, token: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url).bearer_auth(token);
        if let Some(secret) = &self.app_secret {
            req = req.header("X-App-Secret", secret);
        }
        req
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body).map_or_else(
                |_| format!("HTTP {}: {body}", status.as_u16()),
                |e| format!("HTTP {}: {}", e.error.code, e.error.message),
            );
            warn!(status = status.as_u16(), "Sheets API request failed");
            return Err(Error::unavailable(Backend::Sheet, message));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::unavailable(Backend::Sheet, format!("unexpected response: {e}"))
        })
    }

    async fn sheet_id(&self, tab: &str) -> Result<i64> {
        let cached = self
            .sheet_ids
            .lock()
            .ok()
            .and_then(|m| m.get(tab).copied());
        if let Some(id) = cached {
            return Ok(id);
        }

        let (spreadsheet, token) = self.credentials()?;
        let mut url = self.url(spreadsheet, &[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(sheetId,title)");
        let response = self
            .request(reqwest::Method::GET, url, token)
            .send()
            .await?;
        let meta: SpreadsheetMeta = Self::parse_response(response).await?;

        let mut found = None;
        if let Ok(mut cache) = self.sheet_ids.lock() {
            for sheet in meta.sheets {
                if sheet.properties.title == tab {
                    found = Some(sheet.properties.sheet_id);
                }
                cache.insert(sheet.properties.title, sheet.properties.sheet_id);
            }
        }
        found.ok_or_else(|| Error::KeyNotFound {
            tab: tab.to_string(),
            key: "sheetId".to_string(),
        })
    }
}

impl SheetBackend for GoogleSheetsBackend {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let (id, token) = self.credentials()?;
        let url = self.url(id, &["values", range])?;
        debug!(range, "GET values");

        let response = self
            .request(reqwest::Method::GET, url, token)
            .send()
            .await?;
        let body: ValueRange = Self::parse_response(response).await?;

        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_row(&self, tab: &str, row: &[String]) -> Result<()> {
        let (id, token) = self.credentials()?;
        let target = format!("{}:append", a1::quote_tab(tab));
        let mut url = self.url(id, &["values", &target])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        debug!(tab, cells = row.len(), "POST append");

        let response = self
            .request(reqwest::Method::POST, url, token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?;
        let _: serde_json::Value = Self::parse_response(response).await?;
        Ok(())
    }

    async fn write_cells(&self, tab: &str, writes: &[CellWrite]) -> Result<usize> {
        let (id, token) = self.credentials()?;
        let url = self.url(id, &["values:batchUpdate"])?;
        let data: Vec<serde_json::Value> = writes
            .iter()
            .map(|w| {
                json!({
                    "range": a1::cell_range(tab, w.column, w.row),
                    "values": [[w.value]],
                })
            })
            .collect();
        debug!(tab, cells = writes.len(), "POST values:batchUpdate");

        let response = self
            .request(reqwest::Method::POST, url, token)
            .json(&json!({ "valueInputOption": "USER_ENTERED", "data": data }))
            .send()
            .await?;
        let body: BatchUpdateValuesResponse = Self::parse_response(response).await?;
        Ok(body.total_updated_cells)
    }

    async fn delete_row(&self, tab: &str, row: usize) -> Result<()> {
        if row == 0 {
            return Err(Error::InvalidArgument("row numbers start at 1".to_string()));
        }
        let sheet_id = self.sheet_id(tab).await?;
        let (id, token) = self.credentials()?;
        let target = format!("{id}:batchUpdate");
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid sheets endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config("sheets endpoint cannot be a base URL".to_string()))?
            .push("spreadsheets")
            .push(&target);
        debug!(tab, row, "POST deleteDimension");

        let request = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row,
                    }
                }
            }]
        });
        let response = self
            .request(reqwest::Method::POST, url, token)
            .json(&request)
            .send()
            .await?;
        let _: serde_json::Value = Self::parse_response(response).await?;
        Ok(())
    }
}
