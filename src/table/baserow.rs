// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Baserow REST backend.
//!
//! Talks to the row and field endpoints of the Baserow database API with a
//! database token. Rows are always requested with `user_field_names=true`, so
//! fields are keyed by the names users see instead of `field_123` style
//! identifiers.
//!
//! # Value Folding
//!
//! Baserow hands out richer values than [`FieldValue`] can hold. They are
//! folded as follows:
//!
//! - Single select options (`{"id": 1, "value": "Open", ...}`) become their
//!   `value`.
//! - Collaborators and similar objects with a `name` become that name.
//! - Lists, e.g., link rows or multiple select, become their folded elements.
//!   An empty list is null, one element is that element, and more than one
//!   element is joined into comma separated text.
//! - Any other object is null.
//!
//! # See Also
//!
//! - [Baserow database API](https://api.baserow.io/api/redoc/)

use crate::{
    config::BaserowSettings,
    table::{FieldValue, Reference, Row, RowId, RowPage, TableBackend, TableId, TransportError},
};

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, Response,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Table backend for the Baserow REST API.
#[derive(Debug, Clone)]
pub struct BaserowBackend {
    client: Client,
    base_url: String,
}

impl BaserowBackend {
    /// Construct new Baserow backend.
    ///
    /// # Errors
    ///
    /// - Return [`TransportError::Setup`] if the token cannot be used as a
    ///   header value, or the HTTP client cannot be built.
    pub fn new(base_url: impl AsRef<str>, token: impl AsRef<str>) -> Result<Self, TransportError> {
        let mut authorization = HeaderValue::from_str(&format!("Token {}", token.as_ref()))
            .map_err(|_| TransportError::Setup("API token is not a valid header value".into()))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("record-linker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| TransportError::Setup(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.as_ref().trim_end_matches('/').into(),
        })
    }

    /// Construct new Baserow backend from settings.
    ///
    /// # Errors
    ///
    /// - Return [`TransportError::Setup`] if backend cannot be constructed.
    pub fn from_settings(settings: &BaserowSettings) -> Result<Self, TransportError> {
        Self::new(&settings.url, &settings.token)
    }

    fn rows_url(&self, table: TableId) -> String {
        format!("{}/api/database/rows/table/{table}/", self.base_url)
    }

    fn row_url(&self, table: TableId, row: RowId) -> String {
        format!("{}/api/database/rows/table/{table}/{row}/", self.base_url)
    }

    fn fields_url(&self, table: TableId) -> String {
        format!("{}/api/database/fields/table/{table}/", self.base_url)
    }
}

impl TableBackend for BaserowBackend {
    async fn list_rows(
        &self,
        table: TableId,
        page: u32,
        size: u32,
    ) -> Result<RowPage, TransportError> {
        let url = self.rows_url(table);
        debug!("GET {url} page={page} size={size}");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("user_field_names", "true".to_string()),
                ("page", page.to_string()),
                ("size", size.to_string()),
            ])
            .send()
            .await?;
        let page: RowsResponse = success(response).await?.json().await?;

        Ok(RowPage {
            rows: page
                .results
                .into_iter()
                .map(row_from_json)
                .collect::<Result<Vec<_>, _>>()?,
            has_more: page.next.is_some(),
        })
    }

    async fn update_row_field(
        &self,
        table: TableId,
        row: RowId,
        field: &str,
        reference: &Reference,
    ) -> Result<(), TransportError> {
        let url = self.row_url(table, row);
        debug!("PATCH {url} field={field:?} reference={reference}");

        let mut body = Map::new();
        body.insert(field.into(), reference_to_json(reference));
        let response = self
            .client
            .patch(&url)
            .query(&[("user_field_names", "true")])
            .json(&body)
            .send()
            .await?;
        success(response).await?;

        Ok(())
    }

    async fn primary_field(&self, table: TableId) -> Result<String, TransportError> {
        let url = self.fields_url(table);
        debug!("GET {url}");

        let response = self.client.get(&url).send().await?;
        let fields: Vec<FieldMeta> = success(response).await?.json().await?;

        fields
            .into_iter()
            .find(|field| field.primary)
            .map(|field| field.name)
            .ok_or_else(|| TransportError::Malformed(format!("table {table} has no primary field")))
    }
}

#[derive(Debug, Deserialize)]
struct RowsResponse {
    next: Option<String>,
    results: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct FieldMeta {
    name: String,
    #[serde(default)]
    primary: bool,
}

async fn success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

fn row_from_json(mut object: Map<String, Value>) -> Result<Row, TransportError> {
    let id = object
        .remove("id")
        .and_then(|id| id.as_u64())
        .ok_or_else(|| TransportError::Malformed("row without numeric id".into()))?;

    // INVARIANT: "order" is row bookkeeping, not a user field.
    object.remove("order");

    Ok(Row {
        id: RowId::new(id),
        fields: object
            .into_iter()
            .map(|(name, value)| (name, fold_value(&value)))
            .collect(),
    })
}

fn fold_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(value) => FieldValue::Bool(*value),
        Value::Number(value) => value
            .as_f64()
            .map(FieldValue::Number)
            .unwrap_or_default(),
        Value::String(value) => FieldValue::Text(value.clone()),
        Value::Object(object) => object
            .get("value")
            .or_else(|| object.get("name"))
            .map(fold_value)
            .unwrap_or_default(),
        Value::Array(values) => {
            let mut folded = values
                .iter()
                .map(fold_value)
                .filter(|value| !value.is_blank())
                .collect::<Vec<_>>();
            match folded.len() {
                0 => FieldValue::Null,
                1 => folded.remove(0),
                _ => FieldValue::Text(
                    folded
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
            }
        }
    }
}

fn reference_to_json(reference: &Reference) -> Value {
    match reference {
        // INVARIANT: Link row fields take a list of row identifiers.
        Reference::RowId(id) => Value::from(vec![id.get()]),
        Reference::Value(FieldValue::Null) => Value::Null,
        Reference::Value(FieldValue::Bool(value)) => Value::Bool(*value),
        Reference::Value(FieldValue::Number(value)) => Value::from(*value),
        Reference::Value(FieldValue::Text(value)) => Value::String(value.clone()),
    }
}
