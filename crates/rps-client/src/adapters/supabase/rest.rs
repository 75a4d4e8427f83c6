//! PostgREST table access.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};

use super::{error_body, network_error, SupabaseStore};
use crate::domain::StoreError;
use crate::ports::outbound::{Order, Query, TableStore};

/// `Accept` value that makes PostgREST return one object or `PGRST116`.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Query-string form of a [`Query`]: `select`, one pair per filter, `order`, `limit`.
pub(super) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.columns.replace(' ', ""))];
    for filter in &query.filters {
        params.push((filter.column().to_string(), filter.operator_value()));
    }
    if !query.orders.is_empty() {
        let order = query
            .orders
            .iter()
            .map(Order::to_param)
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

impl SupabaseStore {
    fn table_url(&self, table: &str) -> String {
        self.url(&format!("/rest/v1/{table}"))
    }

    async fn api_error(table: &str, response: reqwest::Response) -> StoreError {
        let (status, body) = error_body(response).await;
        let error = StoreError::Api {
            code: body.code(),
            message: body
                .message()
                .unwrap_or_else(|| format!("Request failed ({status})")),
            status,
        };
        if !error.is_no_rows() {
            warn!(table, status, code = ?error.code(), "PostgREST error");
        }
        error
    }
}

#[async_trait]
impl TableStore for SupabaseStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let response = self
            .authorized(self.http.get(self.table_url(table)))
            .query(&query_params(query))
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        debug!(table, rows = rows.len(), "Selected");
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        let response = self
            .authorized(self.http.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }
        let stored: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        debug!(table, rows = stored.len(), "Inserted");
        Ok(stored)
    }

    async fn select_single(&self, table: &str, query: &Query) -> Result<Value, StoreError> {
        let response = self
            .authorized(self.http.get(self.table_url(table)))
            .header(ACCEPT, SINGLE_OBJECT)
            .query(&query_params(query))
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }
}
