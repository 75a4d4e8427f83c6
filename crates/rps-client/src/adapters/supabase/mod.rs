//! Supabase Remote Store Adapter
//!
//! Talks to a hosted Supabase project:
//!
//! - `auth.rs`: GoTrue (`/auth/v1`) sign-up, password grant, logout, user
//! - `rest.rs`: PostgREST (`/rest/v1`) selects and inserts
//! - `realtime.rs`: Phoenix websocket (`/realtime/v1/websocket`) change feed
//!
//! The bearer token from the last sign-in is kept here and sent on every REST
//! call and realtime join; the public key is used until then.

mod auth;
mod realtime;
mod rest;

use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::StoreConfig;
use crate::domain::{ClientError, StoreError};

/// Connect timeout for HTTP calls.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Supabase-backed implementation of the remote store ports.
pub struct SupabaseStore {
    http: Client,
    base_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
    events_per_second: u32,
    request_timeout: Duration,
}

impl SupabaseStore {
    /// Create a store client for `base_url` authenticated with `anon_key`.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        request_timeout: Duration,
        events_per_second: u32,
    ) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "Supabase client created");
        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.into(),
            access_token: Arc::new(RwLock::new(None)),
            events_per_second,
            request_timeout,
        })
    }

    /// Create a store client from loaded configuration.
    pub fn from_config(config: &StoreConfig) -> Result<Self, ClientError> {
        let (url, key) = config.credentials()?;
        Ok(Self::new(
            url,
            key,
            config.request_timeout,
            config.events_per_second,
        )?)
    }

    /// Base URL of the project.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a user session token is held.
    pub fn has_session(&self) -> bool {
        self.access_token.read().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// User token when signed in, public key otherwise.
    fn bearer(&self) -> String {
        self.access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn set_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }
}

/// Error body shapes returned by GoTrue and PostgREST.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn message(&self) -> Option<String> {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }

    /// PostgREST / SQLSTATE code; GoTrue's numeric `code` is the HTTP status.
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(code)) => Some(code.clone()),
            _ => self.error_code.clone(),
        }
    }
}

fn network_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Network("request timed out".to_string())
    } else if e.is_connect() {
        StoreError::Network(format!("cannot connect: {e}"))
    } else {
        StoreError::Network(e.to_string())
    }
}

/// Read a failed response into its error body.
async fn error_body(response: Response) -> (u16, ErrorBody) {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default();
    (status, body)
}
