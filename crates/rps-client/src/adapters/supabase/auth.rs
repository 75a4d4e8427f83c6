//! GoTrue authentication.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{error_body, network_error, SupabaseStore};
use crate::domain::{AuthUser, StoreError, UserId};
use crate::ports::outbound::AuthProvider;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: UserMetadata<'a>,
}

#[derive(Serialize)]
struct UserMetadata<'a> {
    username: &'a str,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<Value>,
}

impl From<GoTrueUser> for AuthUser {
    fn from(user: GoTrueUser) -> Self {
        let username = user
            .user_metadata
            .as_ref()
            .and_then(|m| m.get("username"))
            .and_then(Value::as_str)
            .map(str::to_string);
        AuthUser {
            id: UserId::new(user.id),
            email: user.email,
            username,
        }
    }
}

/// `/token` always, `/signup` when a session is issued immediately.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    user: GoTrueUser,
}

/// Split an auth response into the optional token and the user.
///
/// Sign-up returns a bare user while e-mail confirmation is pending.
fn parse_auth_response(body: Value) -> Result<(Option<String>, AuthUser), StoreError> {
    if body.get("access_token").is_some() {
        let session: SessionResponse =
            serde_json::from_value(body).map_err(|e| StoreError::Parse(e.to_string()))?;
        return Ok((Some(session.access_token), session.user.into()));
    }
    let user: GoTrueUser =
        serde_json::from_value(body).map_err(|e| StoreError::Parse(e.to_string()))?;
    Ok((None, user.into()))
}

impl SupabaseStore {
    async fn auth_call<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<AuthUser, StoreError> {
        let response = self
            .http
            .post(self.url(path))
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            let (status, body) = error_body(response).await;
            let message = body
                .message()
                .unwrap_or_else(|| format!("Authentication failed ({status})"));
            return Err(StoreError::Auth(message));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        let (token, user) = parse_auth_response(body)?;
        if token.is_none() {
            debug!(user_id = %user.id, "No session issued (confirmation pending)");
        }
        self.set_token(token);
        Ok(user)
    }
}

#[async_trait]
impl AuthProvider for SupabaseStore {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<AuthUser, StoreError> {
        let request = SignUpRequest {
            email,
            password,
            data: UserMetadata { username },
        };
        self.auth_call("/auth/v1/signup", &request).await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, StoreError> {
        self.auth_call(
            "/auth/v1/token?grant_type=password",
            &Credentials { email, password },
        )
        .await
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let Some(token) = self.access_token.write().take() else {
            return Ok(());
        };

        let response = self
            .http
            .post(self.url("/auth/v1/logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            info!("Remote session closed");
            return Ok(());
        }
        let (status, body) = error_body(response).await;
        warn!(status, "Logout rejected");
        Err(StoreError::Auth(
            body.message()
                .unwrap_or_else(|| format!("Sign-out failed ({status})")),
        ))
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, StoreError> {
        let Some(token) = self.access_token.read().clone() else {
            return Ok(None);
        };

        let response = self
            .http
            .get(self.url("/auth/v1/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        match response.status() {
            status if status.is_success() => {
                let user: GoTrueUser = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Parse(e.to_string()))?;
                Ok(Some(user.into()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Stored token no longer valid");
                self.set_token(None);
                Ok(None)
            }
            _ => {
                let (status, body) = error_body(response).await;
                Err(StoreError::Auth(
                    body.message()
                        .unwrap_or_else(|| format!("Could not read user ({status})")),
                ))
            }
        }
    }
}
