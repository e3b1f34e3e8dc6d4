//! Caller identity.
//!
//! Sessions belong to an external identity service. Checkout only asks who a
//! bearer token belongs to; anonymous callers check out as guests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Customer { user_id: Uuid },
    Operator,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("session service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("session service returned an unusable response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Who the token belongs to; `None` for unknown or expired tokens.
    async fn current_user(&self, token: &str) -> Result<Option<Principal>, AuthError>;
}

// =============================================================================
// Identity service client
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role { Customer, Operator }

#[derive(Debug, Deserialize)]
struct SessionBody {
    user_id: Uuid,
    #[serde(default = "customer_role")]
    role: Role,
}

fn customer_role() -> Role { Role::Customer }

impl From<SessionBody> for Principal {
    fn from(body: SessionBody) -> Self {
        match body.role {
            Role::Customer => Principal::Customer { user_id: body.user_id },
            Role::Operator => Principal::Operator,
        }
    }
}

pub struct HttpSessionResolver {
    client: Client,
    base_url: String,
}

impl HttpSessionResolver {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder().connect_timeout(connect_timeout).timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

#[async_trait]
impl SessionResolver for HttpSessionResolver {
    async fn current_user(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        let url = format!("{}/v1/sessions/current", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: SessionBody = response.json().await.map_err(|e| AuthError::Malformed(e.to_string()))?;
                debug!(user_id = %body.user_id, "Session resolved");
                Ok(Some(body.into()))
            }
            status => Err(AuthError::Malformed(format!("unexpected status {}", status))),
        }
    }
}

// =============================================================================
// Fixed tokens
// =============================================================================

/// Token table kept in memory. Used when no identity service is configured,
/// in which case only the operator token is known.
#[derive(Default)]
pub struct StaticSessions {
    tokens: HashMap<String, Principal>,
}

impl StaticSessions {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    pub fn operator_only(operator_token: Option<String>) -> Self {
        match operator_token {
            Some(token) => Self::new().with(token, Principal::Operator),
            None => Self::new(),
        }
    }
}

#[async_trait]
impl SessionResolver for StaticSessions {
    async fn current_user(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self.tokens.get(token).copied())
    }
}
