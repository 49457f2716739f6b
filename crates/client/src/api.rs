//! Transport for the `/api/locks` endpoints.
//!
//! [`LockApi`] is the seam between the session/poller state machines and the
//! network. [`HttpLockApi`] implements it with [`reqwest`], attaching a bearer
//! token from a [`TokenSource`] and retrying once after a token refresh when
//! the server answers 401.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use buksu_core::locks::{
    AcquireLockResponse, BatchCheckRequest, BatchCheckResponse, CleanupResponse,
    HeartbeatResponse, LockConflict, LockGrant, LockStatus, LockTarget, ReleaseLockResponse,
};
use reqwest::{StatusCode, Url};

use crate::error::ClientError;

/// Supplies access tokens for lock requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// The current access token, or `None` when signed out.
    fn access_token(&self) -> Option<String>;

    /// Try to obtain a fresh token after a 401. Returns `true` if a retry
    /// is worthwhile.
    async fn refresh(&self) -> bool {
        false
    }
}

/// A fixed token that is never refreshed.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Operations of the lock service as seen by one authenticated user.
#[async_trait]
pub trait LockApi: Send + Sync {
    /// Take the lease. A conflict comes back as [`ClientError::Locked`].
    async fn acquire(&self, target: &LockTarget) -> Result<LockGrant, ClientError>;

    /// Extend a lease this user holds.
    async fn heartbeat(&self, target: &LockTarget) -> Result<HeartbeatResponse, ClientError>;

    async fn release(&self, target: &LockTarget) -> Result<ReleaseLockResponse, ClientError>;

    async fn status(&self, target: &LockTarget) -> Result<LockStatus, ClientError>;

    /// Status of many resources, keyed `"<type>-<id>"`.
    async fn check_batch(
        &self,
        resources: &[LockTarget],
    ) -> Result<HashMap<String, LockStatus>, ClientError>;

    async fn cleanup(&self) -> Result<CleanupResponse, ClientError>;

    /// Fire-and-forget release for shutdown paths that cannot await.
    fn dispatch_release(&self, target: &LockTarget);
}

/// HTTP client for the lock service.
pub struct HttpLockApi {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
}

impl HttpLockApi {
    /// Create a client for the service at `base_url`, e.g.
    /// `http://localhost:3000`.
    pub fn new(base_url: &str, tokens: Arc<dyn TokenSource>) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url, tokens)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::BaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::BaseUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    // ---- private helpers ----

    /// `<base>/api/locks/<segments...>` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "locks"]).extend(segments);
        }
        url
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let token = self
            .tokens
            .access_token()
            .ok_or(ClientError::Unauthorized)?;
        Ok(request.bearer_auth(token))
    }

    /// Send with bearer auth; on 401 refresh the token and retry once.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let retry = request.try_clone();
        let response = self.authorize(request)?.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(retry) = retry else {
            return Err(ClientError::Unauthorized);
        };
        if !self.tokens.refresh().await {
            return Err(ClientError::Unauthorized);
        }
        tracing::debug!("Access token refreshed, retrying lock request");

        let response = self.authorize(retry)?.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        Ok(response)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ClientError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl LockApi for HttpLockApi {
    async fn acquire(&self, target: &LockTarget) -> Result<LockGrant, ClientError> {
        let request = self.client.post(self.endpoint(&["acquire"])).json(target);
        let response = self.execute(request).await?;

        if response.status() == StatusCode::LOCKED {
            let body = response.text().await?;
            return Err(match serde_json::from_str::<LockConflict>(&body) {
                Ok(conflict) => ClientError::Locked {
                    message: conflict.message,
                    locked_by: conflict.locked_by,
                    until: conflict.until,
                },
                Err(_) => ClientError::Api {
                    status: StatusCode::LOCKED.as_u16(),
                    body,
                },
            });
        }

        let body: AcquireLockResponse = Self::parse_response(response).await?;
        Ok(body.lock)
    }

    async fn heartbeat(&self, target: &LockTarget) -> Result<HeartbeatResponse, ClientError> {
        let request = self.client.post(self.endpoint(&["heartbeat"])).json(target);
        let response = self.execute(request).await?;
        Self::parse_response(response).await
    }

    async fn release(&self, target: &LockTarget) -> Result<ReleaseLockResponse, ClientError> {
        let request = self.client.post(self.endpoint(&["release"])).json(target);
        let response = self.execute(request).await?;
        Self::parse_response(response).await
    }

    async fn status(&self, target: &LockTarget) -> Result<LockStatus, ClientError> {
        let request = self
            .client
            .get(self.endpoint(&[target.resource_id.as_str()]))
            .query(&[("resourceType", target.resource_type.as_str())]);
        let response = self.execute(request).await?;
        Self::parse_response(response).await
    }

    async fn check_batch(
        &self,
        resources: &[LockTarget],
    ) -> Result<HashMap<String, LockStatus>, ClientError> {
        let body = BatchCheckRequest {
            resources: resources.to_vec(),
        };
        let request = self.client.post(self.endpoint(&["check-batch"])).json(&body);
        let response = self.execute(request).await?;
        let body: BatchCheckResponse = Self::parse_response(response).await?;
        Ok(body.locks)
    }

    async fn cleanup(&self) -> Result<CleanupResponse, ClientError> {
        let request = self.client.post(self.endpoint(&["cleanup"]));
        let response = self.execute(request).await?;
        Self::parse_response(response).await
    }

    fn dispatch_release(&self, target: &LockTarget) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%target, "No async runtime, leaving lock to expire");
            return;
        };
        let Some(token) = self.tokens.access_token() else {
            tracing::warn!(%target, "No access token, leaving lock to expire");
            return;
        };

        let request = self
            .client
            .post(self.endpoint(&["release"]))
            .bearer_auth(token)
            .json(target);
        let target = target.clone();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) => {
                    tracing::debug!(%target, status = %response.status(), "Detached lock release sent");
                }
                Err(e) => {
                    tracing::debug!(%target, error = %e, "Detached lock release failed");
                }
            }
        });
    }
}
