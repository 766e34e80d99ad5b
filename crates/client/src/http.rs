//! Authenticated HTTP client for the admin backend.
//!
//! Every privileged call reads the stored credential first and never touches
//! the network without one. Responses are folded into [`AdminError`]:
//! 401/403 become `Unauthenticated`, anything else unexpected becomes
//! `TransportFailure`.

use std::sync::Arc;

use adminpanel_core::{AdminError, AdminResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

pub use reqwest::Method;

use crate::config::ClientConfig;
use crate::credential::CredentialStore;

/// Transport used by the directory controller.
///
/// [`AuthenticatedClient`] is the production implementation; tests provide
/// scripted fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform an authenticated call and return the decoded JSON body.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> AdminResult<Value>;

    /// Drop the stored credential after the backend rejected it.
    fn clear_credential(&self);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> AdminResult<Value> {
        (**self).request(method, path, body).await
    }

    fn clear_credential(&self) {
        (**self).clear_credential()
    }
}

/// Success body of `POST /token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// HTTP client that attaches the stored bearer credential.
pub struct AuthenticatedClient {
    config: ClientConfig,
    http: reqwest::Client,
    store: Arc<dyn CredentialStore>,
}

impl AuthenticatedClient {
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> AdminResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AdminError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http, store })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.read().is_some()
    }

    /// Exchange email/password for a bearer token and persist it.
    ///
    /// The fields go out form-encoded as `username`/`password`. On failure
    /// the previously stored credential is left untouched.
    pub async fn login(&self, email: &str, password: &str) -> AdminResult<String> {
        let url = self.config.url("/token");
        tracing::debug!(%url, "requesting access token");

        let resp = self
            .http
            .post(&url)
            .form(&[("username", email), ("password", password)])
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status.is_client_error() {
            tracing::warn!(status = status.as_u16(), "login rejected");
            return Err(AdminError::InvalidCredentials);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AdminError::http_status(status.as_u16(), error_detail(&text, status)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AdminError::http_status(status.as_u16(), format!("malformed token response: {e}")))?;

        if token.access_token.is_empty() {
            return Err(AdminError::http_status(status.as_u16(), "token response without access_token"));
        }
        if let Some(kind) = token.token_type.as_deref()
            && !kind.eq_ignore_ascii_case("bearer")
        {
            tracing::warn!(token_type = %kind, "unexpected token type; using it as bearer");
        }

        self.store.save(&token.access_token);
        tracing::info!("login succeeded");

        Ok(token.access_token)
    }

    /// Forget the stored credential.
    pub fn logout(&self) {
        self.store.clear();
        tracing::info!("logged out");
    }

    /// Authenticated call against `path`.
    ///
    /// Fails with `Unauthenticated` before any network activity when no
    /// credential is stored. The credential is never cleared here; that is
    /// the caller's decision.
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> AdminResult<Value> {
        let Some(token) = self.store.read() else {
            tracing::debug!(%method, %path, "no credential; request not sent");
            return Err(AdminError::Unauthenticated);
        };

        let url = self.config.url(path);
        let mut req = self.http.request(method.clone(), &url).bearer_auth(token);
        if let Some(body) = &body {
            req = req.json(body);
        }

        tracing::debug!(%method, %path, "sending request");
        let resp = req.send().await.map_err(transport_error)?;

        let result = classify(resp).await;
        match &result {
            Ok(_) => tracing::debug!(%method, %path, "request succeeded"),
            Err(err) => tracing::debug!(%method, %path, "request failed: {err}"),
        }
        result
    }
}

#[async_trait]
impl Transport for AuthenticatedClient {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> AdminResult<Value> {
        AuthenticatedClient::request(self, method, path, body).await
    }

    fn clear_credential(&self) {
        self.store.clear();
    }
}

async fn classify(resp: reqwest::Response) -> AdminResult<Value> {
    let status = resp.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AdminError::Unauthenticated);
    }

    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(AdminError::http_status(status.as_u16(), error_detail(&text, status)));
    }

    let bytes = resp.bytes().await.map_err(transport_error)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| AdminError::http_status(status.as_u16(), format!("undecodable response body: {e}")))
}

/// Human-readable message for an error response.
///
/// Prefers the backend's `{"detail": "..."}` field, then the raw body, then
/// the status reason.
fn error_detail(body: &str, status: StatusCode) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        match map.get("detail") {
            Some(Value::String(detail)) => return detail.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
    }

    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }

    status.canonical_reason().unwrap_or("unexpected status").to_string()
}

fn transport_error(err: reqwest::Error) -> AdminError {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };

    match err.status() {
        Some(status) => AdminError::http_status(status.as_u16(), message),
        None => AdminError::transport(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_prefers_detail_field() {
        let msg = error_detail(r#"{"detail":"Utilisateur introuvable"}"#, StatusCode::NOT_FOUND);
        assert_eq!(msg, "Utilisateur introuvable");
    }

    #[test]
    fn error_detail_falls_back_to_body_then_reason() {
        assert_eq!(error_detail("boom", StatusCode::INTERNAL_SERVER_ERROR), "boom");
        assert_eq!(error_detail("", StatusCode::BAD_GATEWAY), "Bad Gateway");
        assert_eq!(
            error_detail(r#"{"detail":[{"msg":"field required"}]}"#, StatusCode::UNPROCESSABLE_ENTITY),
            r#"[{"msg":"field required"}]"#
        );
    }

    #[tokio::test]
    async fn request_without_credential_is_unauthenticated() {
        let store: Arc<dyn CredentialStore> = Arc::new(crate::credential::MemoryCredentialStore::new());
        // Nothing listens on port 9; a network attempt would surface as TransportFailure.
        let client = AuthenticatedClient::new(ClientConfig::new("http://127.0.0.1:9"), store).unwrap();

        let err = client.request(Method::GET, "/admin/users", None).await.unwrap_err();
        assert_eq!(err, AdminError::Unauthenticated);
        assert!(!client.is_authenticated());
    }
}
