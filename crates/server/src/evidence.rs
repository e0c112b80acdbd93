//! Remote evidence store client for uploaded lab reports and pump tests.
//!
//! Talks to a Dropbox-style content API using a long-lived refresh token and
//! short-lived access tokens. When the remote store is disabled, documents
//! land on local disk under the configured root folder instead. Uploads are
//! best-effort from the portal's point of view: a failed upload is reported
//! to the caller but never blocks a submission or metrics derivation.

use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use aquaclaim_core::config::EvidenceConfig;

const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const UPLOAD_URL: &str = "https://content.dropboxapi.com/2/files/upload";

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence store write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("evidence store is misconfigured: {0}")]
    Configuration(String),
    #[error("evidence store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("evidence store rejected the request ({status}): {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Clone, Debug)]
pub struct EvidenceReceipt {
    pub path: String,
    pub size_bytes: usize,
}

pub struct EvidenceClient {
    config: EvidenceConfig,
    client: Client,
    access_token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl EvidenceClient {
    pub fn new(config: EvidenceConfig) -> Self {
        Self { config, client: Client::new(), access_token: RwLock::new(None) }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Stores one supporting document under the configured root folder.
    /// Existing files at the same path are overwritten, matching the portal
    /// rule that a re-submitted document replaces the prior one.
    pub async fn upload(
        &self,
        relative_path: &str,
        bytes: Vec<u8>,
    ) -> Result<EvidenceReceipt, EvidenceError> {
        let path = format!("{}/{}", self.config.root_folder.trim_end_matches('/'), relative_path);
        let size_bytes = bytes.len();

        if !self.config.enabled {
            return self.store_local(&path, &bytes).await;
        }

        let token = self.current_token().await?;
        let response = self.upload_request(&token, &path, bytes.clone()).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            // Access tokens are short-lived; refresh once and retry.
            let token = self.refresh_token().await?;
            self.upload_request(&token, &path, bytes).await?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvidenceError::Api { status, body });
        }

        info!(
            event_name = "evidence.uploaded",
            path = %path,
            size_bytes,
            "supporting document stored"
        );
        Ok(EvidenceReceipt { path, size_bytes })
    }

    async fn store_local(&self, path: &str, bytes: &[u8]) -> Result<EvidenceReceipt, EvidenceError> {
        let target = std::path::Path::new(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, bytes).await?;

        info!(
            event_name = "evidence.stored_local",
            path = %path,
            size_bytes = bytes.len(),
            "remote store disabled, document stored on local disk"
        );
        Ok(EvidenceReceipt { path: path.to_owned(), size_bytes: bytes.len() })
    }

    async fn upload_request(
        &self,
        token: &str,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<reqwest::Response, EvidenceError> {
        let api_arg = serde_json::json!({
            "path": path,
            "mode": "overwrite",
            "mute": true,
        });

        Ok(self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?)
    }

    async fn current_token(&self) -> Result<String, EvidenceError> {
        if let Some(token) = self.access_token.read().await.clone() {
            return Ok(token);
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, EvidenceError> {
        let app_key = self
            .config
            .app_key
            .as_deref()
            .ok_or_else(|| EvidenceError::Configuration("evidence.app_key is not set".into()))?;
        let app_secret = self
            .config
            .app_secret
            .as_ref()
            .ok_or_else(|| EvidenceError::Configuration("evidence.app_secret is not set".into()))?;
        let refresh_token = self.config.refresh_token.as_ref().ok_or_else(|| {
            EvidenceError::Configuration("evidence.refresh_token is not set".into())
        })?;

        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(app_key, Some(app_secret.expose_secret()))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "evidence.token_refresh_failed",
                status = %status,
                "could not refresh evidence store access token"
            );
            return Err(EvidenceError::Api { status, body });
        }

        let token: TokenResponse = response.json().await?;
        *self.access_token.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }
}
