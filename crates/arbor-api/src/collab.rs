use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// Resolves a session token to a user id.
///
/// Registration, password hashing, and session issuance live in the
/// collaborator service; this backend only verifies.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// `Ok(None)` means the token is missing, unknown, or expired.
    async fn verify(&self, token: &str) -> Result<Option<i64>>;
}

/// Resolves a knowledge base to its currently enabled document ids.
#[async_trait]
pub trait KnowledgeResolver: Send + Sync {
    /// `Ok(None)` means the base does not exist or is not owned by
    /// `user_id`. The returned ids are a call-time snapshot; documents
    /// toggled afterwards do not affect an in-flight turn.
    async fn enabled_doc_ids(&self, user_id: i64, base_id: i64) -> Result<Option<Vec<String>>>;
}

/// HTTP client for the collaborator service that owns users, sessions, and
/// knowledge-base metadata.
#[derive(Clone)]
pub struct HttpCollaborator {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    user_id: i64,
}

#[derive(Deserialize)]
struct DocIdsResponse {
    doc_ids: Vec<String>,
}

impl HttpCollaborator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build collaborator HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SessionVerifier for HttpCollaborator {
    async fn verify(&self, token: &str) -> Result<Option<i64>> {
        let response = self
            .http
            .get(format!("{}/session/verify", self.base_url))
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await
            .context("session verify request failed")?;

        match response.status() {
            StatusCode::OK => {
                let body: VerifyResponse = response
                    .json()
                    .await
                    .context("malformed session verify response")?;
                Ok(Some(body.user_id))
            }
            StatusCode::UNAUTHORIZED => Ok(None),
            status => anyhow::bail!("session verify returned {status}"),
        }
    }
}

#[async_trait]
impl KnowledgeResolver for HttpCollaborator {
    async fn enabled_doc_ids(&self, user_id: i64, base_id: i64) -> Result<Option<Vec<String>>> {
        let response = self
            .http
            .get(format!(
                "{}/knowledge-bases/{base_id}/enabled-documents",
                self.base_url
            ))
            .query(&[("user_id", user_id)])
            .send()
            .await
            .context("knowledge base lookup failed")?;

        match response.status() {
            StatusCode::OK => {
                let body: DocIdsResponse = response
                    .json()
                    .await
                    .context("malformed knowledge base response")?;
                Ok(Some(body.doc_ids))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => anyhow::bail!("knowledge base lookup returned {status}"),
        }
    }
}
