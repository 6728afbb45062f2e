//! Direct transport: named documents in the family's remote container,
//! addressed with a bearer credential.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::auth::AccessToken;
use crate::error::{RemoteError, map_reqwest_error};

#[derive(Clone)]
pub struct DirectTransport {
    http: Client,
    base_url: String,
    family_id: String,
}

impl DirectTransport {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>, family_id: impl Into<String>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("choreboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            family_id: family_id.into(),
        })
    }

    fn document_url(&self, name: &str) -> String {
        format!("{}/families/{}/documents/{}", self.base_url, self.family_id, name)
    }

    /// `Ok(None)` when the document does not exist yet; callers treat that
    /// as an empty collection.
    pub async fn read_document(
        &self,
        token: &AccessToken,
        name: &str,
    ) -> Result<Option<Value>, RemoteError> {
        let res = self
            .http
            .get(self.document_url(name))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let value = res
                    .json::<Value>()
                    .await
                    .map_err(|e| RemoteError::Malformed(e.to_string()))?;
                Ok(Some(value))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED => Err(RemoteError::Unauthorized),
            s => {
                let body = res.text().await.unwrap_or_default();
                Err(RemoteError::Http {
                    status: s.as_u16(),
                    body,
                })
            }
        }
    }

    /// Replace-on-write: the body is the complete document.
    pub async fn write_document(
        &self,
        token: &AccessToken,
        name: &str,
        body: &Value,
    ) -> Result<(), RemoteError> {
        let res = self
            .http
            .put(self.document_url(name))
            .bearer_auth(token.expose())
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(RemoteError::Unauthorized),
            s => {
                let body = res.text().await.unwrap_or_default();
                Err(RemoteError::Http {
                    status: s.as_u16(),
                    body,
                })
            }
        }
    }
}
