//! Gateway transport: one coarse endpoint that performs operations
//! server-side with its own credential. Used whenever the direct path has
//! no usable credential.

use std::time::Duration;

use db::models::chore::{ChoreInstance, UpdateChore};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{RemoteError, map_reqwest_error};

/// Marker the gateway embeds in its error message when the family has not
/// completed the one-time consent step. Must surface as a distinct outcome
/// with the consent URL, never as a generic failure.
pub const AUTH_REQUIRED_MARKER: &str = "AUTHORIZATION_REQUIRED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Templates,
    Chores,
    Members,
    Activity,
    Transactions,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Templates => "templates",
            DataKind::Chores => "chores",
            DataKind::Members => "members",
            DataKind::Activity => "activity",
            DataKind::Transactions => "transactions",
        }
    }
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    action: &'a str,
    family_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct GatewayTransport {
    http: Client,
    endpoint: String,
    family_id: String,
}

impl GatewayTransport {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

    pub fn new(endpoint: impl Into<String>, family_id: impl Into<String>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("choreboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            family_id: family_id.into(),
        })
    }

    async fn call(&self, action: &str, payload: Option<Value>) -> Result<Option<Value>, RemoteError> {
        let request = GatewayRequest {
            action,
            family_id: &self.family_id,
            payload,
        };
        let res = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let reply: GatewayReply = res
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        if reply.success {
            return Ok(reply.data);
        }

        let message = reply.error.unwrap_or_else(|| "unknown gateway error".to_string());
        if message.contains(AUTH_REQUIRED_MARKER) {
            let url = reply
                .data
                .as_ref()
                .and_then(|d| d.get("auth_url"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(RemoteError::AuthorizationRequired { url, message });
        }
        Err(RemoteError::Gateway(message))
    }

    pub async fn get_data(&self, kind: DataKind) -> Result<Option<Value>, RemoteError> {
        self.call("getData", Some(json!({ "type": kind.as_str() }))).await
    }

    pub async fn create_chore(&self, chore: &ChoreInstance) -> Result<(), RemoteError> {
        let payload = serde_json::to_value(chore).map_err(|e| RemoteError::Malformed(e.to_string()))?;
        self.call("createChore", Some(payload)).await.map(|_| ())
    }

    pub async fn update_chore(&self, chore_id: Uuid, patch: &UpdateChore) -> Result<(), RemoteError> {
        let patch = serde_json::to_value(patch).map_err(|e| RemoteError::Malformed(e.to_string()))?;
        self.call("updateChore", Some(json!({ "chore_id": chore_id, "patch": patch })))
            .await
            .map(|_| ())
    }

    pub async fn delete_chore(&self, chore_id: Uuid) -> Result<(), RemoteError> {
        self.call("deleteChore", Some(json!({ "chore_id": chore_id })))
            .await
            .map(|_| ())
    }

    pub async fn complete_chore(
        &self,
        chore_id: Uuid,
        actor_id: &str,
        photo_ref: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.call(
            "completeChore",
            Some(json!({
                "chore_id": chore_id,
                "completed_by": actor_id,
                "photo_ref": photo_ref,
            })),
        )
        .await
        .map(|_| ())
    }

    pub async fn verify_chore(
        &self,
        chore_id: Uuid,
        verifier_id: &str,
        approved: bool,
    ) -> Result<(), RemoteError> {
        self.call(
            "verifyChore",
            Some(json!({
                "chore_id": chore_id,
                "verified_by": verifier_id,
                "approved": approved,
            })),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_template(&self, template_id: Uuid) -> Result<(), RemoteError> {
        self.call("deleteTemplate", Some(json!({ "template_id": template_id })))
            .await
            .map(|_| ())
    }

    /// Ask the gateway to run the whole reconciliation server-side. The
    /// reconciler calls this once and returns when the direct path has no
    /// usable credential.
    pub async fn request_refresh(&self) -> Result<(), RemoteError> {
        self.call("refresh", None).await.map(|_| ())
    }
}
