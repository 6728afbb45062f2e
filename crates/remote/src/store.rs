//! Failover coordinator: one retry-then-fallback policy shared by every
//! remote operation, plus typed document reads and writes.

use std::sync::Arc;

use db::models::activity::ActivityDocument;
use db::models::chore::{ChoresDocument, TemplatesDocument};
use db::models::member::{LedgerDocument, MembersDocument};
use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::auth::{AccessToken, TokenProvider};
use crate::direct::DirectTransport;
use crate::error::RemoteError;
use crate::gateway::{DataKind, GatewayTransport};

pub const DOC_TEMPLATES: &str = "templates";
pub const DOC_CHORES: &str = "chores";
pub const DOC_MEMBERS: &str = "members";
pub const DOC_ACTIVITY: &str = "activity";
pub const DOC_LEDGER: &str = "transactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    /// No credential was obtainable at all.
    NoCredential,
    /// The credential was rejected and a forced refresh did not help.
    AuthExpired,
    /// The direct transport failed for a non-authorization reason.
    DirectError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Gateway(FallbackCause),
}

/// An operation result tagged with the transport that produced it, so
/// callers can react to *why* the gateway had to answer.
#[derive(Debug)]
pub struct Routed<T> {
    pub value: T,
    pub route: Route,
}

impl<T> Routed<T> {
    /// The direct path is currently unusable for credential reasons. The
    /// reconciler treats this as "hand the whole pass to the gateway".
    pub fn credentials_unavailable(&self) -> bool {
        matches!(
            self.route,
            Route::Gateway(FallbackCause::NoCredential) | Route::Gateway(FallbackCause::AuthExpired)
        )
    }
}

pub struct RemoteStore {
    direct: DirectTransport,
    gateway: GatewayTransport,
    tokens: Arc<dyn TokenProvider>,
}

impl RemoteStore {
    pub fn new(
        direct: DirectTransport,
        gateway: GatewayTransport,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            direct,
            gateway,
            tokens,
        }
    }

    pub fn direct(&self) -> &DirectTransport {
        &self.direct
    }

    pub fn gateway(&self) -> &GatewayTransport {
        &self.gateway
    }

    /// The one failover policy, applied per logical operation:
    /// direct if a credential is obtainable; on an unauthorized failure,
    /// exactly one forced refresh and one retry; then the gateway. A
    /// non-authorization direct failure falls back without a refresh. A
    /// gateway failure is terminal.
    pub async fn run<T, DF>(
        &self,
        op: &'static str,
        direct: impl Fn(AccessToken) -> DF,
        gateway: impl AsyncFnOnce() -> Result<T, RemoteError>,
    ) -> Result<Routed<T>, RemoteError>
    where
        DF: Future<Output = Result<T, RemoteError>>,
    {
        let token = match self.tokens.token(false).await {
            Ok(token) => token,
            Err(e) => {
                warn!(op, error = %e, "token lookup failed, using gateway");
                None
            }
        };

        let Some(token) = token else {
            let value = gateway().await?;
            return Ok(Routed {
                value,
                route: Route::Gateway(FallbackCause::NoCredential),
            });
        };

        match direct(token.clone()).await {
            Ok(value) => Ok(Routed {
                value,
                route: Route::Direct,
            }),
            Err(RemoteError::Unauthorized) => {
                let refreshed = match self.tokens.token(true).await {
                    Ok(token) => token,
                    Err(e) => {
                        warn!(op, error = %e, "token refresh failed, using gateway");
                        None
                    }
                };
                let Some(token) = refreshed else {
                    let value = gateway().await?;
                    return Ok(Routed {
                        value,
                        route: Route::Gateway(FallbackCause::AuthExpired),
                    });
                };
                match direct(token.clone()).await {
                    Ok(value) => Ok(Routed {
                        value,
                        route: Route::Direct,
                    }),
                    Err(RemoteError::Unauthorized) => {
                        let value = gateway().await?;
                        Ok(Routed {
                            value,
                            route: Route::Gateway(FallbackCause::AuthExpired),
                        })
                    }
                    Err(e) => {
                        warn!(op, error = %e, "direct transport failed after refresh, using gateway");
                        let value = gateway().await?;
                        Ok(Routed {
                            value,
                            route: Route::Gateway(FallbackCause::DirectError),
                        })
                    }
                }
            }
            Err(e) => {
                warn!(op, error = %e, "direct transport failed, using gateway");
                let value = gateway().await?;
                Ok(Routed {
                    value,
                    route: Route::Gateway(FallbackCause::DirectError),
                })
            }
        }
    }

    async fn read_doc<T>(&self, name: &'static str, kind: DataKind) -> Result<Routed<T>, RemoteError>
    where
        T: DeserializeOwned + Default,
    {
        let routed = self
            .run(
                name,
                async |token| self.direct.read_document(&token, name).await,
                async || self.gateway.get_data(kind).await,
            )
            .await?;

        let value = match routed.value {
            Some(raw) => match serde_json::from_value::<T>(raw) {
                Ok(doc) => doc,
                Err(e) => {
                    // A malformed document must not take down a pass.
                    warn!(document = name, error = %e, "malformed document, treating as empty");
                    T::default()
                }
            },
            None => T::default(),
        };

        Ok(Routed {
            value,
            route: routed.route,
        })
    }

    /// Whole-document replace. Direct-only: the gateway has no document
    /// write, so credential failures surface to the caller, which redirects
    /// the pass through the gateway's `refresh` action instead.
    async fn write_doc<T: Serialize>(&self, name: &'static str, doc: &T) -> Result<(), RemoteError> {
        let body: Value =
            serde_json::to_value(doc).map_err(|e| RemoteError::Malformed(e.to_string()))?;

        let Some(token) = self.tokens.token(false).await? else {
            return Err(RemoteError::NoCredential);
        };

        match self.direct.write_document(&token, name, &body).await {
            Ok(()) => Ok(()),
            Err(RemoteError::Unauthorized) => {
                let Some(token) = self.tokens.token(true).await? else {
                    return Err(RemoteError::Unauthorized);
                };
                self.direct.write_document(&token, name, &body).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn read_templates(&self) -> Result<Routed<TemplatesDocument>, RemoteError> {
        self.read_doc(DOC_TEMPLATES, DataKind::Templates).await
    }

    pub async fn read_chores(&self) -> Result<Routed<ChoresDocument>, RemoteError> {
        self.read_doc(DOC_CHORES, DataKind::Chores).await
    }

    pub async fn read_members(&self) -> Result<Routed<MembersDocument>, RemoteError> {
        self.read_doc(DOC_MEMBERS, DataKind::Members).await
    }

    pub async fn read_activity(&self) -> Result<Routed<ActivityDocument>, RemoteError> {
        self.read_doc(DOC_ACTIVITY, DataKind::Activity).await
    }

    pub async fn read_ledger(&self) -> Result<Routed<LedgerDocument>, RemoteError> {
        self.read_doc(DOC_LEDGER, DataKind::Transactions).await
    }

    pub async fn write_templates(&self, doc: &TemplatesDocument) -> Result<(), RemoteError> {
        self.write_doc(DOC_TEMPLATES, doc).await
    }

    pub async fn write_chores(&self, doc: &ChoresDocument) -> Result<(), RemoteError> {
        self.write_doc(DOC_CHORES, doc).await
    }

    pub async fn write_members(&self, doc: &MembersDocument) -> Result<(), RemoteError> {
        self.write_doc(DOC_MEMBERS, doc).await
    }

    pub async fn write_activity(&self, doc: &ActivityDocument) -> Result<(), RemoteError> {
        self.write_doc(DOC_ACTIVITY, doc).await
    }

    pub async fn write_ledger(&self, doc: &LedgerDocument) -> Result<(), RemoteError> {
        self.write_doc(DOC_LEDGER, doc).await
    }

    /// Read-append-write on the capped activity log.
    pub async fn append_activity(
        &self,
        entries: Vec<db::models::activity::ActivityEntry>,
    ) -> Result<(), RemoteError> {
        let mut doc = self.read_activity().await?.value;
        for entry in entries {
            doc.append(entry);
        }
        doc.metadata.touch();
        self.write_activity(&doc).await
    }
}
