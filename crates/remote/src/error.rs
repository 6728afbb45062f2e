use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("credential rejected")]
    Unauthorized,
    #[error("no credential available")]
    NoCredential,
    #[error("authorization required: {message}")]
    AuthorizationRequired { url: String, message: String },
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// True when the failure means the credential itself is unusable, as
    /// opposed to the remote being unhappy for some other reason.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized | RemoteError::NoCredential)
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(e.to_string())
    }
}
