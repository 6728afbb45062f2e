pub mod auth;
pub mod direct;
pub mod error;
pub mod gateway;
pub mod store;

pub use auth::{AccessToken, HttpTokenProvider, StaticTokenProvider, TokenProvider};
pub use direct::DirectTransport;
pub use error::RemoteError;
pub use gateway::{DataKind, GatewayTransport};
pub use store::{FallbackCause, RemoteStore, Route, Routed};
