use std::net::SocketAddr;

use anyhow::Context;

/// Everything comes from the environment (a `.env` file is honored in
/// development). Credential settings pick the transport mix: a refresh
/// token enables the direct path with automatic renewal, a bare access
/// token enables it without, and neither leaves only the gateway.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub family_id: String,
    pub store_base_url: String,
    pub gateway_url: String,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub reconcile_interval_secs: u64,
    pub desktop_notifications: bool,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = optional("CHOREBOARD_BIND")
            .unwrap_or_else(|| "127.0.0.1:8732".to_string())
            .parse()
            .context("CHOREBOARD_BIND is not a valid socket address")?;
        let database_url =
            optional("CHOREBOARD_DB").unwrap_or_else(|| "sqlite:choreboard.db".to_string());
        let family_id =
            std::env::var("CHOREBOARD_FAMILY_ID").context("CHOREBOARD_FAMILY_ID is required")?;
        let store_base_url =
            std::env::var("CHOREBOARD_STORE_URL").context("CHOREBOARD_STORE_URL is required")?;
        let gateway_url =
            std::env::var("CHOREBOARD_GATEWAY_URL").context("CHOREBOARD_GATEWAY_URL is required")?;
        let reconcile_interval_secs = optional("CHOREBOARD_SYNC_INTERVAL_SECS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("CHOREBOARD_SYNC_INTERVAL_SECS must be an integer")?
            .unwrap_or(300);
        let desktop_notifications = optional("CHOREBOARD_DESKTOP_NOTIFICATIONS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            bind_addr,
            database_url,
            family_id,
            store_base_url,
            gateway_url,
            token_url: optional("CHOREBOARD_TOKEN_URL"),
            client_id: optional("CHOREBOARD_CLIENT_ID"),
            refresh_token: optional("CHOREBOARD_REFRESH_TOKEN"),
            access_token: optional("CHOREBOARD_ACCESS_TOKEN"),
            reconcile_interval_secs,
            desktop_notifications,
        })
    }
}
