use std::time::Duration;

use crate::util::env_u64;

fn connect_timeout() -> Duration {
    Duration::from_secs(env_u64("JRM_HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(5).max(1))
}

fn keepalive() -> Duration {
    Duration::from_secs(env_u64("JRM_HTTP_TCP_KEEPALIVE_SECS").unwrap_or(60).max(1))
}

fn pool_idle() -> Duration {
    Duration::from_secs(env_u64("JRM_HTTP_POOL_IDLE_SECS").unwrap_or(90).max(1))
}

fn user_agent() -> String {
    format!("jrm/{}", env!("CARGO_PKG_VERSION"))
}

/// Base client builder with shared defaults. Manifest fetches apply a
/// per-request `.timeout(...)`; downloads rely on the idle timeout instead.
pub fn builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(connect_timeout())
        .tcp_keepalive(keepalive())
        .pool_idle_timeout(pool_idle())
}

pub fn client() -> Result<reqwest::Client, reqwest::Error> {
    builder().build()
}
