use std::time::Duration;

use async_trait::async_trait;
use jrm_runtime::{JavaVersion, Platform, RemoteRuntimeDescriptor, Vendor};
use serde::Deserialize;
use serde_json::Value;

/// Where remote runtime descriptors come from.
///
/// Failures never surface as errors: an unreachable or malformed source
/// contributes an empty list, and resolution continues with local runtimes.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, endpoint: &str, timeout: Duration) -> Vec<RemoteRuntimeDescriptor>;
}

/// Manifest entry as published. Field names vary between publishers.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    version: String,
    vendor: String,
    #[serde(alias = "operationSystem", alias = "platform")]
    os: String,
    #[serde(alias = "url")]
    href: String,
    #[serde(default, alias = "hash")]
    sha256: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

impl ManifestEntry {
    fn into_descriptor(self) -> Result<RemoteRuntimeDescriptor, String> {
        let version = JavaVersion::parse(&self.version).map_err(|err| err.to_string())?;
        let platform = Platform::from_slug(&self.os)
            .ok_or_else(|| format!("unknown platform {:?}", self.os))?;
        let vendor = Vendor::new(self.vendor);
        if vendor.is_any() {
            return Err("wildcard vendor".into());
        }
        if self.href.trim().is_empty() {
            return Err("empty download location".into());
        }
        Ok(RemoteRuntimeDescriptor {
            version,
            vendor,
            platform,
            url: self.href.trim().to_string(),
            sha256: self
                .sha256
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty()),
            size_bytes: self.size,
        })
    }
}

/// Decode a manifest payload. Accepts `{"runtimes": [...]}` or a bare array.
/// Returns `None` when the payload itself is not a manifest; individual bad
/// entries are skipped.
pub fn parse_manifest(bytes: &[u8]) -> Option<Vec<RemoteRuntimeDescriptor>> {
    let doc: Value = serde_json::from_slice(bytes).ok()?;
    let entries = match doc {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("runtimes") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return None,
        },
        _ => return None,
    };

    let mut out = Vec::with_capacity(entries.len());
    for (idx, raw) in entries.into_iter().enumerate() {
        let parsed = serde_json::from_value::<ManifestEntry>(raw)
            .map_err(|err| err.to_string())
            .and_then(ManifestEntry::into_descriptor);
        match parsed {
            Ok(descriptor) => out.push(descriptor),
            Err(reason) => {
                tracing::warn!(target: "jrm::manifest", entry = idx, %reason, "skipping manifest entry");
            }
        }
    }
    Some(out)
}

/// Fetches the JSON manifest over HTTP.
#[derive(Debug, Clone)]
pub struct HttpManifestClient {
    client: reqwest::Client,
}

impl HttpManifestClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestClient {
    async fn fetch(&self, endpoint: &str, timeout: Duration) -> Vec<RemoteRuntimeDescriptor> {
        let response = match self.client.get(endpoint).timeout(timeout).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(target: "jrm::manifest", %endpoint, error = %err, "manifest unreachable");
                return Vec::new();
            }
        };
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "jrm::manifest", %endpoint, status = status.as_u16(), "manifest request failed");
            return Vec::new();
        }
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(target: "jrm::manifest", %endpoint, error = %err, "manifest body unreadable");
                return Vec::new();
            }
        };
        match parse_manifest(&body) {
            Some(runtimes) => {
                tracing::debug!(target: "jrm::manifest", %endpoint, runtimes = runtimes.len(), "manifest fetched");
                runtimes
            }
            None => {
                tracing::warn!(target: "jrm::manifest", %endpoint, "manifest payload malformed");
                Vec::new()
            }
        }
    }
}

/// Fixed descriptor list, ignoring the endpoint. Used offline.
#[derive(Debug, Clone, Default)]
pub struct StaticManifest(pub Vec<RemoteRuntimeDescriptor>);

#[async_trait]
impl ManifestSource for StaticManifest {
    async fn fetch(&self, _endpoint: &str, _timeout: Duration) -> Vec<RemoteRuntimeDescriptor> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client() -> HttpManifestClient {
        HttpManifestClient::new(crate::http_client::client().expect("client"))
    }

    #[test]
    fn parses_aliases_and_skips_bad_entries() {
        let payload = json!({
            "cacheTimeInMillis": 86400000,
            "runtimes": [
                {"version": "1.8.220", "vendor": "adopt", "os": "linux64", "href": "https://dl/a.zip", "sha256": "ABCD"},
                {"version": "11.0.1", "vendor": "adopt", "operationSystem": "WIN64", "url": "https://dl/b.zip", "size": 42},
                {"version": "1.8*", "vendor": "adopt", "os": "linux64", "href": "https://dl/c.zip"},
                {"version": "17", "vendor": "adopt", "os": "solaris", "href": "https://dl/d.zip"},
                {"version": "17", "vendor": "*", "os": "linux64", "href": "https://dl/e.zip"},
                {"vendor": "adopt", "os": "linux64", "href": "https://dl/f.zip"}
            ]
        });
        let runtimes = parse_manifest(payload.to_string().as_bytes()).expect("manifest");
        assert_eq!(runtimes.len(), 2);
        assert_eq!(runtimes[0].version.to_string(), "1.8.220");
        assert_eq!(runtimes[0].sha256.as_deref(), Some("abcd"));
        assert_eq!(runtimes[1].platform, Platform::Win64);
        assert_eq!(runtimes[1].url, "https://dl/b.zip");
        assert_eq!(runtimes[1].size_bytes, Some(42));
    }

    #[test]
    fn bare_array_and_garbage() {
        let bare = json!([{"version": "11", "vendor": "adopt", "platform": "linux64", "href": "u"}]);
        assert_eq!(parse_manifest(bare.to_string().as_bytes()).map(|v| v.len()), Some(1));
        assert!(parse_manifest(b"<html>").is_none());
        assert!(parse_manifest(b"{\"runtimes\": 5}").is_none());
        assert_eq!(parse_manifest(b"{}").map(|v| v.len()), Some(0));
    }

    #[tokio::test]
    async fn fetches_manifest_over_http() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jvms");
            then.status(200).json_body(json!({
                "runtimes": [
                    {"version": "1.8.220", "vendor": "adopt", "os": "linux64", "href": "https://dl/a.zip"}
                ]
            }));
        });
        let runtimes = client()
            .fetch(&server.url("/jvms"), Duration::from_secs(5))
            .await;
        mock.assert();
        assert_eq!(runtimes.len(), 1);
        assert_eq!(runtimes[0].vendor, Vendor::new("adopt"));
    }

    #[tokio::test]
    async fn malformed_or_failing_manifest_is_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/garbage");
            then.status(200).body("not json at all");
        });
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });
        let client = client();
        assert!(client
            .fetch(&server.url("/garbage"), Duration::from_secs(5))
            .await
            .is_empty());
        assert!(client
            .fetch(&server.url("/missing"), Duration::from_secs(5))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_empty() {
        let runtimes = client()
            .fetch("http://127.0.0.1:9/jvms", Duration::from_millis(500))
            .await;
        assert!(runtimes.is_empty());
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_to_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({"runtimes": []}));
        });
        let runtimes = client()
            .fetch(&server.url("/slow"), Duration::from_millis(200))
            .await;
        assert!(runtimes.is_empty());
    }
}
