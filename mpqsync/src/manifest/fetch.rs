//! Manifest retrieval from the launcher API.

use std::fmt;
use std::time::Duration;

use super::{Manifest, RawManifest};

/// Default launcher manifest endpoint.
pub const DEFAULT_MANIFEST_URL: &str = "https://launcher.turtlecraft.gg/api/manifest";

/// Timeout for the manifest request. The document is small; anything slower
/// than this indicates a network problem, not a big payload.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors that can occur while retrieving or parsing the manifest.
#[derive(Debug)]
pub enum ManifestError {
    /// The HTTP request failed or returned a non-success status.
    Fetch { url: String, reason: String },

    /// The request timed out.
    Timeout { url: String, timeout_secs: u64 },

    /// The response body was not a valid manifest document.
    Parse { url: String, reason: String },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch { url, reason } => {
                write!(f, "failed to fetch manifest from {}: {}", url, reason)
            }
            Self::Timeout { url, timeout_secs } => {
                write!(f, "manifest request to {} timed out after {}s", url, timeout_secs)
            }
            Self::Parse { url, reason } => {
                write!(f, "failed to parse manifest from {}: {}", url, reason)
            }
        }
    }
}

impl std::error::Error for ManifestError {}

/// Fetch and parse the manifest from the launcher API.
///
/// # Errors
///
/// Returns an error if the request fails, times out, or the body is not a
/// valid manifest document.
pub fn fetch_manifest(url: &str) -> ManifestResult<Manifest> {
    tracing::info!(url, "fetching manifest");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(concat!("mpqsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ManifestError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().map_err(|e| {
        if e.is_timeout() {
            ManifestError::Timeout {
                url: url.to_string(),
                timeout_secs: FETCH_TIMEOUT_SECS,
            }
        } else {
            ManifestError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ManifestError::Fetch {
            url: url.to_string(),
            reason: format!("request failed with status {}", response.status()),
        });
    }

    let raw: RawManifest = response.json().map_err(|e| ManifestError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    Ok(Manifest::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_manifest_parses_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/manifest"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"client": [{"type": "file", "name": "WoW.exe",
                    "hash": "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855",
                    "size": 4, "mirrors": {}}], "patches": []}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let url = format!("{}/api/manifest", server.uri());
        let manifest = tokio::task::spawn_blocking(move || fetch_manifest(&url))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].name, "WoW.exe");
    }

    #[tokio::test]
    async fn test_fetch_manifest_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = server.uri();
        let result = tokio::task::spawn_blocking(move || fetch_manifest(&url))
            .await
            .unwrap();

        assert!(matches!(result, Err(ManifestError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_fetch_manifest_bad_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "application/json"))
            .mount(&server)
            .await;

        let url = server.uri();
        let result = tokio::task::spawn_blocking(move || fetch_manifest(&url))
            .await
            .unwrap();

        assert!(matches!(result, Err(ManifestError::Parse { .. })));
    }
}
