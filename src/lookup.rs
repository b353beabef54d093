//! External route lookup client
//!
//! When the registry misses on a (host, path) key, or while a backend is
//! waiting for provisioning to finish, the route spec is (re-)fetched from
//! an external lookup service that answers query-style requests with a
//! JSON route document.

use crate::config::RouteSpec;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Lookup request timeout; the service is expected to answer quickly
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LookupError {
    /// The service was unreachable or answered with an unexpected status
    #[error("lookup request failed: {0}")]
    Request(String),

    /// The service answered 200 but the document did not parse
    #[error("malformed route spec: {0}")]
    Malformed(String),
}

/// Resolves (host, path) to a route spec, or nothing
#[async_trait]
pub trait RouteLookup: Send + Sync {
    async fn lookup(&self, host: &str, path: &str) -> Result<Option<RouteSpec>, LookupError>;
}

/// HTTP implementation of [`RouteLookup`]
pub struct HttpRouteLookup {
    url: String,
    client: reqwest::Client,
}

impl HttpRouteLookup {
    pub fn new(url: String) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .user_agent(concat!("tunnelgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::Request(e.to_string()))?;
        Ok(Self { url, client })
    }
}

fn lookup_url(base: &str, host: &str, path: &str) -> String {
    format!(
        "{}?host={}&path={}",
        base,
        urlencoding::encode(host),
        urlencoding::encode(path)
    )
}

#[async_trait]
impl RouteLookup for HttpRouteLookup {
    async fn lookup(&self, host: &str, path: &str) -> Result<Option<RouteSpec>, LookupError> {
        debug!(host, path, "Asking lookup service for route");
        let url = lookup_url(&self.url, host, path);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let spec: RouteSpec = response
                    .json()
                    .await
                    .map_err(|e| LookupError::Malformed(e.to_string()))?;
                Ok(Some(spec))
            }
            reqwest::StatusCode::NOT_FOUND => {
                info!(host, path, "Lookup service has no route");
                Ok(None)
            }
            status => Err(LookupError::Request(format!(
                "lookup service answered {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_url_escapes_query_params() {
        let url = lookup_url(
            "http://pathinfo.internal/lookup",
            "app.example.com",
            "/work space/&x",
        );
        assert_eq!(
            url,
            "http://pathinfo.internal/lookup?host=app.example.com&path=%2Fwork%20space%2F%26x"
        );
    }

    #[test]
    fn test_client_builds() {
        assert!(HttpRouteLookup::new("http://127.0.0.1:1/lookup".into()).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_request_error() {
        let lookup = HttpRouteLookup::new("http://127.0.0.1:1/lookup".into()).unwrap();
        let err = lookup.lookup("h", "/p").await.err().unwrap();
        assert!(matches!(err, LookupError::Request(_)));
    }
}
