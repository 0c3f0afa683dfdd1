//! HTTP reachability probe for digital assets.

use std::time::Duration;

use async_trait::async_trait;
use corpscope_shared::{AssetCheckError, AssetProbe};
use reqwest::Client;
use tracing::{debug, instrument};

/// [`AssetProbe`] that issues a GET to the domain root.
///
/// Any status below 400 (redirects included) counts as active; 4xx/5xx as
/// inactive. Transport failures surface as [`AssetCheckError`].
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl AssetProbe for HttpProbe {
    #[instrument(skip_all, fields(domain = %domain))]
    async fn is_active(&self, domain: &str) -> Result<bool, AssetCheckError> {
        let url = format!("http://{domain}/");

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssetCheckError::timeout(domain, self.timeout.as_millis() as u64)
                } else {
                    AssetCheckError::network(domain, e.to_string())
                }
            })?;

        let status = resp.status();
        debug!(%status, "asset probed");
        Ok(status.as_u16() < 400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpscope_shared::AssetCheckFailure;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host_of(server: &MockServer) -> String {
        server.address().to_string()
    }

    fn probe(timeout: Duration) -> HttpProbe {
        HttpProbe::new(Client::new(), timeout)
    }

    #[tokio::test]
    async fn ok_status_is_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let active = probe(Duration::from_secs(5))
            .is_active(&host_of(&server))
            .await
            .expect("probe");
        assert!(active);
    }

    #[tokio::test]
    async fn client_error_is_inactive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let active = probe(Duration::from_secs(5))
            .is_active(&host_of(&server))
            .await
            .expect("probe");
        assert!(!active);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = probe(Duration::from_millis(50))
            .is_active(&host_of(&server))
            .await
            .unwrap_err();
        assert_eq!(err.reason, AssetCheckFailure::Timeout(50));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // Port 9 (discard) is closed on test hosts.
        let err = probe(Duration::from_secs(2))
            .is_active("127.0.0.1:9")
            .await
            .unwrap_err();
        assert!(matches!(err.reason, AssetCheckFailure::Network(_)));
    }
}
