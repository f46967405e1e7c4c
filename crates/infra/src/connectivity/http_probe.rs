//! HTTP reachability probe
//!
//! Issues a lightweight `HEAD` request against a known endpoint. Any HTTP
//! response means the network is usable; a transport error or timeout means
//! it is not. The round-trip time is reported as latency so the monitor can
//! flag slow links.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fieldsync_common::error::{CommonError, CommonResult};
use fieldsync_core::ConnectivitySource;
use fieldsync_domain::ConnectivitySignal;
use reqwest::Client;
use tracing::debug;

use crate::errors::InfraError;

/// Connectivity source backed by an HTTP probe endpoint
#[derive(Debug, Clone)]
pub struct HttpProbeSource {
    client: Client,
    url: String,
}

impl HttpProbeSource {
    /// Probe `url`, giving up after `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> CommonResult<Self> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|err| {
            CommonError::validation_with_value("network.probe_url", err.to_string(), url.as_str())
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|err| CommonError::from(InfraError::from(err)))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivitySource for HttpProbeSource {
    async fn sample(&self) -> Option<ConnectivitySignal> {
        let started = Instant::now();
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                debug!(status = %response.status(), latency_ms, "Probe reachable");
                Some(ConnectivitySignal::online().with_latency_ms(latency_ms))
            }
            Err(err) => {
                let InfraError(cause) = err.into();
                debug!(error = %cause, "Probe unreachable");
                Some(ConnectivitySignal::offline())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_reachable_endpoint_reports_online_with_latency() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let probe =
            HttpProbeSource::new(format!("{}/health", server.uri()), Duration::from_secs(2)).unwrap();
        let signal = probe.sample().await.unwrap();

        assert!(signal.online);
        assert!(signal.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_server_errors_still_count_as_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let probe = HttpProbeSource::new(server.uri(), Duration::from_secs(2)).unwrap();

        assert!(probe.sample().await.unwrap().online);
    }

    #[tokio::test]
    async fn test_timeout_reports_offline() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let probe = HttpProbeSource::new(server.uri(), Duration::from_millis(50)).unwrap();

        assert!(!probe.sample().await.unwrap().online);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = HttpProbeSource::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.error_type_name(), "validation");
    }
}
