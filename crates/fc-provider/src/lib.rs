//! Provider Adapter (§4.3): the only component allowed to perform network
//! I/O to the messaging provider. Translates transport errors into typed
//! results and never propagates a panic or unhandled error across the
//! boundary — a provider outage degrades the pipeline's throughput, it
//! doesn't crash a worker.

pub mod circuit_breaker;
pub mod signing;

use std::time::Duration;

use async_trait::async_trait;
use fc_common::Channel;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use circuit_breaker::CircuitBreaker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    pub provider_sid: Option<String>,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: String,
    pub error_code: Option<String>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn send(&self, to_phone: &str, content: &str, channel: Channel) -> SendResult;
    async fn fetch_status(&self, provider_sid: &str) -> StatusResult;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub timeout: Duration,
    pub signing_secret: Option<String>,
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://provider.example.com".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            timeout: Duration::from_secs(10),
            signing_secret: None,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    body: &'a str,
    channel: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    sid: Option<String>,
    status: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Option<String>,
    error_code: Option<String>,
}

pub struct HttpProviderAdapter {
    client: Client,
    config: ProviderConfig,
    circuit_breaker: CircuitBreaker,
}

impl HttpProviderAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build provider HTTP client");
        Self {
            client,
            config,
            circuit_breaker: CircuitBreaker::default(),
        }
    }

    fn channel_tag(channel: Channel) -> &'static str {
        match channel {
            Channel::Whatsapp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Messenger => "messenger",
            Channel::Voice => "voice",
        }
    }

    fn sign_if_configured(&self, request: reqwest::RequestBuilder, body: &str) -> reqwest::RequestBuilder {
        match &self.config.signing_secret {
            Some(secret) => {
                let (signature, timestamp) = signing::sign(body, secret);
                request
                    .header(signing::SIGNATURE_HEADER, signature)
                    .header(signing::TIMESTAMP_HEADER, timestamp)
            }
            None => request,
        }
    }

    async fn send_once(&self, to_phone: &str, content: &str, channel: Channel) -> SendResult {
        if !self.circuit_breaker.allow_request() {
            debug!(to_phone, "provider circuit breaker open, rejecting send");
            return SendResult {
                success: false,
                provider_sid: None,
                status: "circuit_open".to_string(),
                error_code: Some("CIRCUIT_OPEN".to_string()),
                error_message: Some("provider circuit breaker is open".to_string()),
            };
        }

        let payload = SendRequest {
            to: to_phone,
            body: content,
            channel: Self::channel_tag(channel),
        };
        let body_json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(e) => {
                return SendResult {
                    success: false,
                    provider_sid: None,
                    status: "encode_error".to_string(),
                    error_code: Some("ENCODE_ERROR".to_string()),
                    error_message: Some(e.to_string()),
                }
            }
        };

        let url = format!("{}/messages", self.config.base_url);
        let mut request = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .header("Content-Type", "application/json")
            .body(body_json.clone());
        request = self.sign_if_configured(request, &body_json);

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                self.circuit_breaker.record_success();
                match response.json::<SendResponse>().await {
                    Ok(parsed) => SendResult {
                        success: true,
                        provider_sid: parsed.sid,
                        status: parsed.status.unwrap_or_else(|| "queued".to_string()),
                        error_code: parsed.error_code,
                        error_message: parsed.error_message,
                    },
                    Err(e) => {
                        warn!(error = %e, "provider returned a success status with an unparseable body");
                        SendResult {
                            success: true,
                            provider_sid: None,
                            status: "queued".to_string(),
                            error_code: None,
                            error_message: None,
                        }
                    }
                }
            }
            Ok(response) if response.status().is_client_error() => {
                // Client errors never trip the breaker -- they're a
                // configuration problem with this message, not a sign the
                // provider itself is unhealthy.
                self.circuit_breaker.record_success();
                let status_code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                warn!(status_code, to_phone, "provider rejected send");
                SendResult {
                    success: false,
                    provider_sid: None,
                    status: "rejected".to_string(),
                    error_code: Some(status_code.to_string()),
                    error_message: Some(body),
                }
            }
            Ok(response) => {
                self.circuit_breaker.record_failure();
                let status_code = response.status().as_u16();
                warn!(status_code, to_phone, "provider server error on send");
                SendResult {
                    success: false,
                    provider_sid: None,
                    status: "provider_error".to_string(),
                    error_code: Some(status_code.to_string()),
                    error_message: Some("provider returned a server error".to_string()),
                }
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                error!(error = %e, to_phone, "provider send request failed");
                SendResult {
                    success: false,
                    provider_sid: None,
                    status: "transport_error".to_string(),
                    error_code: Some("TRANSPORT_ERROR".to_string()),
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    async fn send(&self, to_phone: &str, content: &str, channel: Channel) -> SendResult {
        let mut attempts = 0;
        loop {
            let outcome = self.send_once(to_phone, content, channel).await;
            if outcome.success || outcome.status == "rejected" || outcome.status == "circuit_open" {
                return outcome;
            }
            attempts += 1;
            if attempts >= self.config.max_retries {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(250 * attempts as u64)).await;
        }
    }

    async fn fetch_status(&self, provider_sid: &str) -> StatusResult {
        let url = format!("{}/messages/{}", self.config.base_url, provider_sid);
        let request = self
            .client
            .get(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token));

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<StatusResponse>().await {
                    Ok(parsed) => StatusResult {
                        status: parsed.status.unwrap_or_else(|| "unknown".to_string()),
                        error_code: parsed.error_code,
                    },
                    Err(e) => {
                        warn!(error = %e, provider_sid, "unparseable status response");
                        StatusResult {
                            status: "unknown".to_string(),
                            error_code: None,
                        }
                    }
                }
            }
            Ok(response) => {
                warn!(status_code = response.status().as_u16(), provider_sid, "status fetch failed");
                StatusResult {
                    status: "unknown".to_string(),
                    error_code: None,
                }
            }
            Err(e) => {
                error!(error = %e, provider_sid, "status fetch request failed");
                StatusResult {
                    status: "unknown".to_string(),
                    error_code: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn adapter_for(server: &MockServer) -> HttpProviderAdapter {
        HttpProviderAdapter::new(ProviderConfig {
            base_url: server.uri(),
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            timeout: Duration::from_secs(5),
            signing_secret: None,
            max_retries: 2,
        })
    }

    #[tokio::test]
    async fn send_returns_provider_sid_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sid": "SID123",
                "status": "queued"
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let result = adapter.send("+14155550001", "hi", Channel::Sms).await;
        assert!(result.success);
        assert_eq!(result.provider_sid.as_deref(), Some("SID123"));
    }

    #[tokio::test]
    async fn send_does_not_retry_on_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let result = adapter.send("+14155550001", "hi", Channel::Sms).await;
        assert!(!result.success);
        assert_eq!(result.status, "rejected");
    }

    #[tokio::test]
    async fn fetch_status_reports_unknown_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/SID123"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server).await;
        let result = adapter.fetch_status("SID123").await;
        assert_eq!(result.status, "unknown");
    }
}
