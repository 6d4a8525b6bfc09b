//! Mobile push delivery
//!
//! `PushSender` is the seam the dispatcher uses. `HttpPushSender` posts the
//! FCM-style message to a configured HTTP endpoint behind a rate limiter.

use crate::config::PushConfig;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push endpoint rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Push request failed: {message}")]
    Transport { message: String },
    #[error("Push delivery timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidNotification {
    pub sound: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidConfig {
    pub priority: String,
    pub notification: AndroidNotification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aps {
    pub sound: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsConfig {
    pub payload: ApnsPayload,
}

/// Device-addressed push message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub notification: PushNotification,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

impl PushMessage {
    /// High priority with the default sound on both platforms.
    pub fn new(token: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            notification: PushNotification {
                title: title.into(),
                body: body.into(),
            },
            android: AndroidConfig {
                priority: "high".to_string(),
                notification: AndroidNotification {
                    sound: "default".to_string(),
                },
            },
            apns: ApnsConfig {
                payload: ApnsPayload {
                    aps: Aps {
                        sound: "default".to_string(),
                    },
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PushEnvelope<'a> {
    message: &'a PushMessage,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: PushMessage) -> Result<(), PushError>;
}

/// Posts push messages over HTTP
#[derive(Debug)]
pub struct HttpPushSender {
    client: reqwest::Client,
    endpoint: String,
    server_key: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpPushSender {
    pub fn new(
        endpoint: impl Into<String>,
        server_key: Option<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        let per_second = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            server_key,
            rate_limiter,
        })
    }

    /// Builds a sender when an endpoint is configured.
    pub fn from_config(config: &PushConfig, timeout: Duration) -> Result<Option<Self>, PushError> {
        match &config.endpoint {
            Some(endpoint) => Self::new(
                endpoint.clone(),
                config.server_key.clone(),
                config.requests_per_second,
                timeout,
            )
            .map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(&self, message: PushMessage) -> Result<(), PushError> {
        self.rate_limiter.until_ready().await;

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&PushEnvelope { message: &message });
        if let Some(key) = &self.server_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| PushError::Transport {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "Push message accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_push_payload_shape() {
        let message = PushMessage::new("device-1", "Case #7 approved", "Dana approved case #7");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["token"], "device-1");
        assert_eq!(value["notification"]["title"], "Case #7 approved");
        assert_eq!(value["android"]["priority"], "high");
        assert_eq!(value["android"]["notification"]["sound"], "default");
        assert_eq!(value["apns"]["payload"]["aps"]["sound"], "default");
    }

    #[tokio::test]
    async fn test_http_sender_posts_envelope_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "message": { "token": "device-1", "notification": { "title": "t" } }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = HttpPushSender::new(
            format!("{}/send", server.uri()),
            Some("secret".to_string()),
            10,
            Duration::from_secs(5),
        )
        .unwrap();
        sender
            .send(PushMessage::new("device-1", "t", "b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_sender_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("unregistered token"))
            .mount(&server)
            .await;

        let sender =
            HttpPushSender::new(server.uri(), None, 10, Duration::from_secs(5)).unwrap();
        let err = sender
            .send(PushMessage::new("stale", "t", "b"))
            .await
            .unwrap_err();
        match err {
            PushError::Rejected { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "unregistered token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_sender_without_endpoint() {
        let config = PushConfig::default();
        assert!(HttpPushSender::from_config(&config, Duration::from_secs(1))
            .unwrap()
            .is_none());
    }
}
