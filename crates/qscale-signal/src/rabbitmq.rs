//! RabbitMQ management API queue-depth source.
//!
//! ```text
//! GET /api/queues/{vhost}/{queue}
//! Authorization: Basic base64(user:password)
//!
//! 200 {"messages_ready": 412, "messages": 430, ...}
//! ```
//!
//! Only `messages_ready` counts: unacked messages already have a worker.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::Method;
use serde::Deserialize;

use qscale_core::QueueConfig;

use crate::client::{self, require_success};
use crate::error::{SignalError, SignalResult};
use crate::source::QueueDepthSource;

#[derive(Debug, Deserialize)]
struct QueueInfo {
    #[serde(default)]
    messages_ready: u64,
}

/// Reads the ready-message count of one queue.
#[derive(Clone)]
pub struct RabbitQueueSource {
    url: String,
    authorization: String,
}

impl std::fmt::Debug for RabbitQueueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The authorization header carries the password.
        f.debug_struct("RabbitQueueSource")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RabbitQueueSource {
    pub fn new(config: &QueueConfig) -> Self {
        let host = if config.host.contains(':') {
            format!("[{}]", config.host)
        } else {
            config.host.clone()
        };
        let url = format!(
            "http://{host}:{}/api/queues/{}/{}",
            config.management_port,
            client::encode_segment(&config.vhost),
            client::encode_segment(&config.queue)
        );
        let credentials = STANDARD.encode(format!("{}:{}", config.user, config.password));
        Self {
            url,
            authorization: format!("Basic {credentials}"),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QueueDepthSource for RabbitQueueSource {
    async fn queue_depth(&self) -> SignalResult<u32> {
        let (status, body) =
            client::send(Method::GET, &self.url, Some(&self.authorization), None).await?;
        require_success(status, &self.url)?;

        let info: QueueInfo =
            serde_json::from_slice(&body).map_err(|e| SignalError::Decode(e.to_string()))?;
        Ok(u32::try_from(info.messages_ready).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn config_for(addr: SocketAddr) -> QueueConfig {
        QueueConfig {
            host: addr.ip().to_string(),
            management_port: addr.port(),
            ..QueueConfig::default()
        }
    }

    #[test]
    fn url_and_credentials_from_config() {
        let source = RabbitQueueSource::new(&QueueConfig::default());
        assert_eq!(source.url(), "http://rabbitmq:80/api/queues/%2F/celery");
        // base64("guest:guest")
        assert_eq!(source.authorization, "Basic Z3Vlc3Q6Z3Vlc3Q=");
    }

    #[test]
    fn url_encodes_names_and_brackets_ipv6_hosts() {
        let source = RabbitQueueSource::new(&QueueConfig {
            host: "::1".to_string(),
            management_port: 15672,
            vhost: "/".to_string(),
            queue: "nightly reports".to_string(),
            ..QueueConfig::default()
        });
        assert_eq!(
            source.url(),
            "http://[::1]:15672/api/queues/%2F/nightly%20reports"
        );
    }

    #[tokio::test]
    async fn queue_name_with_space_reaches_broker() {
        let router = Router::new().route(
            "/api/queues/{vhost}/{queue}",
            get(
                |axum::extract::Path((vhost, queue)): axum::extract::Path<(String, String)>| async move {
                    assert_eq!(vhost, "/");
                    assert_eq!(queue, "nightly reports");
                    r#"{"messages_ready":9}"#
                },
            ),
        );
        let addr = serve(router).await;

        let source = RabbitQueueSource::new(&QueueConfig {
            queue: "nightly reports".to_string(),
            ..config_for(addr)
        });
        assert_eq!(source.queue_depth().await.unwrap(), 9);
    }

    #[test]
    fn debug_hides_credentials() {
        let source = RabbitQueueSource::new(&QueueConfig::default());
        let rendered = format!("{source:?}");
        assert!(!rendered.contains("Z3Vlc3Q"));
    }

    #[tokio::test]
    async fn reads_messages_ready() {
        let router = Router::new().route(
            "/api/queues/{vhost}/{queue}",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Basic Z3Vlc3Q6Z3Vlc3Q=" {
                    return (StatusCode::UNAUTHORIZED, String::new());
                }
                (
                    StatusCode::OK,
                    r#"{"name":"celery","messages_ready":412,"messages":430}"#.to_string(),
                )
            }),
        );
        let addr = serve(router).await;

        let source = RabbitQueueSource::new(&config_for(addr));
        assert_eq!(source.queue_depth().await.unwrap(), 412);
    }

    #[tokio::test]
    async fn missing_field_counts_as_empty() {
        let router = Router::new().route(
            "/api/queues/{vhost}/{queue}",
            get(|| async { r#"{"name":"celery"}"# }),
        );
        let addr = serve(router).await;

        let source = RabbitQueueSource::new(&config_for(addr));
        assert_eq!(source.queue_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_queue_is_status_error() {
        let router = Router::new();
        let addr = serve(router).await;

        let source = RabbitQueueSource::new(&config_for(addr));
        let err = source.queue_depth().await.unwrap_err();
        assert!(matches!(err, SignalError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let router = Router::new().route(
            "/api/queues/{vhost}/{queue}",
            get(|| async { "<html>proxy error</html>" }),
        );
        let addr = serve(router).await;

        let source = RabbitQueueSource::new(&config_for(addr));
        let err = source.queue_depth().await.unwrap_err();
        assert!(matches!(err, SignalError::Decode(_)));
    }
}
