//! Minimal HTTP/1.1 client used by the collaborator adapters.
//!
//! One TCP connection per request, no pooling, no TLS: each tick makes at
//! most three calls, and both the RabbitMQ management API and the control
//! plane are reached over the cluster network.

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::debug;

use crate::error::{SignalError, SignalResult};

const CLIENT_AGENT: &str = "qscale/0.1";

/// Escaped inside one path segment. `%` is not in the set, so names that
/// are already encoded (the `%2F` vhost) pass through unchanged.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Encode a name for use as a single URL path segment.
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// A parsed `http://` URL split into what a raw connection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub host: String,
    pub port: u16,
    pub authority: String,
    pub path: String,
}

impl Endpoint {
    pub fn parse(url: &str) -> SignalResult<Self> {
        let invalid = |reason: &str| SignalError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|_| invalid("unparseable"))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(_) => return Err(invalid("only http:// is supported")),
            None => return Err(invalid("missing scheme")),
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());

        // IPv6 literals keep their brackets in the authority only.
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']');

        Ok(Self {
            host: host.to_string(),
            port: authority.port_u16().unwrap_or(80),
            authority: authority.as_str().to_string(),
            path,
        })
    }
}

/// Send one request and return the status and full body.
pub(crate) async fn send(
    method: Method,
    url: &str,
    authorization: Option<&str>,
    json_body: Option<Vec<u8>>,
) -> SignalResult<(StatusCode, Bytes)> {
    let endpoint = Endpoint::parse(url)?;

    let stream = tokio::net::TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| SignalError::Connect(format!("{}: {e}", endpoint.authority)))?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| SignalError::Http(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut builder = http::Request::builder()
        .method(method.clone())
        .uri(endpoint.path.as_str())
        .header(HOST, endpoint.authority.as_str())
        .header(USER_AGENT, CLIENT_AGENT);
    if let Some(auth) = authorization {
        builder = builder.header(AUTHORIZATION, auth);
    }
    let body = match json_body {
        Some(bytes) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Bytes::from(bytes)
        }
        None => Bytes::new(),
    };
    let req = builder
        .body(Full::new(body))
        .map_err(|e| SignalError::Http(e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| SignalError::Http(e.to_string()))?;
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| SignalError::Http(e.to_string()))?
        .to_bytes();

    debug!(%method, %url, %status, len = bytes.len(), "collaborator response");
    Ok((status, bytes))
}

/// Fail with [`SignalError::Status`] unless the response is 2xx.
pub(crate) fn require_success(status: StatusCode, url: &str) -> SignalResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(SignalError::Status {
            status: status.as_u16(),
            uri: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_url() {
        let ep = Endpoint::parse("http://rabbitmq:15672/api/queues/%2F/celery").unwrap();
        assert_eq!(ep.host, "rabbitmq");
        assert_eq!(ep.port, 15672);
        assert_eq!(ep.authority, "rabbitmq:15672");
        assert_eq!(ep.path, "/api/queues/%2F/celery");
    }

    #[test]
    fn parse_defaults_port_and_path() {
        let ep = Endpoint::parse("http://control-plane").unwrap();
        assert_eq!(ep.port, 80);
        assert_eq!(ep.path, "/");
    }

    #[test]
    fn parse_strips_ipv6_brackets_from_host() {
        let ep = Endpoint::parse("http://[::1]:15672/api/overview").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 15672);
        assert_eq!(ep.authority, "[::1]:15672");
    }

    #[test]
    fn encode_segment_escapes_separators_but_not_percent() {
        assert_eq!(encode_segment("celery"), "celery");
        assert_eq!(encode_segment("my queue"), "my%20queue");
        assert_eq!(encode_segment("/"), "%2F");
        assert_eq!(encode_segment("%2F"), "%2F");
        assert_eq!(encode_segment("prod/reports?x#y"), "prod%2Freports%3Fx%23y");
    }

    #[tokio::test]
    async fn send_reaches_ipv6_loopback() {
        let Ok(listener) = tokio::net::TcpListener::bind("[::1]:0").await else {
            // No IPv6 loopback on this host.
            return;
        };
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let router = axum::Router::new().route("/ping", axum::routing::get(|| async { "pong" }));
            axum::serve(listener, router).await.unwrap();
        });

        let (status, body) = send(Method::GET, &format!("http://{addr}/ping"), None, None)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"pong");
    }

    #[test]
    fn parse_rejects_https_and_bare_hosts() {
        assert!(matches!(
            Endpoint::parse("https://example.com/"),
            Err(SignalError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Endpoint::parse("example.com/path"),
            Err(SignalError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn require_success_maps_status() {
        assert!(require_success(StatusCode::OK, "http://x/").is_ok());
        let err = require_success(StatusCode::SERVICE_UNAVAILABLE, "http://x/").unwrap_err();
        assert!(matches!(err, SignalError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn send_to_closed_port_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = send(Method::GET, &format!("http://{addr}/"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::Connect(_)));
    }
}
