//! Control-plane capacity target.
//!
//! Talks to the deployment scale endpoint of the control-plane REST API:
//!
//! | Method | Path | Body / Response |
//! |--------|------|-----------------|
//! | GET  | `/api/v1/deployments/:id/scale` | `{"success":true,"data":{"target":3}}` |
//! | POST | `/api/v1/deployments/:id/scale` | request `{"target":3}` |
//!
//! Responses use the API's `{success, data, error}` envelope; a
//! `success: false` envelope is a rejection even when the status is 2xx.

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use qscale_core::TargetConfig;

use crate::client::{self, require_success};
use crate::error::{SignalError, SignalResult};
use crate::source::CapacityTarget;

/// Response wrapper used by the control-plane API.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScaleBody {
    target: u32,
}

/// Reads and sets a deployment's desired instance count.
#[derive(Debug, Clone)]
pub struct ControlPlaneTarget {
    url: String,
    deployment: String,
}

impl ControlPlaneTarget {
    pub fn new(config: &TargetConfig) -> Self {
        let base = config.api_url.trim_end_matches('/');
        let encoded = client::encode_segment(&config.deployment);
        Self {
            url: format!("{base}/api/v1/deployments/{encoded}/scale"),
            deployment: config.deployment.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn unwrap_envelope<T>(&self, body: &[u8]) -> SignalResult<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let envelope: ApiEnvelope<T> =
            serde_json::from_slice(body).map_err(|e| SignalError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(SignalError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "no error message".to_string()),
            ));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl CapacityTarget for ControlPlaneTarget {
    async fn current_count(&self) -> SignalResult<u32> {
        let (status, body) = client::send(Method::GET, &self.url, None, None).await?;
        require_success(status, &self.url)?;

        let data: ScaleBody = self
            .unwrap_envelope(&body)?
            .ok_or_else(|| SignalError::Decode("response has no data".to_string()))?;
        Ok(data.target)
    }

    async fn set_desired_count(&self, count: u32) -> SignalResult<()> {
        let payload = serde_json::to_vec(&ScaleBody { target: count })
            .map_err(|e| SignalError::Decode(e.to_string()))?;
        let (status, body) = client::send(Method::POST, &self.url, None, Some(payload)).await?;
        require_success(status, &self.url)?;

        self.unwrap_envelope::<serde_json::Value>(&body)?;
        debug!(deployment = %self.deployment, count, "desired count updated");
        Ok(())
    }
}
