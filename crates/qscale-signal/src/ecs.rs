//! ECS service capacity target.
//!
//! Reads `desiredCount` with `DescribeServices` and sets it with
//! `UpdateService`. Credentials come from the standard AWS provider chain
//! (environment, profile, task role).

use async_trait::async_trait;
use aws_sdk_ecs::Client;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::operation::describe_services::DescribeServicesOutput;
use tracing::debug;

use qscale_core::TargetConfig;

use crate::error::{SignalError, SignalResult};
use crate::source::CapacityTarget;

/// One ECS service in one cluster.
#[derive(Debug, Clone)]
pub struct EcsServiceTarget {
    client: Client,
    cluster: String,
    service: String,
}

impl EcsServiceTarget {
    /// Build a client for the configured region.
    pub async fn from_config(config: &TargetConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .load()
            .await;
        Self::new(
            Client::new(&sdk_config),
            config.ecs_cluster.clone(),
            config.ecs_service.clone(),
        )
    }

    pub fn new(client: Client, cluster: String, service: String) -> Self {
        Self {
            client,
            cluster,
            service,
        }
    }
}

#[async_trait]
impl CapacityTarget for EcsServiceTarget {
    async fn current_count(&self) -> SignalResult<u32> {
        let output = self
            .client
            .describe_services()
            .cluster(&self.cluster)
            .services(&self.service)
            .send()
            .await
            .map_err(|e| SignalError::Http(DisplayErrorContext(&e).to_string()))?;
        desired_count(&output, &self.service)
    }

    async fn set_desired_count(&self, count: u32) -> SignalResult<()> {
        let desired = i32::try_from(count)
            .map_err(|_| SignalError::Rejected(format!("desired count {count} out of range")))?;
        self.client
            .update_service()
            .cluster(&self.cluster)
            .service(&self.service)
            .desired_count(desired)
            .send()
            .await
            .map_err(|e| SignalError::Http(DisplayErrorContext(&e).to_string()))?;
        debug!(cluster = %self.cluster, service = %self.service, count, "desired count updated");
        Ok(())
    }
}

/// Pull the service's desired count out of a `DescribeServices` response.
///
/// ECS reports an unknown service as a `MISSING` failure with a 200
/// status, so an empty `services` list is an error here.
fn desired_count(output: &DescribeServicesOutput, service: &str) -> SignalResult<u32> {
    let Some(found) = output.services().first() else {
        let reason = output
            .failures()
            .first()
            .and_then(|f| f.reason())
            .unwrap_or("service not returned");
        return Err(SignalError::Rejected(format!("{service}: {reason}")));
    };
    u32::try_from(found.desired_count())
        .map_err(|_| SignalError::Decode(format!("negative desiredCount {}", found.desired_count())))
}
