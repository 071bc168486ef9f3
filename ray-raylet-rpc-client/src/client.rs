// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Real Raylet RPC client backed by tonic gRPC stubs.

use parking_lot::Mutex;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

use ray_common::status::{RayError, RayResult};
use ray_proto::ray::rpc;

use crate::traits::RayletClient;

type NmClient = rpc::node_manager_service_client::NodeManagerServiceClient<Channel>;

/// Raylet RPC client wrapping `NodeManagerServiceClient`.
///
/// Retries and deadlines are left to the transport; callers on the resource
/// report path treat every call as fire-and-forget.
pub struct RayletRpcClient {
    endpoint: String,
    stub: Mutex<NmClient>,
}

impl RayletRpcClient {
    /// Build a client for `address` whose channel connects on first use.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect_lazy(address: &rpc::Address) -> RayResult<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RayError::invalid(
                "raylet clients can only be created inside a tokio runtime",
            ));
        }
        let endpoint = format!("http://{}:{}", address.ip_address, address.port);
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| {
                RayError::invalid_argument(format!("invalid raylet address '{endpoint}': {e}"))
            })?
            .connect_lazy();
        Ok(Self::from_channel(endpoint, channel))
    }

    /// Create from an existing channel (useful for testing).
    pub fn from_channel(endpoint: String, channel: Channel) -> Self {
        Self {
            endpoint,
            stub: Mutex::new(NmClient::new(channel)),
        }
    }

    /// The `http://ip:port` endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl RayletClient for RayletRpcClient {
    async fn update_resource_usage(
        &self,
        req: rpc::UpdateResourceUsageRequest,
    ) -> Result<rpc::UpdateResourceUsageReply, Status> {
        // Clone out of the lock; tonic clients are cheap handles on one channel.
        let mut stub = self.stub.lock().clone();
        stub.update_resource_usage(tonic::Request::new(req))
            .await
            .map(|resp| resp.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn address(ip: &str, port: i32) -> rpc::Address {
        rpc::Address {
            raylet_id: vec![1; 28],
            ip_address: ip.to_string(),
            port,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_lazy_builds_endpoint() {
        let client = RayletRpcClient::connect_lazy(&address("127.0.0.1", 6379)).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:6379");
    }

    #[tokio::test]
    async fn test_connect_lazy_rejects_bad_host() {
        let err = RayletRpcClient::connect_lazy(&address("not a host", 1))
            .err()
            .unwrap();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_connect_lazy_outside_runtime() {
        let err = RayletRpcClient::connect_lazy(&address("127.0.0.1", 1))
            .err()
            .unwrap();
        assert_eq!(err.code, ray_common::status::StatusCode::Invalid);
    }

    #[tokio::test]
    async fn test_unreachable_raylet_returns_status() {
        // Port 1 on loopback is reserved and refuses connections.
        let client = RayletRpcClient::connect_lazy(&address("127.0.0.1", 1)).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client.update_resource_usage(rpc::UpdateResourceUsageRequest::default()),
        )
        .await
        .expect("rpc should fail fast against a closed port");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_trait_object_usage() {
        let client: Box<dyn RayletClient> =
            Box::new(RayletRpcClient::connect_lazy(&address("127.0.0.1", 1)).unwrap());
        let _ = tokio::time::timeout(
            Duration::from_secs(10),
            client.update_resource_usage(rpc::UpdateResourceUsageRequest::default()),
        )
        .await;
    }
}
