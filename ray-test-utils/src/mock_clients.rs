// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Mock RPC client stubs for unit testing.
//!
//! They record requests for inspection instead of touching the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ray_proto::ray::rpc;
use ray_raylet_rpc_client::{RayletClient, RayletClientPool};
use tonic::Status;

/// A fake raylet client that records resource usage pushes.
#[derive(Clone, Default)]
pub struct FakeRayletClient {
    requests: Arc<Mutex<VecDeque<rpc::UpdateResourceUsageRequest>>>,
    fail: Arc<AtomicBool>,
}

impl FakeRayletClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call reply with `UNAVAILABLE`. Requests are
    /// still recorded.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Pop the oldest recorded request.
    pub fn pop_request(&self) -> Option<rpc::UpdateResourceUsageRequest> {
        self.requests.lock().pop_front()
    }

    /// Number of recorded requests.
    pub fn num_requests(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait::async_trait]
impl RayletClient for FakeRayletClient {
    async fn update_resource_usage(
        &self,
        req: rpc::UpdateResourceUsageRequest,
    ) -> Result<rpc::UpdateResourceUsageReply, Status> {
        self.requests.lock().push_back(req);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Status::unavailable("fake raylet is down"));
        }
        Ok(rpc::UpdateResourceUsageReply::default())
    }
}

/// A client pool whose factory always hands out `client`.
pub fn fake_raylet_client_pool(client: FakeRayletClient) -> Arc<RayletClientPool> {
    Arc::new(RayletClientPool::with_factory(Box::new(move |_| {
        Ok(Arc::new(client.clone()) as Arc<dyn RayletClient>)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_records_requests() {
        let client = FakeRayletClient::new();
        client
            .update_resource_usage(rpc::UpdateResourceUsageRequest::default())
            .await
            .unwrap();
        assert_eq!(client.num_requests(), 1);
        assert!(client.pop_request().is_some());
        assert!(client.pop_request().is_none());
    }

    #[tokio::test]
    async fn test_fake_failure_still_records() {
        let client = FakeRayletClient::new();
        client.set_fail(true);
        let result = client
            .update_resource_usage(rpc::UpdateResourceUsageRequest::default())
            .await;
        assert_eq!(result.unwrap_err().code(), tonic::Code::Unavailable);
        assert_eq!(client.num_requests(), 1);
    }
}
