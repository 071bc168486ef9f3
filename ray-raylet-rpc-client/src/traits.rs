// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Async trait for raylet (NodeManager) client.

use ray_proto::ray::rpc;
use tonic::Status;

/// Async trait for the Raylet (NodeManager) RPCs the GCS issues.
#[async_trait::async_trait]
pub trait RayletClient: Send + Sync {
    // ── Resource reporting ────────────────────────────────────────
    async fn update_resource_usage(
        &self,
        req: rpc::UpdateResourceUsageRequest,
    ) -> Result<rpc::UpdateResourceUsageReply, Status>;
}
