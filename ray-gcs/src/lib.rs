// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Global Control Service (GCS) resource reporting for Ray.
//!
//! The resource manager that composes cluster-wide usage batches and the
//! broadcaster that pushes them to every raylet.

pub mod init_data;
pub mod resource_manager;
pub mod resource_report_broadcaster;

pub use init_data::GcsInitData;
pub use resource_manager::{GcsResourceManager, NodeResourceUsage};
pub use resource_report_broadcaster::{
    BatchSender, GcsResourceReportBroadcaster, GrpcBatchSender, NodeAddressRegistry,
    ResourceUsageBatchFn,
};
