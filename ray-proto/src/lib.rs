// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Generated protobuf and gRPC client types for the GCS resource report path.
//!
//! Built from the trimmed `common.proto`, `gcs.proto` and `node_manager.proto`
//! under `protos/`. Field tags match Ray's upstream definitions, so the
//! encoding is wire-compatible with the raylet's `NodeManagerService`.

/// Ray protobuf types organized by package.
pub mod ray {
    /// Main RPC types (package `ray.rpc`).
    pub mod rpc {
        tonic::include_proto!("ray.rpc");
    }
}

pub use ray::rpc;
