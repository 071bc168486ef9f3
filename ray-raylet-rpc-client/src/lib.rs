// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Raylet RPC client library.
//!
//! The `NodeManagerService` client the GCS uses to reach raylets, and the
//! per-node pool that caches those clients.

pub mod client;
pub mod pool;
pub mod traits;

pub use client::RayletRpcClient;
pub use pool::{RayletClientFactory, RayletClientPool};
pub use traits::RayletClient;
