// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Proto message builders for tests.

use std::collections::HashMap;

use prost::Message;
use ray_common::id::NodeID;
use ray_proto::ray::rpc;

/// Generate an ALIVE GcsNodeInfo.
pub fn gen_node_info(node_id: &NodeID, address: &str, port: i32) -> rpc::GcsNodeInfo {
    rpc::GcsNodeInfo {
        node_id: node_id.binary(),
        node_manager_address: address.to_string(),
        node_manager_port: port,
        node_manager_hostname: format!("host-{address}"),
        node_name: address.to_string(),
        state: rpc::gcs_node_info::GcsNodeState::Alive as i32,
        ..Default::default()
    }
}

/// Same as [`gen_node_info`] but marked DEAD.
pub fn gen_dead_node_info(node_id: &NodeID, address: &str, port: i32) -> rpc::GcsNodeInfo {
    let mut node = gen_node_info(node_id, address, port);
    node.set_state(rpc::gcs_node_info::GcsNodeState::Dead);
    node
}

/// The raylet address the broadcaster derives from [`gen_node_info`].
pub fn gen_raylet_address(node_id: &NodeID, address: &str, port: i32) -> rpc::Address {
    rpc::Address {
        raylet_id: node_id.binary(),
        ip_address: address.to_string(),
        port,
        ..Default::default()
    }
}

/// A single-node batch with the given available resources.
pub fn gen_resource_usage_batch(
    node_id: &NodeID,
    available: &[(&str, f64)],
) -> rpc::ResourceUsageBatchData {
    let resources_available: HashMap<String, f64> = available
        .iter()
        .map(|(name, qty)| (name.to_string(), *qty))
        .collect();
    rpc::ResourceUsageBatchData {
        batch: vec![rpc::ResourcesData {
            node_id: node_id.binary(),
            resources_total: resources_available.clone(),
            resources_available,
            ..Default::default()
        }],
    }
}

/// Decode a broadcast payload back into a batch.
pub fn decode_resource_usage_batch(payload: &[u8]) -> rpc::ResourceUsageBatchData {
    rpc::ResourceUsageBatchData::decode(payload).expect("payload is not a ResourceUsageBatchData")
}
