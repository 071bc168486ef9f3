// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS resource manager: tracks per-node resource availability.
//!
//! Besides answering queries it composes the batch the resource report broadcaster pushes to
//! every raylet.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ray_common::id::NodeID;
use ray_proto::ray::rpc;

use crate::resource_report_broadcaster::ResourceUsageBatchFn;

/// Per-node resource usage data.
#[derive(Debug, Clone, Default)]
pub struct NodeResourceUsage {
    /// Total resources on the node.
    pub total_resources: HashMap<String, f64>,
    /// Available (unused) resources.
    pub available_resources: HashMap<String, f64>,
    /// Resource load (demand).
    pub resource_load: HashMap<String, f64>,
    /// Raylet address, echoed into the broadcast batch.
    pub node_manager_address: String,
}

/// The GCS resource manager tracks resources across all nodes.
pub struct GcsResourceManager {
    node_resources: RwLock<HashMap<NodeID, NodeResourceUsage>>,
}

impl GcsResourceManager {
    pub fn new() -> Self {
        Self {
            node_resources: RwLock::new(HashMap::new()),
        }
    }

    /// Handle node registration.
    pub fn on_node_add(&self, node_id: &NodeID) {
        self.node_resources.write().entry(*node_id).or_default();
    }

    /// Handle node death.
    pub fn on_node_dead(&self, node_id: &NodeID) {
        self.node_resources.write().remove(node_id);
    }

    /// Update resource usage for a node.
    pub fn update_resource_usage(&self, node_id: &NodeID, usage: NodeResourceUsage) {
        self.node_resources.write().insert(*node_id, usage);
    }

    /// Get all resource usage (for autoscaler).
    pub fn get_all_resource_usage(&self) -> HashMap<NodeID, NodeResourceUsage> {
        self.node_resources.read().clone()
    }

    pub fn num_alive_nodes(&self) -> usize {
        self.node_resources.read().len()
    }

    /// Build a fresh batch with one `ResourcesData` per tracked node.
    pub fn get_resource_usage_batch_for_broadcast(&self) -> rpc::ResourceUsageBatchData {
        let resources = self.node_resources.read();
        let batch = resources
            .iter()
            .map(|(node_id, usage)| rpc::ResourcesData {
                node_id: node_id.binary(),
                resources_available: usage.available_resources.clone(),
                resources_total: usage.total_resources.clone(),
                resource_load: usage.resource_load.clone(),
                node_manager_address: usage.node_manager_address.clone(),
            })
            .collect();
        rpc::ResourceUsageBatchData { batch }
    }

    /// Adapt this manager into the composer the broadcaster calls once per tick.
    pub fn resource_usage_batch_fn(self: &Arc<Self>) -> ResourceUsageBatchFn {
        let this = Arc::clone(self);
        Arc::new(move || Ok(this.get_resource_usage_batch_for_broadcast()))
    }
}

impl Default for GcsResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_id(v: u8) -> NodeID {
        let mut data = [0u8; 28];
        data[0] = v;
        NodeID::from_binary(&data)
    }

    #[test]
    fn test_resource_tracking() {
        let mgr = GcsResourceManager::new();
        let nid = node_id(1);

        mgr.on_node_add(&nid);
        assert_eq!(mgr.num_alive_nodes(), 1);

        let usage = NodeResourceUsage {
            total_resources: HashMap::from([("CPU".into(), 8.0)]),
            available_resources: HashMap::from([("CPU".into(), 4.0)]),
            ..Default::default()
        };
        mgr.update_resource_usage(&nid, usage);
        let all = mgr.get_all_resource_usage();
        assert_eq!(all[&nid].available_resources.get("CPU"), Some(&4.0));

        mgr.on_node_dead(&nid);
        assert_eq!(mgr.num_alive_nodes(), 0);
        // Dead twice is harmless.
        mgr.on_node_dead(&nid);
        assert_eq!(mgr.num_alive_nodes(), 0);
    }

    #[test]
    fn test_on_node_add_keeps_existing_usage() {
        let mgr = GcsResourceManager::new();
        let nid = node_id(1);
        mgr.update_resource_usage(
            &nid,
            NodeResourceUsage {
                available_resources: HashMap::from([("GPU".into(), 1.0)]),
                ..Default::default()
            },
        );
        mgr.on_node_add(&nid);
        assert_eq!(
            mgr.get_all_resource_usage()[&nid].available_resources.get("GPU"),
            Some(&1.0)
        );
    }

    #[test]
    fn test_batch_for_broadcast() {
        let mgr = GcsResourceManager::new();
        let n1 = node_id(1);
        let n2 = node_id(2);
        mgr.update_resource_usage(
            &n1,
            NodeResourceUsage {
                total_resources: HashMap::from([("CPU".into(), 16.0)]),
                available_resources: HashMap::from([("CPU".into(), 8.0)]),
                resource_load: HashMap::from([("CPU".into(), 2.0)]),
                node_manager_address: "10.0.0.1".into(),
            },
        );
        mgr.on_node_add(&n2);

        let batch = mgr.get_resource_usage_batch_for_broadcast();
        assert_eq!(batch.batch.len(), 2);
        let data = batch
            .batch
            .iter()
            .find(|d| d.node_id == n1.binary())
            .unwrap();
        assert_eq!(data.resources_total.get("CPU"), Some(&16.0));
        assert_eq!(data.resources_available.get("CPU"), Some(&8.0));
        assert_eq!(data.resource_load.get("CPU"), Some(&2.0));
        assert_eq!(data.node_manager_address, "10.0.0.1");
    }

    #[test]
    fn test_empty_batch() {
        let mgr = GcsResourceManager::new();
        assert!(mgr.get_resource_usage_batch_for_broadcast().batch.is_empty());
    }

    #[test]
    fn test_batch_fn_sees_latest_state() {
        let mgr = Arc::new(GcsResourceManager::new());
        let compose = mgr.resource_usage_batch_fn();
        assert!(compose().unwrap().batch.is_empty());

        mgr.on_node_add(&node_id(7));
        assert_eq!(compose().unwrap().batch.len(), 1);
    }
}
