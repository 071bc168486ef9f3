// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Snapshot of persisted GCS tables loaded at startup.
//!
//! Only the node table is carried here.

use std::collections::HashMap;

use ray_common::id::NodeID;
use ray_proto::ray::rpc;

/// Cluster state recovered before the GCS managers start.
#[derive(Debug, Clone, Default)]
pub struct GcsInitData {
    nodes: HashMap<NodeID, rpc::GcsNodeInfo>,
}

impl GcsInitData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from node records, skipping any whose ID is malformed.
    pub fn from_nodes(nodes: impl IntoIterator<Item = rpc::GcsNodeInfo>) -> Self {
        let mut init_data = Self::new();
        for node in nodes {
            init_data.add_node(node);
        }
        init_data
    }

    /// Record a node. Returns `false` if its ID is malformed.
    pub fn add_node(&mut self, node: rpc::GcsNodeInfo) -> bool {
        match NodeID::try_from_binary(&node.node_id) {
            Some(node_id) => {
                self.nodes.insert(node_id, node);
                true
            }
            None => {
                tracing::warn!(
                    len = node.node_id.len(),
                    "Skipping persisted node with malformed node_id"
                );
                false
            }
        }
    }

    pub fn nodes(&self) -> &HashMap<NodeID, rpc::GcsNodeInfo> {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(v: u8, state: rpc::gcs_node_info::GcsNodeState) -> rpc::GcsNodeInfo {
        let mut node_id = vec![0u8; 28];
        node_id[0] = v;
        let mut info = rpc::GcsNodeInfo {
            node_id,
            ..Default::default()
        };
        info.set_state(state);
        info
    }

    #[test]
    fn test_from_nodes() {
        use rpc::gcs_node_info::GcsNodeState;
        let init = GcsInitData::from_nodes([
            node(1, GcsNodeState::Alive),
            node(2, GcsNodeState::Dead),
        ]);
        assert_eq!(init.nodes().len(), 2);
    }

    #[test]
    fn test_malformed_node_id_skipped() {
        let mut init = GcsInitData::new();
        let bad = rpc::GcsNodeInfo {
            node_id: vec![1, 2, 3],
            ..Default::default()
        };
        assert!(!init.add_node(bad));
        assert!(init.nodes().is_empty());
    }
}
