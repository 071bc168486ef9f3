// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Raylet client pool.
//!
//! A thread-safe cache of raylet clients keyed by node ID, so periodic
//! callers reuse one channel per raylet.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use ray_common::id::NodeID;
use ray_common::status::{RayError, RayResult};
use ray_proto::ray::rpc;

use crate::client::RayletRpcClient;
use crate::traits::RayletClient;

/// Builds a client for a raylet address. Swappable for tests.
pub type RayletClientFactory =
    Box<dyn Fn(&rpc::Address) -> RayResult<Arc<dyn RayletClient>> + Send + Sync>;

struct PooledClient {
    ip_address: String,
    port: i32,
    client: Arc<dyn RayletClient>,
}

impl PooledClient {
    fn matches(&self, address: &rpc::Address) -> bool {
        self.port == address.port && self.ip_address == address.ip_address
    }
}

/// Shared pool of raylet clients.
pub struct RayletClientPool {
    client_factory: RayletClientFactory,
    clients: Mutex<HashMap<NodeID, PooledClient>>,
}

impl RayletClientPool {
    /// Pool backed by lazily-connecting tonic clients.
    pub fn new() -> Self {
        Self::with_factory(Box::new(|address| {
            Ok(Arc::new(RayletRpcClient::connect_lazy(address)?) as Arc<dyn RayletClient>)
        }))
    }

    pub fn with_factory(client_factory: RayletClientFactory) -> Self {
        Self {
            client_factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached client for the raylet at `address`, connecting if
    /// there is none or the node has moved to a new endpoint.
    pub fn get_or_connect_by_address(
        &self,
        address: &rpc::Address,
    ) -> RayResult<Arc<dyn RayletClient>> {
        let node_id = NodeID::try_from_binary(&address.raylet_id).ok_or_else(|| {
            RayError::invalid_argument(format!(
                "raylet address has a {}-byte raylet_id, expected {}",
                address.raylet_id.len(),
                NodeID::SIZE
            ))
        })?;

        if let Some(pooled) = self.clients.lock().get(&node_id) {
            if pooled.matches(address) {
                return Ok(Arc::clone(&pooled.client));
            }
        }

        // Build outside the lock.
        let client = (self.client_factory)(address)?;
        tracing::debug!(
            ?node_id,
            ip = %address.ip_address,
            port = address.port,
            "Connected raylet client"
        );

        let mut clients = self.clients.lock();
        match clients.get(&node_id) {
            // Lost a race with another caller for the same endpoint; share theirs.
            Some(existing) if existing.matches(address) => Ok(Arc::clone(&existing.client)),
            _ => {
                clients.insert(
                    node_id,
                    PooledClient {
                        ip_address: address.ip_address.clone(),
                        port: address.port,
                        client: Arc::clone(&client),
                    },
                );
                Ok(client)
            }
        }
    }

    /// Cached client for `node_id`, if any.
    pub fn get_by_id(&self, node_id: &NodeID) -> Option<Arc<dyn RayletClient>> {
        self.clients
            .lock()
            .get(node_id)
            .map(|pooled| Arc::clone(&pooled.client))
    }

    /// Drop the cached client for `node_id`. No-op if absent.
    pub fn disconnect(&self, node_id: &NodeID) {
        if self.clients.lock().remove(node_id).is_some() {
            tracing::debug!(?node_id, "Disconnected raylet client");
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

impl Default for RayletClientPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tonic::Status;

    struct NoopClient;

    #[async_trait::async_trait]
    impl RayletClient for NoopClient {
        async fn update_resource_usage(
            &self,
            _req: rpc::UpdateResourceUsageRequest,
        ) -> Result<rpc::UpdateResourceUsageReply, Status> {
            Ok(rpc::UpdateResourceUsageReply::default())
        }
    }

    fn counting_pool() -> (RayletClientPool, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&created);
        let pool = RayletClientPool::with_factory(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoopClient) as Arc<dyn RayletClient>)
        }));
        (pool, created)
    }

    fn address(id: u8, ip: &str, port: i32) -> rpc::Address {
        let mut raylet_id = vec![0u8; 28];
        raylet_id[0] = id;
        rpc::Address {
            raylet_id,
            ip_address: ip.to_string(),
            port,
            ..Default::default()
        }
    }

    #[test]
    fn test_reuses_client_for_same_address() {
        let (pool, created) = counting_pool();
        let a = pool.get_or_connect_by_address(&address(1, "10.0.0.1", 6379)).unwrap();
        let b = pool.get_or_connect_by_address(&address(1, "10.0.0.1", 6379)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_separate_clients_per_node() {
        let (pool, created) = counting_pool();
        pool.get_or_connect_by_address(&address(1, "10.0.0.1", 6379)).unwrap();
        pool.get_or_connect_by_address(&address(2, "10.0.0.2", 6379)).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_reconnects_when_node_moves() {
        let (pool, created) = counting_pool();
        let a = pool.get_or_connect_by_address(&address(1, "10.0.0.1", 6379)).unwrap();
        let b = pool.get_or_connect_by_address(&address(1, "10.0.0.9", 6380)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_invalid_raylet_id() {
        let (pool, created) = counting_pool();
        let mut addr = address(1, "10.0.0.1", 6379);
        addr.raylet_id.truncate(3);
        let err = pool.get_or_connect_by_address(&addr).err().unwrap();
        assert!(err.is_invalid_argument());
        assert_eq!(created.load(Ordering::SeqCst), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_factory_error_is_not_cached() {
        let pool = RayletClientPool::with_factory(Box::new(|_| {
            Err(RayError::invalid_argument("unreachable"))
        }));
        assert!(pool
            .get_or_connect_by_address(&address(1, "10.0.0.1", 6379))
            .is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_disconnect() {
        let (pool, created) = counting_pool();
        let addr = address(1, "10.0.0.1", 6379);
        let node_id = NodeID::from_binary(&addr.raylet_id);
        pool.get_or_connect_by_address(&addr).unwrap();
        assert!(pool.get_by_id(&node_id).is_some());

        pool.disconnect(&node_id);
        assert!(pool.get_by_id(&node_id).is_none());
        // Absent node: no-op.
        pool.disconnect(&node_id);

        pool.get_or_connect_by_address(&addr).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_default_pool_builds_tonic_clients() {
        let pool = RayletClientPool::default();
        let client = pool
            .get_or_connect_by_address(&address(1, "127.0.0.1", 6379))
            .unwrap();
        let again = pool
            .get_or_connect_by_address(&address(1, "127.0.0.1", 6379))
            .unwrap();
        assert!(Arc::ptr_eq(&client, &again));
    }
}
