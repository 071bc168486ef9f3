// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS resource report broadcaster: pushes cluster resource usage to raylets.
//!
//! Every broadcast period the broadcaster composes one
//! `ResourceUsageBatchData`, serializes it once and hands the same bytes to
//! its [`BatchSender`] for every raylet in its membership table. All of that
//! happens on a dedicated thread so the GCS main loop is never stalled by
//! serialization or fan-out.
//!
//! The first round runs as soon as [`GcsResourceReportBroadcaster::start`]
//! returns, then once per period. If composing a batch fails the round is
//! skipped and the loop carries on.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use prost::Message;
use ray_common::config::RayConfig;
use ray_common::constants::RESOURCE_REPORT_BROADCAST_THREAD_NAME;
use ray_common::id::NodeID;
use ray_common::runtime::{DedicatedRuntime, PeriodicalRunner, RayRuntime};
use ray_common::status::{RayError, RayResult};
use ray_proto::ray::rpc;
use ray_raylet_rpc_client::RayletClientPool;
use ray_util::time::Stopwatch;

use crate::init_data::GcsInitData;

/// Produces the batch to broadcast. Called at most once per round.
pub type ResourceUsageBatchFn =
    Arc<dyn Fn() -> RayResult<rpc::ResourceUsageBatchData> + Send + Sync>;

/// Ships one serialized batch to one raylet.
///
/// Implementations must not block on the reply: the broadcast loop moves on
/// to the next raylet as soon as this returns. Delivery failures are the
/// implementation's to swallow.
pub trait BatchSender: Send + Sync {
    fn send_batch(
        &self,
        address: &rpc::Address,
        raylet_client_pool: &Arc<RayletClientPool>,
        serialized_batch: &Bytes,
    );
}

impl<F> BatchSender for F
where
    F: Fn(&rpc::Address, &Arc<RayletClientPool>, &Bytes) + Send + Sync,
{
    fn send_batch(
        &self,
        address: &rpc::Address,
        raylet_client_pool: &Arc<RayletClientPool>,
        serialized_batch: &Bytes,
    ) {
        self(address, raylet_client_pool, serialized_batch)
    }
}

/// Default sender: fire-and-forget `UpdateResourceUsage` through the pool.
///
/// The RPC is spawned on the caller's tokio runtime and its reply, success
/// or error, is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrpcBatchSender;

impl BatchSender for GrpcBatchSender {
    fn send_batch(
        &self,
        address: &rpc::Address,
        raylet_client_pool: &Arc<RayletClientPool>,
        serialized_batch: &Bytes,
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                ip = %address.ip_address,
                port = address.port,
                "No runtime to send resource usage on, dropping"
            );
            return;
        };
        let client = match raylet_client_pool.get_or_connect_by_address(address) {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!(
                    ip = %address.ip_address,
                    port = address.port,
                    error = %e,
                    "Failed to get raylet client for resource usage broadcast"
                );
                return;
            }
        };
        let request = rpc::UpdateResourceUsageRequest {
            serialized_resource_usage_batch: serialized_batch.clone(),
        };
        let ip_address = address.ip_address.clone();
        let port = address.port;
        runtime.spawn(async move {
            if let Err(status) = client.update_resource_usage(request).await {
                tracing::trace!(
                    ip = %ip_address,
                    port,
                    code = ?status.code(),
                    "Resource usage broadcast not delivered"
                );
            }
        });
    }
}

/// Thread-safe node ID → raylet address table.
///
/// The lock only ever guards map operations.
#[derive(Default)]
pub struct NodeAddressRegistry {
    nodes: Mutex<HashMap<NodeID, rpc::Address>>,
}

impl NodeAddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the address for `node_id`.
    pub fn add_or_update(&self, node_id: NodeID, address: rpc::Address) {
        self.nodes.lock().insert(node_id, address);
    }

    /// Remove `node_id`. Returns whether it was present.
    pub fn remove(&self, node_id: &NodeID) -> bool {
        self.nodes.lock().remove(node_id).is_some()
    }

    /// An owned copy of every registered address, in no particular order.
    pub fn snapshot_addresses(&self) -> Vec<rpc::Address> {
        self.nodes.lock().values().cloned().collect()
    }

    pub(crate) fn contains(&self, node_id: &NodeID) -> bool {
        self.nodes.lock().contains_key(node_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

/// State shared between the owner and the tick running on the broadcast thread.
struct BroadcastContext {
    nodes: NodeAddressRegistry,
    raylet_client_pool: Arc<RayletClientPool>,
    get_resource_usage_batch_for_broadcast: ResourceUsageBatchFn,
    send_batch: Arc<dyn BatchSender>,
    num_rounds: AtomicU64,
}

impl BroadcastContext {
    fn send_broadcast(&self) {
        let stopwatch = Stopwatch::new();

        let batch = match (self.get_resource_usage_batch_for_broadcast)() {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to compose resource usage batch, skipping round");
                return;
            }
        };
        let serialized_batch = Bytes::from(batch.encode_to_vec());
        let addresses = self.nodes.snapshot_addresses();

        for address in &addresses {
            let sent = panic::catch_unwind(AssertUnwindSafe(|| {
                self.send_batch
                    .send_batch(address, &self.raylet_client_pool, &serialized_batch)
            }));
            if sent.is_err() {
                tracing::error!(
                    ip = %address.ip_address,
                    port = address.port,
                    "Batch sender panicked, continuing with remaining raylets"
                );
            }
            self.release_if_removed(address);
        }

        let round = self.num_rounds.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            round,
            num_nodes = addresses.len(),
            num_resources_data = batch.batch.len(),
            payload_bytes = serialized_batch.len(),
            elapsed_us = stopwatch.elapsed_us(),
            "Broadcast resource usage batch"
        );
    }

    /// Drop a pooled client that a send re-created after its node was
    /// removed mid-round. Removal unregisters the node before disconnecting,
    /// so either this check sees the removal or the removal's disconnect
    /// lands after the re-insert.
    fn release_if_removed(&self, address: &rpc::Address) {
        let Some(node_id) = NodeID::try_from_binary(&address.raylet_id) else {
            return;
        };
        if !self.nodes.contains(&node_id) {
            self.raylet_client_pool.disconnect(&node_id);
        }
    }
}

enum BroadcasterState {
    Created,
    Running {
        runtime: DedicatedRuntime,
        ticker: PeriodicalRunner,
    },
    Stopped,
}

/// Periodically broadcasts resource usage batches to all known raylets
/// from its own thread.
///
/// Lifecycle is `Created → Running → Stopped`. A stopped broadcaster cannot
/// be restarted; build a new one instead.
pub struct GcsResourceReportBroadcaster {
    context: Arc<BroadcastContext>,
    broadcast_period: Duration,
    state: Mutex<BroadcasterState>,
}

impl GcsResourceReportBroadcaster {
    /// Broadcaster using the default fire-and-forget gRPC sender.
    pub fn new(
        raylet_client_pool: Arc<RayletClientPool>,
        get_resource_usage_batch_for_broadcast: ResourceUsageBatchFn,
        broadcast_period: Duration,
    ) -> Self {
        Self::with_sender(
            raylet_client_pool,
            get_resource_usage_batch_for_broadcast,
            broadcast_period,
            Arc::new(GrpcBatchSender),
        )
    }

    /// Broadcaster with a custom sender. Meant for tests.
    pub fn with_sender(
        raylet_client_pool: Arc<RayletClientPool>,
        get_resource_usage_batch_for_broadcast: ResourceUsageBatchFn,
        broadcast_period: Duration,
        send_batch: Arc<dyn BatchSender>,
    ) -> Self {
        Self {
            context: Arc::new(BroadcastContext {
                nodes: NodeAddressRegistry::new(),
                raylet_client_pool,
                get_resource_usage_batch_for_broadcast,
                send_batch,
                num_rounds: AtomicU64::new(0),
            }),
            broadcast_period,
            state: Mutex::new(BroadcasterState::Created),
        }
    }

    /// Broadcaster whose period comes from
    /// `raylet_report_resources_period_milliseconds`.
    pub fn from_config(
        config: &RayConfig,
        raylet_client_pool: Arc<RayletClientPool>,
        get_resource_usage_batch_for_broadcast: ResourceUsageBatchFn,
    ) -> Self {
        Self::new(
            raylet_client_pool,
            get_resource_usage_batch_for_broadcast,
            config.resource_broadcast_period(),
        )
    }

    /// Seed the membership table with every ALIVE node from persisted state.
    pub fn initialize(&self, gcs_init_data: &GcsInitData) {
        for node in gcs_init_data.nodes().values() {
            if node.state == rpc::gcs_node_info::GcsNodeState::Alive as i32 {
                self.handle_node_added(node);
            }
        }
    }

    /// Spawn the broadcast thread and start ticking.
    ///
    /// # Panics
    ///
    /// If the broadcaster is already running or has been stopped.
    pub fn start(&self) -> RayResult<()> {
        let mut state = self.state.lock();
        match *state {
            BroadcasterState::Created => {}
            BroadcasterState::Running { .. } => {
                panic!("GcsResourceReportBroadcaster::start called while already running")
            }
            BroadcasterState::Stopped => {
                panic!("GcsResourceReportBroadcaster::start called after stop; it cannot be restarted")
            }
        }

        let runtime = DedicatedRuntime::start(RESOURCE_REPORT_BROADCAST_THREAD_NAME).map_err(
            |e| RayError::io_error(format!("failed to spawn resource report broadcast thread: {e}")),
        )?;
        let ticker = self.start_ticker(runtime.runtime());
        *state = BroadcasterState::Running { runtime, ticker };

        tracing::info!(
            period_ms = self.broadcast_period.as_millis() as u64,
            num_nodes = self.context.nodes.len(),
            "Resource report broadcaster started"
        );
        Ok(())
    }

    fn start_ticker(&self, runtime: &RayRuntime) -> PeriodicalRunner {
        let context = Arc::clone(&self.context);
        PeriodicalRunner::start(
            runtime,
            self.broadcast_period,
            "GcsResourceReportBroadcaster.SendBroadcast",
            move || context.send_broadcast(),
        )
    }

    /// Stop ticking and join the broadcast thread.
    ///
    /// Blocks until a round that is already running has finished handing its
    /// batch to the sender; outstanding RPCs are abandoned. No-op unless
    /// running.
    pub fn stop(&self) {
        // The state lock is released before joining so a round in flight can
        // still query the broadcaster.
        let running = {
            let mut state = self.state.lock();
            if !matches!(*state, BroadcasterState::Running { .. }) {
                return;
            }
            std::mem::replace(&mut *state, BroadcasterState::Stopped)
        };
        if let BroadcasterState::Running {
            mut runtime,
            mut ticker,
        } = running
        {
            ticker.stop();
            runtime.stop();
            tracing::info!(
                num_rounds = self.num_broadcast_rounds(),
                "Resource report broadcaster stopped"
            );
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), BroadcasterState::Running { .. })
    }

    /// Event handler when a new node joins the cluster.
    pub fn handle_node_added(&self, node_info: &rpc::GcsNodeInfo) {
        let Some(node_id) = NodeID::try_from_binary(&node_info.node_id) else {
            tracing::warn!(
                len = node_info.node_id.len(),
                "Ignoring added node with malformed node_id"
            );
            return;
        };
        let address = rpc::Address {
            raylet_id: node_info.node_id.clone(),
            ip_address: node_info.node_manager_address.clone(),
            port: node_info.node_manager_port,
            ..Default::default()
        };
        self.context.nodes.add_or_update(node_id, address);
        tracing::info!(
            ?node_id,
            ip = %node_info.node_manager_address,
            port = node_info.node_manager_port,
            "Added node to resource report broadcast"
        );
    }

    /// Event handler when a node leaves the cluster.
    pub fn handle_node_removed(&self, node_info: &rpc::GcsNodeInfo) {
        let Some(node_id) = NodeID::try_from_binary(&node_info.node_id) else {
            tracing::warn!(
                len = node_info.node_id.len(),
                "Ignoring removed node with malformed node_id"
            );
            return;
        };
        if self.context.nodes.remove(&node_id) {
            self.context.raylet_client_pool.disconnect(&node_id);
            tracing::info!(?node_id, "Removed node from resource report broadcast");
        }
    }

    /// Run one broadcast round on the calling thread.
    pub fn send_broadcast(&self) {
        self.context.send_broadcast();
    }

    /// Number of raylets currently receiving broadcasts.
    pub fn num_nodes(&self) -> usize {
        self.context.nodes.len()
    }

    /// Number of rounds that composed and dispatched a batch.
    pub fn num_broadcast_rounds(&self) -> u64 {
        self.context.num_rounds.load(Ordering::Relaxed)
    }

    pub fn broadcast_period(&self) -> Duration {
        self.broadcast_period
    }
}

impl Drop for GcsResourceReportBroadcaster {
    fn drop(&mut self) {
        self.stop();
    }
}
