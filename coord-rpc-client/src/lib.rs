//! A pooled `BackendExecService` client, the Rust analogue of
//! `risingwave_rpc_client::ComputeClientPool`: channels are cached and reused by host,
//! `get_client`/`release_client` are explicit rather than RAII so the pool can track
//! how many callers currently hold a channel to a given backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use coord_common::{CoordError, CoordResult, FragmentId, HostAddr};
use coord_pb::backend_exec_service_client::BackendExecServiceClient;
use coord_pb::{
    CancelPlanFragmentRequest, ExecPlanFragmentRequest, FragmentIdProst, HostAddress, QueryIdProst,
};
use coordinator::{BackendClient, ClientCache, ExecPlanFragmentArgs};
use dashmap::DashMap;
use tonic::transport::Channel;

struct PooledChannel {
    channel: Channel,
    outstanding: AtomicUsize,
}

/// Caches one lazily-connected `tonic::transport::Channel` per backend host. Channels
/// are cheap to clone (an `Arc`-backed handle), so pooling at the channel level rather
/// than the generated-client level is sufficient: a fresh `BackendExecServiceClient` is
/// built per `get_client` call from the cached channel.
pub struct ComputeClientPool {
    channels: DashMap<HostAddr, Arc<PooledChannel>>,
}

impl Default for ComputeClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeClientPool {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    async fn channel_for(&self, host_port: &HostAddr) -> CoordResult<Arc<PooledChannel>> {
        if let Some(existing) = self.channels.get(host_port) {
            return Ok(existing.clone());
        }

        let endpoint = format!("http://{host_port}");
        let channel = Channel::from_shared(endpoint.clone())
            .map_err(|e| CoordError::Internal(format!("invalid backend endpoint {endpoint}: {e}")))?
            .connect_lazy();
        let pooled = Arc::new(PooledChannel {
            channel,
            outstanding: AtomicUsize::new(0),
        });
        self.channels.insert(host_port.clone(), pooled.clone());
        Ok(pooled)
    }

    /// Number of callers currently holding a client for `host_port`, for diagnostics.
    pub fn outstanding(&self, host_port: &HostAddr) -> usize {
        self.channels
            .get(host_port)
            .map(|c| c.outstanding.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl ClientCache for ComputeClientPool {
    async fn get_client(&self, host_port: &HostAddr) -> CoordResult<Arc<dyn BackendClient>> {
        let pooled = self.channel_for(host_port).await?;
        pooled.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TonicBackendClient {
            client: BackendExecServiceClient::new(pooled.channel.clone()),
        }))
    }

    async fn release_client(&self, host_port: &HostAddr, _client: Arc<dyn BackendClient>) {
        if let Some(pooled) = self.channels.get(host_port) {
            pooled.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct TonicBackendClient {
    client: BackendExecServiceClient<Channel>,
}

#[async_trait]
impl BackendClient for TonicBackendClient {
    async fn exec_plan_fragment(&self, args: ExecPlanFragmentArgs) -> CoordResult<()> {
        let mut client = self.client.clone();
        let request = ExecPlanFragmentRequest {
            query_id: Some(QueryIdProst::from(args.query_id)),
            fragment_id: Some(FragmentIdProst::from(args.fragment_id)),
            backend_num: args.backend_num,
            coord: Some(HostAddress::from(args.coord)),
            plan_fragment: args.fragment.payload,
            exec_params: args.params.payload,
        };
        tracing::debug!(backend_num = args.backend_num, "rpc: ExecPlanFragment");
        let response = client
            .exec_plan_fragment(request)
            .await
            .map_err(|status| CoordError::Transport(status.message().to_string()))?;
        match response.into_inner().status {
            Some(status) => match coord_pb::wire_to_error(&status) {
                Some(err) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    async fn cancel_plan_fragment(&self, fragment_id: FragmentId) -> CoordResult<()> {
        let mut client = self.client.clone();
        let request = CancelPlanFragmentRequest {
            fragment_id: Some(FragmentIdProst::from(fragment_id)),
        };
        tracing::debug!(%fragment_id, "rpc: CancelPlanFragment");
        let response = client
            .cancel_plan_fragment(request)
            .await
            .map_err(|status| CoordError::Transport(status.message().to_string()))?;
        match response.into_inner().status {
            Some(status) => match coord_pb::wire_to_error(&status) {
                Some(err) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}
