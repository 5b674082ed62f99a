//! Traits for the external collaborators the coordinator core depends on. Their
//! internals (query planning, physical execution, transport, host discovery) are out
//! of scope; only these interfaces are specified.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use coord_common::{CoordResult, FragmentId, HostAddr, QueryId, RuntimeProfile};

use crate::request::{DataLocationHint, ExecParams, FragmentRequest};

/// A batch of output rows produced by the local (root) fragment executor. The row
/// representation itself is out of scope; it is carried as an opaque payload.
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub num_rows: usize,
    pub payload: Vec<u8>,
}

/// Maps data-location hints to concrete backend hosts. One call per remote fragment
/// level; the returned vector's length must equal the number of instances requested.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn get_hosts(
        &self,
        hint: &DataLocationHint,
        num_instances: usize,
    ) -> CoordResult<Vec<HostAddr>>;
}

/// Arguments for an `ExecPlanFragment` RPC, assembled by the dispatcher from a
/// `BackendExecState`.
#[derive(Debug, Clone)]
pub struct ExecPlanFragmentArgs {
    pub query_id: QueryId,
    pub fragment_id: FragmentId,
    pub backend_num: u32,
    pub coord: HostAddr,
    pub fragment: FragmentRequest,
    pub params: ExecParams,
}

/// A pooled RPC connection to one backend, obtained from and returned to a
/// [`ClientCache`]. Every method call corresponds to exactly one RPC issued in §6.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn exec_plan_fragment(&self, args: ExecPlanFragmentArgs) -> CoordResult<()>;
    async fn cancel_plan_fragment(&self, fragment_id: FragmentId) -> CoordResult<()>;
}

/// A pool of reusable RPC clients keyed by host/port. `get_client`/`release_client`
/// must balance on every control-flow path; see the dispatcher and cancellation
/// aggregator for the call sites that uphold this.
#[async_trait]
pub trait ClientCache: Send + Sync {
    async fn get_client(&self, host_port: &HostAddr) -> CoordResult<Arc<dyn BackendClient>>;
    async fn release_client(&self, host_port: &HostAddr, client: Arc<dyn BackendClient>);
}

/// Unblocks pending receivers for a fragment. Out-of-scope transport internals; the
/// coordinator only ever calls `cancel`.
pub trait StreamMgr: Send + Sync {
    fn cancel(&self, fragment_id: FragmentId);
}

/// Drives the root (coordinator) fragment. `open` may block on upstream data; `close`
/// must be idempotent from the caller's perspective (the coordinator itself only ever
/// calls it once, but a defensive implementation should tolerate a second call).
#[async_trait]
pub trait PlanFragmentExecutor: Send + Sync {
    async fn prepare(&self, request: &FragmentRequest, params: &ExecParams) -> CoordResult<()>;
    async fn open(&self) -> CoordResult<()>;
    async fn get_next(&self) -> CoordResult<Option<RowBatch>>;
    async fn close(&self) -> CoordResult<()>;

    /// Marks the local fragment's runtime state as cancelled. Must give `open`/`get_next`
    /// an actual observation point, or `Cancel` cannot unblock a pending `Wait`.
    fn set_cancelled(&self);

    /// The local fragment's own profile, attached to the query profile on completion.
    fn query_profile(&self) -> RuntimeProfile;
}

/// Accumulates rows observed by the local executor adapter.
#[derive(Debug, Default)]
pub struct ExecStats {
    num_rows: AtomicU64,
}

impl ExecStats {
    pub fn add_rows(&self, n: u64) {
        self.num_rows.fetch_add(n, Ordering::Relaxed);
    }

    pub fn num_rows(&self) -> u64 {
        self.num_rows.load(Ordering::Relaxed)
    }
}
