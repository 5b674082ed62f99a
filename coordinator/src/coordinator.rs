//! The Coordinator: lifecycle controller, fragment dispatcher, remote-state table,
//! local executor adapter, and cancellation/status aggregator rolled into one
//! long-lived object per in-flight query.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use coord_common::{
    CoordError, CoordResult, FragmentId, HostAddr, QueryId, RuntimeProfile, SharedProfile,
    TOTAL_TIME_COUNTER,
};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::backend_state::{BackendExecState, BackendExecStateSnapshot};
use crate::collaborators::{
    ClientCache, ExecPlanFragmentArgs, ExecStats, PlanFragmentExecutor, RowBatch, Scheduler,
    StreamMgr,
};
use crate::request::QueryExecRequest;
use crate::split_stats;

/// Lifecycle phase, tracked only for diagnostics/assertions: the actual correctness
/// guarantees come from `startup_lock`, `wait_lock`, per-backend locks, and the atomics
/// below, not from this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Dispatched,
    Open,
    Streaming,
    Cancelled,
    Failed,
}

pub struct Coordinator {
    query_id: QueryId,
    advertise_addr: HostAddr,
    dispatch_parallelism: usize,

    executor: Arc<dyn PlanFragmentExecutor>,
    exec_stats: Arc<ExecStats>,
    scheduler: Arc<dyn Scheduler>,
    client_cache: Arc<dyn ClientCache>,
    stream_mgr: Arc<dyn StreamMgr>,

    query_profile: SharedProfile,
    backend_states: RwLock<Vec<Arc<BackendExecState>>>,

    phase: parking_lot::Mutex<Phase>,
    /// Held for the entirety of `exec` and of the public `cancel`, so a concurrent
    /// cancel never observes a partially built backend list.
    startup_lock: AsyncMutex<()>,
    /// Disjoint from `startup_lock`: `executor.open()` may block for a long time and
    /// must not stall a concurrent cancel.
    wait_lock: AsyncMutex<bool>,
    execution_completed: AtomicBool,
    profile_attached: AtomicBool,
    closed_once: AtomicBool,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query_id: QueryId,
        advertise_addr: HostAddr,
        dispatch_parallelism: usize,
        executor: Arc<dyn PlanFragmentExecutor>,
        exec_stats: Arc<ExecStats>,
        scheduler: Arc<dyn Scheduler>,
        client_cache: Arc<dyn ClientCache>,
        stream_mgr: Arc<dyn StreamMgr>,
    ) -> Self {
        Self {
            query_profile: SharedProfile::new(format!("Query(id={query_id})")),
            query_id,
            advertise_addr,
            dispatch_parallelism,
            executor,
            exec_stats,
            scheduler,
            client_cache,
            stream_mgr,
            backend_states: RwLock::new(Vec::new()),
            phase: parking_lot::Mutex::new(Phase::New),
            startup_lock: AsyncMutex::new(()),
            wait_lock: AsyncMutex::new(false),
            execution_completed: AtomicBool::new(false),
            profile_attached: AtomicBool::new(false),
            closed_once: AtomicBool::new(false),
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn exec_stats(&self) -> &ExecStats {
        &self.exec_stats
    }

    pub fn query_profile(&self) -> RuntimeProfile {
        self.query_profile.snapshot()
    }

    pub async fn backend_snapshots(&self) -> Vec<BackendExecStateSnapshot> {
        let backends = self.backend_states.read().clone();
        let mut out = Vec::with_capacity(backends.len());
        for b in &backends {
            out.push(b.snapshot().await);
        }
        out
    }

    // ---- 4.1 Lifecycle controller / 4.2 Fragment dispatcher ------------------------

    /// Prepares the local fragment, then dispatches all remote fragments in parallel.
    /// Must run to completion (success or failure) before `wait`/`get_next`/`cancel`
    /// can observe a consistent backend list.
    #[tracing::instrument(skip(self, request), fields(query_id = %self.query_id))]
    pub async fn exec(&self, request: QueryExecRequest) -> CoordResult<()> {
        let _startup_guard = self.startup_lock.lock().await;
        let _timer = coord_common::ScopedTimer::start(self.query_profile.clone(), TOTAL_TIME_COUNTER);

        if request.fragments.is_empty() {
            return Err(CoordError::Internal("QueryExecRequest has no fragments".into()));
        }
        if request.params.len() != request.fragments.len() {
            return Err(CoordError::Internal(
                "params and fragments must have the same length".into(),
            ));
        }
        if request.params[0].len() != 1 {
            return Err(CoordError::Internal(
                "the coordinator fragment must have exactly one instance".into(),
            ));
        }
        if request.data_locations.len() < request.fragments.len() - 1 {
            return Err(CoordError::Internal(format!(
                "data_locations has {} entries but {} remote fragments need one each",
                request.data_locations.len(),
                request.fragments.len() - 1
            )));
        }

        let num_backends: usize = request.params[1..].iter().map(|p| p.len()).sum();
        self.query_id.check_capacity(num_backends)?;

        // Register data streams for the coordinator fragment before any remote
        // fragment is dispatched: a producer that started first would fail to
        // deliver its first batch, because the receiver would not exist yet.
        self.executor
            .prepare(&request.fragments[0], &request.params[0][0])
            .await?;

        let mut rewritten_params = request.params;
        if rewritten_params.len() > 1 {
            for p in rewritten_params[1].iter_mut() {
                p.destinations = vec![self.advertise_addr.clone()];
            }
        }

        // Fragments are dispatched in ascending level order so receivers (closer to
        // the root) exist before their producers (further from the root).
        let mut backend_list = Vec::with_capacity(num_backends);
        let mut backend_num: u32 = 0;
        for i in 1..request.fragments.len() {
            let hosts = self
                .scheduler
                .get_hosts(&request.data_locations[i - 1], rewritten_params[i].len())
                .await?;
            if hosts.len() != rewritten_params[i].len() {
                self.cancel_internal(true).await;
                return Err(CoordError::Internal(format!(
                    "scheduler returned {} hosts for {} instances of fragment {i}",
                    hosts.len(),
                    rewritten_params[i].len()
                )));
            }

            for (host, params) in hosts.into_iter().zip(rewritten_params[i].drain(..)) {
                let fragment_id = self.query_id.fragment_id_for_backend(backend_num);
                let state = Arc::new(BackendExecState::new(
                    backend_num,
                    fragment_id,
                    host,
                    request.fragments[i].clone(),
                    params,
                ));
                backend_list.push(state);
                backend_num += 1;
            }
        }

        log_split_sizes(&backend_list);
        *self.backend_states.write() = backend_list.clone();
        *self.phase.lock() = Phase::Dispatched;

        let first_error = self.dispatch_all(&backend_list).await;

        if let Some(err) = first_error {
            *self.phase.lock() = Phase::Failed;
            self.cancel_internal(true).await;
            return Err(err);
        }

        Ok(())
    }

    /// Fans `ExecPlanFragment` RPCs out in parallel, bounded by `dispatch_parallelism`.
    /// Returns the first error encountered, if any; every backend's own outcome is
    /// recorded into its `BackendExecState` regardless of the others' outcomes.
    async fn dispatch_all(&self, backends: &[Arc<BackendExecState>]) -> Option<CoordError> {
        let coord = self.advertise_addr.clone();
        let query_id = self.query_id;
        let results: Vec<CoordResult<()>> = stream::iter(backends.iter().cloned())
            .map(|backend| {
                let client_cache = self.client_cache.clone();
                let coord = coord.clone();
                async move {
                    let result =
                        dispatch_one(backend.as_ref(), client_cache.as_ref(), query_id, coord).await;
                    backend.record_dispatch_result(result.clone()).await;
                    result
                }
            })
            .buffer_unordered(self.dispatch_parallelism.max(1))
            .collect()
            .await;

        results.into_iter().find_map(|r| r.err())
    }

    // ---- 4.1 Lifecycle controller: Wait --------------------------------------------

    /// Idempotent: only the first call invokes `executor.open()`, which may block on
    /// upstream data arrival. Guarded by a lock distinct from `startup_lock` so a
    /// concurrent `cancel` is never blocked behind a slow `open`.
    #[tracing::instrument(skip(self), fields(query_id = %self.query_id))]
    pub async fn wait(&self) -> CoordResult<()> {
        let mut has_called_wait = self.wait_lock.lock().await;
        if *has_called_wait {
            return Ok(());
        }
        *has_called_wait = true;
        self.executor.open().await?;
        *self.phase.lock() = Phase::Open;
        Ok(())
    }

    // ---- 4.4 Local executor adapter / GetNext --------------------------------------

    /// Must be preceded by a successful `wait`. A `None` batch signals end-of-stream;
    /// the local executor is then closed exactly once and its profile attached to the
    /// query profile.
    #[tracing::instrument(skip(self), fields(query_id = %self.query_id))]
    pub async fn get_next(&self) -> CoordResult<Option<RowBatch>> {
        *self.phase.lock() = Phase::Streaming;
        let result = self.get_next_internal().await;
        let execution_completed = self.execution_completed.load(Ordering::SeqCst);

        let final_result = if result.is_err() || execution_completed {
            match (result, self.close_local_executor_once().await) {
                (Ok(v), Ok(())) => Ok(v),
                (Ok(_), Err(close_err)) => Err(close_err),
                (Err(e), Ok(())) => Err(e),
                (Err(mut e), Err(close_err)) => {
                    e.append_message(close_err.to_string());
                    Err(e)
                }
            }
        } else {
            result
        };

        if execution_completed {
            tracing::info!(
                query_id = %self.query_id,
                profile = %self.query_profile.pretty_print(),
                "cumulative profile at end of stream"
            );
        }
        final_result
    }

    async fn get_next_internal(&self) -> CoordResult<Option<RowBatch>> {
        let _timer =
            coord_common::ScopedTimer::start(self.query_profile.clone(), TOTAL_TIME_COUNTER);
        tracing::trace!(query_id = %self.query_id, "coordinator.get_next");
        match self.executor.get_next().await? {
            None => {
                self.execution_completed.store(true, Ordering::SeqCst);
                if !self.profile_attached.swap(true, Ordering::SeqCst) {
                    self.query_profile.add_child(self.executor.query_profile());
                }
                Ok(None)
            }
            Some(batch) => {
                self.exec_stats.add_rows(batch.num_rows as u64);
                Ok(Some(batch))
            }
        }
    }

    async fn close_local_executor_once(&self) -> CoordResult<()> {
        if self.closed_once.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.executor.close().await
    }

    // ---- 4.5 Cancellation & status aggregator --------------------------------------

    /// Always acquires the startup lock; safe to call concurrently with `exec` or
    /// repeatedly. Best-effort: does not wait for remote acknowledgement.
    pub async fn cancel(&self) {
        self.cancel_internal(false).await
    }

    async fn cancel_internal(&self, lock_already_held: bool) {
        let _guard = if lock_already_held {
            None
        } else {
            Some(self.startup_lock.lock().await)
        };

        *self.phase.lock() = Phase::Cancelled;
        self.executor.set_cancelled();
        self.stream_mgr.cancel(self.query_id.coordinator_fragment_id());

        let backends = self.backend_states.read().clone();
        for backend in backends.iter() {
            let mut inner = backend.inner.lock().await;
            if !inner.initiated || inner.done {
                continue;
            }

            let client = match self.client_cache.get_client(&backend.host_port).await {
                Ok(c) => c,
                Err(_) => continue,
            };

            if let Err(e) = client.cancel_plan_fragment(backend.fragment_id).await {
                inner.status.record(e);
            }

            self.client_cache
                .release_client(&backend.host_port, client)
                .await;
        }
    }

    /// Inbound status report from a worker. Rejects an unknown `backend_num` and an
    /// attempted error→OK transition as internal errors rather than silently
    /// overwriting state.
    #[tracing::instrument(skip(self, profile), fields(query_id = %self.query_id))]
    pub async fn update_fragment_exec_status(
        &self,
        backend_num: u32,
        status: Option<CoordError>,
        done: bool,
        profile: RuntimeProfile,
    ) -> CoordResult<()> {
        let backend = {
            let backends = self.backend_states.read();
            backends.get(backend_num as usize).cloned()
        }
        .ok_or_else(|| {
            CoordError::Internal(format!("unknown backend number {backend_num}"))
        })?;

        let mut should_cancel = false;
        {
            let mut inner = backend.inner.lock().await;
            match status {
                None => {
                    if !inner.status.is_ok() {
                        return Err(CoordError::Internal(format!(
                            "backend {backend_num}: fragment is transitioning from error \
                             status to OK: {}",
                            inner.status.error().map(|e| e.to_string()).unwrap_or_default()
                        )));
                    }
                }
                Some(e) => {
                    inner.status.record(e);
                    should_cancel = true;
                }
            }
            inner.done = done;
            inner.profile = Some(profile.clone());
        }

        if done {
            tracing::debug!(
                query_id = %self.query_id,
                backend_num,
                profile = %profile.pretty_print(),
                "profile received for backend"
            );
            self.query_profile.add_child(profile);
        }

        if should_cancel {
            self.cancel().await;
        }

        Ok(())
    }
}

async fn dispatch_one(
    backend: &BackendExecState,
    client_cache: &dyn ClientCache,
    query_id: QueryId,
    coord: HostAddr,
) -> CoordResult<()> {
    tracing::debug!(
        fragment_id = %backend.fragment_id,
        host = %backend.host_port,
        "making rpc: ExecPlanFragment"
    );

    let client = client_cache.get_client(&backend.host_port).await?;
    let args = ExecPlanFragmentArgs {
        query_id,
        fragment_id: backend.fragment_id,
        backend_num: backend.backend_num,
        coord,
        fragment: backend.fragment_request.clone(),
        params: backend.exec_params.clone(),
    };
    let result = client.exec_plan_fragment(args).await;
    client_cache
        .release_client(&backend.host_port, client)
        .await;
    result
}

fn log_split_sizes(backends: &[Arc<BackendExecState>]) {
    let sizes: Vec<u64> = backends.iter().map(|b| b.total_split_size).collect();
    if let Some(stats) = split_stats::compute(&sizes) {
        tracing::info!(
            num_backends = backends.len(),
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            stddev = stats.stddev,
            "split sizes for dispatched backends"
        );
    }
    for b in backends {
        tracing::trace!(
            host = %b.host_port,
            total_split_size = b.total_split_size,
            "data volume for backend"
        );
    }
}
