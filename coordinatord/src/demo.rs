//! Example/demo mode (§10.6): exercises a real `Coordinator` end-to-end against one or
//! more `coord-worker` processes, without a real query planner or data-stream
//! transport. Not part of the coordinator core; this only proves the lifecycle and
//! wire protocol wiring are correct.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use coord_common::{CoordResult, FragmentId, HostAddr, QueryId, RuntimeProfile};
use coordinator::{
    Coordinator, DataLocationHint, ExecParams, ExecStats, FragmentRequest, PlanFragmentExecutor,
    QueryExecRequest, RowBatch, ScanRangeSet, Scheduler, StreamMgr,
};

use crate::registry::CoordinatorRegistry;

/// Produces a fixed number of synthetic row batches once opened; stands in for a real
/// root-fragment executor, which would otherwise pull from the data-stream transport
/// that §1 puts out of scope.
struct DemoExecutor {
    remaining_batches: AtomicUsize,
}

impl DemoExecutor {
    fn new(num_batches: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining_batches: AtomicUsize::new(num_batches),
        })
    }
}

#[async_trait]
impl PlanFragmentExecutor for DemoExecutor {
    async fn prepare(&self, _request: &FragmentRequest, _params: &ExecParams) -> CoordResult<()> {
        Ok(())
    }

    async fn open(&self) -> CoordResult<()> {
        Ok(())
    }

    async fn get_next(&self) -> CoordResult<Option<RowBatch>> {
        let prev = self.remaining_batches.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| if n == 0 { None } else { Some(n - 1) },
        );
        match prev {
            Ok(_) => Ok(Some(RowBatch {
                num_rows: 100,
                payload: vec![],
            })),
            Err(_) => Ok(None),
        }
    }

    async fn close(&self) -> CoordResult<()> {
        Ok(())
    }

    fn set_cancelled(&self) {}

    fn query_profile(&self) -> RuntimeProfile {
        RuntimeProfile::new("DemoRootFragment")
    }
}

/// Hands out the configured worker hosts round-robin, ignoring the data-location hint
/// entirely: the demo has no real scan ranges to place.
struct RoundRobinScheduler {
    hosts: Vec<HostAddr>,
}

#[async_trait]
impl Scheduler for RoundRobinScheduler {
    async fn get_hosts(
        &self,
        _hint: &DataLocationHint,
        num_instances: usize,
    ) -> CoordResult<Vec<HostAddr>> {
        Ok((0..num_instances)
            .map(|i| self.hosts[i % self.hosts.len()].clone())
            .collect())
    }
}

struct LoggingStreamMgr;

impl StreamMgr for LoggingStreamMgr {
    fn cancel(&self, fragment_id: FragmentId) {
        tracing::info!(%fragment_id, "demo stream manager: cancel requested");
    }
}

/// Runs one synthetic query through `Exec`/`Wait`/`GetNext`/close, against the given
/// worker hosts, logging the outcome. Intended to be spawned once after the server
/// starts listening, so workers calling back into `UpdateFragmentExecStatus` can reach
/// this process.
pub async fn run_demo(
    registry: Arc<CoordinatorRegistry>,
    advertise_addr: HostAddr,
    dispatch_parallelism: usize,
    worker_hosts: Vec<HostAddr>,
) {
    let query_id = QueryId { hi: 1, lo: 0 };
    let client_cache = Arc::new(coord_rpc_client::ComputeClientPool::new());
    let coordinator = Arc::new(Coordinator::new(
        query_id,
        advertise_addr,
        dispatch_parallelism,
        DemoExecutor::new(3),
        Arc::new(ExecStats::default()),
        Arc::new(RoundRobinScheduler {
            hosts: worker_hosts.clone(),
        }),
        client_cache,
        Arc::new(LoggingStreamMgr),
    ));
    registry.register(coordinator.clone());

    let request = QueryExecRequest {
        fragments: vec![FragmentRequest::default(), FragmentRequest::default()],
        params: vec![
            vec![ExecParams {
                instance_index: 0,
                destinations: vec![],
                scan_ranges: vec![],
                payload: vec![],
            }],
            worker_hosts
                .iter()
                .enumerate()
                .map(|(i, _)| ExecParams {
                    instance_index: i,
                    destinations: vec![],
                    scan_ranges: vec![ScanRangeSet {
                        split_lengths: vec![1000],
                    }],
                    payload: vec![],
                })
                .collect(),
        ],
        data_locations: vec![DataLocationHint::default()],
    };

    if let Err(e) = coordinator.exec(request).await {
        tracing::error!(%query_id, error = %e, "demo query failed to dispatch");
        registry.unregister(query_id);
        return;
    }

    if let Err(e) = coordinator.wait().await {
        tracing::error!(%query_id, error = %e, "demo query failed to open");
        registry.unregister(query_id);
        return;
    }

    let mut total_rows = 0u64;
    loop {
        match coordinator.get_next().await {
            Ok(Some(batch)) => total_rows += batch.num_rows as u64,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(%query_id, error = %e, "demo query failed mid-stream");
                break;
            }
        }
    }

    tracing::info!(%query_id, total_rows, "demo query complete");
    registry.unregister(query_id);
}
