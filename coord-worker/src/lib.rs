//! A reference backend: implements `BackendExecService` by simulating fragment
//! execution and reporting completion back to the coordinator via
//! `CoordinatorExecService::UpdateFragmentExecStatus`. Modeled on the same
//! accept-then-report-async shape as `ExecPlanFragment` in the original design: the RPC
//! handler only acknowledges that the fragment was accepted, the real outcome is
//! reported later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coord_common::{FragmentId, QueryId};
use coord_pb::backend_exec_service_server::BackendExecService;
use coord_pb::coordinator_exec_service_client::CoordinatorExecServiceClient;
use coord_pb::{
    CancelPlanFragmentRequest, CancelPlanFragmentResponse, ExecPlanFragmentRequest,
    ExecPlanFragmentResponse, RuntimeProfileNode, TaskStatus, UpdateFragmentExecStatusRequest,
};
use dashmap::DashMap;
use rand::Rng;
use tonic::{Request, Response, Status};

/// Per-fragment cancellation flag, the worker-side analogue of the coordinator's
/// `BackendExecState`. Removed once the fragment reports done.
#[derive(Default)]
pub struct WorkerState {
    cancelled: DashMap<FragmentId, Arc<AtomicBool>>,
}

impl WorkerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub struct BackendExecServiceImpl {
    state: Arc<WorkerState>,
    /// Simulated per-row processing delay range, used only by the reference
    /// implementation to produce a realistic-looking execution timeline.
    min_exec_delay: Duration,
    max_exec_delay: Duration,
}

impl BackendExecServiceImpl {
    pub fn new(state: Arc<WorkerState>) -> Self {
        Self {
            state,
            min_exec_delay: Duration::from_millis(5),
            max_exec_delay: Duration::from_millis(50),
        }
    }
}

#[tonic::async_trait]
impl BackendExecService for BackendExecServiceImpl {
    async fn exec_plan_fragment(
        &self,
        request: Request<ExecPlanFragmentRequest>,
    ) -> Result<Response<ExecPlanFragmentResponse>, Status> {
        let req = request.into_inner();
        let query_id: QueryId = req
            .query_id
            .clone()
            .ok_or_else(|| Status::invalid_argument("missing query_id"))?
            .into();
        let fragment_id: FragmentId = req
            .fragment_id
            .clone()
            .ok_or_else(|| Status::invalid_argument("missing fragment_id"))?
            .into();
        let coord_addr = req
            .coord
            .clone()
            .ok_or_else(|| Status::invalid_argument("missing coord"))?;

        tracing::info!(%fragment_id, backend_num = req.backend_num, "accepted ExecPlanFragment");

        let cancelled = Arc::new(AtomicBool::new(false));
        self.state.cancelled.insert(fragment_id, cancelled.clone());

        let backend_num = req.backend_num;
        let delay_range = (self.min_exec_delay, self.max_exec_delay);
        tokio::spawn(async move {
            run_fragment(
                query_id,
                fragment_id,
                backend_num,
                coord_addr,
                cancelled,
                delay_range,
            )
            .await;
        });

        Ok(Response::new(ExecPlanFragmentResponse { status: None }))
    }

    async fn cancel_plan_fragment(
        &self,
        request: Request<CancelPlanFragmentRequest>,
    ) -> Result<Response<CancelPlanFragmentResponse>, Status> {
        let req = request.into_inner();
        let fragment_id: FragmentId = req
            .fragment_id
            .ok_or_else(|| Status::invalid_argument("missing fragment_id"))?
            .into();

        tracing::info!(%fragment_id, "received CancelPlanFragment");
        if let Some(flag) = self.state.cancelled.get(&fragment_id) {
            flag.store(true, Ordering::SeqCst);
        }

        Ok(Response::new(CancelPlanFragmentResponse { status: None }))
    }
}

async fn run_fragment(
    query_id: QueryId,
    fragment_id: FragmentId,
    backend_num: u32,
    coord: coord_pb::HostAddress,
    cancelled: Arc<AtomicBool>,
    (min_delay, max_delay): (Duration, Duration),
) {
    let delay_ms = {
        let mut rng = rand::thread_rng();
        rng.gen_range(min_delay.as_millis() as u64..=max_delay.as_millis() as u64)
    };
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let status = if cancelled.load(Ordering::SeqCst) {
        Some(TaskStatus {
            status_code: coord_pb::StatusCode::Cancelled as i32,
            error_msgs: vec![format!("fragment {fragment_id} cancelled")],
        })
    } else {
        None
    };

    let profile = RuntimeProfileNode {
        name: format!("Fragment(backend={backend_num})"),
        counters: Default::default(),
        children: Vec::new(),
    };

    if let Err(e) = report_status(query_id, coord, backend_num, status, true, profile).await {
        tracing::warn!(%fragment_id, error = %e, "failed to report fragment completion");
    }
}

async fn report_status(
    query_id: QueryId,
    coord: coord_pb::HostAddress,
    backend_num: u32,
    status: Option<TaskStatus>,
    done: bool,
    profile: RuntimeProfileNode,
) -> anyhow::Result<()> {
    let endpoint = format!("http://{}:{}", coord.host, coord.port);
    let mut client = CoordinatorExecServiceClient::connect(endpoint).await?;
    client
        .update_fragment_exec_status(UpdateFragmentExecStatusRequest {
            query_id: Some(coord_pb::QueryIdProst::from(query_id)),
            backend_num,
            status,
            done,
            profile: Some(profile),
        })
        .await?;
    Ok(())
}
