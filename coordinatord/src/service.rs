//! `CoordinatorExecService` server impl: the RPC surface workers call back into. Mirrors
//! the reference `StreamServiceImpl`'s shape — deserialize, delegate to the owning
//! object, map the typed error into a `tonic::Status`.

use std::sync::Arc;

use coord_common::QueryId;
use coord_pb::coordinator_exec_service_server::CoordinatorExecService;
use coord_pb::{
    status_to_wire, UpdateFragmentExecStatusRequest, UpdateFragmentExecStatusResponse,
};
use tonic::{Request, Response, Status};

use crate::registry::CoordinatorRegistry;

pub struct CoordinatorExecServiceImpl {
    registry: Arc<CoordinatorRegistry>,
}

impl CoordinatorExecServiceImpl {
    pub fn new(registry: Arc<CoordinatorRegistry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl CoordinatorExecService for CoordinatorExecServiceImpl {
    async fn update_fragment_exec_status(
        &self,
        request: Request<UpdateFragmentExecStatusRequest>,
    ) -> Result<Response<UpdateFragmentExecStatusResponse>, Status> {
        let req = request.into_inner();
        let query_id: QueryId = req
            .query_id
            .ok_or_else(|| Status::invalid_argument("missing query_id"))?
            .into();

        let coordinator = self.registry.get(query_id).ok_or_else(|| {
            Status::not_found(format!("no in-flight coordinator for query {query_id}"))
        })?;

        let status = req.status.and_then(|s| coord_pb::wire_to_error(&s));
        let profile = req.profile.map(Into::into).unwrap_or_default();

        coordinator
            .update_fragment_exec_status(req.backend_num, status, req.done, profile)
            .await
            .map_err(|e| {
                tracing::error!(%query_id, error = %e, "failed to apply UpdateFragmentExecStatus");
                Status::from(e)
            })?;

        Ok(Response::new(UpdateFragmentExecStatusResponse {
            status: Some(status_to_wire(&coord_common::StickyStatus::default())),
        }))
    }
}
