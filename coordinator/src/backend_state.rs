//! Per-backend remote execution state: the coordinator's flat, append-only table
//! indexed by `backend_num`.

use coord_common::{CoordError, FragmentId, HostAddr, RuntimeProfile, StickyStatus};
use tokio::sync::Mutex;

use crate::request::{ExecParams, FragmentRequest};

/// Mutable fields behind the per-record lock. Locked independently of the
/// coordinator's startup lock so `UpdateFragmentExecStatus` never has to take it.
#[derive(Debug, Default)]
pub(crate) struct BackendExecStateInner {
    pub status: StickyStatus,
    pub initiated: bool,
    pub done: bool,
    pub profile: Option<RuntimeProfile>,
}

/// A snapshot of one backend's state, safe to hand out past the lock.
#[derive(Debug, Clone)]
pub struct BackendExecStateSnapshot {
    pub backend_num: u32,
    pub fragment_id: FragmentId,
    pub host_port: HostAddr,
    pub total_split_size: u64,
    pub is_ok: bool,
    pub initiated: bool,
    pub done: bool,
    pub profile: Option<RuntimeProfile>,
}

pub struct BackendExecState {
    pub backend_num: u32,
    pub fragment_id: FragmentId,
    pub host_port: HostAddr,
    /// Sum of HDFS split lengths over `exec_params.scan_ranges[0]`; used only for the
    /// dispatch-time logging summary.
    pub total_split_size: u64,
    /// Copied at construction time rather than borrowed from the request (the safer
    /// design flagged as an open design note): Rust's ownership model makes a borrowed
    /// view awkward to null-out defensively, so the record simply owns its data.
    pub fragment_request: FragmentRequest,
    pub exec_params: ExecParams,
    pub(crate) inner: Mutex<BackendExecStateInner>,
}

impl BackendExecState {
    pub fn new(
        backend_num: u32,
        fragment_id: FragmentId,
        host_port: HostAddr,
        fragment_request: FragmentRequest,
        exec_params: ExecParams,
    ) -> Self {
        let total_split_size = exec_params.total_split_size();
        Self {
            backend_num,
            fragment_id,
            host_port,
            total_split_size,
            fragment_request,
            exec_params,
            inner: Mutex::new(BackendExecStateInner::default()),
        }
    }

    pub async fn snapshot(&self) -> BackendExecStateSnapshot {
        let inner = self.inner.lock().await;
        BackendExecStateSnapshot {
            backend_num: self.backend_num,
            fragment_id: self.fragment_id,
            host_port: self.host_port.clone(),
            total_split_size: self.total_split_size,
            is_ok: inner.status.is_ok(),
            initiated: inner.initiated,
            done: inner.done,
            profile: inner.profile.clone(),
        }
    }

    /// Records the outcome of this backend's `ExecPlanFragment` RPC. Marks `initiated`
    /// only on success, matching the invariant that Cancel must do nothing for a
    /// backend whose dispatch RPC never came back OK.
    pub(crate) async fn record_dispatch_result(&self, result: Result<(), CoordError>) {
        let mut inner = self.inner.lock().await;
        match result {
            Ok(()) => inner.initiated = true,
            Err(e) => inner.status.record(e),
        }
    }
}
