//! Core, transport-agnostic coordinator logic: the `Exec`/`Wait`/`GetNext`/`Cancel`
//! lifecycle, fragment dispatch, remote-state tracking, and status aggregation.
//!
//! This crate has no RPC framework dependency; it is driven by the traits in
//! [`collaborators`] and wired to a real transport by `coord-rpc-client` and
//! `coordinatord`.

pub mod backend_state;
pub mod collaborators;
pub mod coordinator;
pub mod request;
pub mod split_stats;

pub use backend_state::{BackendExecState, BackendExecStateSnapshot};
pub use collaborators::{
    BackendClient, ClientCache, ExecPlanFragmentArgs, ExecStats, PlanFragmentExecutor, RowBatch,
    Scheduler, StreamMgr,
};
pub use coordinator::Coordinator;
pub use request::{DataLocationHint, ExecParams, FragmentRequest, QueryExecRequest, ScanRangeSet};
