//! Standalone reference worker binary, for exercising `coordinatord` against a real
//! process rather than in-process fakes. Not part of the coordinator core; this is the
//! harness the testable properties in the design are meant to be checked against.

use clap::Parser;
use coord_common::logging::init_logging;
use coord_pb::backend_exec_service_server::BackendExecServiceServer;
use coord_worker::{BackendExecServiceImpl, WorkerState};
use tonic::transport::Server;

#[derive(Parser, Debug)]
#[command(name = "coord-worker")]
struct WorkerOpts {
    #[arg(long, env = "WORKER_LISTEN_ADDR", default_value = "127.0.0.1:7090")]
    listen_addr: String,

    #[arg(long, env = "WORKER_VERBOSE_LEVEL", default_value_t = 0)]
    verbose_level: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = WorkerOpts::parse();
    init_logging(opts.verbose_level);
    tracing::info!(?opts, "starting reference worker");

    let addr = opts.listen_addr.parse()?;
    let state = WorkerState::new();
    let service = BackendExecServiceImpl::new(state);

    Server::builder()
        .add_service(BackendExecServiceServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}
