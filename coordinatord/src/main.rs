//! The coordinator daemon binary: parses options, validates them, binds the gRPC
//! server exposing `CoordinatorExecService`, and optionally runs one demo query against
//! a configured set of `coord-worker` hosts. Modeled on `compute/src/lib.rs`'s
//! `start()` in the reference crate.

mod demo;
mod registry;
mod service;

use clap::Parser;
use coord_common::config::{validate_opts, CoordinatorOpts};
use coord_common::logging::init_logging;
use coord_common::HostAddr;
use coord_pb::coordinator_exec_service_server::CoordinatorExecServiceServer;
use registry::CoordinatorRegistry;
use service::CoordinatorExecServiceImpl;
use tonic::transport::Server;

#[derive(Parser, Debug)]
#[command(name = "coordinatord")]
struct DaemonOpts {
    #[command(flatten)]
    base: CoordinatorOpts,

    /// Comma-separated `host:port` list of `coord-worker` processes to dispatch one
    /// demo query against after the server starts. Empty disables demo mode.
    #[arg(long, env = "COORD_DEMO_WORKERS", value_delimiter = ',', default_value = "")]
    demo_workers: Vec<String>,
}

fn parse_host_addr(s: &str) -> anyhow::Result<HostAddr> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid host:port '{s}'"))?;
    Ok(HostAddr::new(host.to_string(), port.parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut opts = DaemonOpts::parse();
    opts.base.load_overlay()?;
    init_logging(opts.base.verbose_level);
    tracing::info!(?opts, "options");
    validate_opts(&opts.base);

    let registry = CoordinatorRegistry::new();
    let service = CoordinatorExecServiceImpl::new(registry.clone());
    let addr = opts.base.listen_addr.parse()?;

    let demo_workers: Vec<String> = opts
        .demo_workers
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    if !demo_workers.is_empty() {
        let worker_hosts = demo_workers
            .iter()
            .map(|s| parse_host_addr(s))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let advertise_addr = parse_host_addr(&opts.base.resolved_advertise_addr())?;
        let dispatch_parallelism = opts.base.dispatch_parallelism;
        let demo_registry = registry.clone();
        tokio::spawn(async move {
            demo::run_demo(demo_registry, advertise_addr, dispatch_parallelism, worker_hosts).await;
        });
    }

    tracing::info!("server listening at {}", addr);
    Server::builder()
        .add_service(CoordinatorExecServiceServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}
