//! Generated wire types for the coordinator's RPC surface, plus conversions to/from the
//! in-process types in `coord-common`. Generated via `tonic-build`/`prost` from
//! `proto/coordinator.proto`, the same way the reference `risingwave_pb` crate is
//! generated from `proto/*.proto` and consumed by the frontend and rpc-client crates.

tonic::include_proto!("coordinator");

use coord_common::{CoordError, FragmentId, HostAddr, QueryId, RuntimeProfile, StickyStatus};

impl From<HostAddr> for HostAddress {
    fn from(addr: HostAddr) -> Self {
        HostAddress {
            host: addr.host,
            port: addr.port as u32,
        }
    }
}

impl From<HostAddress> for HostAddr {
    fn from(addr: HostAddress) -> Self {
        HostAddr {
            host: addr.host,
            port: addr.port as u16,
        }
    }
}

impl From<QueryId> for QueryIdProst {
    fn from(id: QueryId) -> Self {
        QueryIdProst { hi: id.hi, lo: id.lo }
    }
}

impl From<QueryIdProst> for QueryId {
    fn from(id: QueryIdProst) -> Self {
        QueryId { hi: id.hi, lo: id.lo }
    }
}

impl From<FragmentId> for FragmentIdProst {
    fn from(id: FragmentId) -> Self {
        FragmentIdProst { hi: id.hi, lo: id.lo }
    }
}

impl From<FragmentIdProst> for FragmentId {
    fn from(id: FragmentIdProst) -> Self {
        FragmentId { hi: id.hi, lo: id.lo }
    }
}

impl From<RuntimeProfile> for RuntimeProfileNode {
    fn from(p: RuntimeProfile) -> Self {
        RuntimeProfileNode {
            name: p.name,
            counters: p.counters.into_iter().collect(),
            children: p.children.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<RuntimeProfileNode> for RuntimeProfile {
    fn from(p: RuntimeProfileNode) -> Self {
        RuntimeProfile {
            name: p.name,
            counters: p.counters.into_iter().collect(),
            children: p.children.into_iter().map(Into::into).collect(),
        }
    }
}

/// Encodes a coordinator-side status into its wire form.
pub fn status_to_wire(status: &StickyStatus) -> TaskStatus {
    match status.error() {
        None => TaskStatus {
            status_code: StatusCode::Ok as i32,
            error_msgs: vec![],
        },
        Some(err) => {
            let (code, msg) = error_to_wire(err);
            TaskStatus {
                status_code: code as i32,
                error_msgs: vec![msg],
            }
        }
    }
}

fn error_to_wire(err: &CoordError) -> (StatusCode, String) {
    match err {
        CoordError::Transport(m) => (StatusCode::TransportError, m.clone()),
        CoordError::RemoteExec(m) => (StatusCode::RemoteExecError, m.clone()),
        CoordError::Internal(m) => (StatusCode::InternalError, m.clone()),
        CoordError::Cancelled(m) => (StatusCode::Cancelled, m.clone()),
        CoordError::Executor(m) => (StatusCode::ExecutorError, m.clone()),
    }
}

/// Decodes a wire status into a `CoordError`, or `None` if it represents OK.
pub fn wire_to_error(status: &TaskStatus) -> Option<CoordError> {
    let msg = status.error_msgs.join("; ");
    match StatusCode::from_i32(status.status_code).unwrap_or(StatusCode::InternalError) {
        StatusCode::Ok => None,
        StatusCode::TransportError => Some(CoordError::Transport(msg)),
        StatusCode::RemoteExecError => Some(CoordError::RemoteExec(msg)),
        StatusCode::InternalError => Some(CoordError::Internal(msg)),
        StatusCode::Cancelled => Some(CoordError::Cancelled(msg)),
        StatusCode::ExecutorError => Some(CoordError::Executor(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire() {
        let mut status = StickyStatus::default();
        status.record(CoordError::Transport("rpc failed".into()));
        let wire = status_to_wire(&status);
        assert_eq!(wire.status_code, StatusCode::TransportError as i32);
        let back = wire_to_error(&wire).unwrap();
        assert!(matches!(back, CoordError::Transport(m) if m == "rpc failed"));
    }

    #[test]
    fn ok_status_has_no_error() {
        let status = StickyStatus::default();
        let wire = status_to_wire(&status);
        assert!(wire_to_error(&wire).is_none());
    }
}
