//! Typed error model for the coordinator core.
//!
//! Mirrors the five error kinds named in the design: transport failures talking to a
//! backend, a backend reporting its own fragment as failed, coordinator-side invariant
//! violations, explicit cancellation, and local (root) fragment execution failure.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CoordError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote fragment execution failed: {0}")]
    RemoteExec(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("query cancelled: {0}")]
    Cancelled(String),

    #[error("local fragment execution failed: {0}")]
    Executor(String),
}

pub type CoordResult<T> = Result<T, CoordError>;

impl CoordError {
    /// Appends a secondary message to an existing error without discarding the error
    /// kind that first caused it. Used to implement the sticky-first-error-with-append
    /// composition rule for per-backend status.
    pub fn append_message(&mut self, msg: impl AsRef<str>) {
        let buf = match self {
            CoordError::Transport(m)
            | CoordError::RemoteExec(m)
            | CoordError::Internal(m)
            | CoordError::Cancelled(m)
            | CoordError::Executor(m) => m,
        };
        buf.push_str("; ");
        buf.push_str(msg.as_ref());
    }
}

impl From<CoordError> for tonic::Status {
    fn from(err: CoordError) -> Self {
        match err {
            CoordError::Transport(m) => tonic::Status::unavailable(m),
            CoordError::RemoteExec(m) => tonic::Status::aborted(m),
            CoordError::Internal(m) => tonic::Status::internal(m),
            CoordError::Cancelled(m) => tonic::Status::cancelled(m),
            CoordError::Executor(m) => tonic::Status::aborted(m),
        }
    }
}

/// Per-backend (or per-query) status cell implementing "sticky-first-error-with-append":
/// the first non-OK status wins the error kind, later failures are appended as
/// additional messages so root-cause visibility is preserved without losing secondary
/// evidence.
#[derive(Debug, Clone, Default)]
pub struct StickyStatus {
    error: Option<CoordError>,
}

impl StickyStatus {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Record a failure. Never transitions an already-failed status back to OK: this is
    /// the monotone-failure invariant, enforced here rather than merely asserted.
    pub fn record(&mut self, err: CoordError) {
        match &mut self.error {
            None => self.error = Some(err),
            Some(existing) => existing.append_message(err.to_string()),
        }
    }

    pub fn error(&self) -> Option<&CoordError> {
        self.error.as_ref()
    }

    pub fn into_result(self) -> CoordResult<()> {
        match self.error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_status_keeps_first_error_kind() {
        let mut status = StickyStatus::default();
        assert!(status.is_ok());
        status.record(CoordError::Transport("connection refused".into()));
        status.record(CoordError::Transport("second failure".into()));
        let err = status.error().unwrap();
        match err {
            CoordError::Transport(msg) => {
                assert!(msg.contains("connection refused"));
                assert!(msg.contains("second failure"));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn sticky_status_never_reverts_to_ok() {
        let mut status = StickyStatus::default();
        status.record(CoordError::Internal("boom".into()));
        assert!(!status.is_ok());
        // There is no API to clear an error; the type itself prevents regression.
        assert!(!status.is_ok());
    }
}
