//! 128-bit query and fragment identifiers.

use crate::error::{CoordError, CoordResult};

/// Fragment ids derived from a `QueryId` must keep `lo` below this bound; see
/// [`QueryId::check_capacity`].
pub const MAX_LO: u64 = 1u64 << 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId {
    pub hi: u64,
    pub lo: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId {
    pub hi: u64,
    pub lo: u64,
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}:{:016x}", self.hi, self.lo)
    }
}

impl std::fmt::Display for FragmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}:{:016x}", self.hi, self.lo)
    }
}

impl QueryId {
    /// The fragment id of the coordinator (root) fragment: the query id itself.
    pub fn coordinator_fragment_id(&self) -> FragmentId {
        FragmentId {
            hi: self.hi,
            lo: self.lo,
        }
    }

    /// The fragment id of the `backend_num`-th remote backend (`backend_num` is
    /// 0-based, dense, assigned in dispatch order).
    pub fn fragment_id_for_backend(&self, backend_num: u32) -> FragmentId {
        FragmentId {
            hi: self.hi,
            lo: self.lo + backend_num as u64 + 1,
        }
    }

    /// Precondition check: `query.lo + num_backends < 2^63`. Violation is a precondition
    /// failure, not a recoverable runtime condition elsewhere in the system, but we
    /// return a typed error here so callers (`Exec`) can reject cleanly instead of
    /// silently wrapping.
    pub fn check_capacity(&self, num_backends: usize) -> CoordResult<()> {
        let n = num_backends as u64;
        let overflows = match self.lo.checked_add(n) {
            Some(sum) => sum >= MAX_LO,
            None => true,
        };
        if overflows {
            return Err(CoordError::Internal(format!(
                "query {self}: lo ({}) + num_backends ({n}) would reach or exceed 2^63",
                self.lo
            )));
        }
        Ok(())
    }
}
