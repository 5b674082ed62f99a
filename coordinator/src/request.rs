//! Input data model for `Exec`: the compiled query plus the scheduling hints needed to
//! place remote fragments.

use coord_common::HostAddr;

/// One fragment of the compiled plan. The plan representation itself is out of scope
/// for the coordinator core, so it is carried as an opaque payload produced by the
/// (external) planner/serializer.
#[derive(Debug, Clone, Default)]
pub struct FragmentRequest {
    pub payload: Vec<u8>,
}

/// A contiguous slice of input data assigned to one scan instance; only its length
/// matters to the coordinator, for the split-size diagnostic summary.
#[derive(Debug, Clone, Default)]
pub struct ScanRangeSet {
    pub split_lengths: Vec<u64>,
}

/// Per-instance execution parameters for one fragment, i.e. `p_i,j` in the spec.
#[derive(Debug, Clone, Default)]
pub struct ExecParams {
    pub instance_index: usize,
    /// Data-stream sink(s) this instance's output is routed to. The dispatcher
    /// rewrites this for every direct child of the root fragment to point back at the
    /// coordinator.
    pub destinations: Vec<HostAddr>,
    pub scan_ranges: Vec<ScanRangeSet>,
    /// Opaque per-instance parameters (predicates pushed down, literal bind values,
    /// etc.), produced by the planner.
    pub payload: Vec<u8>,
}

impl ExecParams {
    /// Sum of split lengths in `scan_ranges[0]`, or 0 if there are none. Used only for
    /// the dispatch-time logging summary, never for scheduling decisions.
    pub fn total_split_size(&self) -> u64 {
        self.scan_ranges
            .first()
            .map(|ranges| ranges.split_lengths.iter().sum())
            .unwrap_or(0)
    }
}

/// An opaque hint describing where a fragment's input data lives, handed to the
/// scheduler to resolve into concrete hosts. Host discovery internals are out of scope.
#[derive(Debug, Clone, Default)]
pub struct DataLocationHint {
    pub payload: Vec<u8>,
}

/// The input to `Coordinator::exec`.
///
/// - `fragments[0]` is the coordinator (root) fragment.
/// - `fragments[i]` may receive data from `fragments[j]` for `j > i`.
/// - `params[i]` is the parallel list of per-instance parameters for `fragments[i]`;
///   `params[0]` must have exactly one element.
/// - `data_locations[i]` is consumed by the scheduler to place `fragments[i + 1]`.
#[derive(Debug, Clone, Default)]
pub struct QueryExecRequest {
    pub fragments: Vec<FragmentRequest>,
    pub params: Vec<Vec<ExecParams>>,
    pub data_locations: Vec<DataLocationHint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_split_size_sums_first_scan_range_set() {
        let params = ExecParams {
            scan_ranges: vec![ScanRangeSet {
                split_lengths: vec![100, 200, 300],
            }],
            ..Default::default()
        };
        assert_eq!(params.total_split_size(), 600);
    }

    #[test]
    fn total_split_size_is_zero_without_scan_ranges() {
        let params = ExecParams::default();
        assert_eq!(params.total_split_size(), 0);
    }
}
