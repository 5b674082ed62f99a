//! Split-size distribution diagnostics, printed once after dispatch. The Rust
//! equivalent of `Coordinator::PrintBackendInfo`'s `boost::accumulators` usage, hand
//! rolled since there is no accumulator crate in this stack.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitSizeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

pub fn compute(sizes: &[u64]) -> Option<SplitSizeStats> {
    if sizes.is_empty() {
        return None;
    }
    let n = sizes.len() as f64;
    let min = *sizes.iter().min().unwrap() as f64;
    let max = *sizes.iter().max().unwrap() as f64;
    let mean = sizes.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = sizes
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some(SplitSizeStats {
        min,
        max,
        mean,
        stddev: variance.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_stats() {
        assert!(compute(&[]).is_none());
    }

    #[test]
    fn uniform_sizes_have_zero_stddev() {
        let stats = compute(&[10, 10, 10]).unwrap();
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.mean, 10.0);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn mixed_sizes() {
        let stats = compute(&[100, 200, 300]).unwrap();
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 300.0);
        assert_eq!(stats.mean, 200.0);
        assert!((stats.stddev - 81.64965809).abs() < 1e-4);
    }
}
