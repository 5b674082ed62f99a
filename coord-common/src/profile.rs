//! Runtime profile tree: a hierarchical counter/timer tree, merged once at fragment
//! completion (incremental merge is explicitly out of scope).

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeProfile {
    pub name: String,
    pub counters: Vec<(String, i64)>,
    pub children: Vec<RuntimeProfile>,
}

impl RuntimeProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counters: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: RuntimeProfile) {
        self.children.push(child);
    }

    pub fn add_counter(&mut self, name: &str, delta: i64) {
        if let Some((_, v)) = self.counters.iter_mut().find(|(n, _)| n == name) {
            *v += delta;
        } else {
            self.counters.push((name.to_string(), delta));
        }
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Human-readable dump, used for the verbose-mode cumulative profile printed at
    /// end-of-stream and the per-backend profile printed on receipt.
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        self.pretty_print_indent(&mut out, 0);
        out
    }

    fn pretty_print_indent(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        out.push_str(&format!("{pad}{}:\n", self.name));
        for (k, v) in &self.counters {
            out.push_str(&format!("{pad}  {k}: {v}\n"));
        }
        for c in &self.children {
            c.pretty_print_indent(out, depth + 1);
        }
    }
}

/// Thread-safe handle to a query's root profile. `UpdateFragmentExecStatus` attaches
/// child profiles from an RPC-server thread while `GetNext` attaches the local
/// fragment's profile from the caller's thread; both go through this lock rather than
/// leaving attachment unsynchronized.
#[derive(Clone)]
pub struct SharedProfile(Arc<Mutex<RuntimeProfile>>);

impl SharedProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(RuntimeProfile::new(name))))
    }

    pub fn add_child(&self, child: RuntimeProfile) {
        self.0.lock().add_child(child);
    }

    pub fn add_counter(&self, name: &str, delta: i64) {
        self.0.lock().add_counter(name, delta);
    }

    pub fn snapshot(&self) -> RuntimeProfile {
        self.0.lock().clone()
    }

    pub fn pretty_print(&self) -> String {
        self.0.lock().pretty_print()
    }
}

pub const TOTAL_TIME_COUNTER: &str = "TotalTime";

/// Scoped timer accumulating elapsed wall time (nanoseconds) into a named counter on
/// drop, the Rust equivalent of `COUNTER_SCOPED_TIMER`.
pub struct ScopedTimer {
    profile: SharedProfile,
    counter: &'static str,
    start: Instant,
}

impl ScopedTimer {
    pub fn start(profile: SharedProfile, counter: &'static str) -> Self {
        Self {
            profile,
            counter,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed_ns = self.start.elapsed().as_nanos() as i64;
        self.profile.add_counter(self.counter, elapsed_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attaches_children_and_counts() {
        let root = SharedProfile::new("Query(id=test)");
        let mut child = RuntimeProfile::new("Fragment(0)");
        child.add_counter("RowsReturned", 42);
        root.add_child(child);
        let snap = root.snapshot();
        assert_eq!(snap.children.len(), 1);
        assert_eq!(snap.children[0].counter("RowsReturned"), Some(42));
    }

    #[test]
    fn scoped_timer_accumulates_on_drop() {
        let root = SharedProfile::new("Query(id=test)");
        {
            let _timer = ScopedTimer::start(root.clone(), TOTAL_TIME_COUNTER);
        }
        let snap = root.snapshot();
        assert!(snap.counter(TOTAL_TIME_COUNTER).unwrap() >= 0);
    }
}
