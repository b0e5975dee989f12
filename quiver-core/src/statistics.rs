//! Named counters and timers for solver instrumentation.

use rustc_hash::FxHashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// A bag of named counters and accumulated timers.
///
/// Preprocessing passes, the rewriter cache and the quantifier bundles each
/// register their statistics here under a dotted prefix
/// (`preprocess::normalize::num_normalizations`, `quant::time_e_solver`, ...).
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    counters: FxHashMap<String, u64>,
    timers: FxHashMap<String, Duration>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to the named counter.
    pub fn add(&mut self, name: &str, n: u64) {
        *self.counters.entry(name.to_string()).or_default() += n;
    }

    /// Increment the named counter by one.
    pub fn incr(&mut self, name: &str) {
        self.add(name, 1);
    }

    /// Read a counter (zero if never touched).
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Accumulate elapsed time under the named timer.
    pub fn add_time(&mut self, name: &str, elapsed: Duration) {
        *self.timers.entry(name.to_string()).or_default() += elapsed;
    }

    /// Read an accumulated timer.
    pub fn time(&self, name: &str) -> Duration {
        self.timers.get(name).copied().unwrap_or_default()
    }

    /// Start a timer guard; the elapsed time is recorded on [`Timer::stop`].
    pub fn start(&self, name: &str) -> Timer {
        Timer {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Fold another statistics bag into this one.
    pub fn merge(&mut self, other: &Statistics) {
        for (k, v) in &other.counters {
            *self.counters.entry(k.clone()).or_default() += v;
        }
        for (k, v) in &other.timers {
            *self.timers.entry(k.clone()).or_default() += *v;
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counters: Vec<_> = self.counters.iter().collect();
        counters.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in counters {
            writeln!(f, "{name}: {value}")?;
        }
        let mut timers: Vec<_> = self.timers.iter().collect();
        timers.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in timers {
            writeln!(f, "{name}: {:.3}s", value.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Guard returned by [`Statistics::start`].
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Record the elapsed time into `stats`.
    pub fn stop(self, stats: &mut Statistics) {
        stats.add_time(&self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut stats = Statistics::new();
        stats.incr("rewrites");
        stats.add("rewrites", 4);
        assert_eq!(stats.get("rewrites"), 5);
        assert_eq!(stats.get("missing"), 0);
    }

    #[test]
    fn merge_folds_both_kinds() {
        let mut a = Statistics::new();
        a.incr("x");
        a.add_time("t", Duration::from_millis(5));
        let mut b = Statistics::new();
        b.add("x", 2);
        b.add_time("t", Duration::from_millis(7));
        a.merge(&b);
        assert_eq!(a.get("x"), 3);
        assert_eq!(a.time("t"), Duration::from_millis(12));
    }

    #[test]
    fn timer_records_on_stop() {
        let mut stats = Statistics::new();
        let timer = stats.start("phase");
        timer.stop(&mut stats);
        assert!(stats.time("phase") >= Duration::ZERO);
    }
}
