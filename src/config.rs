//! Process-wide configuration (spec.md §5 "Configuration", §6 reordering
//! hooks). Grounded on the teacher's `base.rs` style default-bearing
//! config structs; unlike the teacher (which reads package-wide statics
//! directly), every value here is threaded explicitly through
//! [`crate::sylvan::Sylvan`] instead of living in a global.
use std::time::Duration;

/// Top-level engine limits, set once at [`crate::sylvan::Sylvan::init`].
#[derive(Debug, Clone, Copy)]
pub struct SylvanConfig {
    /// Soft cap on combined unique-table + cache memory.
    pub memory_bytes: usize,
    /// Fraction of `memory_bytes` given to the operation cache; the rest
    /// goes to the unique table.
    pub ratio: f64,
    /// `log2` of the unique table's initial size.
    pub initial_shift: u32,
    /// Worker count for the fork/join runtime. `0` means "one per core"
    /// (the teacher's `num_cpus::get()` convention).
    pub threads: usize,
}

impl Default for SylvanConfig {
    fn default() -> Self {
        SylvanConfig { memory_bytes: 1 << 30, ratio: 0.25, initial_shift: 16, threads: 0 }
    }
}

impl SylvanConfig {
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 { num_cpus::get() } else { self.threads }
    }

    pub fn table_size(&self) -> usize { 1usize << self.initial_shift }

    /// Cache gets `ratio` of the byte budget, sized down to the nearest
    /// power of two of 64-byte slots (an [`crate::opcache::OpCache`] slot).
    pub fn cache_size(&self) -> usize {
        let budget = (self.memory_bytes as f64 * self.ratio) as usize;
        let slots = (budget / 64).max(1);
        slots.next_power_of_two()
    }
}

/// Which sifting variant `reorder::sift` should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderType {
    /// Classic: every variable visits every level once.
    Sift,
    /// Stop sliding a variable past a level once the reachable set has
    /// grown beyond `max_growth` times its size at the best position
    /// found so far.
    BoundedSift,
}

/// Field list matches spec.md's reordering-hooks config verbatim.
#[derive(Debug, Clone, Copy)]
pub struct ReorderConfig {
    /// Skip levels with fewer than this many nodes.
    pub threshold: usize,
    /// For `BoundedSift`: abandon a trial position once size exceeds
    /// this multiple of the best seen so far.
    pub max_growth: f64,
    /// Cap on swaps performed in one `sift` call.
    pub max_swap: usize,
    /// Cap on variables visited in one `sift` call.
    pub max_var: usize,
    /// Wall-clock budget for one `sift` call.
    pub time_limit_ms: u64,
    pub reorder_type: ReorderType,
    /// Re-trigger automatic reordering only once the forest has grown
    /// past this many nodes since the last run.
    pub size_threshold: usize,
    pub print_stat: bool,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        ReorderConfig {
            threshold: 1,
            max_growth: 1.2,
            max_swap: usize::MAX,
            max_var: usize::MAX,
            time_limit_ms: u64::MAX,
            reorder_type: ReorderType::Sift,
            size_threshold: 0,
            print_stat: false,
        }
    }
}

impl ReorderConfig {
    pub fn time_limit(&self) -> Duration { Duration::from_millis(self.time_limit_ms) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sylvan_config_defaults_split_budget() {
        let c = SylvanConfig::default();
        assert!(c.cache_size().is_power_of_two());
        assert!(c.table_size() > 0);
    }

    #[test]
    fn test_resolved_threads_falls_back_to_num_cpus() {
        let c = SylvanConfig { threads: 4, ..SylvanConfig::default() };
        assert_eq!(c.resolved_threads(), 4);
        let auto = SylvanConfig { threads: 0, ..SylvanConfig::default() };
        assert!(auto.resolved_threads() >= 1);
    }

    #[test]
    fn test_reorder_config_defaults() {
        let r = ReorderConfig::default();
        assert_eq!(r.reorder_type, ReorderType::Sift);
        assert!(!r.print_stat);
    }
}
