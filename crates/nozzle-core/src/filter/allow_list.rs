//! Fixed allow-list tables for value metrics.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

const REP_METRICS: &[&str] = &[
    "CapacityTotalContainers",
    "CapacityRemainingContainers",
    "CapacityTotalMemory",
    "CapacityRemainingMemory",
    "CapacityTotalDisk",
    "CapacityRemainingDisk",
    "ContainerCount",
    "RepBulkSyncDuration",
    "numCPUS",
    "numGoRoutines",
    "memoryStats.numBytesAllocated",
];

const GOROUTER_METRICS: &[&str] = &[
    "numCPUS",
    "numGoRoutines",
    "memoryStats.numBytesAllocated",
    "memoryStats.numBytesAllocatedHeap",
    "memoryStats.numBytesAllocatedStack",
    "ms_since_last_registry_update",
    "total_routes",
    "uptime",
];

/// Value-metric names permitted per origin in allow-list mode.
///
/// Read-only once built. Only the `rep` and `gorouter` origins have tables;
/// every other origin permits nothing.
#[derive(Debug)]
pub struct AllowList {
    by_origin: HashMap<&'static str, HashSet<&'static str>>,
}

static GLOBAL: OnceLock<AllowList> = OnceLock::new();

impl AllowList {
    fn build() -> Self {
        let by_origin = [("rep", REP_METRICS), ("gorouter", GOROUTER_METRICS)]
            .into_iter()
            .map(|(origin, names)| (origin, names.iter().copied().collect()))
            .collect();
        Self { by_origin }
    }

    /// Process-wide tables, built on first access.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::build)
    }

    pub fn permits(&self, origin: &str, name: &str) -> bool {
        !name.is_empty()
            && self
                .by_origin
                .get(origin)
                .is_some_and(|names| names.contains(name))
    }

    pub fn origins(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_origin.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rep_and_gorouter_have_tables() {
        let mut origins: Vec<_> = AllowList::global().origins().collect();
        origins.sort_unstable();
        assert_eq!(origins, vec!["gorouter", "rep"]);
    }

    #[test]
    fn names_are_scoped_per_origin() {
        let list = AllowList::global();
        assert!(list.permits("rep", "CapacityTotalContainers"));
        assert!(!list.permits("gorouter", "CapacityTotalContainers"));
        assert!(list.permits("gorouter", "total_routes"));
        assert!(!list.permits("rep", "total_routes"));
    }

    #[test]
    fn empty_name_is_never_permitted() {
        assert!(!AllowList::global().permits("rep", ""));
    }

    #[test]
    fn concurrent_first_access_sees_one_instance() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| std::ptr::from_ref(AllowList::global()) as usize))
            .collect();
        let addrs: HashSet<usize> = handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect();
        assert_eq!(addrs.len(), 1);
    }
}
