//! # Cache of equilibrium solutions
//!
//! Solved equilibria are stored as immutable records (conditions, state, sensitivity and the set of
//! present species) grouped into clusters by a classification key of their conditions. A query is
//! only compared with the records of its own cluster and the nearest one is returned.
//! Clusters are append-only; a full cluster drops one record (the oldest or the least recently used)
//! before accepting a new one.
use super::ChemicalState::{Conditions, EquilibriumState, Sensitivity};
use super::EquilibriumErrors::SmartEquilibriumError;
use super::SmartOptions::{
    ClassificationKey, ClusterKey, ClusterKeyPolicy, DistanceMetric, EvictionPolicy,
    SmartEquilibriumOptions,
};
use log::debug;
use prettytable::{Table, row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Index shared between solver instances: searches take the read lock, inserts the write lock
pub type SharedClusterIndex = Arc<RwLock<ClusterIndex>>;

/// converged exact solution with its sensitivity
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub conditions: Conditions,
    pub state: EquilibriumState,
    pub sensitivity: Sensitivity,
    /// species with amount above the active threshold
    pub active_mask: Vec<bool>,
}

impl CacheRecord {
    pub fn new(
        conditions: Conditions,
        state: EquilibriumState,
        sensitivity: Sensitivity,
        active_threshold: f64,
    ) -> Self {
        let active_mask = state.active_mask(active_threshold);
        Self {
            conditions,
            state,
            sensitivity,
            active_mask,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    record: Arc<CacheRecord>,
    /// insertion number
    inserted: u64,
    /// value of the index clock at the last insert or accepted prediction
    last_used: AtomicU64,
}

#[derive(Debug, Default)]
struct Cluster {
    entries: Vec<CacheEntry>,
}

/// nearest record of the query's cluster
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: Arc<CacheRecord>,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterIndexStatistics {
    pub clusters: usize,
    pub records: usize,
    pub evictions: usize,
}

#[derive(Debug)]
pub struct ClusterIndex {
    clusters: HashMap<ClusterKey, Cluster>,
    cluster_key: ClusterKeyPolicy,
    distance_metric: DistanceMetric,
    eviction_policy: EvictionPolicy,
    capacity: usize,
    search_radius: Option<f64>,
    next_insert: u64,
    clock: AtomicU64,
    evictions: usize,
    /// numbers of elements and species of the records, fixed by the first owner or record
    dimensions: Option<(usize, usize)>,
}

impl ClusterIndex {
    pub fn new(options: &SmartEquilibriumOptions) -> Self {
        Self {
            clusters: HashMap::new(),
            cluster_key: options.cluster_key.clone(),
            distance_metric: options.distance_metric,
            eviction_policy: options.eviction_policy,
            capacity: options.cluster_capacity.max(1),
            search_radius: options.search_radius,
            next_insert: 0,
            clock: AtomicU64::new(0),
            evictions: 0,
            dimensions: None,
        }
    }
    /// index for a system with the given numbers of elements and species
    pub fn with_dimensions(mut self, num_elements: usize, num_species: usize) -> Self {
        self.dimensions = Some((num_elements, num_species));
        self
    }
    pub fn shared(options: &SmartEquilibriumOptions) -> SharedClusterIndex {
        Self::new(options).into_shared()
    }
    pub fn into_shared(self) -> SharedClusterIndex {
        Arc::new(RwLock::new(self))
    }
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.dimensions
    }
    /// Checks that the index holds records of a system with the given numbers of elements and
    /// species; an index without records or owner is bound to these numbers
    pub fn bind_dimensions(
        &mut self,
        num_elements: usize,
        num_species: usize,
    ) -> Result<(), SmartEquilibriumError> {
        match self.dimensions {
            None => {
                self.dimensions = Some((num_elements, num_species));
                Ok(())
            }
            Some(dimensions) if dimensions == (num_elements, num_species) => Ok(()),
            Some((elements, species)) => Err(SmartEquilibriumError::Config(format!(
                "cluster index holds systems of {} elements and {} species, not {} and {}",
                elements, species, num_elements, num_species
            ))),
        }
    }

    pub fn key_of(&self, conditions: &Conditions) -> ClusterKey {
        self.cluster_key.classify(conditions)
    }
    pub fn distance_metric(&self) -> DistanceMetric {
        self.distance_metric
    }

    /// Nearest record in the cluster of the query, None if the cluster is absent or empty or the
    /// nearest record is outside the search radius. The LRU clock is not touched: a hit becomes
    /// "used" only when its prediction is accepted (see `touch`)
    pub fn search(&self, conditions: &Conditions) -> Option<SearchHit> {
        if let Some((num_elements, _)) = self.dimensions {
            if conditions.b.len() != num_elements {
                return None;
            }
        }
        let key = self.key_of(conditions);
        let cluster = self.clusters.get(&key)?;
        let (entry, distance) = cluster
            .entries
            .iter()
            .map(|entry| {
                (
                    entry,
                    self.distance_metric
                        .distance(conditions, &entry.record.conditions),
                )
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        if let Some(radius) = self.search_radius {
            if distance > radius {
                debug!(
                    "nearest record of cluster {:?} is at distance {} > {}",
                    key, distance, radius
                );
                return None;
            }
        }
        Some(SearchHit {
            record: Arc::clone(&entry.record),
            distance,
        })
    }

    /// marks the record as used now; records no longer stored are ignored
    pub fn touch(&self, record: &Arc<CacheRecord>) {
        let key = self.key_of(&record.conditions);
        if let Some(entry) = self
            .clusters
            .get(&key)
            .and_then(|cluster| cluster.entries.iter().find(|e| Arc::ptr_eq(&e.record, record)))
        {
            entry
                .last_used
                .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        }
    }

    /// Stores the record in its cluster; returns the record evicted to make room, if any
    pub fn insert(&mut self, record: CacheRecord) -> Option<Arc<CacheRecord>> {
        if self.dimensions.is_none() {
            self.dimensions = Some((record.conditions.b.len(), record.state.n.len()));
        }
        let key = self.key_of(&record.conditions);
        let capacity = self.capacity;
        let policy = self.eviction_policy;
        let entry = CacheEntry {
            record: Arc::new(record),
            inserted: self.next_insert,
            last_used: AtomicU64::new(self.clock.fetch_add(1, Ordering::Relaxed)),
        };
        self.next_insert += 1;
        let cluster = self.clusters.entry(key.clone()).or_default();
        let mut evicted = None;
        if cluster.entries.len() >= capacity {
            let victim = match policy {
                EvictionPolicy::OldestFirst => cluster
                    .entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.inserted)
                    .map(|(i, _)| i),
                EvictionPolicy::LeastRecentlyUsed => cluster
                    .entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                    .map(|(i, _)| i),
            };
            if let Some(i) = victim {
                evicted = Some(cluster.entries.remove(i).record);
                self.evictions += 1;
                debug!("cluster {:?} is full, one record evicted ({:?})", key, policy);
            }
        }
        cluster.entries.push(entry);
        evicted
    }

    /// records of the cluster of the given conditions in insertion order
    pub fn cluster_records(&self, conditions: &Conditions) -> Vec<Arc<CacheRecord>> {
        self.clusters
            .get(&self.key_of(conditions))
            .map(|c| c.entries.iter().map(|e| Arc::clone(&e.record)).collect())
            .unwrap_or_default()
    }
    pub fn len(&self) -> usize {
        self.clusters.values().map(|c| c.entries.len()).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }
    pub fn statistics(&self) -> ClusterIndexStatistics {
        ClusterIndexStatistics {
            clusters: self.num_clusters(),
            records: self.len(),
            evictions: self.evictions,
        }
    }
    pub fn reset(&mut self) {
        self.clusters.clear();
        self.next_insert = 0;
        self.clock.store(0, Ordering::Relaxed);
        self.evictions = 0;
    }

    pub fn pretty_print_clusters(&self) {
        let mut table = Table::new();
        table.add_row(row!["cluster key", "records"]);
        let mut keys: Vec<&ClusterKey> = self.clusters.keys().collect();
        keys.sort();
        for key in keys {
            table.add_row(row![format!("{:?}", key), self.clusters[key].entries.len()]);
        }
        table.printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use std::thread;

    fn record(T: f64, b: Vec<f64>) -> CacheRecord {
        let conditions = Conditions::new(T, 1e5, DVector::from_vec(b));
        let mut state = EquilibriumState {
            T,
            P: 1e5,
            n: DVector::zeros(2),
            y: DVector::zeros(2),
            z: DVector::zeros(2),
        };
        state.n[0] = conditions.b[0];
        CacheRecord::new(conditions, state, Sensitivity::zeros(2, 2), 1e-10)
    }
    fn query(T: f64, b: Vec<f64>) -> Conditions {
        Conditions::new(T, 1e5, DVector::from_vec(b))
    }

    #[test]
    fn test_search_returns_nearest_of_cluster() {
        let mut index = ClusterIndex::new(&SmartEquilibriumOptions::default());
        assert!(index.search(&query(1000.0, vec![1.0, 0.0])).is_none());
        index.insert(record(1000.0, vec![1.0, 0.0]));
        index.insert(record(1500.0, vec![1.0, 0.0]));
        index.insert(record(1000.0, vec![0.0, 1.0]));
        assert_eq!(index.num_clusters(), 2);
        assert_eq!(index.len(), 3);

        let hit = index.search(&query(1400.0, vec![2.0, 0.0])).unwrap();
        assert_eq!(hit.record.conditions.T, 1500.0);
        // other cluster is never consulted
        let hit = index.search(&query(1000.0, vec![0.0, 3.0])).unwrap();
        assert_eq!(hit.record.conditions.b[1], 1.0);
        assert!(index.search(&query(1000.0, vec![1.0, 1.0])).is_none());
    }

    #[test]
    fn test_search_radius() {
        let options = SmartEquilibriumOptions {
            search_radius: Some(0.05),
            ..SmartEquilibriumOptions::default()
        };
        let mut index = ClusterIndex::new(&options);
        index.insert(record(1000.0, vec![1.0, 0.0]));
        assert!(index.search(&query(1010.0, vec![1.0, 0.0])).is_some());
        assert!(index.search(&query(1200.0, vec![1.0, 0.0])).is_none());
    }

    #[test]
    fn test_oldest_first_eviction_bound() {
        let capacity = 4;
        let extra = 3;
        let options = SmartEquilibriumOptions {
            cluster_capacity: capacity,
            ..SmartEquilibriumOptions::default()
        };
        let mut index = ClusterIndex::new(&options);
        let mut evicted = Vec::new();
        for i in 0..capacity + extra {
            if let Some(r) = index.insert(record(1000.0 + i as f64, vec![1.0, 0.0])) {
                evicted.push(r.conditions.T);
            }
        }
        assert_eq!(index.len(), capacity);
        assert_eq!(evicted, vec![1000.0, 1001.0, 1002.0]);
        let remaining: Vec<f64> = index
            .cluster_records(&query(1000.0, vec![1.0, 0.0]))
            .iter()
            .map(|r| r.conditions.T)
            .collect();
        assert_eq!(remaining, vec![1003.0, 1004.0, 1005.0, 1006.0]);
        assert_eq!(index.statistics().evictions, extra);
    }

    #[test]
    fn test_least_recently_used_eviction() {
        let options = SmartEquilibriumOptions {
            cluster_capacity: 2,
            eviction_policy: EvictionPolicy::LeastRecentlyUsed,
            ..SmartEquilibriumOptions::default()
        };
        let mut index = ClusterIndex::new(&options);
        index.insert(record(1000.0, vec![1.0, 0.0]));
        index.insert(record(2000.0, vec![1.0, 0.0]));
        // a search alone does not count as use
        let hit = index.search(&query(1001.0, vec![1.0, 0.0])).unwrap();
        assert_eq!(hit.record.conditions.T, 1000.0);
        let mut untouched = ClusterIndex::new(&options);
        untouched.insert(record(1000.0, vec![1.0, 0.0]));
        untouched.insert(record(2000.0, vec![1.0, 0.0]));
        untouched.search(&query(1001.0, vec![1.0, 0.0])).unwrap();
        let evicted_unused = untouched.insert(record(3000.0, vec![1.0, 0.0])).unwrap();
        assert_eq!(evicted_unused.conditions.T, 1000.0);
        // the older record is used, so the newer one is the least recently used
        index.touch(&hit.record);
        let evicted = index.insert(record(3000.0, vec![1.0, 0.0])).unwrap();
        assert_eq!(evicted.conditions.T, 2000.0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_dimensions_are_bound() {
        let mut index = ClusterIndex::new(&SmartEquilibriumOptions::default());
        assert_eq!(index.dimensions(), None);
        index.insert(record(1000.0, vec![1.0, 0.0]));
        assert_eq!(index.dimensions(), Some((2, 2)));
        assert!(index.bind_dimensions(2, 2).is_ok());
        assert!(matches!(
            index.bind_dimensions(3, 2),
            Err(SmartEquilibriumError::Config(_))
        ));
        // queries of another shape never reach the records
        assert!(index.search(&query(1000.0, vec![1.0, 0.0, 0.0])).is_none());

        let mut fresh = ClusterIndex::new(&SmartEquilibriumOptions::default()).with_dimensions(1, 4);
        assert!(fresh.bind_dimensions(2, 2).is_err());
        assert!(fresh.bind_dimensions(1, 4).is_ok());
    }

    #[test]
    fn test_reset() {
        let mut index = ClusterIndex::new(&SmartEquilibriumOptions::default());
        index.insert(record(1000.0, vec![1.0, 0.0]));
        index.reset();
        assert!(index.is_empty());
        assert_eq!(index.statistics(), ClusterIndexStatistics::default());
    }

    #[test]
    fn test_shared_index_concurrent_search() {
        let shared = ClusterIndex::shared(&SmartEquilibriumOptions::default());
        shared
            .write()
            .unwrap()
            .insert(record(1000.0, vec![1.0, 0.0]));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let index = Arc::clone(&shared);
                thread::spawn(move || {
                    let guard = index.read().unwrap();
                    guard
                        .search(&query(1000.0 + i as f64, vec![1.0, 0.0]))
                        .map(|hit| hit.record.conditions.T)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(1000.0));
        }
    }
}
