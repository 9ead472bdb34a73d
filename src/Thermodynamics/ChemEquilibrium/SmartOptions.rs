//! Options of the smart equilibrium solver: tolerances of the acceptance test, organization of the
//! cache (classification of queries into clusters, distance between queries, eviction) and the
//! options of the exact solver used on cache misses.
use super::ChemicalState::Conditions;
use super::EquilibriumErrors::SmartEquilibriumError;
use super::EquilibriumSolver::EquilibriumOptions;
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

/// classification key of a cluster
pub type ClusterKey = Vec<i64>;

#[enum_dispatch]
pub trait ClassificationKey {
    /// key of the cluster where the conditions (and the record solved at them) belong
    fn classify(&self, conditions: &Conditions) -> ClusterKey;
}

/// Direction of the vector of element amounts b/Σb rounded to `resolution` parts:
/// compositions with proportional amounts of elements share the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedDirectionKey {
    pub resolution: u32,
}

impl ClassificationKey for QuantizedDirectionKey {
    fn classify(&self, conditions: &Conditions) -> ClusterKey {
        let total = conditions.b.sum();
        let resolution = self.resolution.max(1) as f64;
        conditions
            .b
            .iter()
            .map(|b_k| {
                if total > 0.0 {
                    (resolution * b_k / total).round() as i64
                } else {
                    0
                }
            })
            .collect()
    }
}

/// Set of present elements (b_k > 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportSetKey;

impl ClassificationKey for SupportSetKey {
    fn classify(&self, conditions: &Conditions) -> ClusterKey {
        conditions
            .support()
            .into_iter()
            .map(|present| present as i64)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[enum_dispatch(ClassificationKey)]
pub enum ClusterKeyPolicy {
    QuantizedDirection(QuantizedDirectionKey),
    SupportSet(SupportSetKey),
}

impl Default for ClusterKeyPolicy {
    fn default() -> Self {
        ClusterKeyPolicy::QuantizedDirection(QuantizedDirectionKey { resolution: 10 })
    }
}

/// distance between two queries, also the norm of the prediction step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// sqrt((ΔT/T_ref)² + (ΔP/P_ref)² + (|Δb|/|b_ref|)²)
    #[default]
    Relative,
    /// |w - w_ref| with w = [T, P, b]
    Euclidean,
}

impl DistanceMetric {
    #[allow(non_snake_case)]
    pub fn distance(&self, query: &Conditions, reference: &Conditions) -> f64 {
        match self {
            DistanceMetric::Relative => {
                let dT = (query.T - reference.T) / reference.T;
                let dP = (query.P - reference.P) / reference.P;
                let norm_b = reference.b.norm();
                let db = (&query.b - &reference.b).norm();
                let db = if norm_b > 0.0 { db / norm_b } else { db };
                (dT * dT + dP * dP + db * db).sqrt()
            }
            DistanceMetric::Euclidean => (query.as_vector() - reference.as_vector()).norm(),
        }
    }
}

/// which record leaves a full cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    #[default]
    OldestFirst,
    LeastRecentlyUsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartEquilibriumOptions {
    /// |r_k| <= absolute_tolerance for every element
    pub absolute_tolerance: f64,
    /// |r_k| <= relative_tolerance * b_k for elements with b_k > absolute_tolerance
    pub relative_tolerance: f64,
    /// maximal norm of the prediction step; None disables the check
    pub trust_region_radius: Option<f64>,
    /// records farther than this from the query are not used; None means the nearest record in the cluster
    pub search_radius: Option<f64>,
    pub cluster_capacity: usize,
    pub eviction_policy: EvictionPolicy,
    pub cluster_key: ClusterKeyPolicy,
    pub distance_metric: DistanceMetric,
    /// predicted amounts below -amount_floor are a bound violation
    pub amount_floor: f64,
    /// species with amount above the threshold are present
    pub active_threshold: f64,
    /// when false every query is solved exactly and nothing is stored
    pub learning: bool,
    pub exact: EquilibriumOptions,
}

impl Default for SmartEquilibriumOptions {
    fn default() -> Self {
        Self {
            absolute_tolerance: 1e-5,
            relative_tolerance: 1e-3,
            trust_region_radius: Some(0.1),
            search_radius: None,
            cluster_capacity: 64,
            eviction_policy: EvictionPolicy::OldestFirst,
            cluster_key: ClusterKeyPolicy::default(),
            distance_metric: DistanceMetric::Relative,
            amount_floor: 1e-12,
            active_threshold: 1e-10,
            learning: true,
            exact: EquilibriumOptions::default(),
        }
    }
}

impl SmartEquilibriumOptions {
    pub fn validate(&self) -> Result<(), SmartEquilibriumError> {
        let non_negative = [
            ("absolute_tolerance", self.absolute_tolerance),
            ("relative_tolerance", self.relative_tolerance),
            ("amount_floor", self.amount_floor),
            ("active_threshold", self.active_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SmartEquilibriumError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        for (name, radius) in [
            ("trust_region_radius", self.trust_region_radius),
            ("search_radius", self.search_radius),
        ] {
            if let Some(radius) = radius {
                if !radius.is_finite() || radius < 0.0 {
                    return Err(SmartEquilibriumError::Config(format!(
                        "{} must be a non-negative number, got {}",
                        name, radius
                    )));
                }
            }
        }
        if self.cluster_capacity == 0 {
            return Err(SmartEquilibriumError::Config(
                "cluster_capacity must be positive".to_string(),
            ));
        }
        if self.exact.tolerance <= 0.0 || self.exact.max_iterations == 0 {
            return Err(SmartEquilibriumError::Config(
                "exact solver needs a positive tolerance and iteration limit".to_string(),
            ));
        }
        Ok(())
    }
}
