//! # Smart equilibrium solver
//!
//! Equilibrium calculations with on-demand learning. Every query is classified into a cluster of
//! stored solutions, the nearest stored solution is extrapolated to the query with its sensitivity
//! and the extrapolation is checked (bounds, set of present species, mass balance, trust region).
//! An accepted prediction costs one matrix-vector product. A rejected one, or a query without stored
//! neighbours, is solved by the exact Gibbs energy minimizer and the new solution is stored.
//!
//! The control flow of one query is a closed state machine:
//! ```text
//! Search -> Predict -> Validate -> Accept -> Done
//!    |                    |
//!    +--------------------+-> ExactSolve -> Learn -> Done
//! ```
//! # Example
//! ```
//! use SmartKiThe::Thermodynamics::ChemicalSystem::{
//!     ChemicalSystem, IdealThermoModel, PhaseDefinition, PhaseKind, SpeciesData,
//! };
//! use SmartKiThe::Thermodynamics::ChemEquilibrium::ChemicalState::{Conditions, EquilibriumState};
//! use SmartKiThe::Thermodynamics::ChemEquilibrium::SmartEquilibrium::SmartEquilibriumSolver;
//! use SmartKiThe::Thermodynamics::ChemEquilibrium::SmartOptions::SmartEquilibriumOptions;
//! let system = ChemicalSystem::new(vec![PhaseDefinition::new(
//!     "gas",
//!     PhaseKind::Gas,
//!     vec![
//!         SpeciesData::new("C", 0.0, 0.0),
//!         SpeciesData::new("C2", -20_000.0, 0.0),
//!     ],
//! )])
//! .unwrap();
//! let model = IdealThermoModel::from_system(&system);
//! let mut solver =
//!     SmartEquilibriumSolver::from_system(system.clone(), Box::new(model), SmartEquilibriumOptions::default())
//!         .unwrap();
//! let mut state = EquilibriumState::new(&system);
//! let first = Conditions::from_element_amounts(&system, 1000.0, 101325.0, &[("C", 1.0)]).unwrap();
//! let result = solver.solve(&mut state, &first).unwrap();
//! assert!(result.exact_solve_invoked);
//! let second = Conditions::from_element_amounts(&system, 1001.0, 101325.0, &[("C", 1.0)]).unwrap();
//! let result = solver.solve(&mut state, &second).unwrap();
//! assert!(result.used_cache);
//! ```
use super::AcceptanceCriterion::{RejectionReason, accept, clamp_amounts};
use super::ChemicalState::{Conditions, EquilibriumRestrictions, EquilibriumState};
use super::ClusterIndex::{CacheRecord, ClusterIndex, SearchHit, SharedClusterIndex};
use super::EquilibriumErrors::SmartEquilibriumError;
use super::EquilibriumSolver::{EquilibriumSolver, ExactSolveOutcome, ExactSolver};
use super::Predictor::{Prediction, predict};
use super::SmartOptions::SmartEquilibriumOptions;
use crate::Thermodynamics::ChemicalSystem::{ChemicalSystem, ThermoModel};
use log::{debug, info, warn};
use prettytable::{Table, row};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

/// what happened with one query
#[derive(Debug, Clone, PartialEq)]
pub struct SmartEquilibriumResult {
    /// the returned state is an accepted prediction
    pub used_cache: bool,
    pub exact_solve_invoked: bool,
    /// iterations of the exact solver, 0 for accepted predictions
    pub iterations: usize,
    /// why the prediction was rejected
    pub rejection: Option<RejectionReason>,
    /// norm of the prediction step, if a prediction was made
    pub step_norm: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmartEquilibriumStatistics {
    pub queries: usize,
    pub cache_hits: usize,
    pub exact_solves: usize,
    pub learned: usize,
    pub evictions: usize,
    /// rejected predictions by kind of rejection
    pub rejections: BTreeMap<String, usize>,
}

impl SmartEquilibriumStatistics {
    pub fn hit_rate(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.queries as f64
        }
    }
}

/// states of the query state machine
#[derive(Debug)]
pub enum SmartStep {
    Search,
    Predict(SearchHit),
    Validate {
        record: Arc<CacheRecord>,
        prediction: Prediction,
    },
    Accept {
        record: Arc<CacheRecord>,
        prediction: Prediction,
    },
    ExactSolve {
        rejection: Option<RejectionReason>,
        step_norm: Option<f64>,
    },
    Learn {
        outcome: ExactSolveOutcome,
        rejection: Option<RejectionReason>,
        step_norm: Option<f64>,
    },
    Done(SmartEquilibriumResult),
}

pub struct SmartEquilibriumSolver<S: ExactSolver = EquilibriumSolver> {
    exact: S,
    index: SharedClusterIndex,
    options: SmartEquilibriumOptions,
    statistics: SmartEquilibriumStatistics,
}

impl SmartEquilibriumSolver<EquilibriumSolver> {
    /// smart solver over the Gibbs energy minimizer of the system
    pub fn from_system(
        system: ChemicalSystem,
        model: Box<dyn ThermoModel>,
        options: SmartEquilibriumOptions,
    ) -> Result<Self, SmartEquilibriumError> {
        Self::from_system_with_restrictions(system, model, EquilibriumRestrictions::new(), options)
    }
    pub fn from_system_with_restrictions(
        system: ChemicalSystem,
        model: Box<dyn ThermoModel>,
        restrictions: EquilibriumRestrictions,
        options: SmartEquilibriumOptions,
    ) -> Result<Self, SmartEquilibriumError> {
        let exact = EquilibriumSolver::new(system, model)
            .with_restrictions(restrictions)
            .with_options(options.exact.clone());
        Self::new(exact, options)
    }
}

impl<S: ExactSolver> SmartEquilibriumSolver<S> {
    /// solver with its own empty index
    pub fn new(exact: S, options: SmartEquilibriumOptions) -> Result<Self, SmartEquilibriumError> {
        options.validate()?;
        let system = exact.system();
        let index = ClusterIndex::new(&options)
            .with_dimensions(system.num_elements(), system.num_species())
            .into_shared();
        Ok(Self {
            exact,
            index,
            options,
            statistics: SmartEquilibriumStatistics::default(),
        })
    }
    /// solver learning into (and predicting from) an index shared with other solvers;
    /// the clustering, distance and eviction policies are those the index was created with.
    /// The index must hold records of a system with as many elements and species as `exact`
    pub fn with_shared_index(
        exact: S,
        options: SmartEquilibriumOptions,
        index: SharedClusterIndex,
    ) -> Result<Self, SmartEquilibriumError> {
        options.validate()?;
        {
            let system = exact.system();
            let mut guard = index.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.bind_dimensions(system.num_elements(), system.num_species())?;
        }
        Ok(Self {
            exact,
            index,
            options,
            statistics: SmartEquilibriumStatistics::default(),
        })
    }

    pub fn options(&self) -> &SmartEquilibriumOptions {
        &self.options
    }
    pub fn statistics(&self) -> &SmartEquilibriumStatistics {
        &self.statistics
    }
    pub fn index(&self) -> SharedClusterIndex {
        Arc::clone(&self.index)
    }
    pub fn system(&self) -> &ChemicalSystem {
        self.exact.system()
    }
    pub fn exact_solver(&self) -> &S {
        &self.exact
    }
    /// switches learning on and off; without learning every query is solved exactly
    pub fn set_learning(&mut self, learning: bool) {
        self.options.learning = learning;
    }

    fn read_index(&self) -> RwLockReadGuard<'_, ClusterIndex> {
        self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
    fn write_index(&self) -> RwLockWriteGuard<'_, ClusterIndex> {
        self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Equilibrium at the conditions. On success `state` holds the equilibrium state (all amounts
    /// non-negative); on an exact solve the incoming `state` is the initial guess
    pub fn solve(
        &mut self,
        state: &mut EquilibriumState,
        conditions: &Conditions,
    ) -> Result<SmartEquilibriumResult, SmartEquilibriumError> {
        conditions.validate(self.exact.system(), self.exact.restrictions())?;
        self.statistics.queries += 1;
        let mut step = if self.options.learning {
            SmartStep::Search
        } else {
            SmartStep::ExactSolve {
                rejection: None,
                step_norm: None,
            }
        };
        loop {
            step = match step {
                SmartStep::Search => match self.read_index().search(conditions) {
                    Some(hit) => SmartStep::Predict(hit),
                    None => {
                        debug!("no stored equilibrium near T = {}, b = {:?}", conditions.T, conditions.b.as_slice());
                        SmartStep::ExactSolve {
                            rejection: None,
                            step_norm: None,
                        }
                    }
                },
                SmartStep::Predict(hit) => {
                    let prediction = predict(
                        &hit.record,
                        conditions,
                        self.exact.system(),
                        self.options.distance_metric,
                    );
                    SmartStep::Validate {
                        record: hit.record,
                        prediction,
                    }
                }
                SmartStep::Validate { record, prediction } => match accept(
                    &prediction,
                    conditions,
                    &record,
                    &self.exact.system().formula_matrix,
                    &self.options,
                ) {
                    Ok(()) => SmartStep::Accept { record, prediction },
                    Err(reason) => {
                        debug!("prediction rejected: {}", reason);
                        *self
                            .statistics
                            .rejections
                            .entry(reason.kind().to_string())
                            .or_insert(0) += 1;
                        SmartStep::ExactSolve {
                            rejection: Some(reason),
                            step_norm: Some(prediction.step_norm),
                        }
                    }
                },
                SmartStep::Accept {
                    record,
                    mut prediction,
                } => {
                    self.read_index().touch(&record);
                    clamp_amounts(&mut prediction.state);
                    let step_norm = prediction.step_norm;
                    *state = prediction.state;
                    self.statistics.cache_hits += 1;
                    SmartStep::Done(SmartEquilibriumResult {
                        used_cache: true,
                        exact_solve_invoked: false,
                        iterations: 0,
                        rejection: None,
                        step_norm: Some(step_norm),
                    })
                }
                SmartStep::ExactSolve {
                    rejection,
                    step_norm,
                } => {
                    self.statistics.exact_solves += 1;
                    let outcome = match self.exact.solve(conditions, state) {
                        Ok(outcome) => outcome,
                        Err(
                            error @ (SmartEquilibriumError::InvalidConditions(_)
                            | SmartEquilibriumError::ExactSolveDivergence { .. }),
                        ) => return Err(error),
                        // numerical failures of the exact tier
                        Err(error) => {
                            warn!("exact equilibrium solve failed: {}", error);
                            return Err(SmartEquilibriumError::ExactSolveDivergence {
                                iterations: 0,
                                residual: f64::INFINITY,
                            });
                        }
                    };
                    if !outcome.converged {
                        return Err(SmartEquilibriumError::ExactSolveDivergence {
                            iterations: outcome.iterations,
                            residual: outcome.residual,
                        });
                    }
                    SmartStep::Learn {
                        outcome,
                        rejection,
                        step_norm,
                    }
                }
                SmartStep::Learn {
                    outcome,
                    rejection,
                    step_norm,
                } => {
                    let iterations = outcome.iterations;
                    if self.options.learning {
                        let record = CacheRecord::new(
                            conditions.clone(),
                            outcome.state.clone(),
                            outcome.sensitivity,
                            self.options.active_threshold,
                        );
                        let evicted = self.write_index().insert(record);
                        if evicted.is_some() {
                            self.statistics.evictions += 1;
                        }
                        self.statistics.learned += 1;
                        info!(
                            "learned equilibrium at T = {}, P = {}, b = {:?}",
                            conditions.T,
                            conditions.P,
                            conditions.b.as_slice()
                        );
                    }
                    *state = outcome.state;
                    SmartStep::Done(SmartEquilibriumResult {
                        used_cache: false,
                        exact_solve_invoked: true,
                        iterations,
                        rejection,
                        step_norm,
                    })
                }
                SmartStep::Done(result) => return Ok(result),
            };
        }
    }

    /// forgets all stored solutions (of a shared index too) and the statistics
    pub fn reset(&mut self) {
        self.write_index().reset();
        self.statistics = SmartEquilibriumStatistics::default();
        info!("smart equilibrium cache cleared");
    }

    pub fn pretty_print_statistics(&self) {
        let index = self.read_index().statistics();
        let mut table = Table::new();
        table.add_row(row!["quantity", "value"]);
        table.add_row(row!["queries", self.statistics.queries]);
        table.add_row(row!["accepted predictions", self.statistics.cache_hits]);
        table.add_row(row!["exact solves", self.statistics.exact_solves]);
        table.add_row(row!["learned records", self.statistics.learned]);
        table.add_row(row!["hit rate", format!("{:.3}", self.statistics.hit_rate())]);
        for (kind, count) in &self.statistics.rejections {
            table.add_row(row![format!("rejected: {}", kind), count]);
        }
        table.add_row(row!["clusters", index.clusters]);
        table.add_row(row!["stored records", index.records]);
        table.add_row(row!["evictions", index.evictions]);
        table.printstd();
    }
}
