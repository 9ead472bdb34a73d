//! # Kinetics with fast equilibrium
//!
//! Operator splitting of a slow kinetic process and fast chemical equilibrium. The slow process is a
//! black box (`RateLaw`) giving the rate of change of the amounts of elements of the equilibrium
//! system (feed, outflow, exchange with a slow phase...). Every time step:
//! 1) the amounts of elements are advanced by the explicit Euler method and clipped at zero;
//! 2) the temperature follows the linear heating program T(t) = T0 + β*t;
//! 3) the equilibrium at the new conditions is computed by the smart equilibrium solver.
//!
//! Successive steps are close to each other, so most of them are answered by the cache of the smart
//! solver and only a few need the Gibbs energy minimization.
//!
//! ## Example Usage
//! ```
//! use SmartKiThe::Kinetics::SmartKinetics::{KineticsOptions, SmartKinetics};
//! use SmartKiThe::Thermodynamics::ChemicalSystem::{
//!     ChemicalSystem, IdealThermoModel, PhaseDefinition, PhaseKind, SpeciesData,
//! };
//! use SmartKiThe::Thermodynamics::ChemEquilibrium::ChemicalState::{Conditions, EquilibriumState};
//! use SmartKiThe::Thermodynamics::ChemEquilibrium::SmartEquilibrium::SmartEquilibriumSolver;
//! use SmartKiThe::Thermodynamics::ChemEquilibrium::SmartOptions::SmartEquilibriumOptions;
//! use nalgebra::DVector;
//! let system = ChemicalSystem::new(vec![PhaseDefinition::new(
//!     "gas",
//!     PhaseKind::Gas,
//!     vec![SpeciesData::new("C", 0.0, 0.0), SpeciesData::new("C2", -20_000.0, 0.0)],
//! )])
//! .unwrap();
//! let solver = SmartEquilibriumSolver::from_system(
//!     system.clone(),
//!     Box::new(IdealThermoModel::from_system(&system)),
//!     SmartEquilibriumOptions::default(),
//! )
//! .unwrap();
//! // constant feed of carbon
//! let feed = |_t: f64, _c: &Conditions, _s: &EquilibriumState| DVector::from_vec(vec![0.01]);
//! let options = KineticsOptions { t0: 0.0, t_end: 1.0, steps: 10, heating_rate: 0.0 };
//! let mut kinetics = SmartKinetics::new(solver, feed, options).unwrap();
//! let initial = Conditions::from_element_amounts(&system, 1000.0, 101325.0, &[("C", 1.0)]).unwrap();
//! let result = kinetics.integrate(&initial, &mut EquilibriumState::new(&system)).unwrap();
//! assert_eq!(result.steps.len(), 11);
//! assert!(result.cached_steps > 0);
//! ```
use crate::Thermodynamics::ChemEquilibrium::ChemicalState::{Conditions, EquilibriumState};
use crate::Thermodynamics::ChemEquilibrium::EquilibriumErrors::SmartEquilibriumError;
use crate::Thermodynamics::ChemEquilibrium::EquilibriumSolver::{EquilibriumSolver, ExactSolver};
use crate::Thermodynamics::ChemEquilibrium::SmartEquilibrium::SmartEquilibriumSolver;
use log::info;
use nalgebra::DVector;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};

/// rate of change of the amounts of elements db/dt, mol/s
pub trait RateLaw {
    fn rate(&self, t: f64, conditions: &Conditions, state: &EquilibriumState) -> DVector<f64>;
}

impl<F> RateLaw for F
where
    F: Fn(f64, &Conditions, &EquilibriumState) -> DVector<f64>,
{
    fn rate(&self, t: f64, conditions: &Conditions, state: &EquilibriumState) -> DVector<f64> {
        self(t, conditions, state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KineticsOptions {
    pub t0: f64,
    pub t_end: f64,
    pub steps: usize,
    /// β in T(t) = T0 + β*t, K/s
    pub heating_rate: f64,
}

impl Default for KineticsOptions {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t_end: 1.0,
            steps: 100,
            heating_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KineticStep {
    pub t: f64,
    pub conditions: Conditions,
    pub state: EquilibriumState,
    pub used_cache: bool,
}

#[derive(Debug, Clone, Default)]
pub struct KineticsResult {
    pub steps: Vec<KineticStep>,
    pub cached_steps: usize,
    pub exact_steps: usize,
}

impl KineticsResult {
    pub fn pretty_print(&self) {
        let mut table = Table::new();
        table.add_row(row!["t, s", "T, K", "total amount, mol", "equilibrium"]);
        for step in &self.steps {
            table.add_row(row![
                format!("{:.4}", step.t),
                format!("{:.2}", step.conditions.T),
                format!("{:.6e}", step.state.total_amount()),
                if step.used_cache { "cache" } else { "exact" }
            ]);
        }
        table.printstd();
        println!(
            "steps answered by the cache: {}, exact solves: {}",
            self.cached_steps, self.exact_steps
        );
    }
}

pub struct SmartKinetics<R: RateLaw, S: ExactSolver = EquilibriumSolver> {
    pub solver: SmartEquilibriumSolver<S>,
    rate_law: R,
    pub options: KineticsOptions,
}

impl<R: RateLaw, S: ExactSolver> SmartKinetics<R, S> {
    pub fn new(
        solver: SmartEquilibriumSolver<S>,
        rate_law: R,
        options: KineticsOptions,
    ) -> Result<Self, SmartEquilibriumError> {
        if options.steps == 0 || !(options.t_end > options.t0) {
            return Err(SmartEquilibriumError::Config(format!(
                "kinetics needs t_end > t0 and at least one step, got t0 = {}, t_end = {}, steps = {}",
                options.t0, options.t_end, options.steps
            )));
        }
        Ok(Self {
            solver,
            rate_law,
            options,
        })
    }

    /// Integrates from the initial conditions; `state` is the initial guess of the first
    /// equilibrium and holds the last equilibrium on return
    #[allow(non_snake_case)]
    pub fn integrate(
        &mut self,
        initial: &Conditions,
        state: &mut EquilibriumState,
    ) -> Result<KineticsResult, SmartEquilibriumError> {
        let dt = (self.options.t_end - self.options.t0) / self.options.steps as f64;
        let T0 = initial.T;
        let mut conditions = initial.clone();
        let mut result = KineticsResult::default();
        let mut t = self.options.t0;
        for i in 0..=self.options.steps {
            if i > 0 {
                let rate = self.rate_law.rate(t, &conditions, state);
                if rate.len() != conditions.b.len() {
                    return Err(SmartEquilibriumError::MatrixDimensionMismatch(format!(
                        "rate law returned {} rates for {} elements",
                        rate.len(),
                        conditions.b.len()
                    )));
                }
                conditions.b = (&conditions.b + rate * dt).map(|b_k| b_k.max(0.0));
                t = self.options.t0 + i as f64 * dt;
                conditions.T = T0 + self.options.heating_rate * (t - self.options.t0);
            }
            let step = self.solver.solve(state, &conditions)?;
            if step.used_cache {
                result.cached_steps += 1;
            } else {
                result.exact_steps += 1;
            }
            result.steps.push(KineticStep {
                t,
                conditions: conditions.clone(),
                state: state.clone(),
                used_cache: step.used_cache,
            });
        }
        info!(
            "kinetics finished: {} steps, {} from the cache, {} exact",
            result.steps.len(),
            result.cached_steps,
            result.exact_steps
        );
        Ok(result)
    }
}
