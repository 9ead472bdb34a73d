/// data model: conditions of a query, equilibrium state, sensitivity, restrictions
pub mod ChemicalState;
///errors of the exact and smart equilibrium solvers
pub mod EquilibriumErrors;
/// Gibbs free energy minimization with sensitivity of the solution
/// # Examples
/// ```
/// use SmartKiThe::Thermodynamics::ChemicalSystem::{
///     ChemicalSystem, IdealThermoModel, PhaseDefinition, PhaseKind, SpeciesData, R,
/// };
/// use SmartKiThe::Thermodynamics::ChemEquilibrium::ChemicalState::{Conditions, EquilibriumState};
/// use SmartKiThe::Thermodynamics::ChemEquilibrium::EquilibriumSolver::EquilibriumSolver;
/// use approx::assert_relative_eq;
/// // CO2 and CO over graphite at 1000 K
/// let system = ChemicalSystem::new(vec![
///     PhaseDefinition::new(
///         "gas",
///         PhaseKind::Gas,
///         vec![
///             SpeciesData::new("CO", -20.0 * R * 1000.0, 0.0),
///             SpeciesData::new("CO2", -47.0 * R * 1000.0, 0.0),
///             SpeciesData::new("O2", 0.0, 0.0),
///         ],
///     ),
///     PhaseDefinition::new(
///         "graphite",
///         PhaseKind::Condensed,
///         vec![SpeciesData::new("C(gr)", 0.0, 0.0).with_formula("C")],
///     ),
/// ])
/// .unwrap();
/// let model = IdealThermoModel::from_system(&system);
/// let solver = EquilibriumSolver::new(system.clone(), Box::new(model));
/// let conditions =
///     Conditions::from_element_amounts(&system, 1000.0, 101325.0, &[("C", 1.0), ("O", 1.5)])
///         .unwrap();
/// let outcome = solver
///     .solve_equilibrium(&conditions, &EquilibriumState::new(&system))
///     .unwrap();
/// assert!(outcome.converged);
/// outcome.state.pretty_print_state(&system);
/// let b = system.element_amounts(&outcome.state.n);
/// assert_relative_eq!(b[0], 1.0, epsilon = 1e-9);
/// assert_relative_eq!(b[1], 1.5, epsilon = 1e-9);
/// ```
pub mod EquilibriumSolver;
/// options of the smart solver and tunable policies of the cache
pub mod SmartOptions;
/// clusters of stored equilibrium solutions
pub mod ClusterIndex;
/// first order extrapolation of stored solutions
pub mod Predictor;
/// acceptance test of extrapolated states
pub mod AcceptanceCriterion;
/// equilibrium calculations with on-demand learning
pub mod SmartEquilibrium;
/// sequence of equilibria between two sets of conditions
pub mod EquilibriumPath;
