/// elements, species, phases, formula matrix and the thermodynamic model of a chemical system
pub mod ChemicalSystem;
/// module for chemical equilibrium: exact Gibbs energy minimization and smart equilibrium with on-demand learning
pub mod ChemEquilibrium;
