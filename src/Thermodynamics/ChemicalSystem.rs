//! # Chemical system
//!
//! Minimal topology of a chemical system consumed by the equilibrium solvers:
//! elements, species, phases and the formula matrix `A` (rows are elements,
//! columns are species) so that the element amounts of a composition `n` are `b = A n`.
//!
//! Thermodynamic properties are reached only through the [`ThermoModel`] trait; the
//! crate ships [`IdealThermoModel`] which uses constant enthalpy and entropy of formation
//! `μ°/RT = (dH - T*dS)/(R*T)`.
use crate::Kinetics::molmass::{FormulaError, calculate_molar_mass, create_elem_composition_matrix};
use nalgebra::{DMatrix, DVector};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// universal gas constant, J/(mol*K)
pub const R: f64 = 8.314;
/// reference pressure of the standard state, Pa
pub const P_REF: f64 = 101325.0;

/// errors of construction of a chemical system
#[derive(Debug, Error)]
pub enum ChemicalSystemError {
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("phase '{0}' contains no species")]
    EmptyPhase(String),
    #[error("species '{0}' is defined more than once")]
    DuplicateSpecies(String),
    #[error("unknown species '{0}'")]
    UnknownSpecies(String),
    #[error("unknown element '{0}'")]
    UnknownElement(String),
    #[error("the system contains no species")]
    EmptySystem,
}

/// Kind of a phase: ideal gas mixture, ideal condensed solution or pure condensed substance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    Gas,
    Solution,
    Condensed,
}

/// user data of one species: name, formula, enthalpy (J/mol) and entropy (J/mol/K) of formation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct SpeciesData {
    pub name: String,
    /// formula if it differs from the name
    #[serde(default)]
    pub formula: Option<String>,
    pub dH: f64,
    pub dS: f64,
}

impl SpeciesData {
    #[allow(non_snake_case)]
    pub fn new(name: &str, dH: f64, dS: f64) -> Self {
        Self {
            name: name.to_string(),
            formula: None,
            dH,
            dS,
        }
    }
    pub fn with_formula(mut self, formula: &str) -> Self {
        self.formula = Some(formula.to_string());
        self
    }
}

/// user definition of a phase. A Condensed definition with several species is split into pure phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub name: String,
    pub kind: PhaseKind,
    pub species: Vec<SpeciesData>,
}

impl PhaseDefinition {
    pub fn new(name: &str, kind: PhaseKind, species: Vec<SpeciesData>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            species,
        }
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct Species {
    pub name: String,
    pub formula: String,
    /// index of the phase
    pub phase: usize,
    pub dH: f64,
    pub dS: f64,
    /// g/mol
    pub molar_mass: f64,
}

#[derive(Debug, Clone)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
    /// indices of species of the phase
    pub species: Vec<usize>,
}

/// elements, species, phases and formula matrix of the system
#[derive(Debug, Clone)]
pub struct ChemicalSystem {
    pub elements: Vec<String>,
    pub species: Vec<Species>,
    pub phases: Vec<Phase>,
    /// matrix of elements composition of substances, where rows are elements and columns are substances
    pub formula_matrix: DMatrix<f64>,
}

impl ChemicalSystem {
    pub fn new(definitions: Vec<PhaseDefinition>) -> Result<Self, ChemicalSystemError> {
        let mut species: Vec<Species> = Vec::new();
        let mut phases: Vec<Phase> = Vec::new();
        let mut names: HashSet<String> = HashSet::new();
        for definition in definitions {
            if definition.species.is_empty() {
                return Err(ChemicalSystemError::EmptyPhase(definition.name));
            }
            // every pure condensed substance is a phase of its own
            let groups: Vec<(String, Vec<SpeciesData>)> = match definition.kind {
                PhaseKind::Condensed => definition
                    .species
                    .into_iter()
                    .map(|s| (s.name.clone(), vec![s]))
                    .collect(),
                _ => vec![(definition.name, definition.species)],
            };
            for (phase_name, phase_species) in groups {
                let mut indices = Vec::with_capacity(phase_species.len());
                for data in phase_species {
                    if !names.insert(data.name.clone()) {
                        return Err(ChemicalSystemError::DuplicateSpecies(data.name));
                    }
                    let formula = data.formula.clone().unwrap_or_else(|| data.name.clone());
                    let (molar_mass, _) = calculate_molar_mass(&formula, None)?;
                    indices.push(species.len());
                    species.push(Species {
                        name: data.name,
                        formula,
                        phase: phases.len(),
                        dH: data.dH,
                        dS: data.dS,
                        molar_mass,
                    });
                }
                phases.push(Phase {
                    name: phase_name,
                    kind: definition.kind,
                    species: indices,
                });
            }
        }
        if species.is_empty() {
            return Err(ChemicalSystemError::EmptySystem);
        }
        let formulae: Vec<&str> = species.iter().map(|s| s.formula.as_str()).collect();
        let (formula_matrix, elements) = create_elem_composition_matrix(&formulae, None)?;
        Ok(Self {
            elements,
            species,
            phases,
            formula_matrix,
        })
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }
    pub fn num_phases(&self) -> usize {
        self.phases.len()
    }
    pub fn species_index(&self, name: &str) -> Result<usize, ChemicalSystemError> {
        self.species
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ChemicalSystemError::UnknownSpecies(name.to_string()))
    }
    pub fn element_index(&self, name: &str) -> Result<usize, ChemicalSystemError> {
        self.elements
            .iter()
            .position(|e| e == name)
            .ok_or_else(|| ChemicalSystemError::UnknownElement(name.to_string()))
    }
    pub fn species_names(&self) -> Vec<String> {
        self.species.iter().map(|s| s.name.clone()).collect()
    }
    pub fn phase_kind_of_species(&self, j: usize) -> PhaseKind {
        self.phases[self.species[j].phase].kind
    }
    /// amounts of elements b = A n
    pub fn element_amounts(&self, n: &DVector<f64>) -> DVector<f64> {
        &self.formula_matrix * n
    }
    /// mass of the composition, g
    pub fn total_mass(&self, n: &DVector<f64>) -> f64 {
        self.species
            .iter()
            .zip(n.iter())
            .map(|(s, n_j)| s.molar_mass * n_j)
            .sum()
    }
    /// element amounts from a map of species amounts (other species are absent)
    pub fn element_amounts_from_species(
        &self,
        amounts: &HashMap<String, f64>,
    ) -> Result<DVector<f64>, ChemicalSystemError> {
        let mut n = DVector::zeros(self.num_species());
        for (name, amount) in amounts {
            n[self.species_index(name)?] = *amount;
        }
        Ok(self.element_amounts(&n))
    }

    pub fn pretty_print_system(&self) {
        let mut table = Table::new();
        table.add_row(row!["species", "formula", "phase", "dH", "dS", "M"]);
        for s in &self.species {
            table.add_row(row![
                s.name,
                s.formula,
                self.phases[s.phase].name,
                s.dH,
                s.dS,
                s.molar_mass
            ]);
        }
        table.printstd();
    }
}

/// Black box of thermodynamic properties consumed by the equilibrium solvers
pub trait ThermoModel: Send + Sync {
    /// dimensionless standard chemical potentials μ°/RT of all species of the system
    #[allow(non_snake_case)]
    fn standard_gibbs_rt(&self, T: f64, P: f64) -> DVector<f64>;
}

/// dG = dH - T*dS with constant enthalpy and entropy of formation
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct IdealThermoModel {
    pub dH: DVector<f64>,
    pub dS: DVector<f64>,
}

impl IdealThermoModel {
    pub fn from_system(system: &ChemicalSystem) -> Self {
        Self {
            dH: DVector::from_iterator(system.num_species(), system.species.iter().map(|s| s.dH)),
            dS: DVector::from_iterator(system.num_species(), system.species.iter().map(|s| s.dS)),
        }
    }
}

impl ThermoModel for IdealThermoModel {
    #[allow(non_snake_case)]
    fn standard_gibbs_rt(&self, T: f64, _P: f64) -> DVector<f64> {
        let RT = R * T;
        self.dH.zip_map(&self.dS, |dh, ds| (dh - T * ds) / RT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn carbon_oxygen_system() -> ChemicalSystem {
        ChemicalSystem::new(vec![
            PhaseDefinition::new(
                "gas",
                PhaseKind::Gas,
                vec![
                    SpeciesData::new("CO", -166_280.0, 0.0),
                    SpeciesData::new("CO2", -390_758.0, 0.0),
                    SpeciesData::new("O2", 0.0, 0.0),
                ],
            ),
            PhaseDefinition::new(
                "solids",
                PhaseKind::Condensed,
                vec![SpeciesData::new("C(gr)", 0.0, 0.0)],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_system_topology() {
        let system = carbon_oxygen_system();
        assert_eq!(system.elements, vec!["C", "O"]);
        assert_eq!(system.num_species(), 4);
        assert_eq!(system.num_phases(), 2);
        assert_eq!(system.phase_kind_of_species(3), PhaseKind::Condensed);
        assert_eq!(system.formula_matrix[(1, 1)], 2.0);
        let n = DVector::from_vec(vec![1.0, 1.0, 0.5, 2.0]);
        let b = system.element_amounts(&n);
        assert_relative_eq!(b[0], 4.0);
        assert_relative_eq!(b[1], 4.0);
        assert_relative_eq!(system.total_mass(&n), 28.01 + 44.009 + 16.0 + 24.022, epsilon = 1e-2);
    }

    #[test]
    fn test_condensed_definition_is_split_into_pure_phases() {
        let system = ChemicalSystem::new(vec![PhaseDefinition::new(
            "minerals",
            PhaseKind::Condensed,
            vec![
                SpeciesData::new("Calcite", 0.0, 0.0).with_formula("CaCO3"),
                SpeciesData::new("Lime", 0.0, 0.0).with_formula("CaO"),
            ],
        )])
        .unwrap();
        assert_eq!(system.num_phases(), 2);
        assert_eq!(system.phases[1].name, "Lime");
        assert_eq!(system.phases[1].species, vec![1]);
    }

    #[test]
    fn test_bad_definitions() {
        let duplicated = ChemicalSystem::new(vec![PhaseDefinition::new(
            "gas",
            PhaseKind::Gas,
            vec![SpeciesData::new("CO", 0.0, 0.0), SpeciesData::new("CO", 0.0, 0.0)],
        )]);
        assert!(matches!(duplicated, Err(ChemicalSystemError::DuplicateSpecies(_))));
        let empty = ChemicalSystem::new(vec![PhaseDefinition::new("gas", PhaseKind::Gas, vec![])]);
        assert!(matches!(empty, Err(ChemicalSystemError::EmptyPhase(_))));
        let system = carbon_oxygen_system();
        assert!(system.species_index("H2O").is_err());
        assert!(system.element_index("Na").is_err());
    }

    #[test]
    fn test_ideal_thermo_model() {
        let system = carbon_oxygen_system();
        let model = IdealThermoModel::from_system(&system);
        let g = model.standard_gibbs_rt(1000.0, 101325.0);
        assert_relative_eq!(g[0], -20.0, epsilon = 1e-9);
        assert_relative_eq!(g[1], -47.0, epsilon = 1e-9);
        assert_relative_eq!(g[2], 0.0);
    }

    #[test]
    fn test_element_amounts_from_species() {
        let system = carbon_oxygen_system();
        let b = system
            .element_amounts_from_species(&HashMap::from([("CO2".to_string(), 0.5)]))
            .unwrap();
        assert_relative_eq!(b[0], 0.5);
        assert_relative_eq!(b[1], 1.0);
    }
}
