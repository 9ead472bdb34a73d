//! Data model of equilibrium calculations: the conditions of a query, the equilibrium state,
//! its sensitivity with respect to the conditions and the restrictions of the problem.
use super::EquilibriumErrors::SmartEquilibriumError;
use crate::Thermodynamics::ChemicalSystem::ChemicalSystem;
use nalgebra::{DMatrix, DVector};
use prettytable::{Table, row};
use std::collections::{BTreeSet, HashMap};

/// Control variables of an equilibrium query: temperature (K), pressure (Pa) and amounts of elements (mol)
/// in the order of `ChemicalSystem::elements`. As a vector the conditions are `w = [T, P, b_1..b_E]`
#[derive(Debug, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct Conditions {
    pub T: f64,
    pub P: f64,
    pub b: DVector<f64>,
}

impl Conditions {
    #[allow(non_snake_case)]
    pub fn new(T: f64, P: f64, b: DVector<f64>) -> Self {
        Self { T, P, b }
    }
    /// conditions from a list of (element, amount); elements not in the list are absent
    #[allow(non_snake_case)]
    pub fn from_element_amounts(
        system: &ChemicalSystem,
        T: f64,
        P: f64,
        amounts: &[(&str, f64)],
    ) -> Result<Self, SmartEquilibriumError> {
        let mut b = DVector::zeros(system.num_elements());
        for (element, amount) in amounts {
            b[system.element_index(element)?] += *amount;
        }
        Ok(Self::new(T, P, b))
    }
    /// conditions from the initial amounts of species (the rest of species are absent)
    #[allow(non_snake_case)]
    pub fn from_species_amounts(
        system: &ChemicalSystem,
        T: f64,
        P: f64,
        amounts: &HashMap<String, f64>,
    ) -> Result<Self, SmartEquilibriumError> {
        let b = system.element_amounts_from_species(amounts)?;
        Ok(Self::new(T, P, b))
    }
    /// number of control variables 2 + E
    pub fn dimension(&self) -> usize {
        self.b.len() + 2
    }
    pub fn as_vector(&self) -> DVector<f64> {
        let mut w = DVector::zeros(self.dimension());
        w[0] = self.T;
        w[1] = self.P;
        w.rows_mut(2, self.b.len()).copy_from(&self.b);
        w
    }
    /// elements with nonzero amount
    pub fn support(&self) -> Vec<bool> {
        self.b.iter().map(|b_k| *b_k > 0.0).collect()
    }
    /// Species that may take part in the equilibrium: not restricted and not containing
    /// an element which is absent in these conditions
    pub fn allowed_species(
        &self,
        system: &ChemicalSystem,
        restrictions: &EquilibriumRestrictions,
    ) -> Vec<bool> {
        let A = &system.formula_matrix;
        (0..system.num_species())
            .map(|j| {
                !restrictions.is_excluded(j)
                    && (0..A.nrows()).all(|k| A[(k, j)] == 0.0 || self.b[k] > 0.0)
            })
            .collect()
    }

    /// Checks the conditions before any search or solve
    pub fn validate(
        &self,
        system: &ChemicalSystem,
        restrictions: &EquilibriumRestrictions,
    ) -> Result<(), SmartEquilibriumError> {
        if self.b.len() != system.num_elements() {
            return Err(SmartEquilibriumError::InvalidConditions(format!(
                "{} element amounts given for a system of {} elements",
                self.b.len(),
                system.num_elements()
            )));
        }
        if !self.T.is_finite() || self.T <= 0.0 {
            return Err(SmartEquilibriumError::InvalidConditions(format!(
                "temperature must be positive, got {}",
                self.T
            )));
        }
        if !self.P.is_finite() || self.P <= 0.0 {
            return Err(SmartEquilibriumError::InvalidConditions(format!(
                "pressure must be positive, got {}",
                self.P
            )));
        }
        for (k, b_k) in self.b.iter().enumerate() {
            if !b_k.is_finite() || *b_k < 0.0 {
                return Err(SmartEquilibriumError::InvalidConditions(format!(
                    "amount of element {} must be a non-negative number, got {}",
                    system.elements[k], b_k
                )));
            }
        }
        if self.b.sum() <= 0.0 {
            return Err(SmartEquilibriumError::InvalidConditions(
                "all element amounts are zero".to_string(),
            ));
        }
        let allowed = self.allowed_species(system, restrictions);
        let A = &system.formula_matrix;
        for (k, b_k) in self.b.iter().enumerate() {
            if *b_k > 0.0 && !(0..A.ncols()).any(|j| allowed[j] && A[(k, j)] > 0.0) {
                return Err(SmartEquilibriumError::InvalidConditions(format!(
                    "element {} is present but no allowed species contains it",
                    system.elements[k]
                )));
            }
        }
        Ok(())
    }
}

/// Species forced to be absent at equilibrium
#[derive(Debug, Clone, Default)]
pub struct EquilibriumRestrictions {
    excluded: BTreeSet<usize>,
}

impl EquilibriumRestrictions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cannot_exist(
        &mut self,
        system: &ChemicalSystem,
        species: &str,
    ) -> Result<&mut Self, SmartEquilibriumError> {
        self.excluded.insert(system.species_index(species)?);
        Ok(self)
    }
    pub fn is_excluded(&self, j: usize) -> bool {
        self.excluded.contains(&j)
    }
    pub fn excluded(&self) -> impl Iterator<Item = &usize> {
        self.excluded.iter()
    }
}

/// Full solution of an equilibrium problem.
/// n - amounts of species, mol;
/// y - element potentials, μ/RT of each element (zero for absent elements);
/// z - stabilities of species μ_j/RT - Σ_i a_ij y_i (zero for species present at equilibrium)
#[derive(Debug, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct EquilibriumState {
    pub T: f64,
    pub P: f64,
    pub n: DVector<f64>,
    pub y: DVector<f64>,
    pub z: DVector<f64>,
}

impl EquilibriumState {
    pub fn new(system: &ChemicalSystem) -> Self {
        Self {
            T: 298.15,
            P: 101325.0,
            n: DVector::zeros(system.num_species()),
            y: DVector::zeros(system.num_elements()),
            z: DVector::zeros(system.num_species()),
        }
    }
    pub fn set_species_amount(
        &mut self,
        system: &ChemicalSystem,
        species: &str,
        amount: f64,
    ) -> Result<(), SmartEquilibriumError> {
        self.n[system.species_index(species)?] = amount;
        Ok(())
    }
    pub fn species_amount(
        &self,
        system: &ChemicalSystem,
        species: &str,
    ) -> Result<f64, SmartEquilibriumError> {
        Ok(self.n[system.species_index(species)?])
    }
    /// species regarded as present: amount above the threshold
    pub fn active_mask(&self, threshold: f64) -> Vec<bool> {
        self.n.iter().map(|n_j| *n_j > threshold).collect()
    }
    pub fn total_amount(&self) -> f64 {
        self.n.sum()
    }

    pub fn pretty_print_state(&self, system: &ChemicalSystem) {
        println!(
            "__________equilibrium state at T = {} K, P = {} Pa__________",
            self.T, self.P
        );
        let mut table = Table::new();
        table.add_row(row!["species", "phase", "n, mol", "z"]);
        for (j, species) in system.species.iter().enumerate() {
            table.add_row(row![
                species.name,
                system.phases[species.phase].name,
                format!("{:.6e}", self.n[j]),
                format!("{:.3e}", self.z[j])
            ]);
        }
        table.printstd();
        let mut table2 = Table::new();
        table2.add_row(row!["element", "y = μ/RT"]);
        for (i, element) in system.elements.iter().enumerate() {
            table2.add_row(row![element, format!("{:.6}", self.y[i])]);
        }
        table2.printstd();
    }
}

/// Derivatives of the equilibrium state with respect to the conditions w = [T, P, b]:
/// dndw is N x (2 + E), dydw is E x (2 + E)
#[derive(Debug, Clone, PartialEq)]
pub struct Sensitivity {
    pub dndw: DMatrix<f64>,
    pub dydw: DMatrix<f64>,
}

impl Sensitivity {
    pub fn zeros(num_species: usize, num_elements: usize) -> Self {
        Self {
            dndw: DMatrix::zeros(num_species, num_elements + 2),
            dydw: DMatrix::zeros(num_elements, num_elements + 2),
        }
    }
    /// columns of the derivatives with respect to the element amounts
    pub fn dndb(&self) -> DMatrix<f64> {
        let ncols = self.dndw.ncols();
        self.dndw.columns(2, ncols - 2).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Thermodynamics::ChemicalSystem::{PhaseDefinition, PhaseKind, SpeciesData};

    fn system() -> ChemicalSystem {
        ChemicalSystem::new(vec![PhaseDefinition::new(
            "gas",
            PhaseKind::Gas,
            vec![
                SpeciesData::new("C", 0.0, 0.0),
                SpeciesData::new("C2", -20_000.0, 0.0),
                SpeciesData::new("Na", 0.0, 0.0),
                SpeciesData::new("NaC", -10_000.0, 0.0),
            ],
        )])
        .unwrap()
    }

    #[test]
    fn test_conditions_vector() {
        let system = system();
        let conditions =
            Conditions::from_element_amounts(&system, 1000.0, 1e5, &[("C", 0.5), ("Na", 0.1)])
                .unwrap();
        let w = conditions.as_vector();
        assert_eq!(w.len(), 4);
        assert_eq!(w[0], 1000.0);
        assert_eq!(w[1], 1e5);
        assert_eq!(w[2], 0.5);
        assert_eq!(w[3], 0.1);
        assert!(Conditions::from_element_amounts(&system, 1000.0, 1e5, &[("O", 1.0)]).is_err());
    }

    #[test]
    fn test_validation() {
        let system = system();
        let restrictions = EquilibriumRestrictions::new();
        let ok = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![0.5, 0.0]));
        assert!(ok.validate(&system, &restrictions).is_ok());

        let negative = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![0.5, -1.0]));
        assert!(matches!(
            negative.validate(&system, &restrictions),
            Err(SmartEquilibriumError::InvalidConditions(_))
        ));
        let wrong_dimension = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![0.5]));
        assert!(wrong_dimension.validate(&system, &restrictions).is_err());
        let zeros = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![0.0, 0.0]));
        assert!(zeros.validate(&system, &restrictions).is_err());
        let cold = Conditions::new(-1.0, 1e5, DVector::from_vec(vec![0.5, 0.0]));
        assert!(cold.validate(&system, &restrictions).is_err());
    }

    #[test]
    fn test_allowed_species_and_restrictions() {
        let system = system();
        let mut restrictions = EquilibriumRestrictions::new();
        let conditions = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![0.5, 0.0]));
        // sodium species are not allowed without sodium
        assert_eq!(
            conditions.allowed_species(&system, &restrictions),
            vec![true, true, false, false]
        );
        restrictions.cannot_exist(&system, "Na").unwrap();
        restrictions.cannot_exist(&system, "NaC").unwrap();
        let with_sodium = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![0.5, 0.1]));
        // sodium has no carrier left
        assert!(with_sodium.validate(&system, &restrictions).is_err());
    }

    #[test]
    fn test_active_mask() {
        let system = system();
        let mut state = EquilibriumState::new(&system);
        state.set_species_amount(&system, "C2", 0.2).unwrap();
        state.set_species_amount(&system, "C", 1e-20).unwrap();
        assert_eq!(state.active_mask(1e-10), vec![false, true, false, false]);
        assert_eq!(state.species_amount(&system, "C2").unwrap(), 0.2);
    }
}
