//! First order Taylor extrapolation of a stored equilibrium to new conditions
use super::ChemicalState::{Conditions, EquilibriumState};
use super::ClusterIndex::CacheRecord;
use super::SmartOptions::DistanceMetric;
use crate::Thermodynamics::ChemicalSystem::{ChemicalSystem, PhaseKind};

/// candidate state, not yet validated
#[derive(Debug, Clone)]
pub struct Prediction {
    pub state: EquilibriumState,
    /// distance between the query and the reference conditions
    pub step_norm: f64,
}

/// n = n_ref + ∂n/∂w·Δw, y = y_ref + ∂y/∂w·Δw with Δw = w - w_ref.
///
/// Stabilities of condensed species absent from the reference follow the element potentials,
/// z_j = z_ref_j - Σ_k A_kj·(y_k - y_ref_k); the change of their standard potentials with
/// temperature is not included. Species present in the reference keep z = 0, species excluded
/// from the reference solve (z exactly 0) stay at 0.
pub fn predict(
    reference: &CacheRecord,
    query: &Conditions,
    system: &ChemicalSystem,
    metric: DistanceMetric,
) -> Prediction {
    let dw = query.as_vector() - reference.conditions.as_vector();
    let n = &reference.state.n + &reference.sensitivity.dndw * &dw;
    let y = &reference.state.y + &reference.sensitivity.dydw * &dw;
    let dy = &y - &reference.state.y;
    let mut z = reference.state.z.clone();
    for j in 0..z.len() {
        if reference.active_mask[j]
            || z[j] == 0.0
            || system.phase_kind_of_species(j) != PhaseKind::Condensed
        {
            continue;
        }
        z[j] -= system.formula_matrix.column(j).dot(&dy);
    }
    Prediction {
        state: EquilibriumState {
            T: query.T,
            P: query.P,
            n,
            y,
            z,
        },
        step_norm: metric.distance(query, &reference.conditions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Thermodynamics::ChemEquilibrium::ChemicalState::Sensitivity;
    use crate::Thermodynamics::ChemicalSystem::{PhaseDefinition, SpeciesData};
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    /// CO and O2 over graphite; elements C, O
    fn system() -> ChemicalSystem {
        ChemicalSystem::new(vec![
            PhaseDefinition::new(
                "gas",
                PhaseKind::Gas,
                vec![SpeciesData::new("CO", 0.0, 0.0), SpeciesData::new("O2", 0.0, 0.0)],
            ),
            PhaseDefinition::new(
                "graphite",
                PhaseKind::Condensed,
                vec![SpeciesData::new("C(gr)", 0.0, 0.0).with_formula("C")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_linear_extrapolation() {
        let system = system();
        let conditions = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![1.0, 1.2]));
        let state = EquilibriumState {
            T: 1000.0,
            P: 1e5,
            n: DVector::from_vec(vec![1.0, 0.1, 0.0]),
            y: DVector::from_vec(vec![-5.0, -10.0]),
            z: DVector::zeros(3),
        };
        let mut sensitivity = Sensitivity::zeros(3, 2);
        // dn/dT, dn/db_C
        sensitivity.dndw[(0, 0)] = 1e-4;
        sensitivity.dndw[(1, 0)] = -0.5e-4;
        sensitivity.dndw[(0, 2)] = 1.0;
        sensitivity.dydw[(0, 2)] = 0.5;
        let record = CacheRecord::new(conditions, state, sensitivity, 1e-10);

        let query = Conditions::new(1010.0, 1e5, DVector::from_vec(vec![1.1, 1.2]));
        let prediction = predict(&record, &query, &system, DistanceMetric::Relative);
        assert_relative_eq!(prediction.state.n[0], 1.0 + 1e-3 + 0.1, epsilon = 1e-12);
        assert_relative_eq!(prediction.state.n[1], 0.1 - 0.5e-3, epsilon = 1e-12);
        assert_relative_eq!(prediction.state.y[0], -4.95, epsilon = 1e-12);
        assert_eq!(prediction.state.T, 1010.0);
        let norm_b = (1.0f64 + 1.44).sqrt();
        assert_relative_eq!(
            prediction.step_norm,
            (0.01f64 * 0.01 + (0.1 / norm_b) * (0.1 / norm_b)).sqrt(),
            epsilon = 1e-12
        );
        // zero step reproduces the reference
        let same = predict(&record, &record.conditions, &system, DistanceMetric::Relative);
        assert_eq!(same.state.n, record.state.n);
        assert_eq!(same.state.z, record.state.z);
        assert_eq!(same.step_norm, 0.0);
    }

    #[test]
    fn test_stability_of_absent_condensed_species_follows_potentials() {
        let system = system();
        let conditions = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![1.0, 1.2]));
        let state = EquilibriumState {
            T: 1000.0,
            P: 1e5,
            n: DVector::from_vec(vec![1.0, 0.1, 0.0]),
            y: DVector::from_vec(vec![-5.0, -10.0]),
            z: DVector::from_vec(vec![0.0, 0.0, 2.0]),
        };
        let mut sensitivity = Sensitivity::zeros(3, 2);
        sensitivity.dydw[(0, 2)] = 0.5;
        sensitivity.dydw[(1, 3)] = -0.25;
        let record = CacheRecord::new(conditions, state, sensitivity, 1e-10);
        assert_eq!(record.active_mask, vec![true, true, false]);

        // Δy = (0.1, -0.05), graphite holds one carbon
        let query = Conditions::new(1000.0, 1e5, DVector::from_vec(vec![1.2, 1.4]));
        let prediction = predict(&record, &query, &system, DistanceMetric::Relative);
        assert_relative_eq!(prediction.state.y[0], -4.9, epsilon = 1e-12);
        assert_relative_eq!(prediction.state.y[1], -10.05, epsilon = 1e-12);
        assert_relative_eq!(prediction.state.z[2], 1.9, epsilon = 1e-12);
        assert_eq!(prediction.state.z[0], 0.0);
        assert_eq!(prediction.state.z[1], 0.0);
    }
}
