//! Validation of a predicted equilibrium state. A rejected prediction is not an error: the smart
//! solver falls back to the exact solver and the reason is reported in the result.
use super::ChemicalState::{Conditions, EquilibriumState};
use super::ClusterIndex::CacheRecord;
use super::Predictor::Prediction;
use super::SmartOptions::SmartEquilibriumOptions;
use nalgebra::{DMatrix, DVector};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// predicted amount of the species is below -amount_floor
    BoundViolation { species: usize, amount: f64 },
    /// the species is present in the prediction and absent in the reference or vice versa
    ActiveSetMismatch { species: usize },
    /// mass balance residual of the element exceeds the tolerance
    ResidualTooLarge { element: usize, residual: f64 },
    TrustRegionExceeded { step_norm: f64, radius: f64 },
}

impl RejectionReason {
    /// short name for statistics
    pub fn kind(&self) -> &'static str {
        match self {
            RejectionReason::BoundViolation { .. } => "bound violation",
            RejectionReason::ActiveSetMismatch { .. } => "active set mismatch",
            RejectionReason::ResidualTooLarge { .. } => "residual too large",
            RejectionReason::TrustRegionExceeded { .. } => "trust region exceeded",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::BoundViolation { species, amount } => {
                write!(f, "species {} predicted amount {:e}", species, amount)
            }
            RejectionReason::ActiveSetMismatch { species } => {
                write!(f, "species {} changed its presence", species)
            }
            RejectionReason::ResidualTooLarge { element, residual } => {
                write!(f, "element {} mass balance residual {:e}", element, residual)
            }
            RejectionReason::TrustRegionExceeded { step_norm, radius } => {
                write!(f, "step {} outside trust region {}", step_norm, radius)
            }
        }
    }
}

/// residuals of element conservation r = A·max(n, 0) - b
pub fn mass_balance_residual(
    formula_matrix: &DMatrix<f64>,
    n: &DVector<f64>,
    b: &DVector<f64>,
) -> DVector<f64> {
    formula_matrix * n.map(|n_j| n_j.max(0.0)) - b
}

/// Checks the prediction in the order: bounds, active set, mass balance, trust region
pub fn accept(
    prediction: &Prediction,
    query: &Conditions,
    reference: &CacheRecord,
    formula_matrix: &DMatrix<f64>,
    options: &SmartEquilibriumOptions,
) -> Result<(), RejectionReason> {
    let n = &prediction.state.n;
    if let Some((species, amount)) = n
        .iter()
        .enumerate()
        .find(|(_, n_j)| **n_j < -options.amount_floor)
    {
        return Err(RejectionReason::BoundViolation {
            species,
            amount: *amount,
        });
    }
    let mask = prediction.state.active_mask(options.active_threshold);
    if let Some(species) = mask
        .iter()
        .zip(reference.active_mask.iter())
        .position(|(predicted, stored)| predicted != stored)
    {
        return Err(RejectionReason::ActiveSetMismatch { species });
    }
    let residual = mass_balance_residual(formula_matrix, n, &query.b);
    for (element, r_k) in residual.iter().enumerate() {
        let b_k = query.b[element];
        let too_large = r_k.abs() > options.absolute_tolerance
            || (b_k > options.absolute_tolerance && r_k.abs() > options.relative_tolerance * b_k);
        if too_large {
            return Err(RejectionReason::ResidualTooLarge {
                element,
                residual: *r_k,
            });
        }
    }
    if let Some(radius) = options.trust_region_radius {
        if prediction.step_norm > radius {
            return Err(RejectionReason::TrustRegionExceeded {
                step_norm: prediction.step_norm,
                radius,
            });
        }
    }
    Ok(())
}

/// accepted predictions are returned without trace negative amounts
pub fn clamp_amounts(state: &mut EquilibriumState) {
    state.n.apply(|n_j| *n_j = n_j.max(0.0));
}
