//! # Exact equilibrium solver
//!
//! Minimization of the Gibbs free energy of a mixture of ideal solution phases (ideal gas, ideal
//! condensed solutions) and pure condensed substances subject to the conservation of elements
//! `A n = b`, `n >= 0`.
//!
//! Chemical potentials of species of the solution phase p:
//!     μ_j/RT = μ°_j/RT + ln(n_j/N_p) (+ ln(P/P°) for gas species),
//! for pure condensed substances μ_c/RT = μ°_c/RT.
//!
//! The Lagrange conditions are solved by Newton iterations in the reduced form known from the
//! NASA CEA method: the corrections of ln(n_j) are eliminated, so the linear system contains only
//! the element potentials π (Lagrange multipliers divided by RT), the corrections of logarithms of
//! phase totals ln(N_p) and the corrections of amounts of pure condensed substances:
//!
//! Δln n_j = -μ_j/RT + Σ_i a_ij π_i + Δln N_p
//!
//! Σ_i [Σ_j a_kj a_ij n_j] π_i + Σ_p [Σ_{j∈p} a_kj n_j] Δln N_p + Σ_c a_kc Δn_c = b_k - b̂_k + Σ_j a_kj n_j μ_j/RT
//!
//! Σ_i [Σ_{j∈p} a_ij n_j] π_i + (Σ_{j∈p} n_j - N_p) Δln N_p = N_p - Σ_{j∈p} n_j + Σ_{j∈p} n_j μ_j/RT
//!
//! Σ_i a_ic π_i = μ_c/RT
//!
//! Pure condensed substances enter the active set when they are supersaturated (μ_c/RT - Σ a_ic π_i < 0)
//! and leave it when their amount falls to zero. The converged Newton matrix is reused to compute the
//! sensitivity of the solution with respect to T, P and the amounts of elements.
use super::ChemicalState::{Conditions, EquilibriumRestrictions, EquilibriumState, Sensitivity};
use super::EquilibriumErrors::SmartEquilibriumError;
use crate::Thermodynamics::ChemicalSystem::{ChemicalSystem, P_REF, PhaseKind, ThermoModel};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// ln(1e8): species with smaller mole fraction are treated as trace species by the damping
const SIZE: f64 = 18.420680743952367;
/// ln(1e4)
const LN_1E4: f64 = 9.210340371976184;

/// options of the exact solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquilibriumOptions {
    /// convergence criterion on relative corrections of amounts and on the relative mass balance residual
    pub tolerance: f64,
    pub max_iterations: usize,
    /// lower bound of ln(n_j) of solution species
    pub trace_log_floor: f64,
    /// a pure condensed substance enters the equilibrium when μ_c/RT - Σ a_ic π_i < -condensed_tolerance
    pub condensed_tolerance: f64,
    /// relative step of the temperature used to differentiate the thermodynamic model
    pub temperature_step: f64,
}

impl Default for EquilibriumOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 500,
            trace_log_floor: -230.0,
            condensed_tolerance: 1e-8,
            temperature_step: 1e-5,
        }
    }
}

/// result of an exact solve
#[derive(Debug, Clone)]
pub struct ExactSolveOutcome {
    pub state: EquilibriumState,
    pub sensitivity: Sensitivity,
    pub converged: bool,
    pub iterations: usize,
    /// last convergence measure (relative corrections and mass balance residual)
    pub residual: f64,
}

/// Interface of the exact tier consumed by the smart solver
pub trait ExactSolver {
    fn system(&self) -> &ChemicalSystem;
    fn restrictions(&self) -> &EquilibriumRestrictions;
    /// `initial` is the initial guess; `converged == false` means the returned state must not be used
    fn solve(
        &mut self,
        conditions: &Conditions,
        initial: &EquilibriumState,
    ) -> Result<ExactSolveOutcome, SmartEquilibriumError>;
}

/// indices of the species and elements taking part in one equilibrium problem
#[derive(Debug, Clone)]
struct ProblemLayout {
    /// elements with nonzero amount
    elements: Vec<usize>,
    /// allowed species of every solution phase having at least one allowed species
    phases: Vec<Vec<usize>>,
    /// allowed pure condensed substances
    condensed: Vec<usize>,
}

/// Gibbs free energy minimizer
pub struct EquilibriumSolver {
    system: ChemicalSystem,
    model: Box<dyn ThermoModel>,
    restrictions: EquilibriumRestrictions,
    pub options: EquilibriumOptions,
}

impl EquilibriumSolver {
    pub fn new(system: ChemicalSystem, model: Box<dyn ThermoModel>) -> Self {
        Self {
            system,
            model,
            restrictions: EquilibriumRestrictions::new(),
            options: EquilibriumOptions::default(),
        }
    }
    pub fn with_restrictions(mut self, restrictions: EquilibriumRestrictions) -> Self {
        self.restrictions = restrictions;
        self
    }
    pub fn with_options(mut self, options: EquilibriumOptions) -> Self {
        self.options = options;
        self
    }

    /// μ°/RT + ln(P/P°) for gas species
    #[allow(non_snake_case)]
    fn standard_potentials(&self, T: f64, P: f64) -> Result<DVector<f64>, SmartEquilibriumError> {
        let mut g = self.model.standard_gibbs_rt(T, P);
        if g.len() != self.system.num_species() {
            return Err(SmartEquilibriumError::MatrixDimensionMismatch(format!(
                "thermodynamic model returned {} values for {} species",
                g.len(),
                self.system.num_species()
            )));
        }
        let ln_p = (P / P_REF).ln();
        for j in 0..g.len() {
            if self.system.phase_kind_of_species(j) == PhaseKind::Gas {
                g[j] += ln_p;
            }
        }
        Ok(g)
    }
    #[allow(non_snake_case)]
    fn potentials_dT(&self, T: f64, P: f64) -> DVector<f64> {
        let h = (self.options.temperature_step * T).max(1e-8);
        let plus = self.model.standard_gibbs_rt(T + h, P);
        let minus = self.model.standard_gibbs_rt(T - h, P);
        (plus - minus) / (2.0 * h)
    }
    #[allow(non_snake_case)]
    fn potentials_dP(&self, T: f64, P: f64) -> DVector<f64> {
        let h = 1e-6 * P;
        let plus = self.model.standard_gibbs_rt(T, P + h);
        let minus = self.model.standard_gibbs_rt(T, P - h);
        let mut d = (plus - minus) / (2.0 * h);
        for j in 0..d.len() {
            if self.system.phase_kind_of_species(j) == PhaseKind::Gas {
                d[j] += 1.0 / P;
            }
        }
        d
    }

    fn layout(&self, conditions: &Conditions) -> ProblemLayout {
        let allowed = conditions.allowed_species(&self.system, &self.restrictions);
        let elements = (0..self.system.num_elements())
            .filter(|&k| conditions.b[k] > 0.0)
            .collect();
        let mut phases = Vec::new();
        let mut condensed = Vec::new();
        for phase in &self.system.phases {
            let species: Vec<usize> = phase.species.iter().copied().filter(|&j| allowed[j]).collect();
            if species.is_empty() {
                continue;
            }
            match phase.kind {
                PhaseKind::Condensed => condensed.extend(species),
                _ => phases.push(species),
            }
        }
        ProblemLayout {
            elements,
            phases,
            condensed,
        }
    }

    /// symmetric matrix of the reduced Newton system
    #[allow(non_snake_case)]
    fn newton_matrix(
        &self,
        layout: &ProblemLayout,
        included: &[usize],
        n: &DVector<f64>,
        Np: &[f64],
    ) -> DMatrix<f64> {
        let A = &self.system.formula_matrix;
        let (ne, np, nc) = (layout.elements.len(), layout.phases.len(), included.len());
        let mut M = DMatrix::zeros(ne + np + nc, ne + np + nc);
        for (p, phase) in layout.phases.iter().enumerate() {
            let mut sum_n = 0.0;
            for &j in phase {
                let n_j = n[j];
                sum_n += n_j;
                for (e, &k) in layout.elements.iter().enumerate() {
                    let a_kj = A[(k, j)];
                    if a_kj == 0.0 {
                        continue;
                    }
                    M[(e, ne + p)] += a_kj * n_j;
                    M[(ne + p, e)] += a_kj * n_j;
                    for (e2, &i) in layout.elements.iter().enumerate() {
                        M[(e, e2)] += a_kj * A[(i, j)] * n_j;
                    }
                }
            }
            M[(ne + p, ne + p)] = sum_n - Np[p];
        }
        for (q, &c) in included.iter().enumerate() {
            for (e, &k) in layout.elements.iter().enumerate() {
                M[(e, ne + np + q)] = A[(k, c)];
                M[(ne + np + q, e)] = A[(k, c)];
            }
        }
        M
    }

    /// every present element must have a carrier, otherwise the Newton matrix is singular
    fn ensure_carriers(
        &self,
        layout: &ProblemLayout,
        b: &DVector<f64>,
        included: &mut Vec<usize>,
        n_cond: &mut DVector<f64>,
    ) -> bool {
        let A = &self.system.formula_matrix;
        let mut changed = false;
        for &k in &layout.elements {
            let carried = layout.phases.iter().flatten().any(|&j| A[(k, j)] > 0.0)
                || included.iter().any(|&c| A[(k, c)] > 0.0);
            if carried {
                continue;
            }
            if let Some(&c) = layout
                .condensed
                .iter()
                .find(|&&c| A[(k, c)] > 0.0 && !included.contains(&c))
            {
                n_cond[c] = 0.5 * b[k] / A[(k, c)];
                included.push(c);
                changed = true;
            }
        }
        changed
    }

    /// Solves the equilibrium problem, see the module documentation
    #[allow(non_snake_case)]
    pub fn solve_equilibrium(
        &self,
        conditions: &Conditions,
        initial: &EquilibriumState,
    ) -> Result<ExactSolveOutcome, SmartEquilibriumError> {
        conditions.validate(&self.system, &self.restrictions)?;
        let (T, P) = (conditions.T, conditions.P);
        let b = &conditions.b;
        let A = &self.system.formula_matrix;
        let num_species = self.system.num_species();
        let gt = self.standard_potentials(T, P)?;
        let layout = self.layout(conditions);
        let (ne, np) = (layout.elements.len(), layout.phases.len());
        let scale = b.sum();
        let tol = self.options.tolerance;

        // initial guess: the given state if it has positive amounts, otherwise equal amounts of solution species
        let solution_count: usize = layout.phases.iter().map(|p| p.len()).sum();
        let warm = initial.n.len() == num_species
            && layout.phases.iter().flatten().any(|&j| initial.n[j] > 0.0);
        let mut ln_n = DVector::zeros(num_species);
        let mut lnN = vec![0.0; np];
        for (p, phase) in layout.phases.iter().enumerate() {
            let mut total = 0.0;
            for &j in phase {
                let guess = if warm && initial.n[j] > 0.0 {
                    initial.n[j]
                } else if warm {
                    1e-10 * scale
                } else {
                    scale / solution_count as f64
                };
                ln_n[j] = guess.ln().max(self.options.trace_log_floor);
                total += ln_n[j].exp();
            }
            lnN[p] = total.ln();
        }
        let mut n_cond = DVector::zeros(num_species);
        let mut included: Vec<usize> = Vec::new();
        if initial.n.len() == num_species {
            for &c in &layout.condensed {
                if initial.n[c] > 0.0 {
                    n_cond[c] = initial.n[c];
                    included.push(c);
                }
            }
        }
        self.ensure_carriers(&layout, b, &mut included, &mut n_cond);

        let max_phase_changes = 4 * layout.condensed.len() + 10;
        let mut phase_changes = 0;
        let mut iterations = 0;
        let mut converged = false;
        let mut residual = f64::INFINITY;
        let mut pi = DVector::zeros(ne);
        let mut n = DVector::zeros(num_species);
        let mut Np = vec![0.0; np];
        while iterations < self.options.max_iterations {
            iterations += 1;
            n.fill(0.0);
            for &j in layout.phases.iter().flatten() {
                n[j] = ln_n[j].exp();
            }
            for &c in &included {
                n[c] = n_cond[c];
            }
            for p in 0..np {
                Np[p] = lnN[p].exp();
            }
            let mut mu = DVector::zeros(num_species);
            for (p, phase) in layout.phases.iter().enumerate() {
                for &j in phase {
                    mu[j] = gt[j] + ln_n[j] - lnN[p];
                }
            }
            let M = self.newton_matrix(&layout, &included, &n, &Np);
            let b_hat = A * &n;
            let nc = included.len();
            let mut rhs = DVector::zeros(ne + np + nc);
            for (e, &k) in layout.elements.iter().enumerate() {
                let mut s = b[k] - b_hat[k];
                for &j in layout.phases.iter().flatten() {
                    s += A[(k, j)] * n[j] * mu[j];
                }
                rhs[e] = s;
            }
            for (p, phase) in layout.phases.iter().enumerate() {
                let mut s = Np[p];
                for &j in phase {
                    s += n[j] * (mu[j] - 1.0);
                }
                rhs[ne + p] = s;
            }
            for (q, &c) in included.iter().enumerate() {
                rhs[ne + np + q] = gt[c];
            }
            let x = match M.lu().solve(&rhs) {
                Some(x) => x,
                None => {
                    warn!("singular Newton matrix at iteration {}", iterations);
                    break;
                }
            };
            pi = x.rows(0, ne).into_owned();

            let mut dln_n = DVector::zeros(num_species);
            for (p, phase) in layout.phases.iter().enumerate() {
                for &j in phase {
                    let mut s = x[ne + p] - mu[j];
                    for (e, &k) in layout.elements.iter().enumerate() {
                        s += A[(k, j)] * pi[e];
                    }
                    dln_n[j] = s;
                }
            }

            // damping of the Newton step (CEA rules)
            let mut largest: f64 = 0.0;
            let mut lambda: f64 = 1.0;
            for (p, phase) in layout.phases.iter().enumerate() {
                largest = largest.max(5.0 * x[ne + p].abs());
                for &j in phase {
                    let ln_x = ln_n[j] - lnN[p];
                    if ln_x > -SIZE {
                        if dln_n[j] > 0.0 {
                            largest = largest.max(dln_n[j]);
                        }
                    } else if dln_n[j] >= 0.0 {
                        let denominator = dln_n[j] - x[ne + p];
                        if denominator > 0.0 {
                            lambda = lambda.min(((-ln_x - LN_1E4) / denominator).abs());
                        }
                    }
                }
            }
            if largest > 2.0 {
                lambda = lambda.min(2.0 / largest);
            }

            // convergence measure from the undamped corrections
            let total = Np.iter().sum::<f64>() + included.iter().map(|&c| n_cond[c]).sum::<f64>();
            let mut step: f64 = 0.0;
            for (p, phase) in layout.phases.iter().enumerate() {
                step = step.max(Np[p] * x[ne + p].abs() / total);
                for &j in phase {
                    step = step.max(n[j] * dln_n[j].abs() / total);
                }
            }
            for q in 0..nc {
                step = step.max(x[ne + np + q].abs() / total);
            }
            let mass_residual = layout
                .elements
                .iter()
                .map(|&k| (b[k] - b_hat[k]).abs())
                .fold(0.0, f64::max)
                / scale;
            residual = step.max(mass_residual);

            for (p, phase) in layout.phases.iter().enumerate() {
                for &j in phase {
                    ln_n[j] = (ln_n[j] + lambda * dln_n[j]).max(self.options.trace_log_floor);
                }
                lnN[p] += lambda * x[ne + p];
            }
            let mut removed = false;
            for (q, &c) in included.iter().enumerate() {
                let updated = n_cond[c] + lambda * x[ne + np + q];
                if updated <= 0.0 {
                    debug!(
                        "condensed species {} leaves the equilibrium",
                        self.system.species[c].name
                    );
                    n_cond[c] = 0.0;
                    removed = true;
                } else {
                    n_cond[c] = updated;
                }
            }
            if removed {
                included.retain(|&c| n_cond[c] > 0.0);
                self.ensure_carriers(&layout, b, &mut included, &mut n_cond);
                phase_changes += 1;
                if phase_changes > max_phase_changes {
                    warn!("too many changes of the set of condensed phases");
                    break;
                }
                continue;
            }
            if residual > tol {
                continue;
            }
            // stability of the absent pure condensed substances
            let mut most_supersaturated: Option<(usize, f64)> = None;
            for &c in layout.condensed.iter().filter(|c| !included.contains(c)) {
                let mut delta = gt[c];
                for (e, &k) in layout.elements.iter().enumerate() {
                    delta -= A[(k, c)] * pi[e];
                }
                if delta < -self.options.condensed_tolerance
                    && most_supersaturated.map(|(_, d)| delta < d).unwrap_or(true)
                {
                    most_supersaturated = Some((c, delta));
                }
            }
            match most_supersaturated {
                Some((c, delta)) => {
                    debug!(
                        "condensed species {} enters the equilibrium (affinity {})",
                        self.system.species[c].name, delta
                    );
                    n_cond[c] = 0.0;
                    included.push(c);
                    phase_changes += 1;
                    if phase_changes > max_phase_changes {
                        warn!("too many changes of the set of condensed phases");
                        break;
                    }
                }
                None => {
                    converged = true;
                    break;
                }
            }
        }

        // final amounts
        n.fill(0.0);
        for &j in layout.phases.iter().flatten() {
            n[j] = ln_n[j].exp();
        }
        for &c in &included {
            n[c] = n_cond[c];
        }
        for p in 0..np {
            Np[p] = lnN[p].exp();
        }
        let mut y = DVector::zeros(self.system.num_elements());
        for (e, &k) in layout.elements.iter().enumerate() {
            y[k] = pi[e];
        }
        let mut z = DVector::zeros(num_species);
        for (p, phase) in layout.phases.iter().enumerate() {
            for &j in phase {
                let mut s = gt[j] + ln_n[j] - lnN[p];
                for &k in &layout.elements {
                    s -= A[(k, j)] * y[k];
                }
                z[j] = s;
            }
        }
        for &c in &layout.condensed {
            let mut s = gt[c];
            for &k in &layout.elements {
                s -= A[(k, c)] * y[k];
            }
            z[c] = s;
        }
        let state = EquilibriumState { T, P, n, y, z };

        let sensitivity = if converged {
            self.sensitivity(&layout, &included, &state.n, &Np, T, P)
                .ok_or_else(|| {
                    SmartEquilibriumError::SingularSystem(format!(
                        "sensitivity matrix at T = {} K, P = {} Pa is singular",
                        T, P
                    ))
                })?
        } else {
            Sensitivity::zeros(num_species, self.system.num_elements())
        };
        if converged {
            info!(
                "equilibrium at T = {} K, P = {} Pa converged in {} iterations",
                T, P, iterations
            );
        } else {
            warn!(
                "equilibrium at T = {} K, P = {} Pa did not converge in {} iterations, residual {:e}",
                T, P, iterations, residual
            );
        }
        Ok(ExactSolveOutcome {
            state,
            sensitivity,
            converged,
            iterations,
            residual,
        })
    }

    /// Derivatives of the solution with respect to w = [T, P, b] by differentiation of the
    /// equilibrium conditions at the converged point
    #[allow(non_snake_case)]
    fn sensitivity(
        &self,
        layout: &ProblemLayout,
        included: &[usize],
        n: &DVector<f64>,
        Np: &[f64],
        T: f64,
        P: f64,
    ) -> Option<Sensitivity> {
        let A = &self.system.formula_matrix;
        let (ne, np, nc) = (layout.elements.len(), layout.phases.len(), included.len());
        let num_elements = self.system.num_elements();
        let lu = self.newton_matrix(layout, included, n, Np).lu();
        let dgdT = self.potentials_dT(T, P);
        let dgdP = self.potentials_dP(T, P);
        let mut sensitivity = Sensitivity::zeros(self.system.num_species(), num_elements);
        for col in 0..num_elements + 2 {
            let dg = match col {
                0 => Some(&dgdT),
                1 => Some(&dgdP),
                _ => None,
            };
            let mut rhs = DVector::zeros(ne + np + nc);
            match dg {
                Some(dg) => {
                    for (e, &k) in layout.elements.iter().enumerate() {
                        rhs[e] = layout
                            .phases
                            .iter()
                            .flatten()
                            .map(|&j| A[(k, j)] * n[j] * dg[j])
                            .sum();
                    }
                    for (p, phase) in layout.phases.iter().enumerate() {
                        rhs[ne + p] = phase.iter().map(|&j| n[j] * dg[j]).sum();
                    }
                    for (q, &c) in included.iter().enumerate() {
                        rhs[ne + np + q] = dg[c];
                    }
                }
                None => match layout.elements.iter().position(|&k| k == col - 2) {
                    Some(e) => rhs[e] = 1.0,
                    // absent elements: the solution does not respond
                    None => continue,
                },
            }
            let x = lu.solve(&rhs)?;
            for (p, phase) in layout.phases.iter().enumerate() {
                for &j in phase {
                    let mut dln = x[ne + p] - dg.map(|dg| dg[j]).unwrap_or(0.0);
                    for (e, &k) in layout.elements.iter().enumerate() {
                        dln += A[(k, j)] * x[e];
                    }
                    sensitivity.dndw[(j, col)] = n[j] * dln;
                }
            }
            for (q, &c) in included.iter().enumerate() {
                sensitivity.dndw[(c, col)] = x[ne + np + q];
            }
            for (e, &k) in layout.elements.iter().enumerate() {
                sensitivity.dydw[(k, col)] = x[e];
            }
        }
        Some(sensitivity)
    }
}

impl ExactSolver for EquilibriumSolver {
    fn system(&self) -> &ChemicalSystem {
        &self.system
    }
    fn restrictions(&self) -> &EquilibriumRestrictions {
        &self.restrictions
    }
    fn solve(
        &mut self,
        conditions: &Conditions,
        initial: &EquilibriumState,
    ) -> Result<ExactSolveOutcome, SmartEquilibriumError> {
        self.solve_equilibrium(conditions, initial)
    }
}
