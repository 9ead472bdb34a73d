//! Equilibria along the straight line between two sets of conditions, each one solved by the smart
//! solver starting from the previous point
use super::ChemicalState::{Conditions, EquilibriumState};
use super::EquilibriumErrors::SmartEquilibriumError;
use super::EquilibriumSolver::ExactSolver;
use super::SmartEquilibrium::SmartEquilibriumSolver;
use crate::Thermodynamics::ChemicalSystem::ChemicalSystem;
use log::info;
use prettytable::{Table, row};

#[derive(Debug, Clone)]
pub struct PathPoint {
    /// position on the path, from 0 to 1
    pub t: f64,
    pub conditions: Conditions,
    pub state: EquilibriumState,
    pub used_cache: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EquilibriumPath {
    pub points: Vec<PathPoint>,
}

impl EquilibriumPath {
    /// conditions at position t of the segment start..end
    pub fn interpolate(start: &Conditions, end: &Conditions, t: f64) -> Conditions {
        Conditions::new(
            start.T + t * (end.T - start.T),
            start.P + t * (end.P - start.P),
            &start.b + (&end.b - &start.b) * t,
        )
    }

    /// solves `steps + 1` equilibria from `start` to `end`
    pub fn solve<S: ExactSolver>(
        solver: &mut SmartEquilibriumSolver<S>,
        initial: &EquilibriumState,
        start: &Conditions,
        end: &Conditions,
        steps: usize,
    ) -> Result<Self, SmartEquilibriumError> {
        if steps == 0 {
            return Err(SmartEquilibriumError::InvalidConditions(
                "equilibrium path needs at least one step".to_string(),
            ));
        }
        if start.b.len() != end.b.len() {
            return Err(SmartEquilibriumError::InvalidConditions(format!(
                "path ends have {} and {} element amounts",
                start.b.len(),
                end.b.len()
            )));
        }
        let mut state = initial.clone();
        let mut points = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let conditions = Self::interpolate(start, end, t);
            let result = solver.solve(&mut state, &conditions)?;
            points.push(PathPoint {
                t,
                conditions,
                state: state.clone(),
                used_cache: result.used_cache,
            });
        }
        let path = Self { points };
        info!(
            "equilibrium path of {} points, {:.1}% predicted from the cache",
            path.points.len(),
            100.0 * path.hit_rate()
        );
        Ok(path)
    }

    pub fn hit_rate(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().filter(|p| p.used_cache).count() as f64 / self.points.len() as f64
    }
    /// amounts of one species along the path
    pub fn species_profile(&self, species: usize) -> Vec<f64> {
        self.points.iter().map(|p| p.state.n[species]).collect()
    }

    pub fn pretty_print(&self, system: &ChemicalSystem) {
        let mut table = Table::new();
        let mut header = vec!["t".to_string(), "T, K".to_string(), "P, Pa".to_string()];
        header.extend(system.species_names());
        header.push("cache".to_string());
        table.add_row(header.into());
        for point in &self.points {
            let mut cells = vec![
                format!("{:.3}", point.t),
                format!("{:.2}", point.conditions.T),
                format!("{:.1}", point.conditions.P),
            ];
            cells.extend(point.state.n.iter().map(|n| format!("{:.4e}", n)));
            cells.push(if point.used_cache { "hit" } else { "exact" }.to_string());
            table.add_row(cells.into());
        }
        table.printstd();
        let mut summary = Table::new();
        summary.add_row(row!["points", "hit rate"]);
        summary.add_row(row![self.points.len(), format!("{:.3}", self.hit_rate())]);
        summary.printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Thermodynamics::ChemEquilibrium::SmartOptions::SmartEquilibriumOptions;
    use crate::Thermodynamics::ChemicalSystem::{
        IdealThermoModel, P_REF, PhaseDefinition, PhaseKind, SpeciesData,
    };
    use approx::assert_relative_eq;

    fn system() -> ChemicalSystem {
        ChemicalSystem::new(vec![PhaseDefinition::new(
            "gas",
            PhaseKind::Gas,
            vec![
                SpeciesData::new("C", 0.0, 0.0),
                SpeciesData::new("C2", -20_000.0, 0.0),
            ],
        )])
        .unwrap()
    }

    #[test]
    fn test_path_in_temperature() {
        let system = system();
        let mut solver = SmartEquilibriumSolver::from_system(
            system.clone(),
            Box::new(IdealThermoModel::from_system(&system)),
            SmartEquilibriumOptions::default(),
        )
        .unwrap();
        let start = Conditions::from_element_amounts(&system, 1000.0, P_REF, &[("C", 1.0)]).unwrap();
        let end = Conditions::from_element_amounts(&system, 1100.0, P_REF, &[("C", 1.0)]).unwrap();
        let path =
            EquilibriumPath::solve(&mut solver, &EquilibriumState::new(&system), &start, &end, 20)
                .unwrap();
        assert_eq!(path.points.len(), 21);
        assert!(!path.points[0].used_cache);
        assert!(path.hit_rate() > 0.5);
        assert_relative_eq!(path.points[10].conditions.T, 1050.0, epsilon = 1e-9);
        // dissociation grows with temperature
        let atoms = path.species_profile(0);
        assert!(atoms.windows(2).all(|w| w[1] >= w[0] - 1e-6));
        path.pretty_print(&system);
    }

    #[test]
    fn test_path_needs_steps() {
        let system = system();
        let mut solver = SmartEquilibriumSolver::from_system(
            system.clone(),
            Box::new(IdealThermoModel::from_system(&system)),
            SmartEquilibriumOptions::default(),
        )
        .unwrap();
        let start = Conditions::from_element_amounts(&system, 1000.0, P_REF, &[("C", 1.0)]).unwrap();
        assert!(
            EquilibriumPath::solve(&mut solver, &EquilibriumState::new(&system), &start, &start, 0)
                .is_err()
        );
    }
}
