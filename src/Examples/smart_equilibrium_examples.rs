use crate::Kinetics::SmartKinetics::{KineticsOptions, SmartKinetics};
use crate::Kinetics::molmass::create_elem_composition_matrix;
use crate::Thermodynamics::ChemEquilibrium::ChemicalState::{Conditions, EquilibriumState};
use crate::Thermodynamics::ChemEquilibrium::EquilibriumPath::EquilibriumPath;
use crate::Thermodynamics::ChemEquilibrium::EquilibriumSolver::EquilibriumSolver;
use crate::Thermodynamics::ChemEquilibrium::SmartEquilibrium::SmartEquilibriumSolver;
use crate::Thermodynamics::ChemEquilibrium::SmartOptions::SmartEquilibriumOptions;
use crate::Thermodynamics::ChemicalSystem::{
    ChemicalSystem, IdealThermoModel, P_REF, PhaseDefinition, PhaseKind, SpeciesData,
};
use crate::Utils::load_from_file::LoadData;
use nalgebra::DVector;

/// CO, CO2 and O2 over graphite, formation data in J/mol
fn carbon_oxygen_system() -> ChemicalSystem {
    ChemicalSystem::new(vec![
        PhaseDefinition::new(
            "gas",
            PhaseKind::Gas,
            vec![
                SpeciesData::new("CO", -110_530.0, 89.4),
                SpeciesData::new("CO2", -393_520.0, 2.9),
                SpeciesData::new("O2", 0.0, 0.0),
            ],
        ),
        PhaseDefinition::new(
            "graphite",
            PhaseKind::Condensed,
            vec![SpeciesData::new("C(gr)", 0.0, 0.0).with_formula("C")],
        ),
    ])
    .unwrap()
}

pub fn smart_equilibrium_examples(task: usize) {
    match task {
        0 => {
            // EXACT EQUILIBRIUM WITH A CONDENSED PHASE
            let system = carbon_oxygen_system();
            system.pretty_print_system();
            let (matrix, elements) = create_elem_composition_matrix(&["CO", "CO2", "O2", "C"], None).unwrap();
            println!("elements {:?}, formula matrix {}", elements, matrix);
            let solver = EquilibriumSolver::new(
                system.clone(),
                Box::new(IdealThermoModel::from_system(&system)),
            );
            for O in [1.0, 1.5, 2.0, 2.5] {
                let conditions =
                    Conditions::from_element_amounts(&system, 1200.0, P_REF, &[("C", 1.0), ("O", O)])
                        .unwrap();
                let outcome = solver
                    .solve_equilibrium(&conditions, &EquilibriumState::new(&system))
                    .unwrap();
                println!(
                    "O/C = {}: converged {} in {} iterations",
                    O, outcome.converged, outcome.iterations
                );
                outcome.state.pretty_print_state(&system);
            }
        }
        1 => {
            // SMART EQUILIBRIUM ALONG A PATH IN TEMPERATURE AND COMPOSITION
            let system = carbon_oxygen_system();
            let mut solver = SmartEquilibriumSolver::from_system(
                system.clone(),
                Box::new(IdealThermoModel::from_system(&system)),
                SmartEquilibriumOptions::default(),
            )
            .unwrap();
            let start =
                Conditions::from_element_amounts(&system, 900.0, P_REF, &[("C", 1.0), ("O", 1.2)])
                    .unwrap();
            let end =
                Conditions::from_element_amounts(&system, 1300.0, P_REF, &[("C", 1.0), ("O", 2.6)])
                    .unwrap();
            let path =
                EquilibriumPath::solve(&mut solver, &EquilibriumState::new(&system), &start, &end, 200)
                    .unwrap();
            path.pretty_print(&system);
            solver.pretty_print_statistics();
            solver.index().read().unwrap().pretty_print_clusters();
        }
        2 => {
            // OXIDATION OF GRAPHITE BY AN OXYGEN FEED
            let system = carbon_oxygen_system();
            let solver = SmartEquilibriumSolver::from_system(
                system.clone(),
                Box::new(IdealThermoModel::from_system(&system)),
                SmartEquilibriumOptions::default(),
            )
            .unwrap();
            let oxygen = system.element_index("O").unwrap();
            let feed = move |_t: f64, _c: &Conditions, _s: &EquilibriumState| {
                let mut rate = DVector::<f64>::zeros(2);
                rate[oxygen] = 0.5;
                rate
            };
            let options = KineticsOptions {
                t0: 0.0,
                t_end: 4.0,
                steps: 400,
                heating_rate: 25.0,
            };
            let mut kinetics = SmartKinetics::new(solver, feed, options).unwrap();
            let initial =
                Conditions::from_element_amounts(&system, 1000.0, P_REF, &[("C", 1.0), ("O", 0.5)])
                    .unwrap();
            let mut state = EquilibriumState::new(&system);
            let result = kinetics.integrate(&initial, &mut state).unwrap();
            result.pretty_print();
            kinetics.solver.pretty_print_statistics();
            state.pretty_print_state(&system);
        }
        3 => {
            // TASK FROM FILE
            let task = LoadData::new("tasks/carbon_oxygen.task".to_string())
                .load_task()
                .unwrap();
            let system = task.system.clone();
            let mut solver = SmartEquilibriumSolver::from_system(
                system.clone(),
                Box::new(IdealThermoModel::from_system(&system)),
                task.options.clone(),
            )
            .unwrap();
            let mut state = EquilibriumState::new(&system);
            for conditions in &task.queries {
                let result = solver.solve(&mut state, conditions).unwrap();
                println!(
                    "T = {}, b = {:?}: cache {}, exact {}, rejection {:?}",
                    conditions.T,
                    conditions.b.as_slice(),
                    result.used_cache,
                    result.exact_solve_invoked,
                    result.rejection
                );
            }
            solver.pretty_print_statistics();
        }
        _ => {
            println!("no such example: {}", task);
        }
    }
}
