//! Loading of smart equilibrium tasks from text files. A task file consists of sections; each one
//! starts with a header line in capitals followed by a JSON document:
//! ```text
//! SYSTEM
//! [ {"name": "gas", "kind": "Gas", "species": [ {"name": "CO", "dH": -110530.0, "dS": 89.7} ]} ]
//! SMART
//! { "absolute_tolerance": 1e-6, "cluster_capacity": 32 }
//! CONDITIONS
//! [ {"T": 1000.0, "P": 101325.0, "amounts": {"C": 1.0, "O": 1.5}} ]
//! ```
//! The `SMART` section (alias `OPTIONS`) is optional, absent fields take default values.
use crate::Thermodynamics::ChemEquilibrium::ChemicalState::Conditions;
use crate::Thermodynamics::ChemEquilibrium::EquilibriumErrors::SmartEquilibriumError;
use crate::Thermodynamics::ChemEquilibrium::SmartOptions::SmartEquilibriumOptions;
use crate::Thermodynamics::ChemicalSystem::{ChemicalSystem, PhaseDefinition};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// one equilibrium query of a task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct ConditionsData {
    pub T: f64,
    pub P: f64,
    /// amounts of elements, mol
    pub amounts: BTreeMap<String, f64>,
}

impl ConditionsData {
    pub fn to_conditions(&self, system: &ChemicalSystem) -> Result<Conditions, SmartEquilibriumError> {
        let amounts: Vec<(&str, f64)> = self
            .amounts
            .iter()
            .map(|(element, amount)| (element.as_str(), *amount))
            .collect();
        Conditions::from_element_amounts(system, self.T, self.P, &amounts)
    }
}

/// everything a task file defines
#[derive(Debug, Clone)]
pub struct SmartTask {
    pub system: ChemicalSystem,
    pub options: SmartEquilibriumOptions,
    pub queries: Vec<Conditions>,
}

pub struct LoadData {
    pub file_name: String,
}

impl LoadData {
    pub fn new(file_name: String) -> Self {
        LoadData { file_name }
    }
    pub fn load_options(&self) -> Result<SmartEquilibriumOptions, SmartEquilibriumError> {
        load_smart_options_from_file(&self.file_name)
    }
    pub fn load_system(&self) -> Result<ChemicalSystem, SmartEquilibriumError> {
        load_system_from_file(&self.file_name)
    }
    pub fn load_task(&self) -> Result<SmartTask, SmartEquilibriumError> {
        load_task_from_file(&self.file_name)
    }
}

fn read_lines(file_name: &str) -> Result<Vec<String>, SmartEquilibriumError> {
    let path = Path::new(file_name);
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(reader.lines().collect::<Result<Vec<String>, _>>()?)
}

/// Text of the section under the first of the given headers (up to the next header or the end of
/// file) and the index of its first line; None if there is no such header
fn find_section(lines: &[String], headers: &[&str]) -> Option<(usize, String)> {
    let start_index = lines
        .iter()
        .position(|line| headers.contains(&line.trim().to_uppercase().as_str()))?
        + 1;
    let end_index = (start_index..lines.len())
        .find(|&i| {
            let trimmed = lines[i].trim();
            !trimmed.is_empty() && trimmed.chars().all(|c| c.is_uppercase() || c == '_')
        })
        .unwrap_or(lines.len());
    Some((start_index, lines[start_index..end_index].join("\n")))
}

/// parses the JSON of a section and points to the offending line of the file on failure
fn parse_section<T: DeserializeOwned>(
    file_name: &str,
    lines: &[String],
    start_index: usize,
    section: &str,
) -> Result<T, SmartEquilibriumError> {
    serde_json::from_str(section).map_err(|e| {
        let actual_line = start_index + e.line().saturating_sub(1);
        error!(
            "Error parsing file '{}' at line {}, column {}: {}",
            file_name,
            actual_line + 1,
            e.column(),
            e
        );
        if let Some(problem_line) = lines.get(actual_line) {
            error!("Problematic line: {}", problem_line);
        }
        SmartEquilibriumError::Json(e)
    })
}

/// options from the `SMART`/`OPTIONS` section, default options if the file has no such section
pub fn load_smart_options_from_file(
    file_name: &str,
) -> Result<SmartEquilibriumOptions, SmartEquilibriumError> {
    let lines = read_lines(file_name)?;
    options_from_lines(file_name, &lines)
}

fn options_from_lines(
    file_name: &str,
    lines: &[String],
) -> Result<SmartEquilibriumOptions, SmartEquilibriumError> {
    let options = match find_section(lines, &["SMART", "OPTIONS"]) {
        Some((start_index, section)) => {
            let options: SmartEquilibriumOptions =
                parse_section(file_name, lines, start_index, &section)?;
            info!("Successfully parsed smart equilibrium options from '{}'", file_name);
            options
        }
        None => {
            warn!("No 'SMART' or 'OPTIONS' section in '{}', default options are used", file_name);
            SmartEquilibriumOptions::default()
        }
    };
    options.validate()?;
    Ok(options)
}

/// options from a JSON document
pub fn smart_options_from_json(json: &str) -> Result<SmartEquilibriumOptions, SmartEquilibriumError> {
    let options: SmartEquilibriumOptions = serde_json::from_str(json)?;
    options.validate()?;
    Ok(options)
}

/// chemical system from the `SYSTEM`/`PHASES` section
pub fn load_system_from_file(file_name: &str) -> Result<ChemicalSystem, SmartEquilibriumError> {
    let lines = read_lines(file_name)?;
    system_from_lines(file_name, &lines)
}

fn system_from_lines(file_name: &str, lines: &[String]) -> Result<ChemicalSystem, SmartEquilibriumError> {
    let (start_index, section) = find_section(lines, &["SYSTEM", "PHASES"]).ok_or_else(|| {
        SmartEquilibriumError::Config(format!(
            "No 'SYSTEM' or 'PHASES' header found in file '{}'",
            file_name
        ))
    })?;
    let phases: Vec<PhaseDefinition> = parse_section(file_name, lines, start_index, &section)?;
    Ok(ChemicalSystem::new(phases)?)
}

/// system, options and queries of a task file; the `CONDITIONS` section may be absent
pub fn load_task_from_file(file_name: &str) -> Result<SmartTask, SmartEquilibriumError> {
    let lines = read_lines(file_name)?;
    let system = system_from_lines(file_name, &lines)?;
    let options = options_from_lines(file_name, &lines)?;
    let queries = match find_section(&lines, &["CONDITIONS", "QUERIES"]) {
        Some((start_index, section)) => {
            let data: Vec<ConditionsData> =
                parse_section(file_name, &lines, start_index, &section)?;
            data.iter()
                .map(|query| query.to_conditions(&system))
                .collect::<Result<Vec<_>, _>>()?
        }
        None => {
            warn!("No 'CONDITIONS' section in '{}'", file_name);
            Vec::new()
        }
    };
    info!(
        "Task '{}': {} species, {} elements, {} queries",
        file_name,
        system.num_species(),
        system.num_elements(),
        queries.len()
    );
    Ok(SmartTask {
        system,
        options,
        queries,
    })
}
