use log::debug;
use nalgebra::DMatrix;
use regex::Regex;
/// Module to calculate the atomic composition and molar mass of a chemical formula
///
///
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

// Define a struct to hold element data
pub struct Element {
    name: &'static str,
    atomic_mass: f64,
}

// Define a list of elements and their atomic masses
const ELEMENTS: &[Element] = &[
    Element {
        name: "H",
        atomic_mass: 1.008,
    },
    Element {
        name: "He",
        atomic_mass: 4.0026,
    },
    Element {
        name: "Li",
        atomic_mass: 6.94,
    },
    Element {
        name: "Be",
        atomic_mass: 9.0122,
    },
    Element {
        name: "B",
        atomic_mass: 10.81,
    },
    Element {
        name: "C",
        atomic_mass: 12.011,
    },
    Element {
        name: "N",
        atomic_mass: 14.007,
    },
    Element {
        name: "O",
        atomic_mass: 15.999,
    },
    Element {
        name: "F",
        atomic_mass: 18.998,
    },
    Element {
        name: "Ne",
        atomic_mass: 20.18,
    },
    Element {
        name: "Na",
        atomic_mass: 22.99,
    },
    Element {
        name: "Mg",
        atomic_mass: 24.305,
    },
    Element {
        name: "Al",
        atomic_mass: 26.98,
    },
    Element {
        name: "Si",
        atomic_mass: 28.085,
    },
    Element {
        name: "P",
        atomic_mass: 30.974,
    },
    Element {
        name: "S",
        atomic_mass: 32.065,
    },
    Element {
        name: "Cl",
        atomic_mass: 35.45,
    },
    Element {
        name: "Ar",
        atomic_mass: 39.948,
    },
    Element {
        name: "K",
        atomic_mass: 39.102,
    },
    Element {
        name: "Ca",
        atomic_mass: 40.08,
    },
    Element {
        name: "Ti",
        atomic_mass: 47.867,
    },
    Element {
        name: "Cr",
        atomic_mass: 51.9961,
    },
    Element {
        name: "Mn",
        atomic_mass: 54.938,
    },
    Element {
        name: "Fe",
        atomic_mass: 55.845,
    },
    Element {
        name: "Co",
        atomic_mass: 58.933,
    },
    Element {
        name: "Ni",
        atomic_mass: 58.69,
    },
    Element {
        name: "Cu",
        atomic_mass: 63.546,
    },
    Element {
        name: "Zn",
        atomic_mass: 65.38,
    },
    Element {
        name: "Br",
        atomic_mass: 79.904,
    },
    Element {
        name: "Sr",
        atomic_mass: 87.62,
    },
    Element {
        name: "Ba",
        atomic_mass: 137.327,
    },
    // Add more elements here...
];

/// errors of formula parsing
#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("unknown element or group '{element}' in formula '{formula}'")]
    UnknownElement { element: String, formula: String },
    #[error("unbalanced brackets in formula '{0}'")]
    UnbalancedBrackets(String),
    #[error("unexpected symbol '{symbol}' in formula '{formula}'")]
    UnexpectedSymbol { symbol: String, formula: String },
    #[error("empty formula")]
    Empty,
}

fn filter_phases_marks(formula: &str) -> String {
    // marks like CO2(g), C(gr), NaCl(s), CO2(aq) are labels, not groups
    let re = Regex::new(r"\((g|G|l|L|s|S|c|C|cr|gr|aq)\)$").expect("valid phase mark regex");
    re.replace(formula, "").to_string()
}
// Chemical formulae may contain spectial names for chemical groupls i.e. groups of atoms, e.g. Me (methyl) group, which is converted into {"C":1, "H":3}
// so we need to convert them into regular elements
fn handle_groups(
    mut counts: HashMap<String, usize>,
    groups: Option<&HashMap<String, HashMap<String, usize>>>,
) -> HashMap<String, usize> {
    if let Some(groups) = groups {
        for (chemical_group, atomic_composition) in groups.iter() {
            if let Some(number_of_chemical_groups) = counts.remove(chemical_group) {
                for (atom, &quantity) in atomic_composition.iter() {
                    *counts.entry(atom.clone()).or_insert(0) += quantity * number_of_chemical_groups;
                }
            }
        }
    }
    counts
}

/// subscript of an element or a bracket, 1 if absent
fn parse_count(count_str: &str, formula: &str) -> Result<usize, FormulaError> {
    if count_str.is_empty() {
        return Ok(1);
    }
    count_str
        .parse()
        .map_err(|_| FormulaError::UnexpectedSymbol {
            symbol: count_str.to_string(),
            formula: formula.to_string(),
        })
}

fn is_known(symbol: &str, groups: Option<&HashMap<String, HashMap<String, usize>>>) -> bool {
    ELEMENTS.iter().any(|e| e.name == symbol)
        || groups.map(|g| g.contains_key(symbol)).unwrap_or(false)
}

/// Parses a chemical formula and returns a HashMap of elements and their counts. Argument groups is optional. It is
/// needed if formula contains shecial names for chemical groups like Me, Ph, etc In that case this argument should contain the names of these groups
/// and there atomic composition { "Me":{"C":1, "H":3}}.
/// Brackets may be nested: Ca(NO3)2, K4(Fe(CN)6)
pub fn parse_formula(
    formula: &str,
    groups: Option<&HashMap<String, HashMap<String, usize>>>,
) -> Result<HashMap<String, usize>, FormulaError> {
    let initial_formula = formula.replace(' ', "");
    if initial_formula.is_empty() {
        return Err(FormulaError::Empty);
    }
    let formula = filter_phases_marks(&initial_formula);
    debug!("parsing formula {}", initial_formula);
    let token = Regex::new(r"([A-Z][a-z]?)(\d*)|(\()|(\))(\d*)").expect("valid formula regex");
    // stack of bracket levels, the bottom level is the whole formula
    let mut stack: Vec<HashMap<String, usize>> = vec![HashMap::new()];
    let mut position = 0;
    for cap in token.captures_iter(&formula) {
        let whole = cap.get(0).expect("group 0 is always present");
        if whole.start() != position {
            return Err(FormulaError::UnexpectedSymbol {
                symbol: formula[position..whole.start()].to_string(),
                formula: initial_formula.clone(),
            });
        }
        position = whole.end();
        if let Some(symbol) = cap.get(1) {
            let symbol = symbol.as_str().to_string();
            let count_str = cap.get(2).map(|m| m.as_str()).unwrap_or("");
            if !is_known(&symbol, groups) {
                return Err(FormulaError::UnknownElement {
                    element: symbol,
                    formula: initial_formula.clone(),
                });
            }
            let count = parse_count(count_str, &initial_formula)?;
            let level = stack.last_mut().expect("stack is never empty");
            *level.entry(symbol).or_insert(0) += count;
        } else if cap.get(3).is_some() {
            stack.push(HashMap::new());
        } else if cap.get(4).is_some() {
            if stack.len() < 2 {
                return Err(FormulaError::UnbalancedBrackets(initial_formula.clone()));
            }
            let multiplier_str = cap.get(5).map(|m| m.as_str()).unwrap_or("");
            let multiplier = parse_count(multiplier_str, &initial_formula)?;
            let inner = stack.pop().expect("checked above");
            let level = stack.last_mut().expect("stack is never empty");
            for (element, count) in inner {
                let total = count.checked_mul(multiplier).ok_or_else(|| {
                    FormulaError::UnexpectedSymbol {
                        symbol: multiplier_str.to_string(),
                        formula: initial_formula.clone(),
                    }
                })?;
                *level.entry(element).or_insert(0) += total;
            }
        }
    }
    if position != formula.len() {
        return Err(FormulaError::UnexpectedSymbol {
            symbol: formula[position..].to_string(),
            formula: initial_formula,
        });
    }
    if stack.len() != 1 {
        return Err(FormulaError::UnbalancedBrackets(initial_formula));
    }
    let counts = stack.pop().expect("stack has one level");
    Ok(handle_groups(counts, groups))
}

/// Function to calculate the molar mass of a substance given its chemical formula
pub fn calculate_molar_mass(
    formula: &str,
    groups: Option<&HashMap<String, HashMap<String, usize>>>,
) -> Result<(f64, HashMap<String, usize>), FormulaError> {
    let counts = parse_formula(formula, groups)?;
    let molar_mass = counts
        .iter()
        .filter_map(|(element, count)| {
            ELEMENTS
                .iter()
                .find(|e| e.name == element)
                .map(|e| e.atomic_mass * *count as f64)
        })
        .sum();
    Ok((molar_mass, counts))
}

/// Creates the matrix of elements composition of substances, where rows are elements and columns are substances,
/// together with the sorted list of elements
pub fn create_elem_composition_matrix(
    vec_of_formulae: &[&str],
    groups: Option<&HashMap<String, HashMap<String, usize>>>,
) -> Result<(DMatrix<f64>, Vec<String>), FormulaError> {
    let mut set_of_elems: BTreeSet<String> = BTreeSet::new();
    let mut vec_of_compositions = Vec::with_capacity(vec_of_formulae.len());
    for formula in vec_of_formulae.iter() {
        let counts = parse_formula(formula, groups)?;
        set_of_elems.extend(counts.keys().cloned());
        vec_of_compositions.push(counts);
    }
    let unique_vec_of_elems: Vec<String> = set_of_elems.into_iter().collect();
    let mut matrix = DMatrix::zeros(unique_vec_of_elems.len(), vec_of_formulae.len());
    for (substance_i, composition) in vec_of_compositions.iter().enumerate() {
        for (j, element_j) in unique_vec_of_elems.iter().enumerate() {
            if let Some(count) = composition.get(element_j) {
                matrix[(j, substance_i)] = *count as f64;
            }
        }
    }
    Ok((matrix, unique_vec_of_elems))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formula() {
        let expected_counts = HashMap::from([
            ("C".to_string(), 6),
            ("H".to_string(), 8),
            ("O".to_string(), 6),
        ]);
        assert_eq!(parse_formula("C6H8O6", None).unwrap(), expected_counts);

        let expected_counts = HashMap::from([
            ("Na".to_string(), 1),
            ("N".to_string(), 2),
            ("O".to_string(), 6),
        ]);
        assert_eq!(parse_formula("Na(NO3)2", None).unwrap(), expected_counts);

        let expected_counts = HashMap::from([("H".to_string(), 2), ("O".to_string(), 1)]);
        assert_eq!(parse_formula("H2O(g)", None).unwrap(), expected_counts);

        let expected_counts = HashMap::from([
            ("C".to_string(), 5),
            ("H".to_string(), 7),
            ("O".to_string(), 2),
        ]);
        assert_eq!(parse_formula("C5H6OOH", None).unwrap(), expected_counts);
        let expected_counts = HashMap::from([("C".to_string(), 1)]);
        assert_eq!(parse_formula("C(gr)", None).unwrap(), expected_counts);
    }

    #[test]
    fn test_nested_brackets() {
        let counts = parse_formula("K4(Fe(CN)6)", None).unwrap();
        assert_eq!(counts["K"], 4);
        assert_eq!(counts["Fe"], 1);
        assert_eq!(counts["C"], 6);
        assert_eq!(counts["N"], 6);
    }

    #[test]
    fn test_bad_formulae() {
        assert_eq!(parse_formula("", None), Err(FormulaError::Empty));
        assert!(matches!(
            parse_formula("Ca(NO3", None),
            Err(FormulaError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            parse_formula("Xq2", None),
            Err(FormulaError::UnknownElement { .. })
        ));
        assert!(matches!(
            parse_formula("H2-O", None),
            Err(FormulaError::UnexpectedSymbol { .. })
        ));
        // subscripts beyond usize are errors, not single atoms
        assert_eq!(
            parse_formula("H99999999999999999999999", None),
            Err(FormulaError::UnexpectedSymbol {
                symbol: "99999999999999999999999".to_string(),
                formula: "H99999999999999999999999".to_string(),
            })
        );
        assert!(matches!(
            parse_formula("(OH)99999999999999999999999", None),
            Err(FormulaError::UnexpectedSymbol { .. })
        ));
        assert_eq!(parse_formula("H2O", None).unwrap()["H"], 2);
    }

    #[test]
    fn test_calculate_molar_mass() {
        let (molar_mass, _) = calculate_molar_mass("H2O(g)", None).unwrap();
        assert!((molar_mass - 18.01528).abs() < 1e-2);
        let (molar_mass, _) = calculate_molar_mass("NaCl", None).unwrap();
        assert!((molar_mass - 58.44).abs() < 1e-2);
        let (molar_mass, _) = calculate_molar_mass("Ca(NO3)2", None).unwrap();
        assert!((molar_mass - 164.093).abs() < 1e-2);
    }

    #[test]
    fn test_with_groups() {
        let groups = HashMap::from([(
            "Me".to_string(),
            HashMap::from([("C".to_string(), 1), ("H".to_string(), 3)]),
        )]);
        let expected_counts = HashMap::from([("H".to_string(), 8), ("C".to_string(), 7)]);
        assert_eq!(parse_formula("C6H5Me", Some(&groups)).unwrap(), expected_counts);
        let expected_counts = HashMap::from([("H".to_string(), 10), ("C".to_string(), 8)]);
        assert_eq!(
            parse_formula("C6H4(Me)2", Some(&groups)).unwrap(),
            expected_counts
        );
    }

    #[test]
    fn test_element_matrix() {
        let vec_of_formulae = vec!["H2O", "NaCl", "C3H8", "CH4"];
        let (matrix, elements) = create_elem_composition_matrix(&vec_of_formulae, None).unwrap();
        assert_eq!(matrix.nrows(), 5);
        assert_eq!(matrix.ncols(), 4);
        assert_eq!(elements, vec!["C", "Cl", "H", "Na", "O"]);
        // propane column
        assert_eq!(matrix[(0, 2)], 3.0);
        assert_eq!(matrix[(2, 2)], 8.0);
    }
}
