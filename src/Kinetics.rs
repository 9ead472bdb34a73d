/// Module to calculate the atomic composition and molar mass of a chemical formula
///
///  # Examples
/// ```
/// use SmartKiThe::Kinetics::molmass::{calculate_molar_mass, parse_formula};
/// let formula = "C6H8O6";
/// let (molar_mass, element_composition) = calculate_molar_mass(formula, None).unwrap();
/// println!("Element counts: {:?}", element_composition);
/// println!("Molar mass: {:?} g/mol", molar_mass);
/// let atomic_composition = parse_formula("Na(NO3)2", None).unwrap();
/// assert_eq!(atomic_composition["O"], 6);
/// ```
///
pub mod molmass;
/// Kinetic processes with fast chemical equilibrium: the slow process changes the amounts of elements,
/// the equilibrium at every time step is computed by the smart equilibrium solver
pub mod SmartKinetics;
