/// examples of exact and smart equilibrium calculations
pub mod smart_equilibrium_examples;
