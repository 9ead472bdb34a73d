//! Terminal logging of the binary and the examples
use crate::Thermodynamics::ChemEquilibrium::EquilibriumErrors::SmartEquilibriumError;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

/// Installs the terminal logger; fails if a logger is already installed
pub fn init_logger(level: LevelFilter) -> Result<(), SmartEquilibriumError> {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Error)
        .build();
    TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto)
        .map_err(|e| SmartEquilibriumError::Config(format!("logger: {}", e)))
}

/// level from its name ("error", "warn", "info", "debug", "trace", "off")
pub fn level_from_str(level: &str) -> Result<LevelFilter, SmartEquilibriumError> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| SmartEquilibriumError::Config(format!("unknown log level '{}'", level)))
}
