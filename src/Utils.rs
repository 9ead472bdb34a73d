/// loading of task files: chemical system, options of the smart solver and queries
pub mod load_from_file;
/// terminal logger
pub mod logger;
