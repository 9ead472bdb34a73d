use SmartKiThe::Examples::smart_equilibrium_examples::smart_equilibrium_examples;
use SmartKiThe::Utils::logger::init_logger;
use simplelog::LevelFilter;

pub fn main() {
    if let Err(e) = init_logger(LevelFilter::Info) {
        eprintln!("{}", e);
    }
    // 0 - exact solver, 1 - path, 2 - kinetics, 3 - task file
    let task: usize = 1;
    smart_equilibrium_examples(task);
}
