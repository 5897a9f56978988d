use seqbench::cli::{parse_args, setup_logging};
use seqbench::config::ConfigError;
use seqbench::experiment::prepare;
use seqbench::TrainBackend;
use tracing::{error, info};

fn main() {
    let cli = parse_args();

    // Nothing is written before the run is fully resolved
    let run = match prepare::<TrainBackend>(cli.options()) {
        Ok(run) => run,
        Err(e) => {
            match e.downcast_ref::<ConfigError>() {
                Some(ConfigError::UnknownModel(name)) => eprintln!("Unknown model: {name}"),
                _ => eprintln!("Error: {e:#}"),
            }
            std::process::exit(1);
        }
    };

    if let Err(e) = setup_logging(cli.verbose, Some(&run.paths().log_file)) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    info!("{}", seqbench::info());

    if let Err(e) = run.execute() {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
