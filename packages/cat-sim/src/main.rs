use std::process::ExitCode;

use cat_sim::batch::{run_batch, SimulationPlan};
use cat_sim::config::SimConfig;
use cat_sim::corpus::load_corpus;
use cat_sim::error::SimResult;
use cat_sim::logging;

fn run(config: &SimConfig) -> SimResult<()> {
    let corpus = load_corpus(&config.corpus_path)?;
    let cat_config = config.cat_config()?;
    let plan = SimulationPlan {
        true_thetas: config.true_thetas.clone(),
        replications: config.replications,
        seed: config.seed,
        response_model: config.response_model,
    };

    tracing::info!(
        thetas = plan.true_thetas.len(),
        replications = plan.replications,
        model = ?plan.response_model,
        "starting simulation"
    );

    let summary = run_batch(&corpus, &cat_config, &plan)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = match SimConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init_tracing(&config.log_level);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
