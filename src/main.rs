use std::process::ExitCode;

use buscacursos::app::App;
use buscacursos::cli::Args;
use buscacursos::config::Config;
use buscacursos::logging::setup_logging;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Config is needed for logging, so its errors can only go to stderr
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:?}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        year = args.year,
        period = %args.period,
        dry_run = args.dry_run,
        "starting buscacursos"
    );

    let app = match App::new(config, args.dry_run).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    app.run(args.year, args.period).await
}
