mod args;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use regqa_core::config::AppConfig;
use regqa_core::error::AppError;
use tracing_subscriber::EnvFilter;

use args::{Args, Commands};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), AppError> {
    let cfg = AppConfig::load(args.config.as_deref())?;
    match args.command {
        Commands::Chunk { input, output } => commands::chunk(&cfg, input, output),
        Commands::Init => commands::init(&cfg),
        Commands::Index { force, from_chunks } => commands::index(&cfg, force, from_chunks),
        Commands::Ask {
            question,
            k,
            stream,
        } => commands::ask(&cfg, &question, k, stream),
        Commands::Search { question, k } => commands::search(&cfg, &question, k),
        Commands::Status => commands::status(&cfg),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
