mod cli;
mod jobs;
mod output;
mod run;
mod watch;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Imposter(args) => run::run_imposter(&cli.global, args),
        Command::Sequence(args) => run::run_sequence(&cli.global, args),
        Command::Compute(args) => run::run_compute(&cli.global, args),
        Command::Jobs(args) => jobs::run_jobs(&cli.global, args),
        Command::Watch(args) => watch::run_watch(&cli.global, args),
    }
}
