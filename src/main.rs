use anyhow::Result;
use clap::Parser;
use observatory_sampler::cli;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    if let Err(err) = cli::dispatch(args) {
        cli::report_failure(&err);
        std::process::exit(1);
    }
    Ok(())
}
