use std::process::ExitCode;

use cellview::{cli, logger};
use clap::Parser;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();
    // Initialize session log (overwrites previous session log)
    logger::init();
    cli::run(args)
}
