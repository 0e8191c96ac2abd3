use std::process::ExitCode;

use clap::Parser;
use log::error;

use mesi_emu::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(verbosity(cli.verbose))
        .init();

    match mesi_emu::run(cli) {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn verbosity(count: u8) -> log::LevelFilter {
    match count {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Trace,
    }
}
