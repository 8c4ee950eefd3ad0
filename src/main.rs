use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use uart_capitalizer_tb::{config::TbConfig, logger, tb};

/// Runs the UART capitalizer testbench on the built-in simulation kernel.
#[derive(Parser, Debug)]
#[command(name = "uart_capitalizer_tb", version, about)]
struct Cli {
    /// TOML configuration file. Defaults apply to every key it leaves out.
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether all tests passed.
fn run(cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let cfg = match &cli.config {
        Some(path) => TbConfig::from_file(path)?,
        None => TbConfig::default(),
    };
    logger::init(cfg.level_filter()?)?;

    let kernel = tb::build_kernel(&cfg)?;
    let tests = uart_capitalizer_tb::run(&kernel, tb::capitalizer_tests(&cfg), &tb::run_options(&cfg))?;
    Ok(tests.iter().all(|t| t.passed()))
}
