//! axon — interactive simulator for asynchronous circuits.
//!
//! Loads an elaborated design (JSON, as produced by a synthesis frontend),
//! initializes a simulation of the requested top-level process, and drives
//! it through the interactive command loop on stdin, or from a command
//! script.
//!
//! Exit codes: 0 on a normal quit, 1 for usage or load errors, 2 when a
//! warning fires under the `exit-on-warn` policy.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use axon_ir::Design;
use axon_sim::{CommandEngine, SimCommand, SimConfig};

/// axon — asynchronous circuit simulator.
#[derive(Parser, Debug)]
#[command(name = "axon", version, about = "Asynchronous circuit simulator")]
struct Cli {
    /// Elaborated design file (JSON).
    design: PathBuf,

    /// Top-level process type to simulate (defaults to the design's top).
    #[arg(short = 'p', long = "process")]
    process: Option<String>,

    /// Enforce exclusive high/low constraint groups.
    #[arg(short = 'm', long = "monitors")]
    monitors: bool,

    /// Simulation timescale in seconds per tick (display only).
    #[arg(short = 't', long = "timescale")]
    timescale: Option<f64>,

    /// Seed for the simulation PRNG.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Run commands from a script file instead of stdin.
    #[arg(short = 'c', long = "commands")]
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders its own message (including --help/--version).
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("axon: {msg}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<u8, String> {
    if let Some(t) = cli.timescale {
        if t <= 0.0 {
            return Err("timescale value has to be positive".into());
        }
    }

    let design = load_design(&cli.design)?;
    let config = SimConfig {
        seed: cli.seed,
        enable_monitors: cli.monitors,
        timescale: cli.timescale.unwrap_or(10e-12),
        ..SimConfig::default()
    };

    let mut engine = CommandEngine::new(Arc::new(design), config);
    engine
        .execute(&SimCommand::Initialize {
            proc: cli.process.clone(),
        })
        .map_err(|e| e.to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let code = match &cli.script {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("could not open script `{}`: {e}", path.display()))?;
            engine
                .run_repl(&mut BufReader::new(file), &mut out)
                .map_err(|e| e.to_string())?
        }
        None => {
            let stdin = io::stdin();
            engine
                .run_repl(&mut stdin.lock(), &mut out)
                .map_err(|e| e.to_string())?
        }
    };
    Ok(code as u8)
}

fn load_design(path: &PathBuf) -> Result<Design, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read design `{}`: {e}", path.display()))?;
    serde_json::from_str(&contents)
        .map_err(|e| format!("malformed design `{}`: {e}", path.display()))
}
