//! gopt Command-Line Interface
//!
//! Runs a Gaussian input deck, restarting geometry optimizations until they
//! converge.
//!
//! # Usage
//!
//! ```bash
//! gopt -in <deck> [-optSteps <n>] [-restartJob <n>] [-maxRetries <n>]
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Run every job of ethanol.com, 8 optimization cycles per submission
//! gopt -in ethanol.com
//!
//! # 20 cycles per submission, resume at the third job of the deck
//! gopt -in ethanol.com -optSteps 20 -restartJob 3
//! ```

use gopt::config::RunConfig;
use gopt::naming::FileNaming;
use gopt::orchestrator::run_deck;
use gopt::settings::SettingsManager;
use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::process;

/// Values given on the command line.
#[derive(Debug, Default)]
struct CliArgs {
    input: Option<PathBuf>,
    opt_steps: Option<u32>,
    restart_job: Option<usize>,
    max_retries: Option<u32>,
    help: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("gopt");

    let cli = match parse_args(&args[1.min(args.len())..]) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage(program);
            process::exit(1);
        }
    };
    if cli.help {
        print_usage(program);
        process::exit(0);
    }
    let Some(input) = cli.input.clone() else {
        eprintln!("Error: Missing required argument -in <deck>");
        print_usage(program);
        process::exit(1);
    };

    let settings = SettingsManager::load().unwrap_or_else(|_| SettingsManager::defaults());
    init_logger(&settings.logging().level);
    info!("Configuration loaded from: {}", settings.config_source());

    if FileNaming::new(&input).log_collides_with_input() {
        eprintln!(
            "Error: Input deck {} would be overwritten by the output log; rename it",
            input.display()
        );
        process::exit(1);
    }

    let mut config = RunConfig::new(&input, settings.settings());
    if let Some(opt_steps) = cli.opt_steps {
        config = config.with_opt_steps(opt_steps);
    }
    if let Some(max_retries) = cli.max_retries {
        config = config.with_max_retries(max_retries);
    }
    if let Some(restart_job) = cli.restart_job {
        config = config.with_restart_job(restart_job);
    }
    if config.max_retries.is_none() {
        warn!("Optimization restarts are not limited; a job that never converges runs forever");
    }

    match run_deck(&config) {
        Ok(summary) => info!(
            "All jobs completed ({} submissions), output in {}",
            summary.submissions,
            config.log_path.display()
        ),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Initializes the console logger. `RUST_LOG` overrides the configured level.
fn init_logger(level: &str) {
    let level = level.parse().unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format_timestamp_millis()
        .init();
}

/// Parses arguments after the program name.
fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => cli.help = true,
            "-in" => {
                let value = iter.next().ok_or("Missing value for -in")?;
                cli.input = Some(PathBuf::from(value));
            }
            "-optSteps" => {
                let steps: u32 = parse_value(arg, iter.next())?;
                if steps == 0 {
                    return Err("-optSteps must be a positive integer".to_string());
                }
                cli.opt_steps = Some(steps);
            }
            "-restartJob" => cli.restart_job = Some(parse_value(arg, iter.next())?),
            "-maxRetries" => cli.max_retries = Some(parse_value(arg, iter.next())?),
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(cli)
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("Missing value for {}", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

/// Prints usage information to stderr.
fn print_usage(program_name: &str) {
    eprintln!("gopt - run Gaussian optimizations with automatic restarts");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  {} -in <deck> [-optSteps <n>] [-restartJob <n>] [-maxRetries <n>]",
        program_name
    );
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -in <deck>         Gaussian input deck, may contain several --Link1-- jobs");
    eprintln!("                     output is appended to <deck>.out");
    eprintln!("  -optSteps <n>      optimization cycles per submission (default: 8)");
    eprintln!("  -restartJob <n>    start with job number <n> of the deck");
    eprintln!("  -maxRetries <n>    restarts allowed per optimization, 0 = unlimited (default: 20)");
    eprintln!("  -h, --help         print this help");
    eprintln!();
    eprintln!("Whenever an optimization does not complete within <n> cycles it is restarted");
    eprintln!("from the checkpoint. If the previous job was a frequency calculation it is");
    eprintln!("rerun on the current geometry and the optimization continues with ReadFC;");
    eprintln!("otherwise the optimization continues with CalcFC.");
    eprintln!();
    eprintln!("Settings are read from ./gopt_config.cfg, ~/.config/gopt/gopt_config.cfg");
    eprintln!("and /etc/gopt/gopt_config.cfg.");
}
