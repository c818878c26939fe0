use clap::Parser;
use portforge_core::arch::MAX_PORTS;
use portforge_core::channel::CommandChannel;
use portforge_core::parse::config::parse_config;
use portforge_core::parse::experiments::parse_experiments;
use portforge_core::parse::mappings::parse_mappings;
use portforge_core::{
    Architecture, Config, EvalInfo, Experiment, Mapping, PfResult, PortForgeError, RngPool,
    Runner, RunnerOptions,
};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing::{error, info};

const COMMAND_FILE: &str = "/tmp/portforge-cmd";
const REPLY_FILE: &str = "/tmp/portforge-reply";

#[derive(Parser, Debug)]
#[command(
    name = "portforge",
    version,
    about = "Infer CPU port mappings from black-box throughput measurements"
)]
struct Cli {
    /// Experiment file (omit when reading from stdin with -i)
    experiments: Option<PathBuf>,

    /// Config file (built-in defaults when omitted)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Evaluate the experiments with this mapping instead of searching
    #[arg(short = 'm', long = "mapping")]
    mapping: Option<PathBuf>,

    /// Singleton experiments for all instructions (required when searching)
    #[arg(short = 'e', long = "singletons")]
    singletons: Option<PathBuf>,

    /// Read experiments from stdin instead of a file
    #[arg(short = 'i', long = "stdin")]
    read_stdin: bool,

    /// Print winners as JSON to stdout
    #[arg(short = 'j', long = "json")]
    json: bool,

    /// Repeat the evaluation N times and print timing as JSON to stderr
    /// (only with -m)
    #[arg(short = 't', long = "timing", value_name = "N")]
    timing: Option<u32>,

    /// Print the N best mappings once evolution has finished
    #[arg(short = 'n', long = "num-results", value_name = "N", default_value_t = 1)]
    num_results: usize,

    /// Read a seed population of mappings from this file
    #[arg(short = 'p', long = "population")]
    population: Option<PathBuf>,

    /// Write progress to this journal target ('stdout', 'stderr' or a
    /// path); also enables the command channel
    #[arg(short = 'x', long = "journal")]
    journal: Option<String>,

    /// Override the port count given by the config
    #[arg(short = 'q', long = "ports")]
    ports: Option<usize>,

    /// Seed for the random number generator
    #[arg(short = 's', long = "seed", default_value_t = 424242)]
    seed: u64,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        error!("{err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> PfResult<()> {
    check_usage(cli)?;

    let config = match &cli.config {
        Some(path) => parse_config(open(path)?)?,
        None => Config::default(),
    };
    let num_ports = cli.ports.unwrap_or(config.num_ports);
    let mut arch = Architecture::new(num_ports);

    let exps = match (&cli.experiments, cli.read_stdin) {
        (_, true) => parse_experiments(io::stdin().lock(), &mut arch)?,
        (Some(path), false) => parse_experiments(open(path)?, &mut arch)?,
        (None, false) => return Err(usage("missing experiment file")),
    };

    if let Some(mapping_path) = &cli.mapping {
        return evaluate_only(cli, mapping_path, &mut arch, &exps);
    }
    search(cli, &config, &mut arch, &exps)
}

fn check_usage(cli: &Cli) -> PfResult<()> {
    if cli.read_stdin && cli.experiments.is_some() {
        return Err(usage("superfluous positional argument with -i"));
    }
    if !cli.read_stdin && cli.experiments.is_none() {
        return Err(usage("missing experiment file"));
    }
    if cli.num_results < 1 {
        return Err(usage("argument for -n must be > 0"));
    }
    if cli.timing.is_some() && cli.mapping.is_none() {
        return Err(usage("-t requires -m"));
    }
    if let Some(ports) = cli.ports {
        if ports == 0 || ports > MAX_PORTS {
            return Err(usage("argument for -q must be in [1, 26]"));
        }
    }
    Ok(())
}

fn usage(msg: &str) -> PortForgeError {
    PortForgeError::Validation(msg.to_string())
}

fn open(path: &Path) -> PfResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| PortForgeError::Validation(format!("cannot open '{}': {err}", path.display())))
}

/// `-m`: simulate every experiment with the given mapping, optionally
/// repeating the sweep for timing and checking the results against the
/// measured cycles.
fn evaluate_only(
    cli: &Cli,
    mapping_path: &Path,
    arch: &mut Architecture,
    exps: &[Experiment],
) -> PfResult<()> {
    let mappings = parse_mappings(open(mapping_path)?, arch)?;
    let mapping = mappings
        .first()
        .ok_or_else(|| usage("mapping file contains no mapping"))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Simulating experiments with the following mapping:")?;
    serde_json::to_writer_pretty(&mut out, &mapping.to_json(arch))?;
    writeln!(out)?;

    let repetitions = cli.timing.unwrap_or(1).max(1);
    let start = Instant::now();
    for _ in 0..repetitions {
        for exp in exps {
            writeln!(out, "Simulating:")?;
            exp.write_text(arch, &mut out)?;
            let result = mapping.simulate_experiment(arch, exp);
            writeln!(out, "result: {result}")?;
            if cli.timing.is_some() && (result - exp.measured_cycles()).abs() > 1e-5 {
                writeln!(out, "Simulated result does not match measurement!")?;
                return Err(PortForgeError::Validation(
                    "simulated result does not match measurement".to_string(),
                ));
            }
        }
    }
    let elapsed = start.elapsed().as_secs_f64();

    if cli.timing.is_some() {
        let secs_per_exp = elapsed / (exps.len() as f64 * f64::from(repetitions));
        eprintln!(
            "{}",
            serde_json::json!({ "total_secs": elapsed, "secs_per_exp": secs_per_exp })
        );
    }
    Ok(())
}

fn search(cli: &Cli, config: &Config, arch: &mut Architecture, exps: &[Experiment]) -> PfResult<()> {
    let singleton_path = cli
        .singletons
        .as_ref()
        .ok_or_else(|| usage("-e parameter with path to singleton experiments missing"))?;
    let singleton_exps = parse_experiments(open(singleton_path)?, arch)?;

    let mut singleton_cycles = vec![0.0; arch.num_insns()];
    for exp in &singleton_exps {
        if exp.insn_seq().len() != 1 {
            return Err(PortForgeError::Validation(
                "erroneous singleton experiment with more than one instruction".to_string(),
            ));
        }
        singleton_cycles[exp.insn_seq()[0]] = exp.measured_cycles();
    }

    let seeds: Vec<Mapping> = match &cli.population {
        Some(path) => {
            let seeds = parse_mappings(open(path)?, arch)?;
            if seeds.len() > config.population_size {
                return Err(usage(&format!(
                    "number of mappings in '{}' > PopulationSize",
                    path.display()
                )));
            }
            seeds
        }
        None => Vec::new(),
    };

    let (journal, channel): (Option<Box<dyn Write>>, Option<CommandChannel>) = match &cli.journal {
        Some(target) => {
            let stream: Box<dyn Write> = match target.as_str() {
                "stdout" => Box::new(io::stdout()),
                "stderr" => Box::new(io::stderr()),
                path => Box::new(File::create(path)?),
            };
            let channel = CommandChannel::new(COMMAND_FILE, REPLY_FILE)?;
            info!(
                command_file = COMMAND_FILE,
                reply_file = REPLY_FILE,
                "📡 command channel enabled"
            );
            (Some(stream), Some(channel))
        }
        None => (None, None),
    };

    info!(
        num_insns = arch.num_insns(),
        num_ports = arch.num_ports(),
        num_experiments = exps.len(),
        population_size = config.population_size,
        "🧬 starting evolution"
    );

    let eval_info = EvalInfo::new(arch, exps, &singleton_cycles, config);
    let rng = RngPool::seeded(cli.seed);
    let options = RunnerOptions {
        num_to_print: cli.num_results,
        print_json: cli.json,
    };
    let mut runner: Runner<'_, _, Mapping> =
        Runner::new(config, &rng, &eval_info, seeds, options, journal, channel);
    runner.run();

    eprintln!("# Winning individuals:");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    runner.print_winners(&mut out)?;
    Ok(())
}
