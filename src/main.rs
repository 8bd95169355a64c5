//! HAL Simulator - CLI Entry Point
//!
//! Commands:
//! - `hal-sim run <manifest>` - Run a multi-unit system to completion
//! - `hal-sim exec <program>` - Run a single unit without ports
//! - `hal-sim check <manifest>` - Load and wire a system without running it
//! - `hal-sim list <program>` - Print a numbered program listing
//! - `hal-sim config` - Print the effective configuration

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;

use halsim::cpu::execute::TRACE_TARGET;
use halsim::loader::InputSpec;
use halsim::{load_program, load_system, OpcodeTable, PortRef, RunReport, SimConfig, SimError, System, Unit};

#[derive(Parser)]
#[command(name = "hal-sim")]
#[command(version = "0.1.0")]
#[command(about = "A simulator for networks of HAL accumulator machines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every unit of a system until all have halted or faulted
    Run {
        /// Path to the system manifest
        manifest: PathBuf,
        /// Config file layered over ./hal-sim.json
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Log registers before and after every step
        #[arg(short, long)]
        trace: bool,
        /// Longest a single IN/OUT may block (0 waits forever)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Fault any unit that runs this many instructions without STOP
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Extra external input, as UNIT:PORT=VALUE (repeatable)
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<InputSpec>,
        /// Extra result port, as UNIT:PORT (repeatable)
        #[arg(short, long = "result")]
        results: Vec<PortRef>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a single program on its own
    Exec {
        /// Path to the program file
        program: PathBuf,
        /// Log registers before and after every step
        #[arg(short, long)]
        trace: bool,
        /// Fault after this many instructions without STOP
        #[arg(short, long)]
        max_cycles: Option<u64>,
    },
    /// Load and wire a system without running it
    Check {
        /// Path to the system manifest
        manifest: PathBuf,
        /// Config file layered over ./hal-sim.json
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the numbered instruction listing of a program
    List {
        /// Path to the program file
        program: PathBuf,
    },
    /// Print the configuration a run would use
    Config {
        /// Config file layered over ./hal-sim.json
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger();

    match cli.command {
        Commands::Run { manifest, config, trace, timeout_ms, max_cycles, inputs, results, json } => {
            let overrides = Overrides { trace, timeout_ms, max_cycles };
            run_system(&manifest, config.as_deref(), overrides, inputs, results, json)
        }
        Commands::Exec { program, trace, max_cycles } => {
            let overrides = Overrides { trace, timeout_ms: None, max_cycles };
            exec_program(&program, overrides)
        }
        Commands::Check { manifest, config } => check_system(&manifest, config.as_deref()),
        Commands::List { program } => list_program(&program),
        Commands::Config { config } => print_config(config.as_deref()),
    }
}

/// Command-line settings that beat every other config source.
struct Overrides {
    trace: bool,
    timeout_ms: Option<u64>,
    max_cycles: Option<u64>,
}

impl Overrides {
    fn apply(&self, config: &mut SimConfig) {
        if self.trace {
            config.trace = true;
        }
        if let Some(ms) = self.timeout_ms {
            config.io_timeout_ms = (ms > 0).then_some(ms);
        }
        if self.max_cycles.is_some() {
            config.max_cycles = self.max_cycles;
        }
    }
}

/// Units emit on the trace target only when their trace option is set.
fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .filter_module(TRACE_TARGET, log::LevelFilter::Debug)
        .try_init()
        .ok();
}

fn load_config(explicit: Option<&Path>, overrides: &Overrides) -> Result<SimConfig, SimError> {
    let mut config = SimConfig::load_with(explicit)?;
    overrides.apply(&mut config);
    Ok(config)
}

fn parse_input(text: &str) -> Result<InputSpec, String> {
    let (target, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected UNIT:PORT=VALUE, found '{}'", text))?;
    let target: PortRef = target.parse()?;
    let value = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid input value '{}'", value.trim()))?;
    Ok(InputSpec { target, value: Some(value) })
}

/// Fill manifest inputs that carry no value, one line of stdin each.
fn read_missing_inputs(inputs: &mut [InputSpec]) -> Result<(), SimError> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    for input in inputs.iter_mut().filter(|input| input.value.is_none()) {
        eprint!("Value for input {}: ", input.target);
        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => return Err(SimError::MissingInput(input.target)),
        };
        let text = line.trim();
        let value = text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SimError::InvalidInput { target: input.target, text: text.to_string() })?;
        input.value = Some(value);
    }
    Ok(())
}

fn run_system(
    manifest: &Path,
    config: Option<&Path>,
    overrides: Overrides,
    inputs: Vec<InputSpec>,
    results: Vec<PortRef>,
    json: bool,
) -> ExitCode {
    let config = match load_config(config, &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let table = OpcodeTable::new();
    let mut loaded = match load_system(manifest, &table) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("❌ Failed to load system: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !json {
        println!("🔧 Running: {} ({} units)", manifest.display(), loaded.units.len());
    }

    if let Err(e) = read_missing_inputs(&mut loaded.manifest.inputs) {
        eprintln!("❌ {}", e);
        return ExitCode::FAILURE;
    }
    loaded.manifest.inputs.extend(inputs);
    loaded.manifest.results.extend(results);

    let system = match System::from_loaded(loaded, config) {
        Ok(system) => system,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = system.run();

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("━━━ Units ━━━");
    for (index, unit) in report.units.iter().enumerate() {
        println!(
            "[{}] {:<24} {:?}  cycles={}  pc={}  acc={}",
            index, unit.name, unit.state, unit.cycles, unit.pc, unit.accumulator
        );
        if let Some(fault) = &unit.fault {
            println!("    ⚠️  {}", fault);
        }
    }

    if !report.results.is_empty() {
        println!();
        println!("━━━ Results ━━━");
        for result in &report.results {
            if result.values.is_empty() {
                println!("{}: (no value)", result.target);
            } else {
                let values: Vec<String> = result.values.iter().map(|v| v.to_string()).collect();
                println!("{}: {}", result.target, values.join(", "));
            }
        }
    }

    println!();
    if report.is_success() {
        println!("✓ All units halted in {:?}", report.elapsed);
    } else {
        println!("❌ {} unit(s) faulted", report.faulted().count());
    }
}

fn exec_program(path: &Path, overrides: Overrides) -> ExitCode {
    let config = match load_config(None, &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let program = match load_program(path, &OpcodeTable::new()) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("🔧 Executing: {} ({} instructions)", path.display(), program.len());

    let mut unit = Unit::with_options(path.display().to_string(), program, config.unit_options());
    let outcome = unit.run();

    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", unit.cycles);
    println!("State:  {:?}", unit.state);
    println!("PC:     {}", unit.regs.pc);
    println!("ACC:    {}", unit.regs.acc);
    if let Some(instr) = unit.last_instruction() {
        println!("Last:   {}", instr);
    }
    for (index, value) in unit.regs.file.iter().enumerate().filter(|(_, v)| **v != 0.0) {
        println!("R{:<2}:    {}", index, value);
    }

    match outcome {
        Ok(elapsed) => {
            println!();
            println!("✓ Halted in {:?}", elapsed);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Execution fault at PC={}: {}", unit.regs.pc, e);
            ExitCode::FAILURE
        }
    }
}

/// What `check` found in a manifest.
#[derive(Debug)]
struct CheckSummary {
    units: usize,
    connections: usize,
    inputs: usize,
    from_stdin: usize,
    results: usize,
    port_capacity: usize,
}

/// Load and wire a system with the layered config, without running it.
fn check(manifest: &Path, config: Option<&Path>) -> Result<CheckSummary, SimError> {
    let config = SimConfig::load_with(config)?;
    let port_capacity = config.port_capacity;
    let mut loaded = load_system(manifest, &OpcodeTable::new())?;

    let mut from_stdin = 0;
    // Values only matter at run time; a placeholder is enough to check wiring.
    for input in loaded.manifest.inputs.iter_mut().filter(|input| input.value.is_none()) {
        input.value = Some(0.0);
        from_stdin += 1;
    }

    let summary = CheckSummary {
        units: loaded.units.len(),
        connections: loaded.manifest.topology.len(),
        inputs: loaded.manifest.inputs.len(),
        from_stdin,
        results: loaded.manifest.results.len(),
        port_capacity,
    };
    System::from_loaded(loaded, config)?;
    Ok(summary)
}

fn check_system(manifest: &Path, config: Option<&Path>) -> ExitCode {
    match check(manifest, config) {
        Ok(summary) => {
            println!("✓ {}", manifest.display());
            println!(
                "  {} units, {} connections (port capacity {})",
                summary.units, summary.connections, summary.port_capacity
            );
            println!(
                "  {} inputs ({} read from stdin), {} results",
                summary.inputs, summary.from_stdin, summary.results
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_program(path: &Path) -> ExitCode {
    match load_program(path, &OpcodeTable::new()) {
        Ok(program) => {
            println!("📖 {}", path.display());
            println!();
            print!("{}", halsim::Memory::new(program).listing());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_config(explicit: Option<&Path>) -> ExitCode {
    let config = match SimConfig::load_with(explicit) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string_pretty(&config) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to serialize config: {}", e);
            ExitCode::FAILURE
        }
    }
}
