mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{exit_code_for, load_environment, select_machines};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use vessel_builtin::Action;
use vessel_core::install_signal_handler;
use vessel_schema::Category;

#[derive(Debug, Parser)]
#[command(
    name = "vessel",
    version,
    about = "Machine lifecycle orchestrator built on rollback-safe pipelines"
)]
struct Cli {
    /// Path to the orchestrator config file.
    #[arg(long, default_value = "vessel.toml", global = true)]
    config: PathBuf,

    /// Directory holding machine state and lock files.
    #[arg(long, default_value = ".vessel", global = true)]
    data_dir: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create and boot machines (all configured machines when none are named).
    Up {
        machines: Vec<String>,
        /// How many machines to bring up at once.
        #[arg(long, default_value_t = 1)]
        parallel: usize,
    },
    /// Power machines off.
    Halt {
        machines: Vec<String>,
        #[arg(long, default_value_t = 1)]
        parallel: usize,
    },
    /// Destroy machines and forget their state.
    Destroy {
        machines: Vec<String>,
        /// Do not ask for confirmation.
        #[arg(short, long, default_value_t = false)]
        force: bool,
        #[arg(long, default_value_t = 1)]
        parallel: usize,
    },
    /// Show the state of machines.
    Status { machines: Vec<String> },
    /// Save a named snapshot of a machine.
    Snapshot {
        machine: String,
        /// Snapshot name.
        name: String,
    },
    /// Halt a machine and write it out as a box file.
    Package {
        machine: String,
        /// Output path (default: <data-dir>/<machine>.box).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List registered plugin components and their capabilities.
    Plugins,
    /// Detect the most specific guest or host for a set of facts.
    Detect {
        /// guest or host.
        #[arg(long, default_value = "guest")]
        category: Category,
        /// Start from a configured machine's facts.
        #[arg(long)]
        machine: Option<String>,
        /// Extra facts as key=value.
        #[arg(long = "fact")]
        facts: Vec<String>,
    },
    /// Show which component serves a capability.
    Cap {
        category: Category,
        component: String,
        capability: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VESSEL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let result = run(cli);
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn run(cli: Cli) -> Result<u8, String> {
    if let Commands::Completions { shell } = cli.command {
        return commands::completions::run::<Cli>(shell);
    }

    let json = cli.json;
    debug!(
        "config {}, data dir {}",
        cli.config.display(),
        cli.data_dir.display()
    );
    let env = load_environment(&cli.config, &cli.data_dir)?;

    match cli.command {
        Commands::Up { machines, parallel } => {
            let machines = select_machines(&env, &machines)?;
            commands::lifecycle::run(&env, Action::Up, &machines, parallel, false, json)
        }
        Commands::Halt { machines, parallel } => {
            let machines = select_machines(&env, &machines)?;
            commands::lifecycle::run(&env, Action::Halt, &machines, parallel, false, json)
        }
        Commands::Destroy {
            machines,
            force,
            parallel,
        } => {
            let machines = select_machines(&env, &machines)?;
            commands::lifecycle::run(&env, Action::Destroy, &machines, parallel, force, json)
        }
        Commands::Status { machines } => {
            let machines = select_machines(&env, &machines)?;
            commands::status::run(&env, &machines, json)
        }
        Commands::Snapshot { machine, name } => {
            commands::snapshot::run(&env, &machine, &name, json)
        }
        Commands::Package { machine, output } => {
            commands::package::run(&env, &machine, output.as_deref(), json)
        }
        Commands::Plugins => commands::plugins::run(&env, json),
        Commands::Detect {
            category,
            machine,
            facts,
        } => commands::detect::run(&env, category, machine.as_deref(), &facts, json),
        Commands::Cap {
            category,
            component,
            capability,
        } => commands::cap::run(&env, category, &component, &capability, json),
        Commands::Completions { .. } => Ok(commands::EXIT_SUCCESS),
    }
}
