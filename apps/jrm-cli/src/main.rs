use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{
    ConfigCmd, ImportArgs, KeyArgs, ListArgs, PathsArgs, RemoveArgs, ResolveArgs, ScanArgs,
};

#[derive(Parser)]
#[command(name = "jrm", version, about = "Java runtime provisioning utilities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print effective state/cache paths (JSON)
    Paths(PathsArgs),
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    /// List registered runtimes (JSON)
    List(ListArgs),
    /// Resolve a version request to a local runtime, downloading if confirmed
    Resolve(ResolveArgs),
    /// Mark a registered runtime as the platform default
    Activate(KeyArgs),
    /// Remove a runtime from the registry
    Remove(RemoveArgs),
    /// Register an existing JDK home
    Import(ImportArgs),
    /// Register every JDK found below a directory
    Scan(ScanArgs),
}

fn main() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Paths(args) => commands::paths::run(args),
        Commands::Config { cmd } => commands::paths::run_config(cmd),
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async move {
                match command {
                    Commands::List(args) => commands::runtimes::list(args).await,
                    Commands::Resolve(args) => commands::resolve::run(args).await,
                    Commands::Activate(args) => commands::runtimes::activate(args).await,
                    Commands::Remove(args) => commands::runtimes::remove(args).await,
                    Commands::Import(args) => commands::runtimes::import(args).await,
                    Commands::Scan(args) => commands::runtimes::scan(args).await,
                    Commands::Paths(_) | Commands::Config { .. } => Ok(()),
                }
            })
        }
    }
}
