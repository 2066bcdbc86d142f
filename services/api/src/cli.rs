use crate::demo::{run_demo, run_scenario_list, run_scenario_validate, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use courtcraft::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "courtcraft-api",
    about = "Serve and exercise adjudicated courtroom simulations from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect scenario definitions without starting the server
    Scenario {
        #[command(subcommand)]
        command: ScenarioCommand,
    },
    /// Play a scripted session through to certification
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ScenarioCommand {
    /// List the scenarios available to the catalog
    List {
        /// Read definitions from this directory instead of the built-in set
        #[arg(long)]
        scenario_dir: Option<PathBuf>,
    },
    /// Validate a single `<id>.json` definition (and its evidence manifest, if present)
    Validate { path: PathBuf },
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured scenario directory
    #[arg(long)]
    pub(crate) scenario_dir: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Scenario {
            command: ScenarioCommand::List { scenario_dir },
        } => run_scenario_list(scenario_dir),
        Command::Scenario {
            command: ScenarioCommand::Validate { path },
        } => run_scenario_validate(&path),
        Command::Demo(args) => run_demo(args).await,
    }
}
