use crate::runner::{run_receipts, RunArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use expense_ai::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Expense Report Pipeline",
    about = "Turn receipt images into a compliance-checked expense report",
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
    /// Process a directory of receipt images and print progress as it happens
    Run(RunArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Run(args) => run_receipts(args).await,
    }
}
