mod cli;
mod infra;
mod routes;
mod runner;
mod server;

use expense_ai::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
