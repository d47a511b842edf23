// src/main.rs
use std::process::ExitCode;

use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load environment variables from .env file

    voting_backend::init_tracing();

    match voting_backend::start_server().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
