use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

mod app;
mod config;
mod error;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let config_path = match env::args_os().nth(1) {
        Some(p) => PathBuf::from(p),
        None => {
            tracing::error!("{}", error::AppError::Usage);
            return ExitCode::FAILURE;
        }
    };

    match app::App::start(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("The run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
