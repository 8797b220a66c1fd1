//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
        retryable: bool,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create an API error from response details.
    pub fn api(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: Option<String>,
        retryable: bool,
    ) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
            request_id,
            retryable,
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::Api { status: 409, .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Another replica is running this job. Try again once it finishes."
                        .yellow()
                );
            }
            CliError::Api {
                status: 503,
                request_id,
                ..
            } => {
                eprintln!(
                    "\n{}",
                    "Hint: The scheduler cannot reach its database. Check `/readyz`.".yellow()
                );
                if let Some(request_id) = request_id {
                    eprintln!("Request ID: {}", request_id);
                }
            }
            CliError::Api {
                request_id: Some(request_id),
                retryable,
                ..
            } => {
                if *retryable {
                    eprintln!("\n{}", "Hint: This error is transient; retrying may work.".yellow());
                }
                eprintln!("\nRequest ID: {}", request_id);
            }
            CliError::Network(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that the scheduler is running and --api-url is correct.".yellow()
                );
            }
            _ => {}
        }
    }
}
