//! Error handling and display for the CLI.

use colored::Colorize;
use containerops_alloc::AllocError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No state directory configured.")]
    MissingStateDir,

    #[error("Invalid port range {0:?}, expected LOW-HIGH (e.g. 12500-13000)")]
    InvalidPortRange(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint_for(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(CliError::MissingStateDir) = err.downcast_ref::<CliError>() {
        return Some(
            "Pass --state-dir, set CONTAINEROPS_STATE_DIR, or add \"state_dir\" to the opsctl config file.",
        );
    }

    match err.downcast_ref::<AllocError>()? {
        AllocError::LockTimeout { .. } => {
            Some("Another deployment holds the table lock. Retry the same command; nothing was changed.")
        }
        AllocError::CorruptState { .. } => Some(
            "The table was not modified. Inspect or restore it from backup; it is never repaired automatically.",
        ),
        AllocError::PoolExhausted { .. } => {
            Some("Release unused endpoints or widen the network's CIDR / port range.")
        }
        AllocError::AddressConflict { .. } => {
            Some("Pick a different address, or release the current holder first.")
        }
        AllocError::OutOfPool { .. } => Some(
            "The network's range changed after this endpoint was allocated. Release it to re-allocate.",
        ),
        _ => None,
    }
}
