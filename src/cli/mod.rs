//! Command-line interface over the persisted analytics.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

/// Print a command failure and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json: bool) -> ! {
    if json {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        eprintln!(
            "{}",
            serde_json::json!({ "error": err.to_string(), "causes": chain })
        );
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
