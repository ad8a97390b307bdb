pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "checksweep",
    about = "Checksweep operator CLI",
    long_about = "Inspect configuration, verify Slack access, and preview moderation candidates.",
    after_help = "Examples:\n  checksweep doctor --json\n  checksweep config\n  checksweep scan"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to checksweep.toml (defaults to ./checksweep.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check that the Slack tokens can reach the workspace")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List messages currently carrying the target reaction without deleting")]
    Scan,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Config => commands::config::run(config_path),
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Scan => commands::scan::run(config_path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["checksweep", "doctor", "--json", "--config", "alt.toml"]);

        assert!(matches!(cli.command, Command::Doctor { json: true }));
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("alt.toml")));
    }
}
