pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "aquaclaim",
    about = "Aquaclaim operator CLI",
    long_about = "Operate Aquaclaim migrations, demo fixtures, config inspection, readiness checks, and metric recomputation.",
    after_help = "Examples:\n  aquaclaim doctor --json\n  aquaclaim config\n  aquaclaim recompute --pwsid CA5500042"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo water system fixtures")]
    Seed,
    #[command(
        about = "Validate config, evidence and mail readiness, and DB connectivity checks"
    )]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Re-derive stored metrics for every source of one water system")]
    Recompute {
        #[arg(long, help = "Public water system identifier, e.g. CA5500042")]
        pwsid: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Recompute { pwsid } => commands::recompute::run(&pwsid),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
