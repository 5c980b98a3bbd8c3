//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Natural-language notification rules, compiled and run on a schedule.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API and the rule scheduler (default).
    Serve {
        /// Bind host, overriding HOST.
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overriding PORT.
        #[arg(long)]
        port: Option<u16>,
        /// Serve the API without starting the scheduler loop.
        #[arg(long, env = "HERALD_NO_SCHEDULER")]
        no_scheduler: bool,
    },
    /// Run a single scheduler tick against the stored rules and print its report.
    TickOnce,
    /// Compile a rule source file and report its diagnostics.
    CompileCheck {
        /// Path to a rule source file.
        file: PathBuf,
    },
}

impl Cli {
    /// The subcommand to run, `serve` when none was given.
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Serve {
            host: None,
            port: None,
            no_scheduler: false,
        })
    }
}
