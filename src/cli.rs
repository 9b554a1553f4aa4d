// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "haya",
    about = "A self-hosted gateway that fronts a chat agent for channel plugins",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway: binds the HTTP/WebSocket server, starts configured
    /// channel plugins, and runs the cron scheduler until interrupted.
    Serve {
        /// Path to the config file (overrides auto-discovery, spec.md §6).
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Gateway maintenance commands.
    Gateway {
        #[command(subcommand)]
        command: GatewayCommands,
    },

    /// Print the effective configuration (after merging and validation) and exit.
    ShowConfig {
        /// Path to the config file (overrides auto-discovery).
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum GatewayCommands {
    /// Token management (spec.md §6 `gateway.auth.token`).
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// Generate a new bearer token and print it once.
    ///
    /// The caller is responsible for writing the printed token into
    /// `gateway.auth.token` — this command never edits the config file.
    Regenerate,
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "haya", &mut std::io::stdout());
}
