// SPDX-License-Identifier: MIT

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "ember-flasher")]
#[command(about = "Application image flasher for the ember bootloader")]
pub struct Cli {
    /// SocketCAN interface (e.g., can0)
    #[arg(short, long, default_value = "can0")]
    pub interface: String,

    /// ECU identifier stamped into every frame
    #[arg(short, long, default_value = "1")]
    pub ecu_id: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Stream an application image to the ECU and commit it
    Flash {
        /// Application binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Ask the ECU to validate and launch the flashed application
    Boot,

    /// Park the ECU in recovery
    Recover,
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let mut transport = Transport::new(&cli.interface, cli.ecu_id)?;

    match cli.command {
        Commands::Flash { file } => commands::flash(&mut transport, &file),
        Commands::Boot => commands::boot(&mut transport),
        Commands::Recover => commands::recover(&mut transport),
    }
}
