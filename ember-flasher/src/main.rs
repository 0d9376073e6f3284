// SPDX-License-Identifier: MIT

//! Application image flasher for the ember bootloader, over SocketCAN.
//!
//! Usage:
//!   ember-flasher --interface can0 flash app.bin
//!   ember-flasher --interface can0 boot
//!   ember-flasher --interface can0 recover

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}
