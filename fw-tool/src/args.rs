// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fw-tool", version, about = "Seal and deploy firmware updates")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate fresh device secrets.
    GenSecrets {
        /// Keyfile to write: two hex lines, decryption key then HMAC key.
        #[arg(long)]
        out: PathBuf,
        /// Also write a factory provisioning block, one flash page the
        /// device migrates and erases on first power-up.
        #[arg(long)]
        provision_block: Option<PathBuf>,
    },
    /// Seal a firmware binary into an encrypted, authenticated image.
    Protect {
        /// Raw firmware binary.
        #[arg(long)]
        firmware: PathBuf,
        /// Release version. 0 is the debug passthrough version.
        #[arg(long)]
        version: u32,
        /// Release message shown by the device at boot.
        #[arg(long, default_value = "")]
        message: String,
        /// Keyfile from gen-secrets.
        #[arg(long)]
        secrets: PathBuf,
        /// Sealed image to write.
        #[arg(long)]
        out: PathBuf,
    },
    /// Send a sealed image to a device waiting in its update service.
    Update {
        /// Sealed image from protect.
        #[arg(long)]
        image: PathBuf,
        /// Serial port name, e.g. /dev/ttyACM0.
        #[arg(long)]
        port: String,
        /// Serial baud rate.
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
    },
}
