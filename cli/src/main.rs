// This file is part of bitslot, an application to manage multiple FPGA bitstream slots in SPI flash.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// bitslot is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// bitslot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! `bitslot` command line tool.
//!
//! ```bash
//! # check a build against slot 2 and dump the resulting writes
//! bitslot package --slot 2 --bitstream build/top.bit --firmware build/firmware.bin \
//!     --manifest build/manifest.json --output /tmp/slot2
//!
//! # flash it, without asking
//! bitslot flash --slot 2 --bitstream build/top.bit --firmware build/firmware.bin \
//!     --manifest build/manifest.json --noconfirm
//!
//! # the same build, as one archive
//! bitslot flash --slot 2 --archive build/polysyn.tar.gz --noconfirm
//!
//! # build the relay vector that reboots into slot 2
//! bitslot stub --slot 2 --input build/bootstub2.bit --output stubs/bitstream2.z
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`

mod flash;
mod inputs;
mod layout;
mod package;
mod stub;

use crate::inputs::{PackageInputs, TargetArgs};
use clap::{Parser, Subcommand};
use log::{debug, error};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bitslot")]
#[command(bin_name = "bitslot")]
#[command(version, about = "Manage FPGA bitstream slots in SPI flash")]
struct Cli {
    #[arg(
        long = "config",
        help = r#"extra config file, applied on top of
/usr/lib/bitslot/config.toml and /etc/bitslot/config.toml.
        "#
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a build against a slot and print its write plan
    Package {
        #[command(flatten)]
        inputs: PackageInputs,
        /// Write every payload of the plan, and the final manifest, into this directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Package a build and write it to flash
    Flash {
        #[command(flatten)]
        inputs: PackageInputs,
        /// Print the programmer invocations instead of running them
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation before writing
        #[arg(long)]
        noconfirm: bool,
        /// Load the bitstream into configuration SRAM only, skipping all other regions
        #[arg(long)]
        volatile: bool,
        /// Programmer backend, overrides the configured one
        #[arg(long)]
        backend: Option<String>,
        /// Flash image file, implies `--backend image` unless a backend is given
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Compress a BootStub bitstream into a relay vector
    Stub {
        #[command(flatten)]
        target: TargetArgs,
        /// BootStub bitstream
        #[arg(long)]
        input: PathBuf,
        /// Compressed vector to write
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the flash address map
    Layout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Package { inputs, output } => {
            package::package_handler(&inputs, output.as_deref())
        }
        Commands::Flash {
            inputs,
            dry_run,
            noconfirm,
            volatile,
            backend,
            image,
        } => {
            let options = flash::FlashOptions {
                dry_run,
                noconfirm,
                volatile,
                backend,
                image,
            };
            flash::flash_handler(config_path, &inputs, &options).await
        }
        Commands::Stub {
            target,
            input,
            output,
        } => stub::stub_handler(&target, &input, &output),
        Commands::Layout => Ok(layout::layout_message()),
    };
    match result {
        Ok(msg) => {
            println!("{msg}");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
