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

use crate::inputs::{PackageInputs, build_plan, describe_plan};
use bitslot::config::{ProgrammerConfig, programmer_config};
use bitslot::error::BitslotError;
use bitslot::flash::executor::{ExecutionMode, dry_run, execute};
use bitslot::flash::programmer::{TransportSession, programmer_for_backend, registered_backends};
use bitslot::flash::register_programmers;
use log::{debug, info};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const IMAGE_BACKEND: &str = "image";

#[derive(Debug, Clone, Default)]
pub struct FlashOptions {
    pub dry_run: bool,
    pub noconfirm: bool,
    pub volatile: bool,
    pub backend: Option<String>,
    pub image: Option<PathBuf>,
}

impl FlashOptions {
    fn mode(&self) -> ExecutionMode {
        if self.volatile {
            ExecutionMode::Volatile
        } else {
            ExecutionMode::Persistent
        }
    }

    /// Apply the command line on top of the configured programmer.
    fn apply(&self, config: &ProgrammerConfig) -> ProgrammerConfig {
        let mut config = config.clone();
        if let Some(image) = &self.image {
            config.image_path = Some(image.clone());
            config.backend = IMAGE_BACKEND.to_string();
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        config
    }
}

/// Ask on stdout, read the answer from `input`. Only "y" and "yes" agree.
fn confirm(input: &mut impl BufRead, question: &str) -> Result<bool, BitslotError> {
    print!("{question} [y/N] ");
    std::io::stdout()
        .flush()
        .map_err(|e| BitslotError::Internal(format!("failed to flush stdout: {e}")))?;
    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(|e| BitslotError::Internal(format!("failed to read answer: {e}")))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Package the inputs and write them with the configured programmer.
///
/// # Arguments
///
/// * `config_path` - Extra config layer given with `--config`
/// * `inputs` - Target slot and build files
/// * `options` - Flash flags from the command line
///
/// # Returns: `Result<String, BitslotError>`
/// * `Ok(String)` - What was written, or the programmer invocations for a dry run
/// * `Err(BitslotError::Argument)` - Unknown backend, or the user declined
/// * `Err(BitslotError::Validation)` - The build does not fit the slot
/// * `Err(BitslotError::Transport)` - The programmer could not be opened or closed, or a write failed
pub async fn flash_handler(
    config_path: Option<&Path>,
    inputs: &PackageInputs,
    options: &FlashOptions,
) -> Result<String, BitslotError> {
    register_programmers();
    let config = options.apply(programmer_config(config_path));
    debug!("Using programmer config {config:?}, available backends: {:?}", registered_backends());
    let programmer = programmer_for_backend(&config.backend, &config)?;

    let plan = build_plan(inputs)?;
    let mode = options.mode();
    if options.dry_run {
        let invocations = dry_run(&plan, programmer.as_ref(), mode);
        return Ok(format!("{}\n{}", describe_plan(&plan), invocations.join("\n")));
    }

    println!("{}", describe_plan(&plan));
    if !options.noconfirm {
        let question = format!("Write {} with '{}'?", plan.target, config.backend);
        if !confirm(&mut std::io::stdin().lock(), &question)? {
            return Err(BitslotError::Argument("flash aborted by user".into()));
        }
    }

    let mut session = TransportSession::acquire(programmer).await?;
    let report = execute(&plan, session.programmer(), mode)?;
    session.finish()?;
    info!("Flashed '{}' to {}", plan.manifest.display_name, plan.target);
    let mut message = format!(
        "'{}' written to {}: {}",
        plan.manifest.display_name,
        plan.target,
        report.written.join(", ")
    );
    if !report.skipped.is_empty() {
        message.push_str(&format!(" (skipped: {})", report.skipped.join(", ")));
    }
    Ok(message)
}
