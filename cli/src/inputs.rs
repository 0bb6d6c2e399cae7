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

//! Arguments shared by the subcommands, and turning them into a [`WritePlan`].

use bitslot::build::Build;
use bitslot::error::BitslotError;
use bitslot::layout::{SlotIndex, SlotTarget};
use bitslot::manifest::Manifest;
use bitslot::package::{Artifact, WritePlan, package};
use bitslot::system_io::fs_read_bytes;
use clap::Args;
use log::{debug, info};
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Clone)]
#[group(required = false, multiple = false)]
pub struct TargetArgs {
    /// User slot, 0 to 7
    #[arg(long)]
    pub slot: Option<u8>,
    /// The bootloader slot at the start of flash
    #[arg(long)]
    pub bootloader: bool,
}

impl TargetArgs {
    /// # Returns: `Result<SlotTarget, BitslotError>`
    /// * `Ok(SlotTarget)` - The selected slot
    /// * `Err(BitslotError::Argument)` - Slot number out of range, or no slot selected
    pub fn target(&self) -> Result<SlotTarget, BitslotError> {
        match (self.slot, self.bootloader) {
            (_, true) => Ok(SlotTarget::Bootloader),
            (Some(n), false) => SlotIndex::try_from(n)
                .map(SlotTarget::User)
                .map_err(|n| BitslotError::Argument(format!("slot {n} does not exist, use 0 to 7"))),
            (None, false) => Err(BitslotError::Argument(
                "either --slot or --bootloader is required".into(),
            )),
        }
    }

    /// Like [`TargetArgs::target`], but a build with execute-in-place firmware
    /// may leave the slot out and go to the bootloader.
    pub fn target_for(&self, build: &Build) -> Result<SlotTarget, BitslotError> {
        match (self.slot, self.bootloader, build.default_target()) {
            (None, false, Some(target)) => {
                info!("'{}' executes in place, using the {target}", build.manifest.display_name);
                Ok(target)
            }
            (None, false, None) => Err(BitslotError::Argument(format!(
                "'{}' has PSRAM firmware, a --slot is required",
                build.manifest.display_name
            ))),
            _ => self.target(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PackageInputs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Gateware bitstream
    #[arg(long, required_unless_present = "archive", conflicts_with = "archive")]
    pub bitstream: Option<PathBuf>,
    /// Firmware binary, matched to manifest regions by file name. May be repeated
    #[arg(long, conflicts_with = "archive")]
    pub firmware: Vec<PathBuf>,
    /// Manifest JSON describing the firmware regions
    #[arg(long, required_unless_present = "archive", conflicts_with = "archive")]
    pub manifest: Option<PathBuf>,
    /// Build archive (.tar.gz) holding top.bit, manifest.json and the firmware files
    #[arg(long)]
    pub archive: Option<PathBuf>,
}

fn artifact_from_path(path: &Path) -> Result<Artifact, BitslotError> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| BitslotError::Argument(format!("{path:?} has no usable file name")))?;
    Ok(Artifact::new(filename, fs_read_bytes(path)?))
}

fn required<'a>(path: &'a Option<PathBuf>, flag: &str) -> Result<&'a Path, BitslotError> {
    path.as_deref()
        .ok_or_else(|| BitslotError::Argument(format!("{flag} is required without --archive")))
}

/// Read the build, from the archive or from loose files.
pub fn read_build(inputs: &PackageInputs) -> Result<Build, BitslotError> {
    if let Some(archive) = &inputs.archive {
        return Build::from_archive(archive);
    }
    let manifest = Manifest::from_slice(&fs_read_bytes(required(&inputs.manifest, "--manifest")?)?)?;
    let bitstream = fs_read_bytes(required(&inputs.bitstream, "--bitstream")?)?;
    let firmware = inputs
        .firmware
        .iter()
        .map(|path| artifact_from_path(path))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Build {
        bitstream,
        firmware,
        manifest,
    })
}

/// Read every input file and package them for the selected slot.
pub fn build_plan(inputs: &PackageInputs) -> Result<WritePlan, BitslotError> {
    let build = read_build(inputs)?;
    let target = inputs.target.target_for(&build)?;
    debug!(
        "Packaging {} byte bitstream and {} firmware file(s) for {target}",
        build.bitstream.len(),
        build.firmware.len()
    );
    let plan = package(&build.request(target))?;
    plan.manifest.print();
    Ok(plan)
}

/// One line per write, as shown to the user.
pub fn describe_plan(plan: &WritePlan) -> String {
    let mut lines = vec![format!(
        "'{}' for {}: {} write(s)",
        plan.manifest.display_name,
        plan.target,
        plan.ops.len()
    )];
    lines.extend(plan.ops.iter().map(|op| format!("  {op}")));
    info!("{}", lines[0]);
    lines.join("\n")
}
