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
use bitslot::error::BitslotError;
use bitslot::package::WritePlan;
use bitslot::system_io::{fs_create_dir, fs_write_bytes};
use log::info;
use std::path::Path;

/// Package the inputs and optionally dump every write into `output`.
///
/// # Returns: `Result<String, BitslotError>`
/// * `Ok(String)` - The write plan, one line per write
/// * `Err(BitslotError)` - Inputs unreadable, invalid, or output not writable
pub fn package_handler(
    inputs: &PackageInputs,
    output: Option<&Path>,
) -> Result<String, BitslotError> {
    let plan = build_plan(inputs)?;
    let mut message = describe_plan(&plan);
    if let Some(dir) = output {
        write_plan(&plan, dir)?;
        message.push_str(&format!("\nwritten to {dir:?}"));
    }
    Ok(message)
}

/// File name of a dumped payload: `<address>-<region>`, with `.bin` added when the region
/// name has no extension.
fn payload_file_name(address: u32, region_name: &str) -> String {
    match Path::new(region_name).extension() {
        Some(_) => format!("{address:#08x}-{region_name}"),
        None => format!("{address:#08x}-{region_name}.bin"),
    }
}

/// Every payload goes to its own file, the final manifest to `manifest.json`.
fn write_plan(plan: &WritePlan, dir: &Path) -> Result<(), BitslotError> {
    fs_create_dir(dir)?;
    for op in &plan.ops {
        let path = dir.join(payload_file_name(op.address, &op.region_name));
        info!("Writing {path:?}");
        fs_write_bytes(&path, true, &op.payload)?;
    }
    fs_write_bytes(&dir.join("manifest.json"), true, &plan.manifest.to_json())
}
