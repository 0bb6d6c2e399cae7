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

use crate::inputs::TargetArgs;
use bitslot::error::BitslotError;
use bitslot::relay::stub::{compress_stub, stub_file_name};
use bitslot::system_io::{fs_read_bytes, fs_write_bytes};
use bitslot::trigger::Trigger;
use log::warn;
use std::path::Path;

/// Compress the BootStub at `input` into the relay vector for the selected slot.
///
/// # Returns: `Result<String, BitslotError>`
/// * `Ok(String)` - Sizes before and after compression
/// * `Err(BitslotError)` - No slot selected, or a file could not be read or written
pub fn stub_handler(target: &TargetArgs, input: &Path, output: &Path) -> Result<String, BitslotError> {
    let trigger = Trigger::from(target.target()?);
    let bitstream = fs_read_bytes(input)?;
    let compressed = compress_stub(&bitstream);
    fs_write_bytes(output, true, &compressed)?;

    let expected = stub_file_name(trigger);
    if output.file_name().and_then(|name| name.to_str()) != Some(expected.as_str()) {
        warn!("The relay only loads {trigger} from a file called '{expected}'");
    }
    Ok(format!(
        "{trigger}: {} bytes compressed to {} bytes in {output:?}",
        bitstream.len(),
        compressed.len()
    ))
}
