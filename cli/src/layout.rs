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

use bitslot::layout::{FLASH_SIZE, SlotIndex, SlotTarget, firmware_base};

/// Flash address map, one line per slot plus the unused tail of the chip.
pub fn layout_message() -> String {
    let mut lines = vec![format!(
        "{:<16} {:>10} {:>10} {:>10} {:>10}",
        "slot", "bitstream", "firmware", "manifest", "end"
    )];
    let targets =
        std::iter::once(SlotTarget::Bootloader).chain(SlotIndex::all().map(SlotTarget::User));
    for target in targets {
        let firmware = match target {
            SlotTarget::Bootloader => "-".to_string(),
            SlotTarget::User(slot) => format!("{:#08x}", firmware_base(slot)),
        };
        lines.push(format!(
            "{:<16} {:>10} {:>10} {:>10} {:>10}",
            target.to_string(),
            format!("{:#08x}", target.bitstream_addr()),
            firmware,
            format!("{:#08x}", target.manifest_addr()),
            format!("{:#08x}", target.end()),
        ));
    }
    let last_end = SlotIndex::all()
        .map(|slot| SlotTarget::User(slot).end())
        .max()
        .unwrap_or(FLASH_SIZE);
    if last_end < FLASH_SIZE {
        lines.push(format!(
            "{:<16} {:>10} {:>10} {:>10} {:>10}",
            "unused",
            format!("{last_end:#08x}"),
            "-",
            "-",
            format!("{FLASH_SIZE:#08x}"),
        ));
    }
    lines.join("\n")
}
