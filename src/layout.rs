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

//! Flash address map.
//!
//! The SPI flash is split into 1 MiB slots. The bootloader owns the first one,
//! user slots 0..7 follow it:
//!
//! ```text
//! 0x000000 ┌───────────────────────────┐ bootloader bitstream
//!          │ XIP firmware (fixed addr) │
//! 0x0FFC00 │ manifest                  │
//! 0x100000 ├───────────────────────────┤ slot 0 bitstream
//! 0x1C0000 │ PSRAM firmware images     │
//! 0x1FFC00 │ manifest                  │
//! 0x200000 ├───────────────────────────┤ slot 1 bitstream
//!          ⋮                           ⋮
//! 0x900000 └───────────────────────────┘
//! ```
//!
//! Everything here is plain arithmetic without side effects.

use std::fmt;
use std::ops::Range;

pub const BOOTLOADER_BITSTREAM_ADDR: u32 = 0x000000;
/// First user slot starts here.
pub const SLOT_BITSTREAM_BASE: u32 = 0x100000;
pub const SLOT_SIZE: u32 = 0x100000;
pub const FIRMWARE_BASE_SLOT0: u32 = 0x1C0000;
pub const MANIFEST_SIZE: u32 = 1024;
pub const FLASH_PAGE_SIZE: u32 = 1024;
pub const FLASH_SIZE: u32 = 0x1000000;
pub const N_SLOTS: u8 = 8;

/// Index of a user slot, guaranteed to be in `0..N_SLOTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub const FIRST: SlotIndex = SlotIndex(0);

    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (0..N_SLOTS).map(SlotIndex)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for SlotIndex {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < N_SLOTS {
            Ok(SlotIndex(value))
        } else {
            Err(value)
        }
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn bitstream_addr(slot: SlotIndex) -> u32 {
    SLOT_BITSTREAM_BASE + slot.0 as u32 * SLOT_SIZE
}

pub fn firmware_base(slot: SlotIndex) -> u32 {
    FIRMWARE_BASE_SLOT0 + slot.0 as u32 * SLOT_SIZE
}

pub fn manifest_addr(slot: SlotIndex) -> u32 {
    bitstream_addr(slot) + SLOT_SIZE - MANIFEST_SIZE
}

/// Round `x` up to the next multiple of [`FLASH_PAGE_SIZE`].
pub fn align_up(x: u32) -> u32 {
    x.div_ceil(FLASH_PAGE_SIZE) * FLASH_PAGE_SIZE
}

/// Round `x` down to a multiple of [`FLASH_PAGE_SIZE`].
pub fn align_down(x: u32) -> u32 {
    x - x % FLASH_PAGE_SIZE
}

/// Page-aligned span covered by `len` bytes written at `addr`.
pub fn page_span(addr: u32, len: u32) -> Range<u32> {
    align_down(addr)..align_up(addr + len)
}

/// Which slot a package or a trigger is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotTarget {
    Bootloader,
    User(SlotIndex),
}

impl SlotTarget {
    pub fn base(self) -> u32 {
        match self {
            SlotTarget::Bootloader => BOOTLOADER_BITSTREAM_ADDR,
            SlotTarget::User(slot) => bitstream_addr(slot),
        }
    }

    pub fn end(self) -> u32 {
        self.base() + SLOT_SIZE
    }

    pub fn bitstream_addr(self) -> u32 {
        self.base()
    }

    pub fn manifest_addr(self) -> u32 {
        self.end() - MANIFEST_SIZE
    }

    /// Whether `range` lies entirely inside this slot.
    pub fn contains(self, range: &Range<u32>) -> bool {
        range.start >= self.base() && range.end <= self.end()
    }
}

impl fmt::Display for SlotTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotTarget::Bootloader => write!(f, "bootloader slot"),
            SlotTarget::User(slot) => write!(f, "slot {slot}"),
        }
    }
}
