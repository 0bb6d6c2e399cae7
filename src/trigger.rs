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

//! UART trigger tokens exchanged between the boot selector and the relay.
//!
//! A trigger is one ASCII line: `BITSTREAM0` .. `BITSTREAM7` to start a user
//! slot, or `BOOTLOADER` to go back to the boot menu.

use crate::layout::{SlotIndex, SlotTarget};
use std::fmt;

const SLOT_PREFIX: &str = "BITSTREAM";
const BOOTLOADER_TOKEN: &str = "BOOTLOADER";

/// Longest token, without line terminator.
pub const MAX_TOKEN_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Slot(SlotIndex),
    Bootloader,
}

impl Trigger {
    /// Parse a line with its terminator already removed. Exact and case-sensitive.
    pub fn parse(line: &[u8]) -> Option<Trigger> {
        if line == BOOTLOADER_TOKEN.as_bytes() {
            return Some(Trigger::Bootloader);
        }
        match line.strip_prefix(SLOT_PREFIX.as_bytes())? {
            [digit @ b'0'..=b'9'] => SlotIndex::try_from(digit - b'0').ok().map(Trigger::Slot),
            _ => None,
        }
    }

    /// Newline-terminated token as sent over UART.
    pub fn to_line(self) -> String {
        format!("{self}\n")
    }

    /// The slot whose stub is replayed for this trigger.
    pub fn target(self) -> SlotTarget {
        match self {
            Trigger::Slot(slot) => SlotTarget::User(slot),
            Trigger::Bootloader => SlotTarget::Bootloader,
        }
    }

    /// Flash address the stub jumps to.
    pub fn bootaddr(self) -> u32 {
        self.target().bitstream_addr()
    }
}

impl From<SlotTarget> for Trigger {
    fn from(target: SlotTarget) -> Self {
        match target {
            SlotTarget::Bootloader => Trigger::Bootloader,
            SlotTarget::User(slot) => Trigger::Slot(slot),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Slot(slot) => write!(f, "{SLOT_PREFIX}{slot}"),
            Trigger::Bootloader => write!(f, "{BOOTLOADER_TOKEN}"),
        }
    }
}
