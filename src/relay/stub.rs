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

//! BootStub vectors.
//!
//! A BootStub is a tiny bitstream whose only job is to make the FPGA reboot
//! from a given flash address. There is one per trigger. The relay keeps them
//! zlib-compressed and inflates one right before replaying it.
//!
//! On disk a table is a directory with one file per trigger, named after the
//! lowercased token: `bitstream0.z` .. `bitstream7.z` and `bootloader.z`.

use crate::error::BitslotError;
use crate::layout::SlotIndex;
use crate::system_io::fs_read_bytes;
use crate::trigger::Trigger;
use log::{debug, trace};
use miniz_oxide::deflate::compress_to_vec_zlib;
use miniz_oxide::inflate::decompress_to_vec_zlib_with_limit;
use std::collections::HashMap;
use std::path::Path;

/// Upper bound for an inflated vector.
pub const MAX_VECTOR_SIZE: usize = 4 * 1024 * 1024;

const COMPRESSION_LEVEL: u8 = 9;

/// Compress a BootStub bitstream into a relay vector.
pub fn compress_stub(bitstream: &[u8]) -> Vec<u8> {
    compress_to_vec_zlib(bitstream, COMPRESSION_LEVEL)
}

pub fn stub_file_name(trigger: Trigger) -> String {
    format!("{}.z", trigger.to_string().to_lowercase())
}

#[derive(Debug, Clone, Default)]
pub struct StubTable {
    vectors: HashMap<Trigger, Vec<u8>>,
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an already compressed vector for `trigger`.
    pub fn insert(&mut self, trigger: Trigger, compressed: Vec<u8>) {
        trace!("{trigger}: {} byte vector", compressed.len());
        self.vectors.insert(trigger, compressed);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Load every vector present in `dir`. Missing files are skipped.
    pub fn load_dir(dir: &Path) -> Result<Self, BitslotError> {
        let mut table = StubTable::new();
        let triggers = SlotIndex::all()
            .map(Trigger::Slot)
            .chain(std::iter::once(Trigger::Bootloader));
        for trigger in triggers {
            let path = dir.join(stub_file_name(trigger));
            if path.is_file() {
                table.insert(trigger, fs_read_bytes(&path)?);
            } else {
                debug!("No stub for {trigger} at {path:?}");
            }
        }
        Ok(table)
    }

    /// Inflate the vector for `trigger`.
    ///
    /// # Returns: `Result<Vec<u8>, BitslotError>`
    /// * `Ok(Vec<u8>)` - The BootStub bitstream, ready to be shifted out
    /// * `Err(BitslotError::Argument)` - No vector stored for `trigger`
    /// * `Err(BitslotError::Internal)` - The stored vector is not valid zlib, or inflates
    ///   past [`MAX_VECTOR_SIZE`]
    pub fn vector(&self, trigger: Trigger) -> Result<Vec<u8>, BitslotError> {
        let compressed = self
            .vectors
            .get(&trigger)
            .ok_or_else(|| BitslotError::Argument(format!("no BootStub vector for {trigger}")))?;
        decompress_to_vec_zlib_with_limit(compressed, MAX_VECTOR_SIZE).map_err(|e| {
            BitslotError::Internal(format!("BootStub vector for {trigger} is corrupt: {e:?}"))
        })
    }
}
