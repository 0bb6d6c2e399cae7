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

//! File-backed emulation of the SPI flash.
//!
//! A [`FlashImage`] is a 16 MiB byte array that starts fully erased (`0xff`).
//! Writes erase every page they touch before copying the payload in, like the
//! loader does on real hardware. The `image` backend keeps one in a file so
//! that plans can be flashed, inspected and booted without a board.

use crate::config::ProgrammerConfig;
use crate::error::BitslotError;
use crate::flash::programmer::{Programmer, ProgrammerFault};
use crate::layout::{FLASH_SIZE, page_span};
use crate::package::{WriteKind, WriteOp};
use crate::selector::FlashRead;
use crate::system_io::{fs_read_bytes, fs_write_bytes};
use bitslot_macros::programmer;
use log::{info, trace};
use std::path::{Path, PathBuf};

pub const ERASED: u8 = 0xff;

#[derive(Clone, PartialEq, Eq)]
pub struct FlashImage {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for FlashImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.bytes.iter().filter(|b| **b != ERASED).count();
        write!(f, "FlashImage {{ {used} non-erased bytes }}")
    }
}

impl Default for FlashImage {
    fn default() -> Self {
        Self::erased()
    }
}

impl FlashImage {
    pub fn erased() -> Self {
        FlashImage {
            bytes: vec![ERASED; FLASH_SIZE as usize],
        }
    }

    /// Load an image file. It must be exactly [`FLASH_SIZE`] bytes.
    pub fn load(path: &Path) -> Result<Self, BitslotError> {
        let bytes = fs_read_bytes(path)?;
        if bytes.len() != FLASH_SIZE as usize {
            return Err(BitslotError::Argument(format!(
                "{path:?} is {} bytes, a flash image is {FLASH_SIZE}",
                bytes.len()
            )));
        }
        Ok(FlashImage { bytes })
    }

    /// Like [`FlashImage::load`], but a file that does not exist yet is a blank chip.
    pub fn load_or_erased(path: &Path) -> Result<Self, BitslotError> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No flash image at {path:?}, starting from an erased chip");
            Ok(Self::erased())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), BitslotError> {
        fs_write_bytes(path, true, &self.bytes)
    }

    /// Erase the pages touched by `payload` at `offset`, then write it.
    pub fn program(&mut self, offset: u32, payload: &[u8]) -> Result<(), String> {
        let end = u32::try_from(payload.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .filter(|end| *end <= FLASH_SIZE)
            .ok_or_else(|| {
                format!(
                    "{} bytes at {offset:#08x} run past the end of flash",
                    payload.len()
                )
            })?;
        let pages = page_span(offset, end - offset);
        trace!("Erasing [{:#08x}, {:#08x})", pages.start, pages.end);
        self.bytes[pages.start as usize..pages.end as usize].fill(ERASED);
        self.bytes[offset as usize..end as usize].copy_from_slice(payload);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl FlashRead for FlashImage {
    fn read(&self, address: u32, buf: &mut [u8]) {
        let start = (address as usize).min(self.bytes.len());
        let available = &self.bytes[start..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        buf[n..].fill(ERASED);
    }
}

/// Programmer writing into a [`FlashImage`] file.
///
/// The image is loaded on open and saved on close. Volatile bitstream loads
/// never reach the image; the last one is kept as the "running" bitstream.
#[programmer(backend = "image")]
#[derive(Debug)]
pub struct FlashImageProgrammer {
    path: Option<PathBuf>,
    image: Option<FlashImage>,
    loaded_bitstream: Option<Vec<u8>>,
}

impl FlashImageProgrammer {
    pub fn from_config(config: &ProgrammerConfig) -> Self {
        FlashImageProgrammer {
            path: config.image_path.clone(),
            image: None,
            loaded_bitstream: None,
        }
    }

    pub fn loaded_bitstream(&self) -> Option<&[u8]> {
        self.loaded_bitstream.as_deref()
    }
}

impl Programmer for FlashImageProgrammer {
    fn name(&self) -> &'static str {
        "image"
    }

    fn open(&mut self) -> Result<(), ProgrammerFault> {
        let path = self.path.as_deref().ok_or_else(|| {
            ProgrammerFault::Failed("no image_path configured for the image backend".to_string())
        })?;
        let image = FlashImage::load_or_erased(path).map_err(|e| ProgrammerFault::Failed(e.to_string()))?;
        self.image = Some(image);
        Ok(())
    }

    fn write(
        &mut self,
        kind: WriteKind,
        offset: u32,
        persistent: bool,
        payload: &[u8],
    ) -> Result<(), ProgrammerFault> {
        if !persistent {
            if kind != WriteKind::Bit {
                return Err(ProgrammerFault::Failed(
                    "only bitstreams can be loaded into configuration SRAM".to_string(),
                ));
            }
            self.loaded_bitstream = Some(payload.to_vec());
            return Ok(());
        }
        let image = self
            .image
            .as_mut()
            .ok_or_else(|| ProgrammerFault::Failed("image is not open".to_string()))?;
        image.program(offset, payload).map_err(ProgrammerFault::Failed)
    }

    fn close(&mut self) -> Result<(), ProgrammerFault> {
        match (self.image.take(), self.path.as_deref()) {
            (Some(image), Some(path)) => image
                .save(path)
                .map_err(|e| ProgrammerFault::Failed(e.to_string())),
            _ => Ok(()),
        }
    }

    fn describe(&self, op: &WriteOp, persistent: bool) -> String {
        let path = self
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<no image_path>".to_string());
        if persistent {
            format!("image {path}: {op}")
        } else {
            format!("image (volatile): {op}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_erases_touched_pages() {
        let mut image = FlashImage::erased();
        image.program(0x1000, &[0u8; 2048]).unwrap();
        image.program(0x1010, &[0xab; 4]).unwrap();
        let mut buf = [0u8; 24];
        image.read(0x1000, &mut buf);
        assert_eq!(&buf[..16], &[ERASED; 16]);
        assert_eq!(&buf[16..20], &[0xab; 4]);
        // the second page of the first write is untouched
        let mut second_page = [0xffu8; 4];
        image.read(0x1400, &mut second_page);
        assert_eq!(second_page, [0; 4]);
    }

    #[test]
    fn test_program_past_end() {
        let mut image = FlashImage::erased();
        assert!(image.program(FLASH_SIZE - 2, &[0; 4]).is_err());
        assert!(image.program(FLASH_SIZE - 4, &[0; 4]).is_ok());
    }

    #[test]
    fn test_read_past_end_is_erased() {
        let image = FlashImage::erased();
        let mut buf = [0u8; 8];
        image.read(FLASH_SIZE - 4, &mut buf);
        assert_eq!(buf, [ERASED; 8]);
    }

    #[test]
    fn test_programmer_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.img");
        let config = ProgrammerConfig {
            backend: "image".into(),
            image_path: Some(path.clone()),
            ..ProgrammerConfig::default()
        };
        let mut programmer = FlashImageProgrammer::from_config(&config);
        programmer.open().unwrap();
        programmer
            .write(WriteKind::Raw, 0x2FFC00, true, b"{\"name\":\"X\"}")
            .unwrap();
        programmer.close().unwrap();

        let image = FlashImage::load(&path).unwrap();
        assert_eq!(&image.as_bytes()[0x2FFC00..0x2FFC0C], b"{\"name\":\"X\"}");
    }

    #[test]
    fn test_volatile_load_does_not_touch_image() {
        let mut programmer = FlashImageProgrammer {
            path: None,
            image: Some(FlashImage::erased()),
            loaded_bitstream: None,
        };
        programmer.write(WriteKind::Bit, 0x100000, false, &[1, 2, 3]).unwrap();
        assert_eq!(programmer.loaded_bitstream(), Some(&[1u8, 2, 3][..]));
        assert_eq!(programmer.image, Some(FlashImage::erased()));
        assert!(programmer.write(WriteKind::Raw, 0, false, &[1]).is_err());
    }

    #[test]
    fn test_open_without_path() {
        let mut programmer = FlashImageProgrammer::from_config(&ProgrammerConfig::default());
        assert!(programmer.open().is_err());
    }
}
