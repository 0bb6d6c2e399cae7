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

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around `std::fs` that log at `trace` level and convert failures
//! into [`BitslotError`] variants carrying the offending path.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use bitslot::system_io::{fs_read_bytes, fs_write_bytes};
//! # use std::path::Path;
//! # fn example() -> Result<(), bitslot::error::BitslotError> {
//! let bitstream = fs_read_bytes(Path::new("build/top.bit"))?;
//! fs_write_bytes(Path::new("/tmp/top.bit"), true, &bitstream)?;
//! # Ok(())
//! # }
//! ```

use crate::error::BitslotError;
use log::trace;
use std::fs::{OpenOptions, create_dir_all};
use std::io::{Read, Write};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, BitslotError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(BitslotError::IORead)` - If the file cannot be read
pub fn fs_read(file_path: &Path) -> Result<String, BitslotError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(BitslotError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Read the contents of a file as raw bytes.
///
/// Used for bitstreams, firmware images and flash images.
///
/// # Returns: `Result<Vec<u8>, BitslotError>`
/// * `Ok(Vec<u8>)` - The complete contents of the file
/// * `Err(BitslotError::IORead)` - If the file cannot be read
pub fn fs_read_bytes(file_path: &Path) -> Result<Vec<u8>, BitslotError> {
    trace!("Attempting to read bytes from {file_path:?}");
    let mut buf = Vec::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_end(&mut buf));

    match result {
        Ok(n) => {
            trace!("Read {n} bytes");
            Ok(buf)
        }
        Err(e) => Err(BitslotError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Write binary data to a file, truncating existing content.
///
/// # Arguments
///
/// * `file_path` - Path to the file to write
/// * `create` - If `true`, create the file if it doesn't exist
/// * `data` - The binary data to write
///
/// # Returns: `Result<(), BitslotError>`
/// * `Ok(())` - Write succeeded
/// * `Err(BitslotError::IOWrite)` - If the write fails
pub fn fs_write_bytes(file_path: &Path, create: bool, data: &[u8]) -> Result<(), BitslotError> {
    trace!("Attempting to write {} bytes to {file_path:?}", data.len());
    let result = OpenOptions::new()
        .create(create)
        .write(true)
        .truncate(true)
        .open(file_path)
        .and_then(|mut f| f.write_all(data));

    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(BitslotError::IOWrite {
            file: file_path.into(),
            e,
        }),
    }
}

/// Recursively create directories up to the specified path.
///
/// # Returns: `Result<(), BitslotError>`
/// * `Ok(())` - Directory created (or already existed)
/// * `Err(BitslotError::IOCreate)` - If directory creation fails
pub fn fs_create_dir(path: &Path) -> Result<(), BitslotError> {
    trace!("Attempting to create '{path:?}'");
    match create_dir_all(path) {
        Ok(_) => {
            trace!("Directory created at {path:?}.");
            Ok(())
        }
        Err(e) => Err(BitslotError::IOCreate {
            file: path.into(),
            e,
        }),
    }
}
