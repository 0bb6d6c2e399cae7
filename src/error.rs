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

//! Error taxonomy.
//!
//! Errors are grouped by the stage that raises them:
//! - [`ManifestError`] - parsing a manifest template
//! - [`ValidationError`] - building a write plan, always before any I/O
//! - [`TransportError`] - executing a write plan through a programmer
//!
//! All of them convert into [`BitslotError`], which additionally covers the
//! ambient layers (file I/O, configuration, argument checking).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("ManifestError::Malformed: manifest is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("ManifestError::MissingField: {location} is missing required field '{field}'")]
    MissingField {
        location: String,
        field: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "ValidationError::Overlap: '{first}' [{first_start:#08x}, {first_end:#08x}) overlaps \
        '{second}' [{second_start:#08x}, {second_end:#08x})"
    )]
    Overlap {
        first: String,
        first_start: u32,
        first_end: u32,
        second: String,
        second_start: u32,
        second_end: u32,
    },
    #[error(
        "ValidationError::SlotBoundaryExceeded: '{region}' [{start:#08x}, {end:#08x}) does not fit \
        in {target} [{slot_start:#08x}, {slot_end:#08x})"
    )]
    SlotBoundaryExceeded {
        region: String,
        start: u32,
        end: u32,
        target: String,
        slot_start: u32,
        slot_end: u32,
    },
    #[error("ValidationError::WrongRegionKindForSlot: region '{region}' is {kind}, which {target} does not accept")]
    WrongRegionKindForSlot {
        region: String,
        kind: &'static str,
        target: String,
    },
    #[error("ValidationError::MissingArtifact: no firmware artifact provided for region '{filename}'")]
    MissingArtifact { filename: String },
    #[error("ValidationError::SizeMismatch: region '{region}' declares {declared} bytes but the artifact is {actual} bytes")]
    SizeMismatch {
        region: String,
        declared: u32,
        actual: usize,
    },
    #[error("ValidationError::MissingFlashAddress: execute-in-place region '{region}' has no 'spiflash_src'")]
    MissingFlashAddress { region: String },
    #[error("ValidationError::ManifestTooLarge: serialized manifest is {size} bytes, the manifest region holds {limit}")]
    ManifestTooLarge { size: usize, limit: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("TransportError::WriteFailed: writing '{region_name}' at {address:#08x} failed: {cause}")]
    WriteFailed {
        region_name: String,
        address: u32,
        cause: String,
    },
    #[error("TransportError::Timeout: writing '{region_name}' at {address:#08x} did not finish within {after:?}")]
    Timeout {
        region_name: String,
        address: u32,
        after: Duration,
    },
    #[error("TransportError::Unavailable: programmer '{backend}' could not be acquired: {cause}")]
    Unavailable { backend: String, cause: String },
    #[error("TransportError::CloseFailed: programmer '{backend}' did not close cleanly: {cause}")]
    CloseFailed { backend: String, cause: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BitslotError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("BitslotError::Argument: {0}")]
    Argument(String),
    #[error("BitslotError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("BitslotError::IOWrite: An IO error occurred when writing to {file:?}: {e}")]
    IOWrite { file: PathBuf, e: std::io::Error },
    #[error("BitslotError::IOCreate: An IO error occurred when creating {file:?}: {e}")]
    IOCreate { file: PathBuf, e: std::io::Error },
    #[error("BitslotError::TomlDe: Failed to parse config {file:?}: {e}")]
    TomlDe {
        file: PathBuf,
        e: toml::de::Error,
    },
    #[error("BitslotError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}
