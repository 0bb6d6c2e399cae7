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

//! Packaging of a bitstream, its firmware and its manifest into a write plan.
//!
//! [`package`] turns build artifacts into an ordered list of flash writes for
//! one slot. It performs no I/O and keeps no state between calls, so the same
//! request always yields a byte-identical [`WritePlan`].
//!
//! # Placement rules
//!
//! - The bitstream always goes first, at the base of the slot.
//! - Bootloader slot: firmware executes in place, so every region is written
//!   to the `spiflash_src` it was linked for.
//! - User slots: firmware is copied to PSRAM by the bootloader, so regions are
//!   packed one after the other from [`firmware_base`], each starting on a page
//!   boundary. The computed address replaces whatever `spiflash_src` the
//!   template carried.
//! - The manifest goes last, in the final [`MANIFEST_SIZE`] bytes of the slot.
//!
//! Every write must stay inside its slot and no two writes may touch the same
//! flash page.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use bitslot::package::{package, Artifact, PackageRequest};
//! # use bitslot::layout::{SlotIndex, SlotTarget};
//! # use bitslot::manifest::Manifest;
//! # fn example(bitstream: Vec<u8>, firmware: Vec<u8>) -> Result<(), bitslot::error::BitslotError> {
//! let manifest = Manifest::from_slice(
//!     br#"{"name":"POLYSYN","regions":[{"filename":"firmware.bin","size":51200,"psram_dst":0}]}"#,
//! )?;
//! let firmware = [Artifact::new("firmware.bin", firmware)];
//! let plan = package(&PackageRequest {
//!     target: SlotTarget::User(SlotIndex::try_from(1).unwrap()),
//!     bitstream: &bitstream,
//!     firmware: &firmware,
//!     manifest: &manifest,
//! })?;
//! for op in &plan.ops {
//!     println!("{op}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::ValidationError;
use crate::layout::{FLASH_SIZE, MANIFEST_SIZE, SlotTarget, align_up, firmware_base, page_span};
use crate::manifest::{MANIFEST_MAGIC, Manifest, RegionKind};
use log::{debug, info, warn};
use std::fmt;
use std::ops::Range;

pub const BITSTREAM_REGION: &str = "bitstream";
pub const MANIFEST_REGION: &str = "manifest";

/// A named build output, e.g. `firmware.bin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Artifact {
            filename: filename.into(),
            bytes,
        }
    }
}

/// How the programmer should treat a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// A configuration bitstream.
    Bit,
    /// Opaque bytes.
    Raw,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Bit => write!(f, "bit"),
            WriteKind::Raw => write!(f, "raw"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub region_name: String,
    pub kind: WriteKind,
    pub address: u32,
    pub payload: Vec<u8>,
}

impl WriteOp {
    /// Byte range written, `None` if it does not fit the 32-bit address space.
    pub fn range(&self) -> Option<Range<u32>> {
        let len = u32::try_from(self.payload.len()).ok()?;
        let end = self.address.checked_add(len)?;
        Some(self.address..end)
    }

    /// Flash pages touched by this write, `None` if it runs off the chip.
    fn page_span(&self) -> Option<Range<u32>> {
        let range = self.range().filter(|r| r.end <= FLASH_SIZE)?;
        Some(page_span(range.start, range.end - range.start))
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#08x} {} {} ({} bytes)",
            self.address,
            self.kind,
            self.region_name,
            self.payload.len()
        )
    }
}

/// Validated, ordered flash writes for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub target: SlotTarget,
    /// The manifest as written to flash, with derived addresses filled in.
    pub manifest: Manifest,
    pub ops: Vec<WriteOp>,
}

pub struct PackageRequest<'a> {
    pub target: SlotTarget,
    pub bitstream: &'a [u8],
    pub firmware: &'a [Artifact],
    pub manifest: &'a Manifest,
}

/// State of a single [`package`] call. Dropped when the call returns.
struct PackagingSession<'a> {
    request: &'a PackageRequest<'a>,
    manifest: Manifest,
    ops: Vec<WriteOp>,
}

/// Build and validate the write plan for `request`.
///
/// # Returns: `Result<WritePlan, ValidationError>`
/// * `Ok(WritePlan)` - bitstream, firmware regions and manifest, in write order
/// * `Err(ValidationError::WrongRegionKindForSlot)` - PSRAM region aimed at the bootloader, or
///   execute-in-place region aimed at a user slot
/// * `Err(ValidationError::MissingArtifact)` / `Err(ValidationError::SizeMismatch)` - firmware
///   artifacts don't match the manifest
/// * `Err(ValidationError::MissingFlashAddress)` - bootloader region without `spiflash_src`
/// * `Err(ValidationError::ManifestTooLarge)` - manifest does not fit its region
/// * `Err(ValidationError::SlotBoundaryExceeded)` - a write leaves the slot
/// * `Err(ValidationError::Overlap)` - two writes share a flash page
pub fn package(request: &PackageRequest<'_>) -> Result<WritePlan, ValidationError> {
    let mut session = PackagingSession {
        request,
        manifest: request.manifest.clone(),
        ops: Vec::new(),
    };
    session.check_region_kinds()?;
    session.place_bitstream();
    session.place_firmware()?;
    session.place_manifest()?;
    session.check_slot_bounds()?;
    session.check_overlaps()?;

    info!(
        "Packaged '{}' for {} into {} writes",
        session.manifest.display_name,
        request.target,
        session.ops.len()
    );
    Ok(WritePlan {
        target: request.target,
        manifest: session.manifest,
        ops: session.ops,
    })
}

impl PackagingSession<'_> {
    fn check_region_kinds(&self) -> Result<(), ValidationError> {
        let target = self.request.target;
        for region in &self.manifest.regions {
            let accepted = match (target, region.kind) {
                (SlotTarget::Bootloader, RegionKind::Xip) => true,
                (SlotTarget::Bootloader, RegionKind::PsramResident(_)) => false,
                (SlotTarget::User(_), RegionKind::PsramResident(_)) => true,
                (SlotTarget::User(_), RegionKind::Xip) => false,
            };
            if !accepted {
                return Err(ValidationError::WrongRegionKindForSlot {
                    region: region.filename.clone(),
                    kind: region.kind.describe(),
                    target: target.to_string(),
                });
            }
        }
        Ok(())
    }

    fn place_bitstream(&mut self) {
        self.ops.push(WriteOp {
            region_name: BITSTREAM_REGION.to_string(),
            kind: WriteKind::Bit,
            address: self.request.target.bitstream_addr(),
            payload: self.request.bitstream.to_vec(),
        });
    }

    fn place_firmware(&mut self) -> Result<(), ValidationError> {
        let target = self.request.target;
        let mut cursor = match target {
            SlotTarget::Bootloader => None,
            SlotTarget::User(slot) => Some(firmware_base(slot)),
        };

        for region in self.manifest.regions.iter_mut() {
            let artifact = self
                .request
                .firmware
                .iter()
                .find(|a| a.filename == region.filename)
                .ok_or_else(|| ValidationError::MissingArtifact {
                    filename: region.filename.clone(),
                })?;
            if artifact.bytes.len() != region.size as usize {
                return Err(ValidationError::SizeMismatch {
                    region: region.filename.clone(),
                    declared: region.size,
                    actual: artifact.bytes.len(),
                });
            }

            let address = match cursor {
                None => region
                    .spiflash_src
                    .ok_or_else(|| ValidationError::MissingFlashAddress {
                        region: region.filename.clone(),
                    })?,
                Some(next) => {
                    region.spiflash_src = Some(next);
                    let end = next.checked_add(region.size).ok_or_else(|| {
                        ValidationError::SlotBoundaryExceeded {
                            region: region.filename.clone(),
                            start: next,
                            end: u32::MAX,
                            target: target.to_string(),
                            slot_start: target.base(),
                            slot_end: target.end(),
                        }
                    })?;
                    cursor = Some(align_up(end));
                    next
                }
            };
            debug!("Placing '{}' at {address:#08x}", region.filename);
            self.ops.push(WriteOp {
                region_name: region.filename.clone(),
                kind: WriteKind::Raw,
                address,
                payload: artifact.bytes.clone(),
            });
        }

        for artifact in self.request.firmware {
            if !self
                .manifest
                .regions
                .iter()
                .any(|r| r.filename == artifact.filename)
            {
                warn!(
                    "Artifact '{}' is not referenced by the manifest, ignoring",
                    artifact.filename
                );
            }
        }
        Ok(())
    }

    fn place_manifest(&mut self) -> Result<(), ValidationError> {
        self.manifest.magic = Some(MANIFEST_MAGIC);
        let payload = self.manifest.to_json();
        if payload.len() > MANIFEST_SIZE as usize {
            return Err(ValidationError::ManifestTooLarge {
                size: payload.len(),
                limit: MANIFEST_SIZE,
            });
        }
        self.ops.push(WriteOp {
            region_name: MANIFEST_REGION.to_string(),
            kind: WriteKind::Raw,
            address: self.request.target.manifest_addr(),
            payload,
        });
        Ok(())
    }

    fn check_slot_bounds(&self) -> Result<(), ValidationError> {
        let target = self.request.target;
        for op in &self.ops {
            let fits = op
                .page_span()
                .is_some_and(|span| target.contains(&span));
            if !fits {
                let range = op.range().unwrap_or(op.address..u32::MAX);
                return Err(ValidationError::SlotBoundaryExceeded {
                    region: op.region_name.clone(),
                    start: range.start,
                    end: range.end,
                    target: target.to_string(),
                    slot_start: target.base(),
                    slot_end: target.end(),
                });
            }
        }
        Ok(())
    }

    /// Bounds were checked first, so every span exists here.
    fn check_overlaps(&self) -> Result<(), ValidationError> {
        let spans: Vec<(&WriteOp, Range<u32>)> = self
            .ops
            .iter()
            .filter_map(|op| op.page_span().map(|span| (op, span)))
            .collect();
        for (i, (first, a)) in spans.iter().enumerate() {
            for (second, b) in spans.iter().skip(i + 1) {
                if a.start < b.end && b.start < a.end {
                    return Err(ValidationError::Overlap {
                        first: first.region_name.clone(),
                        first_start: a.start,
                        first_end: a.end,
                        second: second.region_name.clone(),
                        second_start: b.start,
                        second_end: b.end,
                    });
                }
            }
        }
        Ok(())
    }
}
