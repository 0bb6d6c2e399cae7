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

//! Bitstream manifests.
//!
//! A manifest describes one slot: the name shown in the boot menu and the
//! firmware regions the bootloader has to set up before the bitstream starts.
//! On disk and in flash it is compact JSON:
//!
//! ```json
//! {
//!   "name": "POLYSYN",
//!   "brief": "8-voice polyphonic synthesizer",
//!   "regions": [
//!     { "filename": "firmware.bin", "size": 51200, "psram_dst": 0 }
//!   ]
//! }
//! ```
//!
//! Parsing happens in two steps. The JSON is first read into a loose
//! [`RawManifest`] where every field is optional, then normalized into a
//! [`Manifest`] whose regions carry a typed [`RegionKind`]. A region's kind is
//! decided only by whether `psram_dst` is present.

use crate::error::ManifestError;
use crate::layout::MANIFEST_SIZE;
use log::{info, trace};
use serde::{Deserialize, Serialize};

/// Stamped by the packager, checked when reading a manifest back from flash.
pub const MANIFEST_MAGIC: u32 = 0xFEEDBEEF;

/// Shown in the boot menu for slots without a readable manifest.
pub const UNKNOWN_NAME: &str = "<unknown>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Executed in place from SPI flash.
    Xip,
    /// Copied from SPI flash to this PSRAM address before the bitstream starts.
    PsramResident(u32),
}

impl RegionKind {
    pub fn describe(self) -> &'static str {
        match self {
            RegionKind::Xip => "execute-in-place",
            RegionKind::PsramResident(_) => "PSRAM-resident",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub filename: String,
    pub size: u32,
    pub kind: RegionKind,
    /// Flash address of the region. Authoritative only for execute-in-place
    /// regions of the bootloader; recomputed for everything else.
    pub spiflash_src: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub display_name: String,
    pub brief: Option<String>,
    pub video: Option<String>,
    pub tag: Option<String>,
    pub hw_rev: Option<u32>,
    pub magic: Option<u32>,
    pub regions: Vec<Region>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawRegion {
    filename: Option<String>,
    size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spiflash_src: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    psram_dst: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brief: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hw_rev: Option<u32>,
    #[serde(default)]
    regions: Vec<RawRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    magic: Option<u32>,
}

impl RawRegion {
    fn normalize(self, index: usize) -> Result<Region, ManifestError> {
        let location = || format!("regions[{index}]");
        let filename = self.filename.ok_or_else(|| ManifestError::MissingField {
            location: location(),
            field: "filename",
        })?;
        let size = self.size.ok_or_else(|| ManifestError::MissingField {
            location: format!("{} ('{filename}')", location()),
            field: "size",
        })?;
        let kind = match self.psram_dst {
            Some(psram_dst) => RegionKind::PsramResident(psram_dst),
            None => RegionKind::Xip,
        };
        Ok(Region {
            filename,
            size,
            kind,
            spiflash_src: self.spiflash_src,
        })
    }
}

impl From<&Region> for RawRegion {
    fn from(region: &Region) -> Self {
        RawRegion {
            filename: Some(region.filename.clone()),
            size: Some(region.size),
            spiflash_src: region.spiflash_src,
            psram_dst: match region.kind {
                RegionKind::Xip => None,
                RegionKind::PsramResident(psram_dst) => Some(psram_dst),
            },
        }
    }
}

impl Manifest {
    /// Parse and normalize a manifest template.
    ///
    /// # Returns: `Result<Manifest, ManifestError>`
    /// * `Ok(Manifest)` - Normalized manifest
    /// * `Err(ManifestError::Malformed)` - Not JSON, or JSON of the wrong shape
    /// * `Err(ManifestError::MissingField)` - `name`, or a region's `filename`/`size`, is absent
    pub fn from_slice(bytes: &[u8]) -> Result<Manifest, ManifestError> {
        let raw: RawManifest = serde_json::from_slice(bytes)?;
        let display_name = raw.name.ok_or(ManifestError::MissingField {
            location: "manifest".to_string(),
            field: "name",
        })?;
        let regions = raw
            .regions
            .into_iter()
            .enumerate()
            .map(|(index, region)| region.normalize(index))
            .collect::<Result<Vec<_>, _>>()?;
        trace!("Parsed manifest '{display_name}' with {} regions", regions.len());
        Ok(Manifest {
            display_name,
            brief: raw.brief,
            video: raw.video,
            tag: raw.tag,
            hw_rev: raw.hw_rev,
            magic: raw.magic,
            regions,
        })
    }

    /// Read a manifest the way the boot menu does, straight out of a manifest region.
    ///
    /// Erased flash reads as `0xff`, so trailing `0xff` bytes are cut off before
    /// parsing. Anything unusable (blank region, bad JSON, wrong magic) is reported
    /// as `None`: the menu only cares whether a name can be shown.
    pub fn from_flash(region: &[u8]) -> Option<Manifest> {
        let last_byte = match region.iter().rposition(|b| *b != 0xff) {
            Some(i) => i + 1,
            None => {
                info!("Manifest region is all ones, ignoring.");
                return None;
            }
        };
        trace!("Manifest length: {last_byte}");
        match Manifest::from_slice(&region[..last_byte]) {
            Ok(manifest) if manifest.magic == Some(MANIFEST_MAGIC) => Some(manifest),
            Ok(manifest) => {
                info!(
                    "Manifest '{}' has magic {:?}, ignoring",
                    manifest.display_name, manifest.magic
                );
                None
            }
            Err(e) => {
                info!("Manifest: bad or nonexisting manifest: {e}");
                None
            }
        }
    }

    /// Serialize to compact JSON. Field order is fixed, so equal manifests
    /// always produce identical bytes.
    pub fn to_json(&self) -> Vec<u8> {
        let raw = RawManifest {
            name: Some(self.display_name.clone()),
            brief: self.brief.clone(),
            video: self.video.clone(),
            tag: self.tag.clone(),
            hw_rev: self.hw_rev,
            regions: self.regions.iter().map(RawRegion::from).collect(),
            magic: self.magic,
        };
        // Plain structs of strings and integers always serialize.
        serde_json::to_vec(&raw).unwrap_or_default()
    }

    /// Whether the serialized form fits in a slot's manifest region.
    pub fn fits(&self) -> bool {
        self.to_json().len() <= MANIFEST_SIZE as usize
    }

    pub fn print(&self) {
        info!("Manifest {{");
        info!("\tname:    '{}'", self.display_name);
        if let Some(brief) = &self.brief {
            info!("\tbrief:   '{brief}'");
        }
        if let Some(video) = &self.video {
            info!("\tvideo:   '{video}'");
        }
        if let Some(tag) = &self.tag {
            info!("\ttag:     '{tag}'");
        }
        if let Some(hw_rev) = self.hw_rev {
            info!("\thw_rev:  {hw_rev}");
        }
        if let Some(magic) = self.magic {
            info!("\tmagic:   {magic:#x}");
        }
        for (i, region) in self.regions.iter().enumerate() {
            info!("\tregion[{i}] = {{");
            info!("\t\tfilename:     '{}'", region.filename);
            match region.spiflash_src {
                Some(spiflash_src) => info!("\t\tspiflash_src: {spiflash_src:#x}"),
                None => info!("\t\tspiflash_src: None"),
            }
            if let RegionKind::PsramResident(psram_dst) = region.kind {
                info!("\t\tpsram_dst:    {psram_dst:#x} (copyto)");
            }
            info!("\t\tsize:         {:#x}", region.size);
            info!("\t}}");
        }
        info!("}}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_kind_follows_psram_dst() {
        let manifest = Manifest::from_slice(
            br#"{"name":"XBEAM","regions":[
                {"filename":"xip.bin","size":16,"spiflash_src":786432},
                {"filename":"ram.bin","size":32,"psram_dst":2097152}
            ]}"#,
        )
        .unwrap();
        assert_eq!(manifest.regions[0].kind, RegionKind::Xip);
        assert_eq!(manifest.regions[0].spiflash_src, Some(0xC0000));
        assert_eq!(manifest.regions[1].kind, RegionKind::PsramResident(0x200000));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let result = Manifest::from_slice(b"{\"name\": \"oops\",");
        assert!(matches!(result, Err(ManifestError::Malformed(_))));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let result = Manifest::from_slice(br#"{"name":"X","regions":[{"filename":"a","size":"big"}]}"#);
        assert!(matches!(result, Err(ManifestError::Malformed(_))));
    }

    #[test]
    fn test_region_missing_filename() {
        let result = Manifest::from_slice(br#"{"name":"X","regions":[{"size":4}]}"#);
        match result {
            Err(ManifestError::MissingField { location, field }) => {
                assert_eq!(field, "filename");
                assert_eq!(location, "regions[0]");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_region_missing_size() {
        let result = Manifest::from_slice(
            br#"{"name":"X","regions":[{"filename":"ok.bin","size":1},{"filename":"fw.bin"}]}"#,
        );
        match result {
            Err(ManifestError::MissingField { location, field }) => {
                assert_eq!(field, "size");
                assert!(location.contains("fw.bin"));
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_name() {
        let result = Manifest::from_slice(br#"{"regions":[]}"#);
        assert!(matches!(
            result,
            Err(ManifestError::MissingField { field: "name", .. })
        ));
    }

    #[test]
    fn test_json_is_stable_and_parses_back() {
        let manifest = Manifest::from_slice(
            br#"{"regions":[{"psram_dst":0,"size":8,"filename":"fw.bin"}],"name":"SID","tag":"v1"}"#,
        )
        .unwrap();
        let json = manifest.to_json();
        assert_eq!(json, manifest.to_json());
        assert_eq!(
            String::from_utf8(json.clone()).unwrap(),
            r#"{"name":"SID","tag":"v1","regions":[{"filename":"fw.bin","size":8,"psram_dst":0}]}"#
        );
        assert_eq!(Manifest::from_slice(&json).unwrap(), manifest);
    }

    #[test]
    fn test_from_flash_trims_erased_bytes() {
        let mut manifest = Manifest::from_slice(br#"{"name":"DSP","regions":[]}"#).unwrap();
        manifest.magic = Some(MANIFEST_MAGIC);
        let mut region = vec![0xffu8; MANIFEST_SIZE as usize];
        let json = manifest.to_json();
        region[..json.len()].copy_from_slice(&json);
        assert_eq!(Manifest::from_flash(&region), Some(manifest));
    }

    #[test]
    fn test_from_flash_blank_or_unstamped() {
        assert_eq!(Manifest::from_flash(&[0xff; 1024]), None);
        assert_eq!(Manifest::from_flash(br#"{"name":"NOMAGIC","regions":[]}"#), None);
        assert_eq!(Manifest::from_flash(&[0x00; 16]), None);
    }
}
