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

//! Build outputs of one gateware project, loaded into memory.
//!
//! A [`Build`] is usually shipped as a gzipped tar archive with a flat layout:
//!
//! - `top.bit` - the bitstream
//! - `manifest.json` - the manifest template
//! - every other file - a firmware artifact, matched to manifest regions by name
//!
//! Directories and other non-file entries are ignored, as is a leading `./`.

use crate::error::BitslotError;
use crate::layout::SlotTarget;
use crate::manifest::{Manifest, RegionKind};
use crate::package::{Artifact, PackageRequest};
use crate::system_io::{fs_read_bytes, fs_write_bytes};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use std::io::Read;
use std::path::Path;

pub const BITSTREAM_FILE: &str = "top.bit";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub bitstream: Vec<u8>,
    pub firmware: Vec<Artifact>,
    pub manifest: Manifest,
}

impl Build {
    /// Unpack a `.tar.gz` build archive.
    ///
    /// # Returns: `Result<Build, BitslotError>`
    /// * `Ok(Build)` - Bitstream, manifest and every other file as firmware
    /// * `Err(BitslotError::IORead)` - Archive unreadable, or not a gzipped tar
    /// * `Err(BitslotError::Argument)` - `top.bit` or `manifest.json` missing
    /// * `Err(BitslotError::Manifest)` - `manifest.json` does not parse
    pub fn from_archive(path: &Path) -> Result<Build, BitslotError> {
        let compressed = fs_read_bytes(path)?;
        let read_err = |e| BitslotError::IORead {
            file: path.to_path_buf(),
            e,
        };
        let mut archive = tar::Archive::new(GzDecoder::new(compressed.as_slice()));
        let mut bitstream = None;
        let mut manifest = None;
        let mut firmware = Vec::new();
        for entry in archive.entries().map_err(read_err)? {
            let mut entry = entry.map_err(read_err)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path().map_err(read_err)?.to_string_lossy().into_owned();
            let name = name.trim_start_matches("./").to_string();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).map_err(read_err)?;
            debug!("Archive {path:?}: {name} ({} bytes)", bytes.len());
            match name.as_str() {
                BITSTREAM_FILE => bitstream = Some(bytes),
                MANIFEST_FILE => manifest = Some(Manifest::from_slice(&bytes)?),
                _ => firmware.push(Artifact::new(name, bytes)),
            }
        }
        let missing = |file: &str| {
            BitslotError::Argument(format!("archive {path:?} does not contain {file}"))
        };
        let build = Build {
            bitstream: bitstream.ok_or_else(|| missing(BITSTREAM_FILE))?,
            manifest: manifest.ok_or_else(|| missing(MANIFEST_FILE))?,
            firmware,
        };
        info!(
            "Unpacked '{}' from {path:?} with {} firmware file(s)",
            build.manifest.display_name,
            build.firmware.len()
        );
        Ok(build)
    }

    /// Pack this build into a `.tar.gz` archive that [`Build::from_archive`] reads back.
    pub fn write_archive(&self, path: &Path) -> Result<(), BitslotError> {
        let write_err = |e| BitslotError::IOWrite {
            file: path.to_path_buf(),
            e,
        };
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let manifest = self.manifest.to_json();
        let files = [(BITSTREAM_FILE, &self.bitstream[..]), (MANIFEST_FILE, &manifest[..])]
            .into_iter()
            .chain(self.firmware.iter().map(|a| (a.filename.as_str(), &a.bytes[..])));
        for (name, bytes) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, bytes).map_err(write_err)?;
        }
        let compressed = builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(write_err)?;
        fs_write_bytes(path, true, &compressed)
    }

    /// The slot a build belongs in when none is given. Execute-in-place
    /// firmware only runs from the bootloader slot; anything else needs an
    /// explicit user slot.
    pub fn default_target(&self) -> Option<SlotTarget> {
        self.manifest
            .regions
            .iter()
            .any(|region| region.kind == RegionKind::Xip)
            .then_some(SlotTarget::Bootloader)
    }

    pub fn request(&self, target: SlotTarget) -> PackageRequest<'_> {
        PackageRequest {
            target,
            bitstream: &self.bitstream,
            firmware: &self.firmware,
            manifest: &self.manifest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SlotIndex;
    use crate::package::package;

    fn synth() -> Build {
        Build {
            bitstream: vec![0xa5; 300],
            firmware: vec![Artifact::new("firmware.bin", vec![0x5a; 40])],
            manifest: Manifest::from_slice(
                br#"{"name":"synth","regions":[{"filename":"firmware.bin","size":40,"psram_dst":0}]}"#,
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_archive_packages_like_loose_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.tar.gz");
        let build = synth();
        build.write_archive(&path).unwrap();

        let unpacked = Build::from_archive(&path).unwrap();
        assert_eq!(unpacked, build);
        let target = SlotTarget::User(SlotIndex::try_from(2).unwrap());
        assert_eq!(
            package(&unpacked.request(target)).unwrap(),
            package(&build.request(target)).unwrap()
        );
    }

    #[test]
    fn test_archive_without_bitstream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tar.gz");
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let manifest = synth().manifest.to_json();
        let mut header = tar::Header::new_gnu();
        header.set_size(manifest.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "./manifest.json", &manifest[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();
        fs_write_bytes(&path, true, &bytes).unwrap();

        let err = Build::from_archive(&path).unwrap_err();
        assert!(matches!(&err, BitslotError::Argument(msg) if msg.contains("top.bit")));
    }

    #[test]
    fn test_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.bit");
        fs_write_bytes(&path, true, &[0xa5; 64]).unwrap();
        assert!(matches!(
            Build::from_archive(&path),
            Err(BitslotError::IORead { .. })
        ));
    }

    #[test]
    fn test_default_target() {
        assert_eq!(synth().default_target(), None);
        let mut bootloader = synth();
        bootloader.manifest = Manifest::from_slice(
            br#"{"name":"boot","regions":[{"filename":"firmware.bin","size":40,"spiflash_src":786432}]}"#,
        )
        .unwrap();
        assert_eq!(bootloader.default_target(), Some(SlotTarget::Bootloader));
    }
}
