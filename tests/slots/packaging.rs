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

use crate::slots::{BITSTREAM_SIZE, Build, FIRMWARE_SIZE, polysyn};
use bitslot::error::ValidationError;
use bitslot::layout::{SlotIndex, SlotTarget};
use bitslot::manifest::{MANIFEST_MAGIC, Manifest};
use bitslot::package::{Artifact, WriteKind, WritePlan, package};
use googletest::prelude::*;
use rstest::*;

fn slot(n: u8) -> SlotTarget {
    SlotTarget::User(SlotIndex::try_from(n).expect("test slot must exist"))
}

fn package_build(build: &Build, target: SlotTarget) -> std::result::Result<WritePlan, ValidationError> {
    package(&build.request(target))
}

#[gtest]
#[rstest]
fn slot_one_layout(polysyn: Build) {
    let plan = package_build(&polysyn, slot(1)).expect("slot 1 build must package");

    let ranges: Vec<(String, WriteKind, u32, u32)> = plan
        .ops
        .iter()
        .map(|op| {
            let range = op.range().expect("writes stay in the address space");
            (op.region_name.clone(), op.kind, range.start, range.end - 1)
        })
        .collect();
    expect_that!(
        ranges,
        elements_are![
            eq(&("bitstream".to_string(), WriteKind::Bit, 0x200000, 0x263FFF)),
            eq(&("firmware.bin".to_string(), WriteKind::Raw, 0x2C0000, 0x2CC7FF)),
            eq(&(
                "manifest".to_string(),
                WriteKind::Raw,
                0x2FFC00,
                0x2FFC00 + plan.ops[2].payload.len() as u32 - 1
            )),
        ]
    );
    for op in &plan.ops {
        let range = op.range().expect("writes stay in the address space");
        expect_that!(range.start, ge(0x200000));
        expect_that!(range.end, le(0x300000));
    }
    expect_that!(plan.ops[0].payload.len(), eq(BITSTREAM_SIZE));
    expect_that!(plan.ops[1].payload.len(), eq(FIRMWARE_SIZE));

    expect_that!(plan.manifest.magic, some(eq(MANIFEST_MAGIC)));
    expect_that!(plan.manifest.regions[0].spiflash_src, some(eq(0x2C0000)));
    let written = Manifest::from_flash(&plan.ops[2].payload).expect("manifest must read back");
    expect_that!(written, eq(&plan.manifest));
}

#[gtest]
#[rstest]
fn packaging_is_deterministic(polysyn: Build) {
    let first = package_build(&polysyn, slot(6)).expect("slot 6 build must package");
    let second = package_build(&polysyn, slot(6)).expect("slot 6 build must package");
    expect_that!(first, eq(&second));
}

#[gtest]
#[rstest]
fn archived_build_packages_identically(polysyn: Build) {
    let dir = tempfile::tempdir().expect("temp dir");
    let archive = dir.path().join("polysyn.tar.gz");
    polysyn.write_archive(&archive).expect("archive must be written");

    let unpacked = Build::from_archive(&archive).expect("archive must unpack");
    expect_that!(unpacked.default_target(), none());
    expect_that!(
        package_build(&unpacked, slot(4)),
        ok(eq(&package_build(&polysyn, slot(4)).expect("slot 4 build must package")))
    );
}

#[gtest]
#[rstest]
#[case::psram_region_in_bootloader(
    SlotTarget::Bootloader,
    r#"{"name": "BOOT", "regions": [{"filename": "fw.bin", "size": 16, "psram_dst": 0}]}"#,
    "ValidationError::WrongRegionKindForSlot"
)]
#[case::xip_region_in_user_slot(
    slot(2),
    r#"{"name": "APP", "regions": [{"filename": "fw.bin", "size": 16, "spiflash_src": 2883584}]}"#,
    "ValidationError::WrongRegionKindForSlot"
)]
#[case::xip_region_without_address(
    SlotTarget::Bootloader,
    r#"{"name": "BOOT", "regions": [{"filename": "fw.bin", "size": 16}]}"#,
    "ValidationError::MissingFlashAddress"
)]
#[case::size_mismatch(
    slot(0),
    r#"{"name": "APP", "regions": [{"filename": "fw.bin", "size": 17, "psram_dst": 0}]}"#,
    "ValidationError::SizeMismatch"
)]
#[case::missing_artifact(
    slot(0),
    r#"{"name": "APP", "regions": [{"filename": "other.bin", "size": 16, "psram_dst": 0}]}"#,
    "ValidationError::MissingArtifact"
)]
fn rejected_builds(#[case] target: SlotTarget, #[case] manifest: &str, #[case] expected: &str) {
    let build = Build {
        bitstream: vec![0xAA; 1024],
        firmware: vec![Artifact::new("fw.bin", vec![0x55; 16])],
        manifest: Manifest::from_slice(manifest.as_bytes()).expect("case manifest must parse"),
    };
    expect_that!(
        package_build(&build, target),
        err(displays_as(contains_substring(expected)))
    );
}

#[gtest]
fn bootloader_regions_at_same_address_overlap() {
    let build = Build {
        bitstream: vec![0xAA; 1024],
        firmware: vec![
            Artifact::new("a.bin", vec![1; 32]),
            Artifact::new("b.bin", vec![2; 32]),
        ],
        manifest: Manifest::from_slice(
            br#"{"name": "BOOT", "regions": [
                {"filename": "a.bin", "size": 32, "spiflash_src": 524288},
                {"filename": "b.bin", "size": 32, "spiflash_src": 524288}
            ]}"#,
        )
        .expect("manifest must parse"),
    };
    expect_that!(
        package_build(&build, SlotTarget::Bootloader),
        err(displays_as(all![
            contains_substring("ValidationError::Overlap"),
            contains_substring("'a.bin'"),
            contains_substring("'b.bin'"),
        ]))
    );
}
