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

use crate::slots::{Build, init_logging, polysyn};
use bitslot::config::ProgrammerConfig;
use bitslot::flash::executor::{ExecutionMode, execute};
use bitslot::flash::flash_image::FlashImage;
use bitslot::flash::programmer::{TransportSession, programmer_for_backend};
use bitslot::flash::register_programmers;
use bitslot::layout::{SlotIndex, SlotTarget};
use bitslot::manifest::UNKNOWN_NAME;
use bitslot::package::{PackageRequest, package};
use bitslot::relay::stub::{StubTable, compress_stub};
use bitslot::relay::{Clock, Relay, RelayEvent, RelayPorts, RelayState};
use bitslot::selector::{BootSelector, SelectorState};
use bitslot::trigger::Trigger;
use googletest::prelude::*;
use rstest::*;
use std::cell::Cell;
use std::path::Path;

async fn flash_to_image(build: &Build, target: SlotTarget, image: &Path) {
    let plan = package(&PackageRequest {
        target,
        bitstream: &build.bitstream,
        firmware: &build.firmware,
        manifest: &build.manifest,
    })
    .expect("build must package");

    register_programmers();
    let config = ProgrammerConfig {
        backend: "image".into(),
        image_path: Some(image.to_path_buf()),
        ..ProgrammerConfig::default()
    };
    let programmer = programmer_for_backend(&config.backend, &config).expect("image backend");
    let mut session = TransportSession::acquire(programmer)
        .await
        .expect("image programmer must open");
    execute(&plan, session.programmer(), ExecutionMode::Persistent).expect("writes must succeed");
    session.finish().expect("image must be saved");
}

#[derive(Default)]
struct Wires {
    to_host: Vec<u8>,
    jtag: Vec<u8>,
}

impl RelayPorts for Wires {
    fn uart_to_host(&mut self, bytes: &[u8]) {
        self.to_host.extend_from_slice(bytes);
    }
    fn uart_to_target(&mut self, _bytes: &[u8]) {}
    fn jtag_to_target(&mut self, _bytes: &[u8]) {}
    fn jtag_to_host(&mut self, _bytes: &[u8]) {}
    fn drive_jtag(&mut self, chunk: &[u8]) -> std::result::Result<usize, String> {
        self.jtag.extend_from_slice(chunk);
        Ok(chunk.len())
    }
}

struct FixedClock(Cell<u64>);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

#[gtest]
#[tokio::test]
#[rstest]
async fn flashed_slot_shows_in_menu(polysyn: Build, _init_logging: ()) {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("flash.img");
    let one = SlotIndex::try_from(1).expect("slot 1");
    flash_to_image(&polysyn, SlotTarget::User(one), &image).await;

    let flash = FlashImage::load(&image).expect("image must be written on close");
    let selector = BootSelector::new(flash, Vec::<Trigger>::new());
    let names: Vec<&str> = selector.entries().iter().map(|e| e.name.as_str()).collect();
    expect_that!(
        names,
        elements_are![
            eq(&UNKNOWN_NAME),
            eq(&"POLYSYN"),
            eq(&UNKNOWN_NAME),
            eq(&UNKNOWN_NAME),
            eq(&UNKNOWN_NAME),
            eq(&UNKNOWN_NAME),
            eq(&UNKNOWN_NAME),
            eq(&UNKNOWN_NAME),
        ]
    );
    let manifest = selector.entries()[1].manifest.as_ref().expect("slot 1 manifest");
    expect_that!(manifest.regions[0].spiflash_src, some(eq(0x2C0000)));
}

#[gtest]
#[tokio::test]
#[rstest]
async fn selecting_a_slot_replays_its_stub(polysyn: Build, _init_logging: ()) {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = dir.path().join("flash.img");
    let four = SlotIndex::try_from(4).expect("slot 4");
    flash_to_image(&polysyn, SlotTarget::User(four), &image).await;

    // scroll down to slot 4 and press the encoder button
    let flash = FlashImage::load(&image).expect("image must be written on close");
    let mut selector = BootSelector::new(flash, Vec::<Trigger>::new());
    selector.poll(0, 4, false);
    selector.poll(10, 0, true);
    selector.poll(100, 0, false);
    let state = selector.poll(200, 0, false);
    expect_that!(state, eq(SelectorState::Committing { slot: four }));
    expect_that!(selector.sink(), elements_are![eq(&Trigger::Slot(four))]);

    let stub: Vec<u8> = (0..2000u32).map(|i| (i % 13) as u8).collect();
    let mut stubs = StubTable::new();
    stubs.insert(Trigger::Slot(four), compress_stub(&stub));
    let mut relay = Relay::new(Wires::default(), stubs);
    relay.push(RelayEvent::UartFromTarget(
        Trigger::Slot(four).to_line().into_bytes(),
    ));
    relay.run_until_idle(&FixedClock(Cell::new(0)));

    expect_that!(relay.state(), eq(&RelayState::PassThrough));
    expect_that!(relay.ports().to_host, eq(&b"BITSTREAM4\n".to_vec()));
    expect_that!(relay.ports().jtag, eq(&stub));

    selector.reconfigured(four);
    expect_that!(selector.state(), eq(SelectorState::Running { slot: four }));
}
