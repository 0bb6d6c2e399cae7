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

//! Putting write plans into flash.
//!
//! - [`programmer`] - the [`Programmer`](programmer::Programmer) trait, the backend registry
//!   and the exclusive [`TransportSession`](programmer::TransportSession)
//! - [`executor`] - runs a plan through a programmer
//! - [`open_fpga_loader`] - backend driving the `openFPGALoader` tool (feature `openfpgaloader`)
//! - [`flash_image`] - file-backed flash emulation and its backend
//!
//! Call [`register_programmers`] once before looking up a backend by name.

pub mod executor;
pub mod flash_image;
#[cfg(feature = "openfpgaloader")]
pub mod open_fpga_loader;
pub mod programmer;

use crate::flash::flash_image::FlashImageProgrammer;
#[cfg(feature = "openfpgaloader")]
use crate::flash::open_fpga_loader::OpenFpgaLoader;

/// Register all programmer backends compiled into this build.
pub fn register_programmers() {
    #[cfg(feature = "openfpgaloader")]
    OpenFpgaLoader::register_programmer();
    FlashImageProgrammer::register_programmer();
}
