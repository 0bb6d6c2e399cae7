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

//! bitslot - multiple FPGA bitstreams in one SPI flash.
//!
//! The flash holds a bootloader and up to eight user bitstreams, each in its
//! own 1 MiB slot together with its firmware and a small JSON manifest. This
//! crate covers the whole path of a bitstream into such a slot and back out:
//!
//! - [`layout`] - slot address arithmetic
//! - [`manifest`] - the manifest format
//! - [`build`] - build outputs, loose or from a `.tar.gz` archive
//! - [`package`] - turns build artifacts into a validated write plan
//! - [`flash`] - runs a write plan through a programmer backend
//! - [`selector`] - the bootloader's slot menu
//! - [`trigger`] - UART tokens sent by the menu
//! - [`relay`] - replays BootStub vectors over JTAG when a token is seen
//!
//! Ambient pieces live in [`config`], [`error`] and [`system_io`].
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level in the `bitslot` binary (`trace`, `debug`, `info`,
//!   `warn`, `error` or `off`). Defaults to `info`

pub mod build;
pub mod config;
pub mod error;
pub mod flash;
pub mod layout;
pub mod manifest;
pub mod package;
pub mod relay;
pub mod selector;
pub mod system_io;
pub mod trigger;
