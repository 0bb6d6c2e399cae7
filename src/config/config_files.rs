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

use crate::config::{
    DEFAULT_BACKEND, DEFAULT_CABLE, DEFAULT_LOADER, DEFAULT_USE_SUDO, DEFAULT_WRITE_TIMEOUT_SECS,
    ProgrammerConfig,
};
use crate::error::BitslotError;
use crate::system_io::fs_read;
use log::trace;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// This is the top level struct which holds all sections
#[derive(Debug, Deserialize)]
pub(crate) struct TomlConfig {
    programmer: Option<ProgrammerToml>,
}

/// This is the "programmer" section struct
#[derive(Debug, Default, Deserialize, PartialEq)]
pub(crate) struct ProgrammerToml {
    backend: Option<String>,
    cable: Option<String>,
    loader: Option<String>,
    use_sudo: Option<bool>,
    write_timeout_secs: Option<u64>,
    image_path: Option<PathBuf>,
}

impl ProgrammerToml {
    /// Fields set in `self` win, the rest come from `fallback`.
    pub(crate) fn merge(self, fallback: ProgrammerToml) -> ProgrammerToml {
        ProgrammerToml {
            backend: self.backend.or(fallback.backend),
            cable: self.cable.or(fallback.cable),
            loader: self.loader.or(fallback.loader),
            use_sudo: self.use_sudo.or(fallback.use_sudo),
            write_timeout_secs: self.write_timeout_secs.or(fallback.write_timeout_secs),
            image_path: self.image_path.or(fallback.image_path),
        }
    }
}

impl From<ProgrammerToml> for ProgrammerConfig {
    fn from(value: ProgrammerToml) -> Self {
        trace!("Creating ProgrammerConfig from {value:?}");
        ProgrammerConfig {
            backend: value.backend.unwrap_or_else(|| {
                trace!("No backend provided. Using hardcoded value.");
                DEFAULT_BACKEND.to_string()
            }),
            cable: value.cable.unwrap_or_else(|| {
                trace!("No cable provided. Using hardcoded value.");
                DEFAULT_CABLE.to_string()
            }),
            loader: value.loader.unwrap_or_else(|| {
                trace!("No loader provided. Using hardcoded value.");
                DEFAULT_LOADER.to_string()
            }),
            use_sudo: value.use_sudo.unwrap_or(DEFAULT_USE_SUDO),
            write_timeout: Duration::from_secs(
                value.write_timeout_secs.unwrap_or(DEFAULT_WRITE_TIMEOUT_SECS),
            ),
            image_path: value.image_path,
        }
    }
}

fn toml_str_to_config(toml_string: &str, file_path: &Path) -> Result<TomlConfig, BitslotError> {
    toml::from_str(toml_string).map_err(|e| BitslotError::TomlDe {
        file: file_path.into(),
        e,
    })
}

pub(crate) fn programmer_config_from_file(file_path: &Path) -> Result<ProgrammerToml, BitslotError> {
    if !file_path.is_file() {
        return Err(BitslotError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    let config = toml_str_to_config(&fs_read(file_path)?, file_path)?;

    match config.programmer {
        Some(programmer) => Ok(programmer),
        None => Err(BitslotError::Internal(
            "config file did not contain a `[programmer]` section.".to_string(),
        )),
    }
}
