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

//! Programmer configuration.
//!
//! Settings are read from up to three TOML files, each overriding the one before:
//!
//! 1. vendor config, [`VENDOR_CONFIG_PATH`]
//! 2. user config, [`USER_CONFIG_PATH`]
//! 3. a file passed on the command line with `--config`
//!
//! Only the `[programmer]` section is used:
//!
//! ```toml
//! [programmer]
//! backend = "openfpgaloader"
//! cable = "dirtyJtag"
//! loader = "openFPGALoader"
//! use_sudo = true
//! write_timeout_secs = 120
//! image_path = "/var/lib/bitslot/flash.img"
//! ```
//!
//! A missing or broken file is not fatal: it is skipped with a warning and the
//! hardcoded defaults below fill whatever is left unset.

mod config_files;

use crate::config::config_files::{ProgrammerToml, programmer_config_from_file};
use log::{trace, warn};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

pub static VENDOR_CONFIG_PATH: &str = "/usr/lib/bitslot/config.toml";
pub static USER_CONFIG_PATH: &str = "/etc/bitslot/config.toml";

// Hardcoded fallbacks used when no config file sets a value
pub static DEFAULT_BACKEND: &str = "openfpgaloader";
pub static DEFAULT_CABLE: &str = "dirtyJtag";
pub static DEFAULT_LOADER: &str = "openFPGALoader";
pub const DEFAULT_USE_SUDO: bool = true;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammerConfig {
    /// Registry name of the programmer backend.
    pub backend: String,
    /// Cable passed to the loader with `-c`.
    pub cable: String,
    /// Loader executable.
    pub loader: String,
    pub use_sudo: bool,
    /// Upper bound for a single write.
    pub write_timeout: Duration,
    /// Backing file of the `image` backend.
    pub image_path: Option<PathBuf>,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        ProgrammerToml::default().into()
    }
}

static CONFIG: OnceLock<ProgrammerConfig> = OnceLock::new();

/// Merge the config files in `paths`, later files overriding earlier ones.
pub fn layered_config(paths: &[&Path]) -> ProgrammerConfig {
    let merged = paths
        .iter()
        .fold(ProgrammerToml::default(), |acc, path| {
            match programmer_config_from_file(path) {
                Ok(layer) => {
                    trace!("Merging config layer {path:?}: {layer:?}");
                    layer.merge(acc)
                }
                Err(e) => {
                    warn!("Skipping config layer {path:?}: {e}");
                    acc
                }
            }
        });
    let config: ProgrammerConfig = merged.into();
    trace!("Resulting config: {config:?}");
    config
}

/// Process-wide programmer configuration.
///
/// The first call decides the layers: vendor, user and, when given,
/// `override_path`. Later calls return the same configuration.
pub fn programmer_config(override_path: Option<&Path>) -> &'static ProgrammerConfig {
    CONFIG.get_or_init(|| {
        let mut layers = vec![Path::new(VENDOR_CONFIG_PATH), Path::new(USER_CONFIG_PATH)];
        if let Some(path) = override_path {
            layers.push(path);
        }
        layered_config(&layers)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_io::fs_write_bytes;

    #[test]
    fn test_later_layers_override_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let vendor = dir.path().join("vendor.toml");
        let user = dir.path().join("user.toml");
        fs_write_bytes(
            &vendor,
            true,
            b"[programmer]\ncable = \"dirtyJtag\"\nuse_sudo = false\nwrite_timeout_secs = 30\n",
        )
        .unwrap();
        fs_write_bytes(&user, true, b"[programmer]\ncable = \"ft2232\"\n").unwrap();

        let config = layered_config(&[vendor.as_path(), user.as_path()]);
        assert_eq!(config.cable, "ft2232");
        assert!(!config.use_sudo);
        assert_eq!(config.write_timeout, Duration::from_secs(30));
        assert_eq!(config.backend, DEFAULT_BACKEND);
    }

    #[test]
    fn test_missing_layers_fall_back_to_defaults() {
        let config = layered_config(&[Path::new("/nonexistent/bitslot/config.toml")]);
        assert_eq!(config, ProgrammerConfig::default());
        assert_eq!(config.loader, DEFAULT_LOADER);
        assert!(config.use_sudo);
    }
}
