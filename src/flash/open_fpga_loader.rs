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

//! `openFPGALoader` backend.
//!
//! Every write stages its payload in a temporary file and runs one loader
//! process on it, e.g. for a firmware region:
//!
//! ```text
//! sudo openFPGALoader -c dirtyJtag -f -o 0x2c0000 --file-type raw /tmp/.tmpXXXX.bin
//! ```
//!
//! Volatile bitstream loads drop `-f` and `-o` so the loader programs the
//! configuration SRAM instead of flash.

use crate::config::ProgrammerConfig;
use crate::flash::programmer::{Programmer, ProgrammerFault};
use crate::package::{WriteKind, WriteOp};
use bitslot_macros::programmer;
use log::{debug, trace};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[programmer(backend = "openfpgaloader")]
#[derive(Debug)]
pub struct OpenFpgaLoader {
    loader: String,
    cable: String,
    use_sudo: bool,
    write_timeout: Duration,
}

impl OpenFpgaLoader {
    pub fn from_config(config: &ProgrammerConfig) -> Self {
        trace!("creating new OpenFpgaLoader for cable '{}'", config.cable);
        OpenFpgaLoader {
            loader: config.loader.clone(),
            cable: config.cable.clone(),
            use_sudo: config.use_sudo,
            write_timeout: config.write_timeout,
        }
    }

    /// Full command line for one write, program name first.
    pub fn command_line(
        &self,
        kind: WriteKind,
        offset: u32,
        persistent: bool,
        payload_path: &Path,
    ) -> Vec<String> {
        let mut args = Vec::new();
        if self.use_sudo {
            args.push("sudo".to_string());
        }
        args.push(self.loader.clone());
        args.extend(["-c".to_string(), self.cable.clone()]);
        if persistent {
            args.extend(["-f".to_string(), "-o".to_string(), format!("{offset:#x}")]);
        }
        args.extend(["--file-type".to_string(), kind.to_string()]);
        args.push(payload_path.to_string_lossy().to_string());
        args
    }

    /// Run `args` and wait for it, killing it once the write timeout passes.
    fn run(&self, args: &[String]) -> Result<(), ProgrammerFault> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| ProgrammerFault::Failed("empty command line".to_string()))?;
        debug!("Running: {}", args.join(" "));
        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| ProgrammerFault::Failed(format!("failed to start {program}: {e}")))?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(ProgrammerFault::Failed(format!(
                        "{} exited with {status}",
                        self.loader
                    )));
                }
                Ok(None) if started.elapsed() >= self.write_timeout => {
                    // the child may have exited since try_wait
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProgrammerFault::Timeout(self.write_timeout));
                }
                Ok(None) => sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(ProgrammerFault::Failed(format!(
                        "failed to wait for {}: {e}",
                        self.loader
                    )));
                }
            }
        }
    }
}

impl Programmer for OpenFpgaLoader {
    fn name(&self) -> &'static str {
        "openfpgaloader"
    }

    /// Check that the loader can be started at all, so that a missing tool is
    /// reported before the first write.
    fn open(&mut self) -> Result<(), ProgrammerFault> {
        let status = Command::new(&self.loader)
            .arg("--Version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| ProgrammerFault::Failed(format!("cannot run {}: {e}", self.loader)))?;
        trace!("{} --Version: {status}", self.loader);
        Ok(())
    }

    fn write(
        &mut self,
        kind: WriteKind,
        offset: u32,
        persistent: bool,
        payload: &[u8],
    ) -> Result<(), ProgrammerFault> {
        let suffix = match kind {
            WriteKind::Bit => ".bit",
            WriteKind::Raw => ".bin",
        };
        let mut staged = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .map_err(|e| ProgrammerFault::Failed(format!("failed to stage payload: {e}")))?;
        staged
            .write_all(payload)
            .and_then(|_| staged.flush())
            .map_err(|e| ProgrammerFault::Failed(format!("failed to stage payload: {e}")))?;
        trace!("Staged {} bytes in {:?}", payload.len(), staged.path());

        let args = self.command_line(kind, offset, persistent, staged.path());
        self.run(&args)
    }

    fn close(&mut self) -> Result<(), ProgrammerFault> {
        Ok(())
    }

    fn describe(&self, op: &WriteOp, persistent: bool) -> String {
        let placeholder = format!("<{}>", op.region_name);
        self.command_line(op.kind, op.address, persistent, Path::new(&placeholder))
            .join(" ")
    }
}
