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

//! Runs a [`WritePlan`] against a programmer, strictly in plan order.
//!
//! The first failing write aborts the rest of the plan. Writes that already
//! went through stay in flash: since the manifest is always the last write of
//! a plan, an interrupted plan leaves a slot without a valid manifest and the
//! boot menu shows it as unknown.

use crate::error::TransportError;
use crate::flash::programmer::{Programmer, ProgrammerFault};
use crate::package::{WriteKind, WriteOp, WritePlan};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Write SPI flash.
    Persistent,
    /// Load the bitstream into configuration SRAM only. Lost on power cycle.
    Volatile,
}

impl ExecutionMode {
    pub fn persistent(self) -> bool {
        self == ExecutionMode::Persistent
    }

    /// Whether `op` has a meaning in this mode.
    fn issues(self, op: &WriteOp) -> bool {
        match self {
            ExecutionMode::Persistent => true,
            ExecutionMode::Volatile => op.kind == WriteKind::Bit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Regions written, in order.
    pub written: Vec<String>,
    /// Regions not issued in this mode.
    pub skipped: Vec<String>,
}

/// Issue every write of `plan` to `programmer`.
///
/// # Returns: `Result<ExecutionReport, TransportError>`
/// * `Ok(ExecutionReport)` - All writes issued in this mode went through
/// * `Err(TransportError::WriteFailed)` - A write failed; nothing after it was attempted
/// * `Err(TransportError::Timeout)` - A write did not finish in time; nothing after it was attempted
pub fn execute(
    plan: &WritePlan,
    programmer: &mut dyn Programmer,
    mode: ExecutionMode,
) -> Result<ExecutionReport, TransportError> {
    let mut report = ExecutionReport::default();
    let total = plan.ops.len();
    for (i, op) in plan.ops.iter().enumerate() {
        if !mode.issues(op) {
            info!("[{}/{total}] Skipping '{}' in {mode:?} mode", i + 1, op.region_name);
            report.skipped.push(op.region_name.clone());
            continue;
        }
        info!(
            "[{}/{total}] Writing '{}' ({} bytes) at {:#08x} via {}",
            i + 1,
            op.region_name,
            op.payload.len(),
            op.address,
            programmer.name()
        );
        programmer
            .write(op.kind, op.address, mode.persistent(), &op.payload)
            .map_err(|fault| {
                warn!(
                    "Aborting after '{}': {} of {total} writes done",
                    op.region_name,
                    report.written.len()
                );
                match fault {
                    ProgrammerFault::Failed(cause) => TransportError::WriteFailed {
                        region_name: op.region_name.clone(),
                        address: op.address,
                        cause,
                    },
                    ProgrammerFault::Timeout(after) => TransportError::Timeout {
                        region_name: op.region_name.clone(),
                        address: op.address,
                        after,
                    },
                }
            })?;
        report.written.push(op.region_name.clone());
    }
    info!(
        "Wrote {} regions for {} ({} skipped)",
        report.written.len(),
        plan.target,
        report.skipped.len()
    );
    Ok(report)
}

/// Describe what [`execute`] would do, without touching the programmer.
pub fn dry_run(plan: &WritePlan, programmer: &dyn Programmer, mode: ExecutionMode) -> Vec<String> {
    plan.ops
        .iter()
        .map(|op| {
            if mode.issues(op) {
                programmer.describe(op, mode.persistent())
            } else {
                format!("# skipped in {mode:?} mode: {op}")
            }
        })
        .collect()
}
