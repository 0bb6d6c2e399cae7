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

//! Programmer abstraction and backend registry.
//!
//! A [`Programmer`] is whatever can put bytes at an offset of the SPI flash, or
//! load a bitstream straight into the FPGA's configuration SRAM. Backends
//! register a constructor under a name using the
//! [`programmer`](bitslot_macros::programmer) attribute, and are looked up by
//! that name with [`programmer_for_backend`]:
//!
//! ```rust,ignore
//! #[programmer(backend = "mybackend")]
//! pub struct MyProgrammer { /* ... */ }
//!
//! impl MyProgrammer {
//!     pub fn from_config(config: &ProgrammerConfig) -> Self { /* ... */ }
//! }
//!
//! fn register_programmers() {
//!     MyProgrammer::register_programmer();
//! }
//! ```
//!
//! Only one [`TransportSession`] can exist per process at a time. Acquiring it
//! opens the programmer. [`TransportSession::finish`] closes it and reports
//! the result; a session dropped without `finish` closes the programmer and
//! releases the write lock on its own, logging any close error.

use crate::config::ProgrammerConfig;
use crate::error::{BitslotError, TransportError};
use crate::package::{WriteKind, WriteOp};
use log::{info, trace, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OnceCell, OwnedMutexGuard};

/// Why a single programmer operation failed. Turned into a [`TransportError`]
/// by the executor, which knows the region being written.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProgrammerFault {
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub trait Programmer: Send {
    /// Registry name of the backend.
    fn name(&self) -> &'static str;

    /// Claim the underlying transport. Called once, before any write.
    fn open(&mut self) -> Result<(), ProgrammerFault>;

    /// Write `payload` at `offset`.
    ///
    /// # Arguments
    ///
    /// * `kind` - whether `payload` is a bitstream or opaque bytes
    /// * `offset` - flash address, ignored for volatile bitstream loads
    /// * `persistent` - `true` to write flash, `false` to load configuration SRAM only
    /// * `payload` - bytes to write
    fn write(
        &mut self,
        kind: WriteKind,
        offset: u32,
        persistent: bool,
        payload: &[u8],
    ) -> Result<(), ProgrammerFault>;

    /// Release the transport. Called exactly once by [`TransportSession`].
    fn close(&mut self) -> Result<(), ProgrammerFault>;

    /// Human readable form of what [`Programmer::write`] would do for `op`.
    fn describe(&self, op: &WriteOp, persistent: bool) -> String;
}

type ProgrammerConstructor = fn(&ProgrammerConfig) -> Box<dyn Programmer>;

/// Global registry of programmer backends, keyed by backend name.
pub static PROGRAMMER_REGISTRY: OnceLock<Mutex<HashMap<&'static str, ProgrammerConstructor>>> =
    OnceLock::new();

pub fn init_programmer_registry() -> Mutex<HashMap<&'static str, ProgrammerConstructor>> {
    Mutex::new(HashMap::new())
}

/// Register a programmer backend under `backend`. Registering a name twice
/// replaces the earlier constructor.
pub fn register_programmer(backend: &'static str, constructor: ProgrammerConstructor) {
    let mut registry = PROGRAMMER_REGISTRY
        .get_or_init(init_programmer_registry)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    trace!("Registering programmer backend '{backend}'");
    registry.insert(backend, constructor);
}

/// Names of all registered backends, sorted.
pub fn registered_backends() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = match PROGRAMMER_REGISTRY.get() {
        Some(registry) => registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect(),
        None => Vec::new(),
    };
    names.sort_unstable();
    names
}

/// Build the programmer registered as `backend`.
///
/// # Returns: `Result<Box<dyn Programmer>, BitslotError>`
/// * `Ok(Box<dyn Programmer>)` - A fresh, unopened programmer
/// * `Err(BitslotError::Internal)` - No backend was ever registered
/// * `Err(BitslotError::Argument)` - `backend` is not a registered name
pub fn programmer_for_backend(
    backend: &str,
    config: &ProgrammerConfig,
) -> Result<Box<dyn Programmer>, BitslotError> {
    let registry = PROGRAMMER_REGISTRY
        .get()
        .ok_or(BitslotError::Internal(String::from(
            "couldn't get PROGRAMMER_REGISTRY",
        )))?
        .lock()
        .map_err(|_| BitslotError::Internal(String::from("couldn't lock PROGRAMMER_REGISTRY")))?;

    match registry.get(backend) {
        Some(constructor) => Ok(constructor(config)),
        None => Err(BitslotError::Argument(format!(
            "bitslot has no programmer backend called '{backend}'"
        ))),
    }
}

static WRITE_LOCK: OnceCell<Arc<AsyncMutex<()>>> = OnceCell::const_new();

async fn get_write_lock_guard() -> OwnedMutexGuard<()> {
    let lock = WRITE_LOCK
        .get_or_init(|| async { Arc::new(AsyncMutex::new(())) })
        .await;
    lock.clone().lock_owned().await
}

/// Exclusive, opened programmer. Closed and unlocked on drop.
pub struct TransportSession {
    programmer: Box<dyn Programmer>,
    closed: bool,
    _guard: OwnedMutexGuard<()>,
}

impl TransportSession {
    /// Wait for the write lock, then open `programmer`.
    ///
    /// # Returns: `Result<TransportSession, TransportError>`
    /// * `Ok(TransportSession)` - The programmer is open and owned by the caller
    /// * `Err(TransportError::Unavailable)` - Opening the programmer failed; the lock is released again
    pub async fn acquire(mut programmer: Box<dyn Programmer>) -> Result<Self, TransportError> {
        let guard = get_write_lock_guard().await;
        programmer
            .open()
            .map_err(|fault| TransportError::Unavailable {
                backend: programmer.name().to_string(),
                cause: fault.to_string(),
            })?;
        info!("Acquired programmer '{}'", programmer.name());
        Ok(TransportSession {
            programmer,
            closed: false,
            _guard: guard,
        })
    }

    pub fn programmer(&mut self) -> &mut dyn Programmer {
        self.programmer.as_mut()
    }

    /// Close the programmer and release the write lock. Some backends only
    /// commit their writes on close.
    ///
    /// # Returns: `Result<(), TransportError>`
    /// * `Ok(())` - The programmer closed cleanly
    /// * `Err(TransportError::CloseFailed)` - Closing failed; earlier writes may not have landed
    pub fn finish(mut self) -> Result<(), TransportError> {
        self.closed = true;
        let backend = self.programmer.name();
        match self.programmer.close() {
            Ok(()) => {
                info!("Released programmer '{backend}'");
                Ok(())
            }
            Err(fault) => Err(TransportError::CloseFailed {
                backend: backend.to_string(),
                cause: fault.to_string(),
            }),
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.programmer.close() {
            Ok(()) => info!("Released programmer '{}'", self.programmer.name()),
            Err(e) => warn!(
                "Programmer '{}' did not close cleanly: {e}",
                self.programmer.name()
            ),
        }
    }
}
