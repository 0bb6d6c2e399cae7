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

//! On-device boot selector.
//!
//! The bootloader shows one menu entry per user slot, named after the manifest
//! found in that slot. Turning the encoder moves the highlight, pressing it
//! asks the relay to reconfigure the FPGA into the highlighted slot. Once a
//! user bitstream runs, holding the encoder for [`LONG_PRESS_MS`] asks for the
//! bootloader again.
//!
//! ```text
//!          short press                reconfigured(slot)
//!   Menu ──────────────▶ Committing ─────────────────────▶ Running(slot)
//!    ▲  ◀───────────────────┘                                   │
//!    │     boot_fallback()                                      │
//!    └──────────────────────────────────────────────────────────┘
//!                            long press
//! ```
//!
//! The selector is driven by a polling loop: [`BootSelector::poll`] is called
//! periodically with the current time, the encoder ticks since the last call
//! and the button level. It never blocks.

use crate::layout::{MANIFEST_SIZE, N_SLOTS, SlotIndex, manifest_addr};
use crate::manifest::{Manifest, UNKNOWN_NAME};
use crate::trigger::Trigger;
use log::{debug, info};

/// Hold time that turns a press into a request to return to the menu.
pub const LONG_PRESS_MS: u64 = 3000;
/// Releases shorter than this are contact bounce and do not end a press.
pub const DEBOUNCE_MS: u64 = 50;

/// Read access to the SPI flash. Addresses past the end read as erased.
pub trait FlashRead {
    fn read(&self, address: u32, buf: &mut [u8]);
}

/// Where the selector sends its trigger tokens, normally the UART towards the relay.
pub trait TriggerSink {
    fn send(&mut self, trigger: Trigger);
}

impl TriggerSink for Vec<Trigger> {
    fn send(&mut self, trigger: Trigger) {
        self.push(trigger);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Menu { highlighted: SlotIndex },
    Committing { slot: SlotIndex },
    Running { slot: SlotIndex },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub slot: SlotIndex,
    /// Manifest display name, or [`UNKNOWN_NAME`].
    pub name: String,
    pub manifest: Option<Manifest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Default)]
struct Button {
    pressed_since: Option<u64>,
    released_at: Option<u64>,
    long_fired: bool,
}

impl Button {
    /// A short press is reported when the release is confirmed, a long press
    /// as soon as the hold time is reached. A press yields one event at most.
    fn update(&mut self, now_ms: u64, down: bool) -> Option<ButtonEvent> {
        let since = match (down, self.pressed_since) {
            (true, None) => {
                self.pressed_since = Some(now_ms);
                self.released_at = None;
                self.long_fired = false;
                return None;
            }
            (false, None) => return None,
            (_, Some(since)) => since,
        };

        if down {
            self.released_at = None;
            if !self.long_fired && now_ms.saturating_sub(since) >= LONG_PRESS_MS {
                self.long_fired = true;
                return Some(ButtonEvent::LongPress);
            }
            return None;
        }

        let released_at = *self.released_at.get_or_insert(now_ms);
        if now_ms.saturating_sub(released_at) < DEBOUNCE_MS {
            return None;
        }
        self.pressed_since = None;
        self.released_at = None;
        (!self.long_fired).then_some(ButtonEvent::ShortPress)
    }
}

pub struct BootSelector<F: FlashRead, T: TriggerSink> {
    flash: F,
    sink: T,
    state: SelectorState,
    entries: Vec<MenuEntry>,
    button: Button,
}

impl<F: FlashRead, T: TriggerSink> BootSelector<F, T> {
    /// Start in the menu with slot 0 highlighted.
    pub fn new(flash: F, sink: T) -> Self {
        let mut selector = BootSelector {
            flash,
            sink,
            state: SelectorState::Menu {
                highlighted: SlotIndex::FIRST,
            },
            entries: Vec::new(),
            button: Button::default(),
        };
        selector.refresh();
        selector
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    pub fn sink(&self) -> &T {
        &self.sink
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Re-read the manifest of every slot.
    pub fn refresh(&mut self) {
        let mut region = vec![0u8; MANIFEST_SIZE as usize];
        self.entries = SlotIndex::all()
            .map(|slot| {
                self.flash.read(manifest_addr(slot), &mut region);
                let manifest = Manifest::from_flash(&region);
                let name = manifest
                    .as_ref()
                    .map(|m| m.display_name.clone())
                    .unwrap_or_else(|| UNKNOWN_NAME.to_string());
                debug!("slot {slot}: '{name}'");
                MenuEntry {
                    slot,
                    name,
                    manifest,
                }
            })
            .collect();
    }

    /// Advance the state machine.
    ///
    /// # Arguments
    ///
    /// * `now_ms` - monotonic time in milliseconds
    /// * `ticks` - encoder steps since the last call, negative for counter-clockwise
    /// * `button_down` - current encoder button level
    pub fn poll(&mut self, now_ms: u64, ticks: i8, button_down: bool) -> SelectorState {
        let event = self.button.update(now_ms, button_down);
        match (self.state, event) {
            (SelectorState::Menu { highlighted }, event) => {
                let highlighted = rotate(highlighted, ticks);
                self.state = SelectorState::Menu { highlighted };
                if event == Some(ButtonEvent::ShortPress) {
                    info!("Booting slot {highlighted}");
                    self.sink.send(Trigger::Slot(highlighted));
                    self.state = SelectorState::Committing { slot: highlighted };
                }
            }
            (SelectorState::Running { slot }, Some(ButtonEvent::LongPress)) => {
                info!("Leaving slot {slot}, returning to the boot menu");
                self.sink.send(Trigger::Bootloader);
                self.enter_menu(slot);
            }
            (SelectorState::Committing { .. } | SelectorState::Running { .. }, _) => {}
        }
        self.state
    }

    /// The selected bitstream reports that it started.
    pub fn reconfigured(&mut self, slot: SlotIndex) {
        if self.state == (SelectorState::Committing { slot }) {
            info!("Slot {slot} is running");
            self.state = SelectorState::Running { slot };
        } else {
            debug!("Ignoring reconfiguration of slot {slot} in {:?}", self.state);
        }
    }

    /// Configuration from the selected slot failed and the bootloader came
    /// back up. Not an error: the menu is simply shown again.
    pub fn boot_fallback(&mut self) {
        let highlighted = match self.state {
            SelectorState::Menu { highlighted } => highlighted,
            SelectorState::Committing { slot } | SelectorState::Running { slot } => slot,
        };
        debug!("Boot fallback from {:?}", self.state);
        self.enter_menu(highlighted);
    }

    /// The button state is kept: a long press still held must not commit on release.
    fn enter_menu(&mut self, highlighted: SlotIndex) {
        self.state = SelectorState::Menu { highlighted };
        self.refresh();
    }
}

fn rotate(slot: SlotIndex, ticks: i8) -> SlotIndex {
    let next = (slot.get() as i16 + ticks as i16).rem_euclid(N_SLOTS as i16);
    SlotIndex::try_from(next as u8).unwrap_or(slot)
}
