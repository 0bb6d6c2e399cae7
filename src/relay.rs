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

//! Reconfiguration relay.
//!
//! The relay sits between the host's debug adapter and the target: it forwards
//! JTAG and UART traffic untouched, and watches the target's UART for trigger
//! lines (see [`crate::trigger`]). When one arrives it takes the JTAG pins over
//! and replays the matching BootStub vector, which reboots the FPGA from the
//! requested slot. Flash is never written.
//!
//! ```text
//!               trigger line on UART
//!  PassThrough ───────────────────────▶ Replaying
//!       ▲                                   │
//!       └───────────────────────────────────┘
//!        vector done, JTAG error or REPLAY_TIMEOUT_MS
//! ```
//!
//! Bytes always reach the other side before they are scanned. While
//! replaying, UART traffic is still forwarded but not scanned, and JTAG
//! traffic from either side is dropped. A line that was cut by the start or
//! end of a replay never matches.
//!
//! Work is queued as [`RelayEvent`]s and done in small steps by
//! [`Relay::step`], so one thread can interleave forwarding with a replay.
//! [`runner`] drives it from a tokio channel.

pub mod runner;
pub mod stub;

use crate::relay::stub::StubTable;
use crate::trigger::{MAX_TOKEN_LEN, Trigger};
use log::{debug, info, trace, warn};
use std::collections::VecDeque;

/// A replay still running after this long is abandoned.
pub const REPLAY_TIMEOUT_MS: u64 = 2000;
/// Bytes shifted out per scheduler step.
pub const REPLAY_CHUNK: usize = 512;

/// The four byte streams the relay forwards, plus the JTAG pins it drives
/// during a replay.
pub trait RelayPorts {
    fn uart_to_host(&mut self, bytes: &[u8]);
    fn uart_to_target(&mut self, bytes: &[u8]);
    fn jtag_to_target(&mut self, bytes: &[u8]);
    fn jtag_to_host(&mut self, bytes: &[u8]);

    /// Shift replay bytes onto the JTAG pins.
    ///
    /// Returns how many bytes of `chunk` were taken. `Ok(0)` means the pins
    /// are busy and the relay will retry on a later step.
    fn drive_jtag(&mut self, chunk: &[u8]) -> Result<usize, String>;
}

pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    UartFromTarget(Vec<u8>),
    UartFromHost(Vec<u8>),
    JtagFromHost(Vec<u8>),
    JtagFromTarget(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    PassThrough,
    Replaying {
        trigger: Trigger,
        vector: Vec<u8>,
        sent: usize,
        started_ms: u64,
    },
}

/// Collects target UART bytes into lines and matches them against the trigger tokens.
#[derive(Debug, Default)]
struct TriggerScanner {
    line: Vec<u8>,
    overflowed: bool,
}

impl TriggerScanner {
    // room for the token plus a carriage return on either side
    const CAPACITY: usize = MAX_TOKEN_LEN + 2;

    fn push(&mut self, byte: u8) -> Option<Trigger> {
        if byte != b'\n' {
            if self.line.len() < Self::CAPACITY {
                self.line.push(byte);
            } else {
                self.overflowed = true;
            }
            return None;
        }
        let trigger = if self.overflowed {
            None
        } else {
            let line = self.line.strip_prefix(b"\r").unwrap_or(&self.line);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            Trigger::parse(line)
        };
        self.reset();
        trigger
    }

    /// Account for bytes that are forwarded but not scanned. A line that was
    /// partly skipped never matches.
    fn skip(&mut self, bytes: &[u8]) {
        if let Some(&last) = bytes.last() {
            self.line.clear();
            self.overflowed = last != b'\n';
        }
    }

    fn reset(&mut self) {
        self.line.clear();
        self.overflowed = false;
    }
}

pub struct Relay<P: RelayPorts> {
    ports: P,
    stubs: StubTable,
    state: RelayState,
    queue: VecDeque<RelayEvent>,
    scanner: TriggerScanner,
}

impl<P: RelayPorts> Relay<P> {
    pub fn new(ports: P, stubs: StubTable) -> Self {
        Relay {
            ports,
            stubs,
            state: RelayState::PassThrough,
            queue: VecDeque::new(),
            scanner: TriggerScanner::default(),
        }
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.state, RelayState::Replaying { .. })
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }

    pub fn push(&mut self, event: RelayEvent) {
        self.queue.push_back(event);
    }

    /// Handle one queued event, then shift one replay chunk.
    ///
    /// Returns `false` when there was nothing to do right now: the queue is
    /// empty and no replay progress could be made.
    pub fn step(&mut self, now_ms: u64) -> bool {
        let mut progressed = false;
        if let Some(event) = self.queue.pop_front() {
            self.handle(event, now_ms);
            progressed = true;
        }
        if self.is_replaying() {
            progressed |= self.replay_chunk(now_ms);
        }
        progressed
    }

    /// Step until no more progress can be made.
    pub fn run_until_idle(&mut self, clock: &impl Clock) {
        while self.step(clock.now_ms()) {}
    }

    fn handle(&mut self, event: RelayEvent, now_ms: u64) {
        match event {
            RelayEvent::UartFromTarget(bytes) => {
                self.ports.uart_to_host(&bytes);
                let mut rest = &bytes[..];
                while let Some((&byte, tail)) = rest.split_first() {
                    if self.is_replaying() {
                        break;
                    }
                    rest = tail;
                    if let Some(trigger) = self.scanner.push(byte) {
                        self.start_replay(trigger, now_ms);
                    }
                }
                self.scanner.skip(rest);
            }
            RelayEvent::UartFromHost(bytes) => self.ports.uart_to_target(&bytes),
            RelayEvent::JtagFromHost(bytes) => {
                if self.is_replaying() {
                    trace!("Dropping {} host JTAG bytes during replay", bytes.len());
                } else {
                    self.ports.jtag_to_target(&bytes);
                }
            }
            RelayEvent::JtagFromTarget(bytes) => {
                if self.is_replaying() {
                    trace!("Dropping {} target JTAG bytes during replay", bytes.len());
                } else {
                    self.ports.jtag_to_host(&bytes);
                }
            }
        }
    }

    fn start_replay(&mut self, trigger: Trigger, now_ms: u64) {
        match self.stubs.vector(trigger) {
            Ok(vector) => {
                info!("{trigger} received, replaying {} byte BootStub", vector.len());
                self.state = RelayState::Replaying {
                    trigger,
                    vector,
                    sent: 0,
                    started_ms: now_ms,
                };
            }
            Err(e) => warn!("{trigger} received but cannot be replayed: {e}"),
        }
    }

    fn replay_chunk(&mut self, now_ms: u64) -> bool {
        let RelayState::Replaying {
            trigger,
            vector,
            sent,
            started_ms,
        } = &mut self.state
        else {
            return false;
        };

        if now_ms.saturating_sub(*started_ms) >= REPLAY_TIMEOUT_MS {
            warn!("Replay for {trigger} timed out after {sent} of {} bytes", vector.len());
            self.finish_replay();
            return true;
        }
        let end = (*sent + REPLAY_CHUNK).min(vector.len());
        match self.ports.drive_jtag(&vector[*sent..end]) {
            Ok(0) if *sent < vector.len() => return false,
            Ok(taken) => *sent += taken.min(end - *sent),
            Err(e) => {
                warn!("Replay for {trigger} failed: {e}");
                self.finish_replay();
                return true;
            }
        }
        if *sent >= vector.len() {
            info!("Replay for {trigger} done");
            self.finish_replay();
        }
        true
    }

    fn finish_replay(&mut self) {
        self.state = RelayState::PassThrough;
        debug!("Back to pass-through");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::layout::SlotIndex;
    use crate::relay::stub::compress_stub;
    use std::cell::Cell;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingPorts {
        pub(crate) to_host_uart: Vec<u8>,
        pub(crate) to_target_uart: Vec<u8>,
        pub(crate) to_target_jtag: Vec<u8>,
        pub(crate) to_host_jtag: Vec<u8>,
        pub(crate) driven: Vec<u8>,
        pub(crate) stalled: bool,
        pub(crate) fail: bool,
    }

    impl RelayPorts for RecordingPorts {
        fn uart_to_host(&mut self, bytes: &[u8]) {
            self.to_host_uart.extend_from_slice(bytes);
        }
        fn uart_to_target(&mut self, bytes: &[u8]) {
            self.to_target_uart.extend_from_slice(bytes);
        }
        fn jtag_to_target(&mut self, bytes: &[u8]) {
            self.to_target_jtag.extend_from_slice(bytes);
        }
        fn jtag_to_host(&mut self, bytes: &[u8]) {
            self.to_host_jtag.extend_from_slice(bytes);
        }
        fn drive_jtag(&mut self, chunk: &[u8]) -> Result<usize, String> {
            if self.fail {
                return Err("TDO stuck".to_string());
            }
            if self.stalled {
                return Ok(0);
            }
            self.driven.extend_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    /// Advances by one millisecond on every read.
    pub(crate) struct StepClock(pub(crate) Cell<u64>);

    impl Clock for StepClock {
        fn now_ms(&self) -> u64 {
            let now = self.0.get();
            self.0.set(now + 1);
            now
        }
    }

    pub(crate) fn stub_bytes(trigger: Trigger) -> Vec<u8> {
        let tag = trigger.to_string();
        tag.bytes().cycle().take(1500).collect()
    }

    pub(crate) fn full_table() -> StubTable {
        let mut table = StubTable::new();
        for slot in SlotIndex::all() {
            let trigger = Trigger::Slot(slot);
            table.insert(trigger, compress_stub(&stub_bytes(trigger)));
        }
        table.insert(Trigger::Bootloader, compress_stub(&stub_bytes(Trigger::Bootloader)));
        table
    }

    fn relay() -> Relay<RecordingPorts> {
        Relay::new(RecordingPorts::default(), full_table())
    }

    fn slot(n: u8) -> Trigger {
        Trigger::Slot(SlotIndex::try_from(n).unwrap())
    }

    #[test]
    fn test_trigger_replays_matching_stub() {
        let mut relay = relay();
        relay.push(RelayEvent::UartFromTarget(b"booting\nBITSTREAM3\n".to_vec()));
        relay.run_until_idle(&StepClock(Cell::new(0)));
        assert_eq!(relay.state(), &RelayState::PassThrough);
        assert_eq!(relay.ports().driven, stub_bytes(slot(3)));
        assert_eq!(relay.ports().to_host_uart, b"booting\nBITSTREAM3\n");
    }

    #[test]
    fn test_carriage_return_is_tolerated() {
        for line in [&b"BITSTREAM1\r\n"[..], b"\rBITSTREAM1\n"] {
            let mut relay = relay();
            relay.push(RelayEvent::UartFromTarget(line.to_vec()));
            relay.run_until_idle(&StepClock(Cell::new(0)));
            assert_eq!(relay.ports().driven, stub_bytes(slot(1)));
        }
    }

    #[test]
    fn test_trigger_split_across_events() {
        let mut relay = relay();
        relay.push(RelayEvent::UartFromTarget(b"BOOTLO".to_vec()));
        relay.push(RelayEvent::UartFromTarget(b"ADER\n".to_vec()));
        relay.run_until_idle(&StepClock(Cell::new(0)));
        assert_eq!(relay.ports().driven, stub_bytes(Trigger::Bootloader));
    }

    #[test]
    fn test_non_triggers_are_only_forwarded() {
        let mut relay = relay();
        for line in [
            &b"bitstream3\n"[..],
            b"BITSTREAM8\n",
            b"BITSTREAM3",
            b"say BITSTREAM3\n",
        ] {
            relay.push(RelayEvent::UartFromTarget(line.to_vec()));
        }
        relay.run_until_idle(&StepClock(Cell::new(0)));
        assert!(relay.ports().driven.is_empty());
        assert_eq!(
            relay.ports().to_host_uart,
            b"bitstream3\nBITSTREAM8\nBITSTREAM3say BITSTREAM3\n"
        );
    }

    #[test]
    fn test_overlong_line_does_not_match_its_tail() {
        let mut relay = relay();
        relay.push(RelayEvent::UartFromTarget(
            b"a very long log line ending in BITSTREAM2\n".to_vec(),
        ));
        relay.run_until_idle(&StepClock(Cell::new(0)));
        assert!(relay.ports().driven.is_empty());
    }

    #[test]
    fn test_no_nested_triggers_and_jtag_dropped_while_replaying() {
        let mut relay = Relay::new(
            RecordingPorts {
                stalled: true,
                ..Default::default()
            },
            full_table(),
        );
        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM0\n".to_vec()));
        relay.step(0);
        assert!(relay.is_replaying());

        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM5\n".to_vec()));
        relay.push(RelayEvent::JtagFromHost(vec![1, 2, 3]));
        relay.push(RelayEvent::UartFromHost(b"hi".to_vec()));
        relay.step(1);
        relay.step(2);
        relay.step(3);
        match relay.state() {
            RelayState::Replaying { trigger, .. } => assert_eq!(*trigger, slot(0)),
            other => panic!("expected Replaying, got {other:?}"),
        }
        assert!(relay.ports().to_target_jtag.is_empty());
        assert_eq!(relay.ports().to_target_uart, b"hi");
        assert_eq!(relay.ports().to_host_uart, b"BITSTREAM0\nBITSTREAM5\n");
    }

    #[test]
    fn test_stalled_replay_times_out() {
        let mut relay = Relay::new(
            RecordingPorts {
                stalled: true,
                ..Default::default()
            },
            full_table(),
        );
        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM4\n".to_vec()));
        relay.step(100);
        assert!(!relay.step(100 + REPLAY_TIMEOUT_MS - 1));
        assert!(relay.is_replaying());
        assert!(relay.step(100 + REPLAY_TIMEOUT_MS));
        assert_eq!(relay.state(), &RelayState::PassThrough);

        // scanning resumes afterwards
        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM4\n".to_vec()));
        relay.step(5000);
        assert!(relay.is_replaying());
    }

    #[test]
    fn test_jtag_error_ends_replay() {
        let mut relay = Relay::new(
            RecordingPorts {
                fail: true,
                ..Default::default()
            },
            full_table(),
        );
        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM6\n".to_vec()));
        relay.run_until_idle(&StepClock(Cell::new(0)));
        assert_eq!(relay.state(), &RelayState::PassThrough);
    }

    #[test]
    fn test_missing_stub_stays_in_pass_through() {
        let mut relay = Relay::new(RecordingPorts::default(), StubTable::new());
        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM2\n".to_vec()));
        relay.push(RelayEvent::JtagFromHost(vec![9]));
        relay.push(RelayEvent::JtagFromTarget(vec![8]));
        relay.run_until_idle(&StepClock(Cell::new(0)));
        assert_eq!(relay.state(), &RelayState::PassThrough);
        assert_eq!(relay.ports().to_target_jtag, vec![9]);
        assert_eq!(relay.ports().to_host_jtag, vec![8]);
    }

    #[test]
    fn test_unreplayable_trigger_does_not_hide_the_next_one() {
        let mut table = StubTable::new();
        table.insert(slot(3), compress_stub(&stub_bytes(slot(3))));
        let mut relay = Relay::new(RecordingPorts::default(), table);
        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM2\nBITSTREAM3\n".to_vec()));
        relay.run_until_idle(&StepClock(Cell::new(0)));
        assert_eq!(relay.ports().driven, stub_bytes(slot(3)));
        assert_eq!(relay.ports().to_host_uart, b"BITSTREAM2\nBITSTREAM3\n");
    }

    #[test]
    fn test_line_straddling_replay_end_is_ignored() {
        let mut relay = Relay::new(
            RecordingPorts {
                stalled: true,
                ..Default::default()
            },
            full_table(),
        );
        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM0\nlog: BITST".to_vec()));
        relay.step(0);
        assert!(relay.is_replaying());
        assert!(relay.step(REPLAY_TIMEOUT_MS));
        assert_eq!(relay.state(), &RelayState::PassThrough);

        relay.push(RelayEvent::UartFromTarget(b"REAM1\n".to_vec()));
        relay.step(REPLAY_TIMEOUT_MS + 1);
        assert!(!relay.is_replaying());

        relay.push(RelayEvent::UartFromTarget(b"BITSTREAM1\n".to_vec()));
        relay.step(REPLAY_TIMEOUT_MS + 2);
        match relay.state() {
            RelayState::Replaying { trigger, .. } => assert_eq!(*trigger, slot(1)),
            other => panic!("expected Replaying, got {other:?}"),
        }
    }
}
