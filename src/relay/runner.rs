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

//! Single-threaded tokio driver for a [`Relay`].
//!
//! Port readers send [`RelayEvent`]s into a channel. The runner feeds them to
//! the relay and steps it until idle; while a replay is stalled it wakes up
//! every [`TICK`] so the replay timeout is noticed without new traffic.

use crate::error::BitslotError;
use crate::relay::{Clock, Relay, RelayEvent, RelayPorts};
use log::{debug, info};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, MissedTickBehavior, interval};

pub const TICK: Duration = Duration::from_millis(10);

/// Milliseconds since the clock was created, on tokio's time source.
pub struct TokioClock {
    start: Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        TokioClock {
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Feed `events` into `relay` until every sender is gone, then finish any
/// replay in progress.
pub async fn run_relay<P: RelayPorts>(relay: &mut Relay<P>, mut events: Receiver<RelayEvent>) {
    let clock = TokioClock::default();
    let mut tick = interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Relay running");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => relay.push(event),
                None => break,
            },
            _ = tick.tick(), if relay.is_replaying() => {}
        }
        relay.run_until_idle(&clock);
    }

    debug!("Event channel closed");
    while relay.is_replaying() {
        tick.tick().await;
        relay.run_until_idle(&clock);
    }
    info!("Relay stopped");
}

/// Run [`run_relay`] on a fresh current-thread runtime, blocking the caller.
pub fn run_relay_blocking<P: RelayPorts>(
    relay: &mut Relay<P>,
    events: Receiver<RelayEvent>,
) -> Result<(), BitslotError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| BitslotError::Internal(format!("failed to start relay runtime: {e}")))?;
    runtime.block_on(run_relay(relay, events));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SlotIndex;
    use crate::relay::RelayState;
    use crate::relay::tests::{RecordingPorts, full_table, stub_bytes};
    use crate::trigger::Trigger;
    use tokio::sync::mpsc::channel;

    #[tokio::test]
    async fn test_runner_replays_and_forwards() {
        let mut relay = Relay::new(RecordingPorts::default(), full_table());
        let (tx, rx) = channel(8);
        tx.send(RelayEvent::JtagFromHost(vec![0xaa])).await.unwrap();
        tx.send(RelayEvent::UartFromTarget(b"BITSTREAM7\n".to_vec()))
            .await
            .unwrap();
        drop(tx);

        run_relay(&mut relay, rx).await;
        let seven = Trigger::Slot(SlotIndex::try_from(7).unwrap());
        assert_eq!(relay.state(), &RelayState::PassThrough);
        assert_eq!(relay.ports().driven, stub_bytes(seven));
        assert_eq!(relay.ports().to_target_jtag, vec![0xaa]);
    }

    #[test]
    fn test_blocking_runner_times_out_stalled_replay() {
        let mut relay = Relay::new(
            RecordingPorts {
                stalled: true,
                ..Default::default()
            },
            full_table(),
        );
        let (tx, rx) = channel(1);
        tx.try_send(RelayEvent::UartFromTarget(b"BOOTLOADER\n".to_vec()))
            .unwrap();
        drop(tx);

        let started = std::time::Instant::now();
        run_relay_blocking(&mut relay, rx).unwrap();
        assert_eq!(relay.state(), &RelayState::PassThrough);
        assert!(relay.ports().driven.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(crate::relay::REPLAY_TIMEOUT_MS));
    }
}
