//! Discrete-input poller with push-button edge detection
//!
//! Reads the DI bank on a fixed interval and fires sequencer commands on
//! rising edges: I0.0 starts the chase or switches its speed, I0.1 stops
//! it. A failed read skips the cycle and keeps the previous baseline, so
//! an edge that spans an outage is still detected once the link recovers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chaser_modbus::{ModbusTransport, Request, Response};

use crate::sequencer::Sequencer;
use crate::state::{ConnectionState, SharedStatus};
use crate::{IO_BASE_ADDRESS, POINT_COUNT};

/// DI bit wired to the start / speed-switch push button
pub const START_BUTTON_BIT: usize = 0;

/// DI bit wired to the stop push button
pub const STOP_BUTTON_BIT: usize = 1;

/// Background task polling the PLC discrete inputs
pub struct InputPoller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl InputPoller {
    /// Spawn the poll loop; it runs until [`InputPoller::stop`]
    pub fn spawn(
        transport: Arc<ModbusTransport>,
        status: SharedStatus,
        sequencer: Arc<Sequencer>,
        interval: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            transport,
            status,
            sequencer,
            interval,
            token.clone(),
        ));
        Self { token, handle }
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Input poller task join failed: {e}");
        }
    }
}

async fn poll_loop(
    transport: Arc<ModbusTransport>,
    status: SharedStatus,
    sequencer: Arc<Sequencer>,
    interval: Duration,
    token: CancellationToken,
) {
    info!("Input poller started ({}ms interval)", interval.as_millis());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut previous = [false; POINT_COUNT];

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let request = Request::ReadDiscreteInputs {
            address: IO_BASE_ADDRESS,
            quantity: POINT_COUNT as u16,
        };
        let bits = match transport.execute(&request).await {
            Ok(Response::Bits(bits)) => bits,
            Ok(_) => {
                warn!("Unexpected response type for discrete-input read");
                continue;
            }
            Err(e) => {
                // Keep the previous baseline; the next good read still
                // sees the edge.
                debug!("Discrete-input read failed, skipping cycle: {e}");
                if !transport.is_connected()
                    && status.snapshot().connection == ConnectionState::Connected
                {
                    warn!("PLC link lost, degrading displayed state");
                    status.reset_to_disconnected();
                }
                continue;
            }
        };

        let mut inputs = [false; POINT_COUNT];
        for (slot, bit) in inputs.iter_mut().zip(&bits) {
            *slot = *bit;
        }

        if inputs[START_BUTTON_BIT] && !previous[START_BUTTON_BIT] {
            if sequencer.is_running() {
                info!("Start button edge: switching speed");
                sequencer.switch_speed();
            } else {
                info!("Start button edge: starting sequencer");
                sequencer.start().await;
            }
        }
        if inputs[STOP_BUTTON_BIT] && !previous[STOP_BUTTON_BIT] && sequencer.is_running() {
            info!("Stop button edge: stopping sequencer");
            sequencer.stop().await;
        }

        if inputs != previous {
            status.set_inputs(inputs);
        }
        previous = inputs;
    }
    info!("Input poller stopped");
}
