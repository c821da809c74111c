//! Chasing-light sequencer state machine
//!
//! Stopped/Running with a cyclic driver task active only while running.
//! The driver re-reads the speed level every tick so a mid-cycle speed
//! change takes effect on the very next tick, and `stop()` joins the
//! driver before acknowledging, so no tick can fire afterwards.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chaser_modbus::{ModbusTransport, Request};

use crate::state::{SequencerState, SharedStatus};
use crate::{IO_BASE_ADDRESS, POINT_COUNT};

/// Cyclic output-pattern driver
pub struct Sequencer {
    transport: Arc<ModbusTransport>,
    status: SharedStatus,
    speed_delays: [u64; 3],
    running: AtomicBool,
    /// 1..=3 while running, 0 when stopped
    speed_level: AtomicU8,
    driver: Mutex<Option<Driver>>,
}

struct Driver {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sequencer {
    pub fn new(
        transport: Arc<ModbusTransport>,
        status: SharedStatus,
        speed_delays: [u64; 3],
    ) -> Self {
        Self {
            transport,
            status,
            speed_delays,
            running: AtomicBool::new(false),
            speed_level: AtomicU8::new(0),
            driver: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn speed_level(&self) -> u8 {
        self.speed_level.load(Ordering::Acquire)
    }

    /// Tick period of the current speed level; 0 when stopped
    pub fn delay_ms(&self) -> u64 {
        match self.speed_level() {
            level @ 1..=3 => self.speed_delays[(level - 1) as usize],
            _ => 0,
        }
    }

    /// Stopped -> Running at speed level 1; no-op while already running
    pub async fn start(self: &Arc<Self>) {
        let mut driver = self.driver.lock().await;
        if self.is_running() {
            debug!("start() ignored: sequencer already running");
            return;
        }

        self.speed_level.store(1, Ordering::Release);
        self.running.store(true, Ordering::Release);
        self.status.publish(|s| {
            s.sequencer = SequencerState {
                running: true,
                speed_level: 1,
                current_index: -1,
                delay_ms: self.speed_delays[0],
            };
        });

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(self).drive(token.clone()));
        *driver = Some(Driver { token, handle });
        info!("Sequencer started at speed level 1");
    }

    /// Running -> Stopped: joins the driver, then clears all outputs
    ///
    /// No-op while already stopped.
    pub async fn stop(&self) {
        let mut driver = self.driver.lock().await;
        if !self.is_running() {
            debug!("stop() ignored: sequencer not running");
            return;
        }

        if let Some(driver) = driver.take() {
            driver.token.cancel();
            if let Err(e) = driver.handle.await {
                warn!("Sequencer driver task join failed: {e}");
            }
        }
        self.running.store(false, Ordering::Release);
        self.speed_level.store(0, Ordering::Release);

        let request = Request::WriteMultipleCoils {
            address: IO_BASE_ADDRESS,
            values: vec![false; POINT_COUNT],
        };
        if let Err(e) = self.transport.execute(&request).await {
            warn!("Failed to clear outputs on stop: {e}");
        }

        self.status.publish(|s| {
            s.sequencer = SequencerState::default();
            s.io.outputs = [false; POINT_COUNT];
        });
        info!("Sequencer stopped");
    }

    /// Cycle the speed level 1 -> 2 -> 3 -> 1; no-op while stopped
    ///
    /// Takes effect on the next tick, not retroactively.
    pub fn switch_speed(&self) {
        if !self.is_running() {
            debug!("switch_speed() ignored: sequencer not running");
            return;
        }

        let next = self.speed_level() % 3 + 1;
        self.speed_level.store(next, Ordering::Release);
        let delay = self.speed_delays[(next - 1) as usize];
        self.status.publish(|s| {
            s.sequencer.speed_level = next;
            s.sequencer.delay_ms = delay;
        });
        info!("Speed level switched to {} ({}ms)", next, delay);
    }

    /// Cyclic driver: one tick advances the lit output by one position
    async fn drive(self: Arc<Self>, token: CancellationToken) {
        let mut current_index: i8 = -1;
        loop {
            // Period re-read from the current level every tick
            let level = self.speed_level().clamp(1, 3);
            let delay = self.speed_delays[(level - 1) as usize];

            tokio::select! {
                () = token.cancelled() => {
                    debug!("Sequencer driver cancelled");
                    return;
                }
                () = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }

            current_index = (current_index + 1) % POINT_COUNT as i8;
            let mut outputs = [false; POINT_COUNT];
            outputs[current_index as usize] = true;

            let request = Request::WriteMultipleCoils {
                address: IO_BASE_ADDRESS,
                values: outputs.to_vec(),
            };
            if let Err(e) = self.transport.execute(&request).await {
                // Transient PLC hiccups must not kill the cycle
                warn!("Chase write failed, next tick retries: {e}");
            }

            self.status.publish(|s| {
                let level = self.speed_level().clamp(1, 3);
                s.sequencer = SequencerState {
                    running: true,
                    speed_level: level,
                    current_index,
                    delay_ms: self.speed_delays[(level - 1) as usize],
                };
                s.io.outputs = outputs;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedStatus;

    fn sequencer(delays: [u64; 3]) -> Arc<Sequencer> {
        // Disconnected transport: writes fail and are logged, state machine
        // behavior is unaffected.
        let transport = Arc::new(ModbusTransport::new(1));
        Arc::new(Sequencer::new(transport, SharedStatus::new(), delays))
    }

    #[tokio::test]
    async fn test_start_sets_level_one() {
        let seq = sequencer([1000, 500, 200]);
        assert!(!seq.is_running());

        seq.start().await;
        assert!(seq.is_running());
        assert_eq!(seq.speed_level(), 1);
        assert_eq!(seq.delay_ms(), 1000);

        let state = seq.status.snapshot().sequencer;
        assert!(state.running);
        assert_eq!(state.current_index, -1);

        seq.stop().await;
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let seq = sequencer([1000, 500, 200]);
        seq.start().await;
        seq.switch_speed();
        assert_eq!(seq.speed_level(), 2);

        // A second start must not reset the speed level
        seq.start().await;
        assert_eq!(seq.speed_level(), 2);

        seq.stop().await;
    }

    #[tokio::test]
    async fn test_speed_cycles_back_to_one() {
        let seq = sequencer([1000, 500, 200]);
        seq.start().await;

        seq.switch_speed();
        assert_eq!(seq.speed_level(), 2);
        assert_eq!(seq.delay_ms(), 500);
        seq.switch_speed();
        assert_eq!(seq.speed_level(), 3);
        assert_eq!(seq.delay_ms(), 200);
        seq.switch_speed();
        assert_eq!(seq.speed_level(), 1);
        assert_eq!(seq.delay_ms(), 1000);

        seq.stop().await;
    }

    #[tokio::test]
    async fn test_commands_while_stopped_are_noops() {
        let seq = sequencer([1000, 500, 200]);

        seq.switch_speed();
        assert_eq!(seq.speed_level(), 0);

        seq.stop().await;
        assert!(!seq.is_running());
        assert_eq!(seq.status.snapshot().sequencer, SequencerState::default());
    }

    #[tokio::test]
    async fn test_driver_lights_exactly_one_output() {
        let seq = sequencer([10, 10, 10]);
        seq.start().await;

        tokio::time::sleep(Duration::from_millis(45)).await;
        let snapshot = seq.status.snapshot();
        let lit: Vec<usize> = snapshot
            .io
            .outputs
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        assert_eq!(lit.len(), 1, "exactly one output lit while running");
        assert_eq!(lit[0] as i8, snapshot.sequencer.current_index);

        seq.stop().await;
    }

    #[tokio::test]
    async fn test_stop_resets_state_and_no_late_ticks() {
        let seq = sequencer([10, 10, 10]);
        seq.start().await;
        tokio::time::sleep(Duration::from_millis(35)).await;
        seq.stop().await;

        let snapshot = seq.status.snapshot();
        assert_eq!(snapshot.sequencer, SequencerState::default());
        assert_eq!(snapshot.io.outputs, [false; POINT_COUNT]);

        // No tick may fire after stop() returned
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(seq.status.snapshot().sequencer, SequencerState::default());
    }
}
