//! Controller facade wiring transport, sequencer, pollers and manual gate
//!
//! One instance per service. Presentation layers talk only to this type:
//! connect/disconnect the PLC link, start/stop/speed-switch the chase,
//! manual output writes, and status snapshots/observer registration.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use chaser_modbus::ModbusTransport;

use crate::config::AppConfig;
use crate::environment::EnvironmentPoller;
use crate::error::Result;
use crate::inputs::InputPoller;
use crate::manual::ManualGate;
use crate::sequencer::Sequencer;
use crate::state::{ConnectionState, SharedStatus, StatusObserver, StatusSnapshot};
use crate::POINT_COUNT;

struct Pollers {
    inputs: InputPoller,
    environment: EnvironmentPoller,
}

/// Service facade over the whole controller
pub struct Controller {
    config: AppConfig,
    transport: Arc<ModbusTransport>,
    status: SharedStatus,
    sequencer: Arc<Sequencer>,
    manual: ManualGate,
    pollers: Mutex<Option<Pollers>>,
}

impl Controller {
    pub fn new(config: AppConfig) -> Self {
        let transport = Arc::new(ModbusTransport::with_timeouts(
            config.unit_id,
            config.connect_timeout(),
            config.request_timeout(),
        ));
        let status = SharedStatus::new();
        let sequencer = Arc::new(Sequencer::new(
            transport.clone(),
            status.clone(),
            config.speed_delays(),
        ));
        let manual = ManualGate::new(transport.clone(), status.clone(), sequencer.clone());
        Self {
            config,
            transport,
            status,
            sequencer,
            manual,
            pollers: Mutex::new(None),
        }
    }

    /// Open the PLC link and start the background pollers
    ///
    /// Idempotent: reconnecting replaces the socket but not the pollers.
    pub async fn connect(&self) -> Result<()> {
        self.transport
            .connect(&self.config.host, self.config.port)
            .await?;
        self.status.set_connection(ConnectionState::Connected);

        let mut pollers = self.pollers.lock().await;
        if pollers.is_none() {
            *pollers = Some(Pollers {
                inputs: InputPoller::spawn(
                    self.transport.clone(),
                    self.status.clone(),
                    self.sequencer.clone(),
                    self.config.poll_interval(),
                ),
                environment: EnvironmentPoller::spawn(
                    self.transport.clone(),
                    self.status.clone(),
                    self.config.environment_interval(),
                ),
            });
        }
        info!(
            "Controller connected to {}:{}",
            self.config.host, self.config.port
        );
        Ok(())
    }

    /// Stop the chase, tear down the pollers and close the link
    pub async fn disconnect(&self) {
        if let Some(pollers) = self.pollers.lock().await.take() {
            pollers.inputs.stop().await;
            pollers.environment.stop().await;
        }
        // Clear the outputs while the link is still up
        self.sequencer.stop().await;
        self.transport.disconnect().await;
        self.status.reset_to_disconnected();
        info!("Controller disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Start the chasing-light cycle (no-op while running)
    pub async fn start(&self) {
        self.sequencer.start().await;
    }

    /// Stop the cycle and clear all outputs (no-op while stopped)
    pub async fn stop(&self) {
        self.sequencer.stop().await;
    }

    /// Cycle the chase speed 1 -> 2 -> 3 -> 1 (no-op while stopped)
    pub fn switch_speed(&self) {
        self.sequencer.switch_speed();
    }

    pub fn is_running(&self) -> bool {
        self.sequencer.is_running()
    }

    /// Manually set one output point; gated on the chase being stopped
    pub async fn set_output(&self, index: usize, value: bool) -> Result<()> {
        self.manual.set_output(index, value).await
    }

    /// Manually overwrite the whole output bank with a pattern
    pub async fn set_all_outputs(&self, values: [bool; POINT_COUNT]) -> Result<()> {
        self.manual.set_all_outputs(values).await
    }

    pub fn is_manual_allowed(&self) -> bool {
        self.manual.is_allowed()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn StatusObserver>>) {
        self.status.set_observer(observer);
    }

    /// Orderly shutdown for process exit
    pub async fn shutdown(&self) {
        self.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let controller = Controller::new(AppConfig::default());
        assert!(!controller.is_connected());
        assert!(!controller.is_running());
        assert!(controller.is_manual_allowed());
        assert_eq!(controller.snapshot(), StatusSnapshot::default());
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_safe() {
        let controller = Controller::new(AppConfig::default());
        controller.disconnect().await;
        assert_eq!(
            controller.snapshot().connection,
            ConnectionState::Disconnected
        );
    }
}
