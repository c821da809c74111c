//! Manual output control, gated on the sequencer being stopped
//!
//! While the chase runs the sequencer owns the DQ bank outright, so manual
//! writes are silently ignored. While stopped, a single point is toggled
//! with a read-modify-write of the full 14-bit vector so the other points
//! keep their state.

use std::sync::Arc;

use tracing::{debug, info};

use chaser_modbus::{ModbusTransport, Request};

use crate::error::{Result, ServiceError};
use crate::sequencer::Sequencer;
use crate::state::{output_label, SharedStatus};
use crate::{IO_BASE_ADDRESS, POINT_COUNT};

/// Manual DQ write path
pub struct ManualGate {
    transport: Arc<ModbusTransport>,
    status: SharedStatus,
    sequencer: Arc<Sequencer>,
}

impl ManualGate {
    pub fn new(
        transport: Arc<ModbusTransport>,
        status: SharedStatus,
        sequencer: Arc<Sequencer>,
    ) -> Self {
        Self {
            transport,
            status,
            sequencer,
        }
    }

    /// Whether manual writes currently reach the PLC
    pub fn is_allowed(&self) -> bool {
        !self.sequencer.is_running()
    }

    /// Set a single output point, leaving the others untouched
    ///
    /// Rejects an out-of-range index before any PLC traffic. While the
    /// sequencer runs this is a silent no-op.
    pub async fn set_output(&self, index: usize, value: bool) -> Result<()> {
        if index >= POINT_COUNT {
            return Err(ServiceError::validation(format!(
                "Output index {index} out of range 0..{POINT_COUNT}"
            )));
        }
        if !self.is_allowed() {
            debug!(
                "Manual write to {} ignored: sequencer running",
                output_label(index)
            );
            return Ok(());
        }

        let read = Request::ReadCoils {
            address: IO_BASE_ADDRESS,
            quantity: POINT_COUNT as u16,
        };
        let bits = self.transport.execute(&read).await?.into_bits()?;

        let mut outputs = [false; POINT_COUNT];
        for (slot, bit) in outputs.iter_mut().zip(&bits) {
            *slot = *bit;
        }
        outputs[index] = value;

        let write = Request::WriteMultipleCoils {
            address: IO_BASE_ADDRESS,
            values: outputs.to_vec(),
        };
        self.transport.execute(&write).await?;

        self.status.set_outputs(outputs);
        info!("Manual write: {} = {}", output_label(index), value);
        Ok(())
    }

    /// Overwrite the whole output bank with an arbitrary pattern
    pub async fn set_all_outputs(&self, values: [bool; POINT_COUNT]) -> Result<()> {
        if !self.is_allowed() {
            debug!("Manual bank write ignored: sequencer running");
            return Ok(());
        }

        let write = Request::WriteMultipleCoils {
            address: IO_BASE_ADDRESS,
            values: values.to_vec(),
        };
        self.transport.execute(&write).await?;

        self.status.set_outputs(values);
        info!(
            "Manual bank write: {} of {} outputs on",
            values.iter().filter(|&&b| b).count(),
            POINT_COUNT
        );
        Ok(())
    }
}
