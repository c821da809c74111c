//! Temperature/humidity poller
//!
//! Reads the two calibrated analog input registers on a slow interval and
//! publishes the decoded reading. Out-of-range raw values decode to `None`
//! and display as `--`; a failed read publishes the same invalid reading
//! instead of keeping a stale one.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chaser_modbus::bits::{decode_humidity, decode_temperature};
use chaser_modbus::{ModbusTransport, Request, Response};

use crate::state::{ConnectionState, EnvironmentReading, SharedStatus};
use crate::{HUMIDITY_REGISTER, TEMPERATURE_REGISTER};

/// Background task polling the environment sensor registers
pub struct EnvironmentPoller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl EnvironmentPoller {
    pub fn spawn(
        transport: Arc<ModbusTransport>,
        status: SharedStatus,
        interval: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(transport, status, interval, token.clone()));
        Self { token, handle }
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Environment poller task join failed: {e}");
        }
    }
}

async fn poll_loop(
    transport: Arc<ModbusTransport>,
    status: SharedStatus,
    interval: Duration,
    token: CancellationToken,
) {
    info!(
        "Environment poller started ({}ms interval)",
        interval.as_millis()
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let reading = match read_sensors(&transport).await {
            Ok(reading) => reading,
            Err(e) => {
                debug!("Environment read failed: {e}");
                if !transport.is_connected()
                    && status.snapshot().connection == ConnectionState::Connected
                {
                    warn!("PLC link lost, degrading displayed state");
                    status.reset_to_disconnected();
                    continue;
                }
                EnvironmentReading::default()
            }
        };
        status.set_environment(reading);
    }
    info!("Environment poller stopped");
}

async fn read_sensors(transport: &ModbusTransport) -> chaser_modbus::Result<EnvironmentReading> {
    let temperature_raw = read_register(transport, TEMPERATURE_REGISTER).await?;
    let humidity_raw = read_register(transport, HUMIDITY_REGISTER).await?;
    Ok(EnvironmentReading {
        temperature: decode_temperature(temperature_raw),
        humidity: decode_humidity(humidity_raw),
    })
}

async fn read_register(transport: &ModbusTransport, address: u16) -> chaser_modbus::Result<u16> {
    let request = Request::ReadInputRegisters {
        address,
        quantity: 1,
    };
    let registers = transport.execute(&request).await?.into_registers()?;
    registers.first().copied().ok_or_else(|| {
        chaser_modbus::ModbusError::protocol(format!("Empty register response for {address}"))
    })
}
