//! Shared status state published to presentation layers
//!
//! Each background component owns one slice of the snapshot (the input
//! poller owns DI, the sequencer and manual gate own DQ, the environment
//! poller owns the sensor reading) and publishes whole-value updates under
//! a single lock, so readers never observe a partially updated snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::POINT_COUNT;

/// PLC connection liveness, as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Digital output (DQ) and input (DI) point states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoSnapshot {
    pub outputs: [bool; POINT_COUNT],
    pub inputs: [bool; POINT_COUNT],
}

impl Default for IoSnapshot {
    fn default() -> Self {
        Self {
            outputs: [false; POINT_COUNT],
            inputs: [false; POINT_COUNT],
        }
    }
}

/// Display label for an output point, e.g. `Q0.0` or `Q1.5`
pub fn output_label(index: usize) -> String {
    format!("Q{}.{}", index / 8, index % 8)
}

/// Display label for an input point, e.g. `I0.0` or `I1.5`
pub fn input_label(index: usize) -> String {
    format!("I{}.{}", index / 8, index % 8)
}

/// Chasing-light sequencer state
///
/// Invariants: stopped means `speed_level == 0` and `current_index == -1`;
/// running means `speed_level` in 1..=3 and exactly one output bit lit,
/// matching `current_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerState {
    pub running: bool,
    /// 1..=3 while running, 0 when stopped
    pub speed_level: u8,
    /// 0..=13 while running, -1 when stopped or before the first tick
    pub current_index: i8,
    /// Tick period derived from the speed level, 0 when stopped
    pub delay_ms: u64,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            running: false,
            speed_level: 0,
            current_index: -1,
            delay_ms: 0,
        }
    }
}

impl SequencerState {
    /// Label of the currently lit output, if any
    pub fn current_output_label(&self) -> Option<String> {
        usize::try_from(self.current_index)
            .ok()
            .filter(|&i| i < POINT_COUNT)
            .map(output_label)
    }
}

/// Calibrated environment reading; `None` marks an out-of-range value
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvironmentReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl EnvironmentReading {
    pub fn format_temperature(&self) -> String {
        match self.temperature {
            Some(t) => format!("{t:.1} degC"),
            None => "--".to_string(),
        }
    }

    pub fn format_humidity(&self) -> String {
        match self.humidity {
            Some(h) => format!("{h:.1} %RH"),
            None => "--".to_string(),
        }
    }
}

/// Complete status snapshot handed to presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusSnapshot {
    pub connection: ConnectionState,
    pub sequencer: SequencerState,
    pub io: IoSnapshot,
    pub environment: EnvironmentReading,
}

impl StatusSnapshot {
    /// One-line summary for periodic status logging
    pub fn summary(&self) -> String {
        let connection = match self.connection {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        let sequencer = if self.sequencer.running {
            format!(
                "running level={} delay={}ms output={}",
                self.sequencer.speed_level,
                self.sequencer.delay_ms,
                self.sequencer
                    .current_output_label()
                    .unwrap_or_else(|| "-".to_string())
            )
        } else {
            "stopped".to_string()
        };
        format!(
            "{connection} | sequencer {sequencer} | temp {} | humidity {}",
            self.environment.format_temperature(),
            self.environment.format_humidity()
        )
    }
}

/// Observer registered by the active presentation layer
///
/// Called after every published state change, outside the status lock.
/// The core never depends on any specific presentation type.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, snapshot: &StatusSnapshot);
}

/// Thread-safe status cell shared between components and presentation
#[derive(Clone, Default)]
pub struct SharedStatus {
    inner: Arc<RwLock<StatusSnapshot>>,
    observer: Arc<RwLock<Option<Arc<dyn StatusObserver>>>>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking read of the current snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        *self.inner.read()
    }

    /// Register (or clear) the presentation observer
    pub fn set_observer(&self, observer: Option<Arc<dyn StatusObserver>>) {
        *self.observer.write() = observer;
    }

    /// Apply a mutation atomically, then notify the observer outside the lock
    pub fn publish<F: FnOnce(&mut StatusSnapshot)>(&self, mutate: F) {
        let snapshot = {
            let mut guard = self.inner.write();
            mutate(&mut guard);
            *guard
        };
        if let Some(observer) = self.observer.read().clone() {
            observer.status_changed(&snapshot);
        }
    }

    pub fn set_connection(&self, connection: ConnectionState) {
        self.publish(|s| s.connection = connection);
    }

    pub fn set_inputs(&self, inputs: [bool; POINT_COUNT]) {
        self.publish(|s| s.io.inputs = inputs);
    }

    pub fn set_outputs(&self, outputs: [bool; POINT_COUNT]) {
        self.publish(|s| s.io.outputs = outputs);
    }

    pub fn set_environment(&self, reading: EnvironmentReading) {
        self.publish(|s| s.environment = reading);
    }

    /// Degrade displayed state to defaults on connection loss
    pub fn reset_to_disconnected(&self) {
        self.publish(|s| {
            s.connection = ConnectionState::Disconnected;
            s.io = IoSnapshot::default();
            s.environment = EnvironmentReading::default();
        });
    }
}
