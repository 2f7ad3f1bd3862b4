//! Mock backends for testing and dry runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rc_link_types::PairedDevice;
use uuid::Uuid;

use crate::error::TransportError;
use crate::{ByteSink, ConnectionHandle, PairedDeviceRegistry, SerialConnection, SerialTransport};

// ---------------------------------------------------------------------------
// MockRegistry
// ---------------------------------------------------------------------------

/// Mock paired-device registry with a fixed device list.
#[derive(Debug, Clone)]
pub struct MockRegistry {
    devices: Option<Vec<PairedDevice>>,
}

impl MockRegistry {
    /// A registry reporting the given names as paired, with synthetic addresses.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| PairedDevice::new(name, format!("00:00:00:00:00:{:02X}", i + 1)))
            .collect();
        Self {
            devices: Some(devices),
        }
    }

    /// A registry whose adapter is missing.
    pub fn unavailable() -> Self {
        Self { devices: None }
    }
}

#[async_trait]
impl PairedDeviceRegistry for MockRegistry {
    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, TransportError> {
        self.devices
            .clone()
            .ok_or_else(|| TransportError::AdapterUnavailable("mock adapter absent".to_string()))
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Scripted result of one [`SerialTransport::open`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Succeed,
    Fail,
    /// Never completes; only cancellation ends the call.
    Hang,
}

/// Shared state for observing what `MockTransport` did.
#[derive(Debug, Default)]
struct MockTransportState {
    script: VecDeque<OpenOutcome>,
    open_delay: Duration,
    open_attempts: usize,
    opened: Vec<(PairedDevice, Uuid)>,
    write_attempts: usize,
    written: Vec<u8>,
    fail_writes: bool,
    stall_writes: bool,
    fail_output_close: bool,
    fail_handle_close: bool,
    output_closes: usize,
    handle_closes: usize,
}

/// Mock serial transport.
///
/// `open` consumes one scripted [`OpenOutcome`] per call and succeeds once
/// the script is exhausted.
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A transport whose opens always succeed.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockTransportState::default())),
        }
    }

    /// A transport that plays `outcomes` in order.
    pub fn scripted(outcomes: impl IntoIterator<Item = OpenOutcome>) -> Self {
        let transport = Self::new();
        transport.state.lock().unwrap().script = outcomes.into_iter().collect();
        transport
    }

    /// Delay every open by `delay` before its outcome applies.
    #[must_use]
    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().open_delay = delay;
        self
    }

    /// Get a clonable handle for observing the transport from tests.
    pub fn handle(&self) -> MockTransportHandle {
        MockTransportHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable observer handle for `MockTransport`.
///
/// Tests use this to inspect open attempts, written bytes and closes, and to
/// inject failures into live connections.
#[derive(Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransportHandle {
    /// Number of `open` calls so far.
    pub fn open_attempts(&self) -> usize {
        self.state.lock().unwrap().open_attempts
    }

    /// Devices and services passed to `open`, in call order.
    pub fn opened(&self) -> Vec<(PairedDevice, Uuid)> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Bytes successfully written across all connections.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    /// Number of `write_byte` calls, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.state.lock().unwrap().write_attempts
    }

    /// Number of output channel closes.
    pub fn output_closes(&self) -> usize {
        self.state.lock().unwrap().output_closes
    }

    /// Number of connection handle closes.
    pub fn handle_closes(&self) -> usize {
        self.state.lock().unwrap().handle_closes
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Make every subsequent write block forever, like a full send buffer.
    pub fn stall_writes(&self, stall: bool) {
        self.state.lock().unwrap().stall_writes = stall;
    }

    /// Make output channel closes report an error.
    pub fn fail_output_close(&self, fail: bool) {
        self.state.lock().unwrap().fail_output_close = fail;
    }

    /// Make handle closes report an error.
    pub fn fail_handle_close(&self, fail: bool) {
        self.state.lock().unwrap().fail_handle_close = fail;
    }
}

#[async_trait]
impl SerialTransport for MockTransport {
    async fn open(
        &self,
        device: &PairedDevice,
        service: Uuid,
    ) -> Result<SerialConnection, TransportError> {
        let (outcome, delay) = {
            let mut state = self.state.lock().unwrap();
            state.open_attempts += 1;
            state.opened.push((device.clone(), service));
            let outcome = state.script.pop_front().unwrap_or(OpenOutcome::Succeed);
            (outcome, state.open_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            OpenOutcome::Succeed => Ok(SerialConnection::new(
                Box::new(MockHandle {
                    state: Arc::clone(&self.state),
                }),
                Box::new(MockSink {
                    state: Arc::clone(&self.state),
                    closed: false,
                }),
            )),
            OpenOutcome::Fail => Err(TransportError::Open(format!(
                "mock refused connection to {}",
                device.name
            ))),
            OpenOutcome::Hang => std::future::pending().await,
        }
    }
}

struct MockSink {
    state: Arc<Mutex<MockTransportState>>,
    closed: bool,
}

#[async_trait]
impl ByteSink for MockSink {
    async fn write_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().unwrap();
            state.write_attempts += 1;
            if self.closed {
                return Err(TransportError::Write("output channel closed".to_string()));
            }
            if !state.stall_writes {
                if state.fail_writes {
                    return Err(TransportError::Write("broken pipe".to_string()));
                }
                state.written.push(byte);
                return Ok(());
            }
        }
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.output_closes += 1;
        self.closed = true;
        if state.fail_output_close {
            return Err(TransportError::Close("output close failed".to_string()));
        }
        Ok(())
    }
}

struct MockHandle {
    state: Arc<Mutex<MockTransportState>>,
}

#[async_trait]
impl ConnectionHandle for MockHandle {
    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.handle_closes += 1;
        if state.fail_handle_close {
            return Err(TransportError::Close("handle close failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_link_types::SERIAL_PORT_PROFILE_UUID;

    #[tokio::test]
    async fn registry_reports_names_or_unavailable() {
        let registry = MockRegistry::with_names(["HC-05", "Other"]);
        let devices = registry.paired_devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "HC-05");
        assert_ne!(devices[0].address, devices[1].address);

        let err = MockRegistry::unavailable().paired_devices().await.unwrap_err();
        assert!(matches!(err, TransportError::AdapterUnavailable(_)));
    }

    #[tokio::test]
    async fn script_is_played_in_order() {
        let transport = MockTransport::scripted([OpenOutcome::Fail, OpenOutcome::Succeed]);
        let handle = transport.handle();
        let device = PairedDevice::new("HC-05", "00:00:00:00:00:01");

        assert!(transport
            .open(&device, SERIAL_PORT_PROFILE_UUID)
            .await
            .is_err());
        let mut conn = transport
            .open(&device, SERIAL_PORT_PROFILE_UUID)
            .await
            .unwrap();
        conn.output.write_byte(b'F').await.unwrap();

        assert_eq!(handle.open_attempts(), 2);
        assert_eq!(handle.written(), b"F");
        assert_eq!(handle.opened()[0].1, SERIAL_PORT_PROFILE_UUID);
    }

    #[tokio::test]
    async fn closed_sink_rejects_writes() {
        let transport = MockTransport::new();
        let handle = transport.handle();
        let device = PairedDevice::new("HC-05", "00:00:00:00:00:01");
        let mut conn = transport
            .open(&device, SERIAL_PORT_PROFILE_UUID)
            .await
            .unwrap();

        conn.output.close().await.unwrap();
        conn.handle.close().await.unwrap();
        assert!(conn.output.write_byte(b'S').await.is_err());
        assert!(handle.written().is_empty());
        assert_eq!(handle.output_closes(), 1);
        assert_eq!(handle.handle_closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_sink_never_completes_a_write() {
        let transport = MockTransport::new();
        let handle = transport.handle();
        let device = PairedDevice::new("HC-05", "00:00:00:00:00:01");
        let mut conn = transport
            .open(&device, SERIAL_PORT_PROFILE_UUID)
            .await
            .unwrap();

        handle.stall_writes(true);
        let stalled =
            tokio::time::timeout(Duration::from_secs(60), conn.output.write_byte(b'F')).await;
        assert!(stalled.is_err());
        assert_eq!(handle.write_attempts(), 1);
        assert!(handle.written().is_empty());

        handle.stall_writes(false);
        conn.output.write_byte(b'S').await.unwrap();
        assert_eq!(handle.written(), b"S");
    }
}
