//! BlueZ backend (Linux, D-Bus via `bluer`).
//!
//! The registry lists bonded devices of one adapter. The transport registers
//! an RFCOMM client profile for the requested service class, asks BlueZ to
//! connect that profile on the device, and accepts the stream BlueZ hands
//! back over the profile.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, ReqError, Role, Stream};
use bluer::{Adapter, Address, Device, Session};
use futures::StreamExt;
use rc_link_types::PairedDevice;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::{ByteSink, ConnectionHandle, PairedDeviceRegistry, SerialConnection, SerialTransport};

/// Registry and transport backed by the system BlueZ daemon.
///
/// Construction never fails: a missing daemon or adapter is logged and
/// every later call reports [`TransportError::AdapterUnavailable`].
pub struct BluezBackend {
    bus: Option<(Session, Adapter)>,
    unavailable_reason: String,
}

impl BluezBackend {
    /// Connect to BlueZ and pick `adapter` (e.g. "hci0"), or the default adapter.
    pub async fn new(adapter: Option<&str>) -> Self {
        match Self::open_bus(adapter).await {
            Ok((session, adapter)) => {
                info!(adapter = %adapter.name(), "using bluetooth adapter");
                Self {
                    bus: Some((session, adapter)),
                    unavailable_reason: String::new(),
                }
            }
            Err(e) => {
                warn!(error = %e, "bluetooth adapter unavailable");
                Self {
                    bus: None,
                    unavailable_reason: e.to_string(),
                }
            }
        }
    }

    async fn open_bus(adapter: Option<&str>) -> bluer::Result<(Session, Adapter)> {
        let session = Session::new().await?;
        let adapter = match adapter {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        if !adapter.is_powered().await? {
            return Err(bluer::Error {
                kind: bluer::ErrorKind::NotReady,
                message: format!("adapter {} is powered off", adapter.name()),
            });
        }
        Ok((session, adapter))
    }

    fn bus(&self) -> Result<&(Session, Adapter), TransportError> {
        self.bus
            .as_ref()
            .ok_or_else(|| TransportError::AdapterUnavailable(self.unavailable_reason.clone()))
    }

    async fn describe(device: &Device) -> bluer::Result<Option<PairedDevice>> {
        if !device.is_paired().await? {
            return Ok(None);
        }
        let name = match device.name().await? {
            Some(name) => name,
            None => device.alias().await?,
        };
        Ok(Some(PairedDevice::new(name, device.address().to_string())))
    }
}

#[async_trait]
impl PairedDeviceRegistry for BluezBackend {
    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, TransportError> {
        let (_, adapter) = self.bus()?;
        let addresses = adapter
            .device_addresses()
            .await
            .map_err(|e| TransportError::AdapterUnavailable(e.to_string()))?;

        let mut paired = Vec::new();
        for address in addresses {
            let device = match adapter.device(address) {
                Ok(device) => device,
                Err(e) => {
                    debug!(%address, error = %e, "skipping device");
                    continue;
                }
            };
            match Self::describe(&device).await {
                Ok(Some(info)) => paired.push(info),
                Ok(None) => {}
                Err(e) => debug!(%address, error = %e, "failed to read device properties"),
            }
        }
        Ok(paired)
    }
}

#[async_trait]
impl SerialTransport for BluezBackend {
    async fn open(
        &self,
        device: &PairedDevice,
        service: Uuid,
    ) -> Result<SerialConnection, TransportError> {
        let (session, adapter) = self.bus()?;
        let address: Address = device.address.parse().map_err(|e| {
            TransportError::Open(format!("invalid address {}: {e}", device.address))
        })?;
        let remote = adapter.device(address).map_err(open_error)?;

        let profile = Profile {
            uuid: service,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        // Dropping the handle unregisters the profile, so every early return
        // below leaves nothing registered.
        let mut registration = session.register_profile(profile).await.map_err(open_error)?;
        debug!(%address, %service, "registered rfcomm client profile");

        let stream = {
            let connect = remote.connect_profile(&service);
            tokio::pin!(connect);
            let mut profile_connected = false;

            loop {
                tokio::select! {
                    result = &mut connect, if !profile_connected => {
                        result.map_err(open_error)?;
                        profile_connected = true;
                    }
                    request = registration.next() => {
                        let Some(request) = request else {
                            return Err(TransportError::Open("profile registration closed".to_string()));
                        };
                        if request.device() != address {
                            debug!(from = %request.device(), "rejecting connection from other device");
                            request.reject(ReqError::Rejected);
                            continue;
                        }
                        break request.accept().map_err(open_error)?;
                    }
                }
            }
        };

        info!(device = %device.name, %address, "rfcomm stream open");
        Ok(SerialConnection::new(
            Box::new(BluezHandle {
                device: remote,
                service,
                registration: Some(registration),
            }),
            Box::new(BluezSink {
                stream: Some(stream),
            }),
        ))
    }
}

fn open_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Open(e.to_string())
}

/// Output half: the RFCOMM stream.
struct BluezSink {
    stream: Option<Stream>,
}

#[async_trait]
impl ByteSink for BluezSink {
    async fn write_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Write("stream closed".to_string()))?;
        stream
            .write_all(&[byte])
            .await
            .map_err(|e| TransportError::Write(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.take() {
            Some(mut stream) => stream
                .shutdown()
                .await
                .map_err(|e| TransportError::Close(e.to_string())),
            None => Ok(()),
        }
    }
}

/// Connection half: the profile registration and the device-side profile link.
struct BluezHandle {
    device: Device,
    service: Uuid,
    registration: Option<ProfileHandle>,
}

#[async_trait]
impl ConnectionHandle for BluezHandle {
    async fn close(&mut self) -> Result<(), TransportError> {
        if self.registration.take().is_none() {
            return Ok(());
        }
        self.device
            .disconnect_profile(&self.service)
            .await
            .map_err(|e| TransportError::Close(e.to_string()))
    }
}
